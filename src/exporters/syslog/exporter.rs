// SPDX-License-Identifier: Apache-2.0

use chrono::Local;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::{debug, info, warn};

use super::config::SyslogExporterConfig;
use super::message::format_message;
use super::writer::SyslogWriter;
use crate::bounded_channel::BoundedReceiver;
use crate::receivers::dirsync::LineBatch;

/// Forwards every received line to a syslog server
pub struct SyslogExporter {
    config: SyslogExporterConfig,
    rx: BoundedReceiver<LineBatch>,
    writer: SyslogWriter,
}

impl SyslogExporter {
    /// Validate the config and open the connection.
    pub async fn new(
        config: SyslogExporterConfig,
        rx: BoundedReceiver<LineBatch>,
    ) -> Result<Self, BoxError> {
        config.validate()?;
        let transport = config.transport()?;
        let writer = SyslogWriter::connect(&transport, config.split)
            .await
            .map_err(|e| format!("unable to connect to syslog endpoint {}: {}", transport, e))?;

        Ok(Self { config, rx, writer })
    }

    pub async fn start(&mut self, cancel_token: CancellationToken) -> Result<(), BoxError> {
        info!(
            endpoint = self.config.endpoint,
            mode = ?self.config.mode,
            "Starting syslog exporter"
        );

        loop {
            let mut batch = select! {
                m = self.rx.next() => match m {
                    Some(batch) => batch,
                    None => break,
                },
                _ = cancel_token.cancelled() => break,
            };

            for line in &batch.lines {
                if !self.send_line(line, &cancel_token).await {
                    // The batch is dropped unacknowledged and will be read again
                    debug!("Syslog exporter cancelled while retrying");
                    self.writer.close().await;
                    return Ok(());
                }
            }
            batch.ack();
            debug!(file = batch.file, count = batch.lines.len(), "Forwarded batch");
        }

        self.writer.close().await;
        debug!("exiting syslog exporter");
        Ok(())
    }

    /// Write one line, retrying until it succeeds. Returns false when
    /// cancelled first.
    async fn send_line(&mut self, line: &str, cancel_token: &CancellationToken) -> bool {
        let message = format_message(
            self.config.mode,
            self.config.facility,
            self.config.severity,
            &Local::now(),
            &self.config.hostname,
            line,
        );

        loop {
            match self.writer.write(&message).await {
                Ok(()) => return true,
                Err(e) => {
                    warn!(
                        error = %e,
                        retry_interval = ?self.config.retry_interval,
                        "Failed to write to syslog server, will retry"
                    );
                }
            }

            select! {
                _ = tokio::time::sleep(self.config.retry_interval) => {}
                _ = cancel_token.cancelled() => return false,
            }
        }
    }
}
