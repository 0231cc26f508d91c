// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use tokio::select;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::{debug, info, warn};

use crate::bounded_channel::bounded;
use crate::exporters::blackhole::BlackholeExporter;
use crate::exporters::syslog::SyslogExporter;
use crate::init::args::{AgentRun, Exporter};
use crate::init::wait;
use crate::receivers::dirsync::{DirSyncReceiver, LineBatch};

/// Wires the directory sync receiver to the configured exporter and owns
/// their shutdown order.
pub struct Agent {
    config: Box<AgentRun>,
}

impl Agent {
    pub fn new(config: Box<AgentRun>) -> Self {
        Self { config }
    }

    pub async fn run(self, agent_cancel: CancellationToken) -> Result<(), BoxError> {
        info!("Starting dirsync agent.");

        let config = self.config;
        let mut receivers_task_set = JoinSet::new();
        let mut exporters_task_set = JoinSet::new();
        let receivers_cancel = CancellationToken::new();
        let exporters_cancel = CancellationToken::new();

        let receiver_config = config.dirsync_receiver.build_config();
        receiver_config.validate()?;

        let (output, exporter_rx) = bounded::<LineBatch>(config.sending_queue_size.max(1));

        match config.exporter {
            Exporter::Blackhole => {
                info!("Using blackhole exporter, lines will be discarded.");
                let mut exporter = BlackholeExporter::new(exporter_rx);
                let token = exporters_cancel.clone();
                exporters_task_set.spawn(async move {
                    exporter.start(token).await;
                    Ok(())
                });
            }
            Exporter::Syslog => {
                let syslog_config = config.syslog_exporter.build_config()?;
                info!(endpoint = syslog_config.endpoint, "Using syslog exporter.");
                let mut exporter = SyslogExporter::new(syslog_config, exporter_rx).await?;
                let token = exporters_cancel.clone();
                exporters_task_set.spawn(async move { exporter.start(token).await });
            }
        }

        // The receiver owns the only sender, so the exporter sees the channel
        // close once the receiver has exited.
        let receiver = DirSyncReceiver::new(receiver_config, output)?;
        receiver
            .start(&mut receivers_task_set, &receivers_cancel)
            .await?;

        let mut result = Ok(());
        select! {
            _ = agent_cancel.cancelled() => {
                debug!("Agent cancellation signaled.");
            },
            e = wait::wait_for_any_task(&mut receivers_task_set) => {
                match e {
                    Ok(()) => info!("Unexpected early exit of receiver."),
                    Err(e) => result = Err(e),
                }
            },
            e = wait::wait_for_any_task(&mut exporters_task_set) => {
                match e {
                    Ok(()) => warn!("Unexpected early exit of exporter."),
                    Err(e) => result = Err(e),
                }
            },
        }

        // Stop the receiver first so that no batch is committed after the
        // exporter is gone.
        receivers_cancel.cancel();
        let res =
            wait::wait_for_tasks_with_timeout(&mut receivers_task_set, Duration::from_secs(1))
                .await;
        if let Err(e) = res {
            if result.is_ok() {
                return Err(format!("timed out waiting for receiver exit: {}", e).into());
            }
        }

        // Give the exporter a chance to drain what was already handed over
        let res =
            wait::wait_for_tasks_with_timeout(&mut exporters_task_set, Duration::from_millis(500))
                .await;
        if res.is_err() {
            warn!("Exporter did not exit on channel close, cancelling.");
            exporters_cancel.cancel();

            let res =
                wait::wait_for_tasks_with_timeout(&mut exporters_task_set, Duration::from_secs(3))
                    .await;
            if let Err(e) = res {
                if result.is_ok() {
                    return Err(format!("timed out waiting for exporter exit: {}", e).into());
                }
            }
        }

        result
    }
}
