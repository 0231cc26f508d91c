// SPDX-License-Identifier: Apache-2.0

//! Polling receiver that drives a [`DirectoryLineReader`] and hands its
//! batches to the exporter.
//!
//! The line reader does blocking I/O, so every call runs on the blocking
//! pool. The reader is moved into the blocking task and back, which keeps
//! exactly one call in flight at a time. A batch is committed only after
//! the exporter has acknowledged it, so at most one batch is in flight.

use std::fmt;
use std::path::Path;

use tokio::select;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::{debug, error, info, warn};

use super::config::DirSyncConfig;
use super::error::Result;
use super::line_reader::DirectoryLineReader;
use crate::bounded_channel::{BoundedSender, SendError};

/// Lines read from one file in one batch
pub struct LineBatch {
    /// Source file, relative to the watched directory
    pub file: String,
    pub lines: Vec<String>,
    ack_chan: Option<oneshot::Sender<()>>,
}

impl LineBatch {
    /// A batch that nobody waits on
    pub fn new(file: impl Into<String>, lines: Vec<String>) -> Self {
        Self {
            file: file.into(),
            lines,
            ack_chan: None,
        }
    }

    /// A batch whose delivery is reported on the returned receiver
    pub fn with_ack(file: String, lines: Vec<String>) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let batch = Self {
            file,
            lines,
            ack_chan: Some(tx),
        };
        (batch, rx)
    }

    /// Confirm the batch was delivered. A batch dropped without this call
    /// is read again.
    pub fn ack(&mut self) {
        if let Some(tx) = self.ack_chan.take() {
            let _ = tx.send(());
        }
    }
}

// Manual Debug since the ack channel has nothing worth printing
impl fmt::Debug for LineBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineBatch")
            .field("file", &self.file)
            .field("lines", &self.lines)
            .field("ack_chan", &self.ack_chan.is_some())
            .finish()
    }
}

pub struct DirSyncReceiver {
    config: DirSyncConfig,
    reader: DirectoryLineReader,
    output: BoundedSender<LineBatch>,
}

impl DirSyncReceiver {
    pub fn new(config: DirSyncConfig, output: BoundedSender<LineBatch>) -> Result<Self> {
        let reader = DirectoryLineReader::new(&config)?;
        Ok(Self {
            config,
            reader,
            output,
        })
    }

    pub async fn start(
        self,
        task_set: &mut JoinSet<std::result::Result<(), BoxError>>,
        receivers_cancel: &CancellationToken,
    ) -> std::result::Result<(), BoxError> {
        info!(
            directory = ?self.config.directory,
            batch_size = self.config.batch_size,
            poll_interval = ?self.config.poll_interval,
            "Starting directory sync receiver"
        );

        let cancel = receivers_cancel.clone();
        task_set.spawn(async move { self.run(cancel).await });

        Ok(())
    }

    async fn run(self, cancel: CancellationToken) -> std::result::Result<(), BoxError> {
        let Self {
            config,
            mut reader,
            output,
        } = self;
        let batch_size = config.batch_size;

        'poll: loop {
            // Drain everything that is available right now
            loop {
                if cancel.is_cancelled() {
                    break 'poll;
                }

                let (r, lines) = run_blocking(reader, move |r| r.read_lines(batch_size)).await?;
                reader = r;
                let lines = lines?;
                if lines.is_empty() {
                    break;
                }

                let file = relative_name(reader.root(), reader.last_file_read());
                let (batch, ack_rx) = LineBatch::with_ack(file, lines);
                let count = batch.lines.len();

                match output.send_cancellable(batch, &cancel).await {
                    Ok(()) => {}
                    Err(SendError::Cancelled) => {
                        debug!("Send cancelled during shutdown, batch will be read again");
                        break 'poll;
                    }
                    Err(SendError::Disconnected) => {
                        error!("Output channel closed, stopping directory sync receiver");
                        reader.close();
                        return Err("output channel closed".into());
                    }
                }

                let delivered = select! {
                    ack = ack_rx => ack.is_ok(),
                    _ = cancel.cancelled() => {
                        debug!("Cancelled awaiting delivery, batch will be read again");
                        break 'poll;
                    }
                };
                if !delivered {
                    warn!(count, "Batch was dropped before delivery, it will be read again");
                    break;
                }

                let (r, committed) = run_blocking(reader, |r| r.commit()).await?;
                reader = r;
                committed?;
                debug!(count, "Committed batch");
            }

            select! {
                _ = tokio::time::sleep(config.poll_interval) => {}
                _ = cancel.cancelled() => break 'poll,
            }
        }

        info!("Directory sync receiver cancelled, shutting down");
        reader.close();
        Ok(())
    }
}

/// Run `f` against the reader on the blocking pool, handing the reader back
/// together with the result.
async fn run_blocking<T, F>(
    mut reader: DirectoryLineReader,
    f: F,
) -> std::result::Result<(DirectoryLineReader, Result<T>), BoxError>
where
    T: Send + 'static,
    F: FnOnce(&mut DirectoryLineReader) -> Result<T> + Send + 'static,
{
    let handle = tokio::task::spawn_blocking(move || {
        let result = f(&mut reader);
        (reader, result)
    });
    Ok(handle.await?)
}

fn relative_name(root: &Path, file: Option<&Path>) -> String {
    let Some(file) = file else {
        return String::new();
    };
    file.strip_prefix(root)
        .unwrap_or(file)
        .to_string_lossy()
        .into_owned()
}
