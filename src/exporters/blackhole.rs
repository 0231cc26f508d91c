// SPDX-License-Identifier: Apache-2.0

use crate::bounded_channel::BoundedReceiver;
use crate::receivers::dirsync::LineBatch;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Accepts batches and drops them
pub struct BlackholeExporter {
    rx: BoundedReceiver<LineBatch>,
    discarded: u64,
}

impl BlackholeExporter {
    pub fn new(rx: BoundedReceiver<LineBatch>) -> Self {
        BlackholeExporter { rx, discarded: 0 }
    }

    pub async fn start(&mut self, cancel_token: CancellationToken) {
        loop {
            select! {
                m = self.rx.next() => match m {
                    Some(mut batch) => {
                        self.discarded += batch.lines.len() as u64;
                        batch.ack();
                    }
                    None => break,
                },
                _ = cancel_token.cancelled() => break,
            }
        }
        debug!(discarded = self.discarded, "exiting blackhole exporter")
    }

    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}
