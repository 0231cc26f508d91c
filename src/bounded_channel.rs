// SPDX-License-Identifier: Apache-2.0

//! Bounded channel between the receiver and the exporter.

use flume::{Receiver, Sender};
use std::fmt;
use tokio::select;
use tokio_util::sync::CancellationToken;

pub struct BoundedSender<T> {
    tx: Sender<T>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SendError {
    /// Every receiver was dropped
    Disconnected,
    /// The cancellation token fired before the send completed
    Cancelled,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Disconnected => write!(f, "channel disconnected"),
            SendError::Cancelled => write!(f, "send cancelled"),
        }
    }
}

impl std::error::Error for SendError {}

impl<T> BoundedSender<T> {
    /// Wait for capacity and send `item`.
    pub async fn send(&self, item: T) -> Result<(), SendError> {
        self.tx
            .send_async(item)
            .await
            .map_err(|_| SendError::Disconnected)
    }

    /// Like `send`, but gives up when `cancel` fires while waiting for
    /// capacity. The item is dropped in that case.
    pub async fn send_cancellable(
        &self,
        item: T,
        cancel: &CancellationToken,
    ) -> Result<(), SendError> {
        let send_fut = self.tx.send_async(item);
        tokio::pin!(send_fut);

        select! {
            result = send_fut => result.map_err(|_| SendError::Disconnected),
            _ = cancel.cancelled() => Err(SendError::Cancelled),
        }
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

impl<T> Clone for BoundedSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

pub struct BoundedReceiver<T> {
    rx: Receiver<T>,
}

impl<T> BoundedReceiver<T> {
    /// Next item, or `None` once all senders are gone and the channel is
    /// drained.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv_async().await.ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

pub fn bounded<T>(size: usize) -> (BoundedSender<T>, BoundedReceiver<T>) {
    let (tx, rx) = flume::bounded::<T>(size);
    (BoundedSender { tx }, BoundedReceiver { rx })
}
