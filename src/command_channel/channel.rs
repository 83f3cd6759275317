//! Command Channel trait
//!
//! The core never talks to a document store directly; it receives a
//! [`CommandChannel`] handle at startup and only uses the three operations the
//! reconciliation loop needs.

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::mpsc::Receiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::types::{CommandRecord, CommandUpdate, Snapshot};
use crate::error_handling::types::PersistenceError;

#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Opens a push subscription on the command record.
    async fn watch(&self) -> Result<Subscription, PersistenceError>;

    /// Reads the current state; `None` when the record does not exist.
    async fn read(&self) -> Result<Option<CommandRecord>, PersistenceError>;

    /// Applies a partial update, substituting server timestamps.
    async fn update(&self, update: &CommandUpdate) -> Result<(), PersistenceError>;
}

/// A live, ordered stream of [`Snapshot`]s.
///
/// Delivery happens on a producer task owned by the channel implementation;
/// the subscription holds the receiving end of a bounded queue plus the means
/// to stop the producer.
pub struct Subscription {
    receiver: Receiver<Snapshot>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(
        receiver: Receiver<Snapshot>,
        cancel: CancellationToken,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            receiver,
            cancel,
            task,
        }
    }

    /// Next snapshot, or `None` once the producer has gone away.
    pub async fn recv(&mut self) -> Option<Snapshot> {
        self.receiver.recv().await
    }

    /// Stops the producer and waits for it to exit.
    pub async fn close(mut self) {
        self.cancel.cancel();
        self.receiver.close();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Subscription producer ended abnormally: {}", e);
            }
        }
        debug!("Subscription released");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
