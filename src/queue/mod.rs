//! The queue: debounced collection, batching, retry with backoff, and crash
//! recovery over a persistent store.

mod config;
mod engine;
mod error;
mod recovery;

pub use config::{QueueOptions, TrimFn};
pub use error::{ConfigError, QueueError};

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::processor::Processor;
use crate::storage::StorageAdapter;

use engine::{Command, Engine};

/// A handle to one queue instance.
///
/// The instance owns in-memory timers and an engine task; all durable state
/// lives in the storage adapter under the instance's label. Handles are
/// cheap to clone; the engine stops when [`destroy`](Self::destroy) is
/// called or every handle is dropped, leaving persisted state for a later
/// instance with the same label to recover.
#[derive(Debug, Clone)]
pub struct Queue {
    label: String,
    tx: mpsc::UnboundedSender<Command>,
}

impl Queue {
    /// Creates a queue instance and runs the recovery protocol for its
    /// label before any item is accepted.
    ///
    /// Must be called from within a Tokio runtime; the engine is spawned
    /// onto it.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Config`] if the options fail validation and
    /// [`QueueError::Storage`] if the store cannot be read or written
    /// during recovery.
    pub fn new(
        options: QueueOptions,
        processor: Arc<dyn Processor>,
        storage: Arc<dyn StorageAdapter>,
    ) -> Result<Self, QueueError> {
        options.validate()?;
        recovery::run_recovery(storage.as_ref(), &options.label, options.active_expiry)?;

        // Recovered items must form a batch without waiting for a fresh
        // enqueue, honoring any backoff delay persisted before the crash.
        let pending = storage.get_queue(&options.label)?;
        let startup_delay = if pending.is_empty() {
            None
        } else {
            let backoff_ms = storage.get_backoff_ms(&options.label)?;
            Some(options.debounce.max(Duration::from_millis(backoff_ms)))
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let label = options.label.clone();
        let engine = Engine::new(options, processor, storage, rx, startup_delay);
        tokio::spawn(engine.run());
        Ok(Self { label, tx })
    }

    /// Appends an item to the pending list and (re)arms the debounce
    /// timer; a burst of calls within the window yields one batching
    /// decision.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`] if the item could not be persisted
    /// and [`QueueError::Closed`] after `destroy`.
    pub async fn enqueue(&self, item: Value) -> Result<(), QueueError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Command::Enqueue { item, reply })
            .map_err(|_| QueueError::Closed)?;
        response.await.map_err(|_| QueueError::Closed)?
    }

    /// Cancels the debounce timer and batches everything pending right
    /// now. Items enqueued afterwards form a separate, later batch.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`] if batching could not be persisted
    /// and [`QueueError::Closed`] after `destroy`.
    pub async fn flush(&self) -> Result<(), QueueError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Command::Flush { reply })
            .map_err(|_| QueueError::Closed)?;
        response.await.map_err(|_| QueueError::Closed)?
    }

    /// Stops this instance's timers and engine without touching persisted
    /// state. An in-flight processing attempt is not cancelled; the engine
    /// merely stops listening for its completion.
    pub fn destroy(&self) {
        let _ = self.tx.send(Command::Destroy);
    }

    /// The label this instance is bound to.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}
