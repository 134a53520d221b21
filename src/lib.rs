//! batchq - Persistent, Debounced Batch Queue
//!
//! A client-side style task queue: callers push opaque items into a named
//! queue; the queue coalesces bursts of pushes, persists pending items
//! through a pluggable key-value adapter, and delivers them in batches to a
//! caller-supplied processor, retrying with exponential backoff on failure.
//! At most one batch is in flight per label, and a fresh instance recovers
//! items left behind by a previous one that died mid-attempt, flagging them
//! `repeated` so the processor can deduplicate side effects.
//!
//! ```no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use batchq::{DeliveredItem, MemoryStorage, ProcessError, Processor, Queue, QueueOptions};
//!
//! struct Uploader;
//!
//! #[async_trait]
//! impl Processor for Uploader {
//!     async fn process(&self, batch: Vec<DeliveredItem>) -> Result<(), ProcessError> {
//!         for item in batch {
//!             // send item.item somewhere; item.repeated means "maybe seen before"
//!         }
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() -> Result<(), batchq::QueueError> {
//! let queue = Queue::new(
//!     QueueOptions::new("analytics"),
//!     Arc::new(Uploader),
//!     Arc::new(MemoryStorage::new()),
//! )?;
//! queue.enqueue(serde_json::json!({"event": "page_view"})).await?;
//! # Ok(())
//! # }
//! ```

pub mod models;
pub mod processor;
pub mod queue;
pub mod storage;

pub use models::{ActiveBatch, BackoffPolicy, DeliveredItem, QueueEntry};
pub use processor::{ProcessError, Processor};
pub use queue::{ConfigError, Queue, QueueError, QueueOptions, TrimFn};
pub use storage::{FileStorage, MemoryStorage, StorageAdapter, StorageError};
