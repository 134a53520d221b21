//! Persistent store adapters.
//!
//! The engine never talks to a backend directly; everything durable goes
//! through [`StorageAdapter`], a synchronous key-value contract namespaced
//! by queue label. Four logical keys exist per label: the pending list, the
//! active-batch checkout record, the consecutive error count, and the
//! current backoff delay.

mod error;
mod file;
mod memory;

pub use error::StorageError;
pub use file::FileStorage;
pub use memory::MemoryStorage;

use uuid::Uuid;

use crate::models::{ActiveBatch, QueueEntry};

/// Synchronous persistent store for queue state, namespaced by label.
///
/// Each method is a whole-value read or write of one key. The engine
/// performs read-modify-write sequences against these without yielding in
/// between, so implementations only need per-call consistency, not
/// transactions.
pub trait StorageAdapter: Send + Sync {
    /// Returns the pending list for `label`, empty if absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read or the stored
    /// value cannot be decoded.
    fn get_queue(&self, label: &str) -> Result<Vec<QueueEntry>, StorageError>;

    /// Replaces the pending list for `label`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be encoded or written.
    fn set_queue(&self, label: &str, entries: &[QueueEntry]) -> Result<(), StorageError>;

    /// Returns the active-batch checkout record for `label`, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read or the stored
    /// value cannot be decoded.
    fn get_active_batch(&self, label: &str) -> Result<Option<ActiveBatch>, StorageError>;

    /// Writes the active-batch record for `label` with the given id,
    /// stamping the checkout time with the current wall clock.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be encoded or written.
    fn set_active_batch(&self, label: &str, id: Uuid) -> Result<(), StorageError>;

    /// Removes the active-batch record for `label`, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be written.
    fn clear_active_batch(&self, label: &str) -> Result<(), StorageError>;

    /// Returns the consecutive error count for `label`, 0 if absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read or the stored
    /// value cannot be decoded.
    fn get_error_count(&self, label: &str) -> Result<u32, StorageError>;

    /// Persists the consecutive error count for `label`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be written.
    fn set_error_count(&self, label: &str, count: u32) -> Result<(), StorageError>;

    /// Returns the current backoff delay for `label` in milliseconds, 0 if
    /// absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read or the stored
    /// value cannot be decoded.
    fn get_backoff_ms(&self, label: &str) -> Result<u64, StorageError>;

    /// Persists the current backoff delay for `label` in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be written.
    fn set_backoff_ms(&self, label: &str, ms: u64) -> Result<(), StorageError>;

    /// Clears all keys for `label`. Used by tests and operational tooling,
    /// not by normal queue operation.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be written.
    fn reset(&self, label: &str) -> Result<(), StorageError>;
}
