//! In-process storage adapter.
//!
//! Clones share one underlying map, which models several queue instances on
//! the same page sharing one store. Values are kept as serialized JSON
//! strings, matching the wire shape a string-valued key-value backend would
//! hold.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use uuid::Uuid;

use super::{StorageAdapter, StorageError};
use crate::models::{ActiveBatch, QueueEntry};

const QUEUE_KEY: &str = "queue";
const ACTIVE_BATCH_KEY: &str = "active_batch";
const ERROR_COUNT_KEY: &str = "error_count";
const BACKOFF_MS_KEY: &str = "backoff_ms";

/// Shared in-memory store. Cheap to clone; all clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(label: &str, suffix: &str) -> String {
        format!("{label}::{suffix}")
    }

    fn read(&self, label: &str, suffix: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&Self::key(label, suffix))
            .cloned()
    }

    fn write(&self, label: &str, suffix: &str, value: String) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(Self::key(label, suffix), value);
    }

    fn remove(&self, label: &str, suffix: &str) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&Self::key(label, suffix));
    }
}

impl StorageAdapter for MemoryStorage {
    fn get_queue(&self, label: &str) -> Result<Vec<QueueEntry>, StorageError> {
        match self.read(label, QUEUE_KEY) {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    fn set_queue(&self, label: &str, entries: &[QueueEntry]) -> Result<(), StorageError> {
        let raw = serde_json::to_string(entries)?;
        self.write(label, QUEUE_KEY, raw);
        Ok(())
    }

    fn get_active_batch(&self, label: &str) -> Result<Option<ActiveBatch>, StorageError> {
        match self.read(label, ACTIVE_BATCH_KEY) {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn set_active_batch(&self, label: &str, id: Uuid) -> Result<(), StorageError> {
        let raw = serde_json::to_string(&ActiveBatch::new(id))?;
        self.write(label, ACTIVE_BATCH_KEY, raw);
        Ok(())
    }

    fn clear_active_batch(&self, label: &str) -> Result<(), StorageError> {
        self.remove(label, ACTIVE_BATCH_KEY);
        Ok(())
    }

    fn get_error_count(&self, label: &str) -> Result<u32, StorageError> {
        match self.read(label, ERROR_COUNT_KEY) {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(0),
        }
    }

    fn set_error_count(&self, label: &str, count: u32) -> Result<(), StorageError> {
        self.write(label, ERROR_COUNT_KEY, count.to_string());
        Ok(())
    }

    fn get_backoff_ms(&self, label: &str) -> Result<u64, StorageError> {
        match self.read(label, BACKOFF_MS_KEY) {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(0),
        }
    }

    fn set_backoff_ms(&self, label: &str, ms: u64) -> Result<(), StorageError> {
        self.write(label, BACKOFF_MS_KEY, ms.to_string());
        Ok(())
    }

    fn reset(&self, label: &str) -> Result<(), StorageError> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let prefix = format!("{label}::");
        map.retain(|key, _| !key.starts_with(&prefix));
        Ok(())
    }
}
