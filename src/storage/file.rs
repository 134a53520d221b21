//! File-backed storage adapter.
//!
//! One JSON object per file, holding the same string-valued keys as
//! [`MemoryStorage`](super::MemoryStorage). Every operation is a whole-file
//! read-modify-write guarded by a process-local mutex, so state survives a
//! process restart the way browser local storage survives a page reload.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use uuid::Uuid;

use super::{StorageAdapter, StorageError};
use crate::models::{ActiveBatch, QueueEntry};

const QUEUE_KEY: &str = "queue";
const ACTIVE_BATCH_KEY: &str = "active_batch";
const ERROR_COUNT_KEY: &str = "error_count";
const BACKOFF_MS_KEY: &str = "backoff_ms";

/// Storage adapter persisting to a single JSON file.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    /// Creates an adapter backed by `path`. The file is created on first
    /// write.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn key(label: &str, suffix: &str) -> String {
        format!("{label}::{suffix}")
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        if raw.is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn store(&self, map: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let raw = serde_json::to_string(map)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }

    fn read(&self, label: &str, suffix: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load()?.get(&Self::key(label, suffix)).cloned())
    }

    fn write(&self, label: &str, suffix: &str, value: String) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.load()?;
        map.insert(Self::key(label, suffix), value);
        self.store(&map)
    }

    fn remove(&self, label: &str, suffix: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.load()?;
        map.remove(&Self::key(label, suffix));
        self.store(&map)
    }
}

impl StorageAdapter for FileStorage {
    fn get_queue(&self, label: &str) -> Result<Vec<QueueEntry>, StorageError> {
        match self.read(label, QUEUE_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    fn set_queue(&self, label: &str, entries: &[QueueEntry]) -> Result<(), StorageError> {
        let raw = serde_json::to_string(entries)?;
        self.write(label, QUEUE_KEY, raw)
    }

    fn get_active_batch(&self, label: &str) -> Result<Option<ActiveBatch>, StorageError> {
        match self.read(label, ACTIVE_BATCH_KEY)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn set_active_batch(&self, label: &str, id: Uuid) -> Result<(), StorageError> {
        let raw = serde_json::to_string(&ActiveBatch::new(id))?;
        self.write(label, ACTIVE_BATCH_KEY, raw)
    }

    fn clear_active_batch(&self, label: &str) -> Result<(), StorageError> {
        self.remove(label, ACTIVE_BATCH_KEY)
    }

    fn get_error_count(&self, label: &str) -> Result<u32, StorageError> {
        match self.read(label, ERROR_COUNT_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(0),
        }
    }

    fn set_error_count(&self, label: &str, count: u32) -> Result<(), StorageError> {
        self.write(label, ERROR_COUNT_KEY, count.to_string())
    }

    fn get_backoff_ms(&self, label: &str) -> Result<u64, StorageError> {
        match self.read(label, BACKOFF_MS_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(0),
        }
    }

    fn set_backoff_ms(&self, label: &str, ms: u64) -> Result<(), StorageError> {
        self.write(label, BACKOFF_MS_KEY, ms.to_string())
    }

    fn reset(&self, label: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.load()?;
        let prefix = format!("{label}::");
        map.retain(|key, _| !key.starts_with(&prefix));
        self.store(&map)
    }
}
