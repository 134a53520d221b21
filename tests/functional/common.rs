//! Common test utilities: a scriptable recording processor and a
//! fault-injecting storage adapter.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use batchq::{
    ActiveBatch, DeliveredItem, MemoryStorage, ProcessError, Processor, QueueEntry,
    StorageAdapter, StorageError,
};

/// Records every delivered batch and replays a script of outcomes; calls
/// beyond the script succeed.
pub struct RecordingProcessor {
    calls: Mutex<Vec<Vec<DeliveredItem>>>,
    script: Mutex<VecDeque<Result<(), ProcessError>>>,
    delay: Option<Duration>,
    never_complete: bool,
}

impl RecordingProcessor {
    pub fn new() -> Arc<Self> {
        Self::with_script(Vec::new())
    }

    pub fn with_script(script: Vec<Result<(), ProcessError>>) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(script.into()),
            delay: None,
            never_complete: false,
        })
    }

    /// Every call takes `delay` before completing.
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            delay: Some(delay),
            never_complete: false,
        })
    }

    /// Every call records the batch and then never completes.
    pub fn never_completing() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            delay: None,
            never_complete: true,
        })
    }

    pub fn calls(&self) -> Vec<Vec<DeliveredItem>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Processor for RecordingProcessor {
    async fn process(&self, batch: Vec<DeliveredItem>) -> Result<(), ProcessError> {
        self.calls.lock().unwrap().push(batch);
        if self.never_complete {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

/// Wraps [`MemoryStorage`] and fails pending-list writes on demand.
pub struct FailingStorage {
    inner: MemoryStorage,
    fail_writes: AtomicBool,
}

impl FailingStorage {
    pub fn new() -> Self {
        Self {
            inner: MemoryStorage::new(),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl StorageAdapter for FailingStorage {
    fn get_queue(&self, label: &str) -> Result<Vec<QueueEntry>, StorageError> {
        self.inner.get_queue(label)
    }

    fn set_queue(&self, label: &str, entries: &[QueueEntry]) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected write failure".into()));
        }
        self.inner.set_queue(label, entries)
    }

    fn get_active_batch(&self, label: &str) -> Result<Option<ActiveBatch>, StorageError> {
        self.inner.get_active_batch(label)
    }

    fn set_active_batch(&self, label: &str, id: Uuid) -> Result<(), StorageError> {
        self.inner.set_active_batch(label, id)
    }

    fn clear_active_batch(&self, label: &str) -> Result<(), StorageError> {
        self.inner.clear_active_batch(label)
    }

    fn get_error_count(&self, label: &str) -> Result<u32, StorageError> {
        self.inner.get_error_count(label)
    }

    fn set_error_count(&self, label: &str, count: u32) -> Result<(), StorageError> {
        self.inner.set_error_count(label, count)
    }

    fn get_backoff_ms(&self, label: &str) -> Result<u64, StorageError> {
        self.inner.get_backoff_ms(label)
    }

    fn set_backoff_ms(&self, label: &str, ms: u64) -> Result<(), StorageError> {
        self.inner.set_backoff_ms(label, ms)
    }

    fn reset(&self, label: &str) -> Result<(), StorageError> {
        self.inner.reset(label)
    }
}

/// Shared test setup: log capture plus a fresh in-memory store.
pub fn storage() -> Arc<MemoryStorage> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("batchq=debug")
        .with_test_writer()
        .try_init();
    Arc::new(MemoryStorage::new())
}

pub fn task(name: &str) -> Value {
    json!({ "task": name })
}

/// Asserts one delivered batch: payloads in order, uniform repeated flag.
pub fn assert_batch(call: &[DeliveredItem], expected: &[&str], repeated: bool) {
    let got: Vec<Value> = call.iter().map(|item| item.item.clone()).collect();
    let want: Vec<Value> = expected.iter().map(|name| task(name)).collect();
    assert_eq!(got, want, "batch payloads mismatch");
    for item in call {
        assert_eq!(
            item.repeated, repeated,
            "repeated flag mismatch for {:?}",
            item.item
        );
    }
}
