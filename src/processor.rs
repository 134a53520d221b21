//! The caller-supplied processing function.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::DeliveredItem;

/// A failed processing attempt.
///
/// Processing failures are handled internally by the retry controller and
/// never surface to `enqueue`/`flush` callers; the message only appears in
/// logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProcessError {
    /// Human-readable failure reason.
    pub message: String,
}

impl ProcessError {
    /// Creates an error with the given reason.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error used when an attempt outlives the processing-timeout
    /// safety ceiling.
    #[must_use]
    pub fn timed_out() -> Self {
        Self::new("processing did not complete within the configured timeout")
    }
}

impl From<&str> for ProcessError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ProcessError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

/// Handles delivery of a checked-out batch.
///
/// The returned future is the completion signal: resolving with `Ok` takes
/// the success path, `Err` the failure path. Because it is a future it can
/// complete at most once; a processor that never completes is cut off by
/// the queue's processing timeout and treated as failed.
///
/// Items arrive in insertion order, each tagged [`repeated`] when it may
/// have been delivered before (a retry, or an item recovered from a
/// previous instance), so side effects can be deduplicated.
///
/// [`repeated`]: DeliveredItem::repeated
#[async_trait]
pub trait Processor: Send + Sync {
    /// Processes one batch.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError` to have the same batch retried after backoff.
    async fn process(&self, batch: Vec<DeliveredItem>) -> Result<(), ProcessError>;
}
