use thiserror::Error;

use crate::storage::StorageError;

/// Configuration problems caught at construction time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// The label names the store namespace and cannot be empty.
    #[error("Queue label must not be empty")]
    EmptyLabel,

    /// A batch size of zero would never deliver anything.
    #[error("Batch size must be at least 1")]
    ZeroBatchSize,

    /// A zero processing timeout would fail every attempt immediately.
    #[error("Processing timeout must be non-zero")]
    ZeroProcessTimeout,

    /// A zero backoff base collapses the retry curve.
    #[error("Backoff base must be non-zero")]
    ZeroBackoffBase,

    /// A multiplier below 1.0 would shrink delays instead of growing them.
    #[error("Backoff multiplier must be >= 1.0, got {multiplier}")]
    MultiplierTooSmall {
        /// The rejected multiplier.
        multiplier: f64,
    },

    /// Jitter is a fraction of the delay and must stay within [0, 1].
    #[error("Backoff jitter must be in [0.0, 1.0], got {jitter}")]
    JitterOutOfRange {
        /// The rejected jitter fraction.
        jitter: f64,
    },

    /// The cap must allow at least the base delay.
    #[error("Backoff cap {cap_ms}ms is below base {base_ms}ms")]
    CapBelowBase {
        /// The rejected cap in milliseconds.
        cap_ms: u32,
        /// The configured base in milliseconds.
        base_ms: u32,
    },
}

/// Errors surfaced by queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The configuration failed validation (construction only).
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The persistent store failed; the operation did not take effect
    /// durably.
    #[error("Storage operation failed: {0}")]
    Storage(#[from] StorageError),

    /// The operation raced with `destroy()`; the instance no longer accepts
    /// work. Persisted state is untouched and a new instance with the same
    /// label will recover it.
    #[error("Queue instance has been destroyed")]
    Closed,
}
