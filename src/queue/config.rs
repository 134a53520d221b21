//! Queue configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::models::{BackoffPolicy, QueueEntry};

use super::error::ConfigError;

/// A pure transform applied to the pending list just before a batch is
/// sliced off its front. The default is the identity.
pub type TrimFn = Arc<dyn Fn(Vec<QueueEntry>) -> Vec<QueueEntry> + Send + Sync>;

/// Configuration for a queue instance.
#[derive(Clone)]
pub struct QueueOptions {
    /// Store namespace; distinguishes queues sharing one store.
    pub label: String,
    /// How long a burst of enqueues is collected before a batching decision.
    pub debounce: Duration,
    /// Maximum items per batch. `None` takes the entire pending list.
    pub batch_size: Option<usize>,
    /// Pending-list transform applied before batching.
    pub trim: Option<TrimFn>,
    /// Backoff curve for failed deliveries.
    pub backoff: BackoffPolicy,
    /// Retries allowed after the first failed attempt before the batch is
    /// discarded. `None` retries indefinitely.
    pub max_retries: Option<u32>,
    /// Safety ceiling on a single processing attempt. An attempt that has
    /// not completed by then is treated as failed and its result ignored.
    pub process_timeout: Duration,
    /// Age after which a persisted batch checkout is considered abandoned
    /// and may be reclaimed by another instance.
    pub active_expiry: Duration,
}

impl QueueOptions {
    /// Default debounce window.
    pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(20);
    /// Default processing-attempt safety ceiling.
    pub const DEFAULT_PROCESS_TIMEOUT: Duration = Duration::from_secs(30);
    /// Default checkout expiry.
    pub const DEFAULT_ACTIVE_EXPIRY: Duration = Duration::from_secs(2);

    /// Creates options with the given label and defaults for everything
    /// else.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            debounce: Self::DEFAULT_DEBOUNCE,
            batch_size: None,
            trim: None,
            backoff: BackoffPolicy::default(),
            max_retries: None,
            process_timeout: Self::DEFAULT_PROCESS_TIMEOUT,
            active_expiry: Self::DEFAULT_ACTIVE_EXPIRY,
        }
    }

    /// Sets the debounce window.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Sets the maximum batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Sets the trim transform.
    #[must_use]
    pub fn with_trim(
        mut self,
        trim: impl Fn(Vec<QueueEntry>) -> Vec<QueueEntry> + Send + Sync + 'static,
    ) -> Self {
        self.trim = Some(Arc::new(trim));
        self
    }

    /// Sets the backoff policy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Bounds retries per batch.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Sets the processing-attempt safety ceiling.
    #[must_use]
    pub fn with_process_timeout(mut self, process_timeout: Duration) -> Self {
        self.process_timeout = process_timeout;
        self
    }

    /// Sets the checkout expiry.
    #[must_use]
    pub fn with_active_expiry(mut self, active_expiry: Duration) -> Self {
        self.active_expiry = active_expiry;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for an empty label, a zero batch size, a zero
    /// processing timeout, or a nonsensical backoff curve.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.label.is_empty() {
            return Err(ConfigError::EmptyLabel);
        }
        if self.batch_size == Some(0) {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.process_timeout.is_zero() {
            return Err(ConfigError::ZeroProcessTimeout);
        }
        if self.backoff.base_ms == 0 {
            return Err(ConfigError::ZeroBackoffBase);
        }
        if self.backoff.multiplier < 1.0 {
            return Err(ConfigError::MultiplierTooSmall {
                multiplier: self.backoff.multiplier,
            });
        }
        if !(0.0..=1.0).contains(&self.backoff.jitter_percent) {
            return Err(ConfigError::JitterOutOfRange {
                jitter: self.backoff.jitter_percent,
            });
        }
        if self.backoff.cap_ms < self.backoff.base_ms {
            return Err(ConfigError::CapBelowBase {
                cap_ms: self.backoff.cap_ms,
                base_ms: self.backoff.base_ms,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for QueueOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueOptions")
            .field("label", &self.label)
            .field("debounce", &self.debounce)
            .field("batch_size", &self.batch_size)
            .field("trim", &self.trim.as_ref().map(|_| "<fn>"))
            .field("backoff", &self.backoff)
            .field("max_retries", &self.max_retries)
            .field("process_timeout", &self.process_timeout)
            .field("active_expiry", &self.active_expiry)
            .finish()
    }
}
