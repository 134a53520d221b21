use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff policy for failed batch deliveries: exponential growth with a cap
/// and optional jitter.
///
/// Uses u32 for millisecond values which fit exactly in f64 (max ~49 days).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry, in milliseconds.
    pub base_ms: u32,
    /// Maximum delay between retries, in milliseconds.
    pub cap_ms: u32,
    /// Multiplier for exponential backoff (must be >= 1.0).
    pub multiplier: f64,
    /// Jitter percentage (0.0 to 1.0). E.g., 0.25 means +/-25% randomness.
    pub jitter_percent: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: 1000,  // 1 second
            cap_ms: 60_000, // 60 seconds
            multiplier: 2.0,
            jitter_percent: 0.0,
        }
    }
}

impl BackoffPolicy {
    /// Creates a new `BackoffPolicy` with the specified parameters.
    ///
    /// Note: `jitter_percent` is clamped to `[0.0, 1.0]` range.
    #[must_use]
    pub const fn new(base_ms: u32, cap_ms: u32, multiplier: f64, jitter_percent: f64) -> Self {
        Self {
            base_ms,
            cap_ms,
            multiplier,
            // Clamp to valid range: negative makes no sense, >1.0 could cause negative delays
            jitter_percent: jitter_percent.clamp(0.0, 1.0),
        }
    }

    /// Calculates the delay before the next retry.
    ///
    /// # Arguments
    /// * `error_count` - Consecutive failures so far (1-indexed: the first
    ///   failure passes 1).
    #[must_use]
    pub fn delay(&self, error_count: u32) -> Duration {
        let base_ms = self.compute_base_delay_ms(error_count);
        let capped_ms = base_ms.min(f64::from(self.cap_ms));

        // Apply jitter: random value in range [1 - jitter, 1 + jitter]
        let jitter = self.jitter_percent.abs();
        let jitter_factor = if jitter == 0.0 {
            1.0
        } else {
            let mut rng = rand::thread_rng();
            1.0 + rng.gen_range(-jitter..=jitter)
        };
        let final_ms = (capped_ms * jitter_factor).max(0.0);

        Duration::from_millis(f64_to_u64_saturating(final_ms))
    }

    /// Calculates the delay without jitter (for testing deterministic behavior).
    #[must_use]
    pub fn delay_without_jitter(&self, error_count: u32) -> Duration {
        let base_ms = self.compute_base_delay_ms(error_count);
        let capped_ms = base_ms.min(f64::from(self.cap_ms));
        Duration::from_millis(f64_to_u64_saturating(capped_ms))
    }

    /// Computes base delay with exponential backoff.
    fn compute_base_delay_ms(&self, error_count: u32) -> f64 {
        // Cap exponent: 2^30 ms is far beyond any sane cap and avoids overflow
        const MAX_EXP: i32 = 30;
        let exp = i32::try_from(error_count.saturating_sub(1)).map_or(MAX_EXP, |e| e.min(MAX_EXP));
        f64::from(self.base_ms) * self.multiplier.powi(exp)
    }
}

/// Converts f64 milliseconds to u64 with saturation.
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn f64_to_u64_saturating(val: f64) -> u64 {
    if !val.is_finite() || val < 0.0 {
        0
    } else if val >= f64::from(u32::MAX) {
        u64::from(u32::MAX)
    } else {
        // SAFETY: val >= 0.0 (no sign loss) and val < u32::MAX (no truncation beyond u64)
        val as u64
    }
}
