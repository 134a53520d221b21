use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

/// An element of the persisted pending list.
///
/// The payload is opaque to the engine; the only engine-owned field is the
/// repeated flag, which survives persistence so that recovered entries stay
/// flagged across further reloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// The caller-supplied payload.
    pub item: Value,
    /// True once this entry has been part of at least one delivery attempt
    /// or was recovered from a previous queue instance.
    #[serde(default)]
    pub repeated: bool,
}

impl QueueEntry {
    /// Creates a fresh, never-attempted entry.
    #[must_use]
    pub const fn new(item: Value) -> Self {
        Self {
            item,
            repeated: false,
        }
    }
}

/// An item as handed to the processing function.
///
/// `repeated` is true when the item is being delivered for at least the
/// second time (a retry of the current batch, or a recovered entry), so
/// processors can apply idempotent/deduplicating side effects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveredItem {
    /// The caller-supplied payload.
    pub item: Value,
    /// True iff this item may have been delivered before.
    pub repeated: bool,
}

/// The persisted checkout record for the batch currently being processed.
///
/// Its presence means an attempt is in flight or was interrupted; at most
/// one record exists per label. The timestamp doubles as a lease: a record
/// older than the configured expiry is treated as abandoned and reclaimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveBatch {
    /// Identifies the owning instance/attempt.
    pub id: Uuid,
    /// Checkout time.
    pub checked_out_at: DateTime<Utc>,
}

impl ActiveBatch {
    /// Creates a record checked out now.
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            checked_out_at: Utc::now(),
        }
    }

    /// Returns true if the checkout is older than `ttl` at time `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        now.signed_duration_since(self.checked_out_at) >= ttl
    }
}
