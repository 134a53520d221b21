//! Data model: pending-list entries, delivered items, the active-batch
//! checkout record, and the backoff policy.

mod backoff;
mod item;

pub use backoff::BackoffPolicy;
pub use item::{ActiveBatch, DeliveredItem, QueueEntry};
