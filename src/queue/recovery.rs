//! Crash recovery.
//!
//! A batch checkout left behind by an instance that died mid-attempt keeps
//! its items in the pending list (they are only removed on success), so
//! nothing is lost. What recovery adds is the repeated flag: any entry that
//! may already have reached the processor is marked so the next delivery
//! can deduplicate side effects.
//!
//! The checkout record carries no batch length, so reclaiming marks every
//! pending entry repeated, not just the ones that were checked out.
//! Over-marking is deliberate: repeated is a dedup hint, and a false
//! positive is harmless where a false negative is not.

use std::time::Duration;

use chrono::Utc;
use metrics::counter;

use crate::storage::{StorageAdapter, StorageError};

/// Takes over an abandoned checkout: flags all pending entries repeated and
/// clears the record so the caller becomes the sole owner of the retry.
pub(crate) fn reclaim_abandoned(
    storage: &dyn StorageAdapter,
    label: &str,
) -> Result<(), StorageError> {
    let mut pending = storage.get_queue(label)?;
    for entry in &mut pending {
        entry.repeated = true;
    }
    storage.set_queue(label, &pending)?;
    storage.clear_active_batch(label)?;
    counter!("batchq.recovery.reclaimed").increment(1);
    tracing::info!(
        label = %label,
        items = pending.len(),
        "reclaimed abandoned batch checkout"
    );
    Ok(())
}

/// Runs once per queue instance at construction, before any item is
/// accepted.
///
/// A checkout record younger than `active_expiry` is presumed owned by a
/// live sibling instance and left alone; the batcher re-checks it on every
/// cycle and reclaims once it goes stale.
pub(crate) fn run_recovery(
    storage: &dyn StorageAdapter,
    label: &str,
    active_expiry: Duration,
) -> Result<(), StorageError> {
    let Some(record) = storage.get_active_batch(label)? else {
        return Ok(());
    };
    if record.is_expired_at(Utc::now(), active_expiry) {
        reclaim_abandoned(storage, label)
    } else {
        tracing::debug!(
            label = %label,
            checked_out_at = %record.checked_out_at,
            "fresh batch checkout found at construction; leaving it to its owner"
        );
        Ok(())
    }
}
