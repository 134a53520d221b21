//! Crash recovery: reclaiming a checked-out batch, surviving destroy, and
//! honoring persisted backoff across instances.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use batchq::{FileStorage, Queue, QueueEntry, QueueOptions, StorageAdapter};

use crate::common::{self, RecordingProcessor};

#[tokio::test(start_paused = true)]
async fn reload_recovers_checked_out_batch_as_repeated() {
    let storage = common::storage();

    // First "page": the batch is checked out but the attempt never
    // completes before the instance goes away.
    let stuck = RecordingProcessor::never_completing();
    let first = Queue::new(QueueOptions::new("jobs"), stuck.clone(), storage.clone()).unwrap();
    first.enqueue(common::task("a")).await.unwrap();
    first.enqueue(common::task("b")).await.unwrap();
    first.flush().await.unwrap();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(stuck.call_count(), 1);

    first.destroy();
    sleep(Duration::from_millis(10)).await;

    // Destroy touched nothing durable: items and checkout are still there.
    assert_eq!(storage.get_queue("jobs").unwrap().len(), 2);
    assert!(storage.get_active_batch("jobs").unwrap().is_some());

    // Second "page": the stale checkout is reclaimed and its items are
    // delivered in the very first batch, flagged repeated.
    let processor = RecordingProcessor::new();
    let second = Queue::new(
        QueueOptions::new("jobs").with_active_expiry(Duration::ZERO),
        processor.clone(),
        storage.clone(),
    )
    .unwrap();
    sleep(Duration::from_millis(200)).await;

    let calls = processor.calls();
    assert_eq!(calls.len(), 1);
    common::assert_batch(&calls[0], &["a", "b"], true);
    assert!(storage.get_queue("jobs").unwrap().is_empty());
    assert!(storage.get_active_batch("jobs").unwrap().is_none());

    second.destroy();
}

#[tokio::test(start_paused = true)]
async fn items_never_batched_are_recovered_without_the_flag() {
    let storage = common::storage();

    let abandoned = RecordingProcessor::new();
    let first = Queue::new(
        QueueOptions::new("jobs"),
        abandoned.clone(),
        storage.clone(),
    )
    .unwrap();
    first.enqueue(common::task("a")).await.unwrap();
    first.enqueue(common::task("b")).await.unwrap();
    // Gone before the debounce timer fires: no batch, no checkout record.
    first.destroy();

    sleep(Duration::from_millis(200)).await;
    assert_eq!(abandoned.call_count(), 0);
    assert_eq!(storage.get_queue("jobs").unwrap().len(), 2);

    // They were never handed to a processor, so they come back unflagged,
    // in the first batch the new instance forms.
    let processor = RecordingProcessor::new();
    let _second = Queue::new(QueueOptions::new("jobs"), processor.clone(), storage).unwrap();
    sleep(Duration::from_millis(200)).await;

    let calls = processor.calls();
    assert_eq!(calls.len(), 1);
    common::assert_batch(&calls[0], &["a", "b"], false);
}

#[tokio::test(start_paused = true)]
async fn fresh_checkout_is_left_to_its_owner() {
    let storage = common::storage();
    storage
        .set_queue("jobs", &[QueueEntry::new(common::task("a"))])
        .unwrap();
    storage.set_active_batch("jobs", uuid::Uuid::new_v4()).unwrap();

    // Default expiry (2s): the record looks owned by a live sibling, so
    // construction must not steal it.
    let processor = RecordingProcessor::new();
    let _queue = Queue::new(
        QueueOptions::new("jobs"),
        processor.clone(),
        storage.clone(),
    )
    .unwrap();

    assert!(storage.get_active_batch("jobs").unwrap().is_some());
    assert!(!storage.get_queue("jobs").unwrap()[0].repeated);
}

#[tokio::test(start_paused = true)]
async fn batcher_reclaims_expired_sibling_checkout() {
    let storage = common::storage();
    storage
        .set_queue("jobs", &[QueueEntry::new(common::task("a"))])
        .unwrap();
    storage.set_active_batch("jobs", uuid::Uuid::new_v4()).unwrap();

    let processor = RecordingProcessor::new();
    let _queue = Queue::new(
        QueueOptions::new("jobs").with_active_expiry(Duration::from_millis(50)),
        processor.clone(),
        storage.clone(),
    )
    .unwrap();

    // Construction sees a live lease and leaves it; the batcher keeps
    // rechecking every debounce window. The lease ages on the wall clock,
    // which virtual time does not advance.
    sleep(Duration::from_millis(100)).await;
    assert_eq!(processor.call_count(), 0);
    assert!(storage.get_active_batch("jobs").unwrap().is_some());

    // Age the lease past its expiry in real time, then let the batcher run
    // another cycle: it must take over the checkout itself.
    std::thread::sleep(Duration::from_millis(60));
    sleep(Duration::from_millis(200)).await;

    let calls = processor.calls();
    assert_eq!(calls.len(), 1);
    common::assert_batch(&calls[0], &["a"], true);
    assert!(storage.get_queue("jobs").unwrap().is_empty());
    assert!(storage.get_active_batch("jobs").unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn startup_honors_persisted_backoff() {
    let storage = common::storage();
    storage
        .set_queue("jobs", &[QueueEntry::new(common::task("a"))])
        .unwrap();
    storage.set_backoff_ms("jobs", 5000).unwrap();

    let processor = RecordingProcessor::new();
    let _queue = Queue::new(QueueOptions::new("jobs"), processor.clone(), storage).unwrap();

    sleep(Duration::from_secs(4)).await;
    assert_eq!(
        processor.call_count(),
        0,
        "the persisted backoff delay must hold across instances"
    );

    sleep(Duration::from_secs(2)).await;
    assert_eq!(processor.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn file_storage_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    {
        let storage = Arc::new(FileStorage::new(&path));
        let stuck = RecordingProcessor::never_completing();
        let first = Queue::new(QueueOptions::new("jobs"), stuck, storage).unwrap();
        first.enqueue(common::task("a")).await.unwrap();
        first.flush().await.unwrap();
        sleep(Duration::from_millis(1)).await;
        first.destroy();
    }

    // A new adapter over the same file is a new process over the same
    // local storage.
    let storage = Arc::new(FileStorage::new(&path));
    let processor = RecordingProcessor::new();
    let _second = Queue::new(
        QueueOptions::new("jobs").with_active_expiry(Duration::ZERO),
        processor.clone(),
        storage.clone(),
    )
    .unwrap();
    sleep(Duration::from_millis(200)).await;

    let calls = processor.calls();
    assert_eq!(calls.len(), 1);
    common::assert_batch(&calls[0], &["a"], true);
    assert!(storage.get_queue("jobs").unwrap().is_empty());
}
