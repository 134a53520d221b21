//! The queue engine: a single actor task owning all queue state.
//!
//! Everything runs on one logical task. Callers talk to it over a command
//! channel; the only suspension points are the debounce timer, the backoff
//! timer, and waiting for the processor's completion future. Each storage
//! mutation is a full read-modify-write finished before the next await, so
//! the persisted state always reflects the in-memory state at the end of
//! every operation.
//!
//! Single-flight is enforced through the persisted checkout record, not
//! shared memory: the batcher refuses to form a batch while a record exists,
//! whether it was written by this instance or a sibling with the same label.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout_at, Instant};
use uuid::Uuid;

use crate::models::{DeliveredItem, QueueEntry};
use crate::processor::{ProcessError, Processor};
use crate::storage::{StorageAdapter, StorageError};

use super::config::QueueOptions;
use super::error::QueueError;
use super::recovery;

/// Commands from the `Queue` handle to the engine.
pub(crate) enum Command {
    Enqueue {
        item: Value,
        reply: oneshot::Sender<Result<(), QueueError>>,
    },
    Flush {
        reply: oneshot::Sender<Result<(), QueueError>>,
    },
    Destroy,
}

/// Immutable snapshot of the checked-out batch. Items enqueued after
/// checkout never join it; they wait in the pending list behind it.
struct ActiveAttempt {
    id: Uuid,
    entries: Vec<QueueEntry>,
}

enum Event {
    Command(Option<Command>),
    AttemptDone(Result<(), ProcessError>),
    DebounceElapsed,
    BackoffElapsed,
}

pub(crate) struct Engine {
    opts: QueueOptions,
    processor: Arc<dyn Processor>,
    storage: Arc<dyn StorageAdapter>,
    rx: mpsc::UnboundedReceiver<Command>,
    debounce_deadline: Option<Instant>,
    backoff_deadline: Option<Instant>,
    attempt_deadline: Option<Instant>,
    inflight: Option<JoinHandle<Result<(), ProcessError>>>,
    active: Option<ActiveAttempt>,
    attempt: u32,
}

impl Engine {
    pub(crate) fn new(
        opts: QueueOptions,
        processor: Arc<dyn Processor>,
        storage: Arc<dyn StorageAdapter>,
        rx: mpsc::UnboundedReceiver<Command>,
        startup_delay: Option<Duration>,
    ) -> Self {
        Self {
            opts,
            processor,
            storage,
            rx,
            debounce_deadline: startup_delay.map(|delay| Instant::now() + delay),
            backoff_deadline: None,
            attempt_deadline: None,
            inflight: None,
            active: None,
            attempt: 0,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            let has_inflight = self.inflight.is_some();
            let debounce = self.debounce_deadline;
            let backoff = self.backoff_deadline;
            let ceiling = self.attempt_deadline;

            let event = tokio::select! {
                biased;
                cmd = self.rx.recv() => Event::Command(cmd),
                result = Self::join_attempt(&mut self.inflight, ceiling), if has_inflight => {
                    Event::AttemptDone(result)
                }
                () = Self::sleep_opt(backoff), if backoff.is_some() => Event::BackoffElapsed,
                () = Self::sleep_opt(debounce), if debounce.is_some() => Event::DebounceElapsed,
            };

            match event {
                Event::Command(None | Some(Command::Destroy)) => break,
                Event::Command(Some(Command::Enqueue { item, reply })) => {
                    let result = self.handle_enqueue(item);
                    let _ = reply.send(result);
                }
                Event::Command(Some(Command::Flush { reply })) => {
                    self.debounce_deadline = None;
                    let result = self.try_batch().map_err(QueueError::from);
                    let _ = reply.send(result);
                }
                Event::AttemptDone(result) => self.on_attempt_done(result),
                Event::DebounceElapsed => {
                    self.debounce_deadline = None;
                    if let Err(error) = self.try_batch() {
                        tracing::error!(
                            label = %self.opts.label,
                            error = %error,
                            suggestion = error.suggestion(),
                            "batching failed after debounce; idle until the next enqueue"
                        );
                    }
                }
                Event::BackoffElapsed => self.on_backoff_elapsed(),
            }
        }
        // Dropping a live JoinHandle detaches the processing task: destroy
        // stops listening for completion but does not cancel the attempt,
        // and persisted state stays as-is for the next instance to recover.
        tracing::debug!(label = %self.opts.label, "queue instance destroyed");
    }

    /// Awaits the in-flight attempt under the safety ceiling. An attempt
    /// that outlives the ceiling is reported as failed; the detached task
    /// keeps running and its eventual result is ignored.
    async fn join_attempt(
        inflight: &mut Option<JoinHandle<Result<(), ProcessError>>>,
        ceiling: Option<Instant>,
    ) -> Result<(), ProcessError> {
        let Some(handle) = inflight.as_mut() else {
            return std::future::pending().await;
        };
        let joined = match ceiling {
            Some(deadline) => match timeout_at(deadline, handle).await {
                Ok(joined) => joined,
                Err(_) => return Err(ProcessError::timed_out()),
            },
            None => handle.await,
        };
        joined.unwrap_or_else(|_| Err(ProcessError::new("processing task panicked")))
    }

    async fn sleep_opt(deadline: Option<Instant>) {
        match deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }

    /// Collector: append to the persisted pending list and (re)arm the
    /// debounce timer.
    fn handle_enqueue(&mut self, item: Value) -> Result<(), QueueError> {
        let mut pending = self.storage.get_queue(&self.opts.label)?;
        pending.push(QueueEntry::new(item));
        self.storage.set_queue(&self.opts.label, &pending)?;
        counter!("batchq.items.enqueued").increment(1);
        tracing::debug!(
            label = %self.opts.label,
            pending = pending.len(),
            "item enqueued"
        );
        self.debounce_deadline = Some(Instant::now() + self.opts.debounce);
        Ok(())
    }

    /// Batcher: checks out the front of the pending list unless a batch is
    /// already in flight somewhere.
    fn try_batch(&mut self) -> Result<(), StorageError> {
        if self.active.is_some() {
            // This instance owns the in-flight attempt; the retry
            // controller progresses it.
            return Ok(());
        }
        if let Some(record) = self.storage.get_active_batch(&self.opts.label)? {
            if !record.is_expired_at(Utc::now(), self.opts.active_expiry) {
                // A live sibling owns the checkout. Re-check once it has
                // had time to finish or go stale.
                tracing::debug!(
                    label = %self.opts.label,
                    "batch checkout owned elsewhere; rechecking later"
                );
                self.debounce_deadline = Some(Instant::now() + self.opts.debounce);
                return Ok(());
            }
            recovery::reclaim_abandoned(self.storage.as_ref(), &self.opts.label)?;
        }

        let pending = self.storage.get_queue(&self.opts.label)?;
        let trimmed = match &self.opts.trim {
            Some(trim) => trim(pending),
            None => pending,
        };
        self.storage.set_queue(&self.opts.label, &trimmed)?;
        if trimmed.is_empty() {
            return Ok(());
        }

        let take = self
            .opts
            .batch_size
            .map_or(trimmed.len(), |size| size.min(trimmed.len()));
        let id = Uuid::new_v4();
        self.storage.set_active_batch(&self.opts.label, id)?;
        self.active = Some(ActiveAttempt {
            id,
            entries: trimmed[..take].to_vec(),
        });
        counter!("batchq.batches.formed").increment(1);
        tracing::debug!(label = %self.opts.label, size = take, "batch checked out");
        self.start_attempt(0);
        Ok(())
    }

    /// Hands the active batch to the processor. `attempt` 0 is the first
    /// delivery of this checkout; anything later marks every item repeated.
    fn start_attempt(&mut self, attempt: u32) {
        let Some(active) = &self.active else { return };
        let batch: Vec<DeliveredItem> = active
            .entries
            .iter()
            .map(|entry| DeliveredItem {
                item: entry.item.clone(),
                repeated: entry.repeated || attempt > 0,
            })
            .collect();
        self.attempt = attempt;
        self.attempt_deadline = Some(Instant::now() + self.opts.process_timeout);
        self.backoff_deadline = None;
        let processor = Arc::clone(&self.processor);
        self.inflight = Some(tokio::spawn(
            async move { processor.process(batch).await },
        ));
    }

    fn on_attempt_done(&mut self, result: Result<(), ProcessError>) {
        self.inflight = None;
        self.attempt_deadline = None;
        let outcome = match result {
            Ok(()) => self.complete_batch(),
            Err(error) => self.fail_batch(&error),
        };
        if let Err(error) = outcome {
            // No caller to surface this to. Fail loudly and drop to idle;
            // the persisted state is whatever the last successful write
            // left and remains recoverable.
            tracing::error!(
                label = %self.opts.label,
                error = %error,
                suggestion = error.suggestion(),
                "storage failed while finishing an attempt; dropping to idle"
            );
            self.active = None;
            self.backoff_deadline = None;
        }
    }

    /// Success path: drain the batch from the pending list, release the
    /// checkout, reset the failure state, and immediately consider the
    /// remaining items.
    fn complete_batch(&mut self) -> Result<(), StorageError> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };
        let mut pending = self.storage.get_queue(&self.opts.label)?;
        let delivered = active.entries.len().min(pending.len());
        pending.drain(..delivered);
        self.storage.set_queue(&self.opts.label, &pending)?;
        self.storage.clear_active_batch(&self.opts.label)?;
        self.storage.set_error_count(&self.opts.label, 0)?;
        self.storage.set_backoff_ms(&self.opts.label, 0)?;
        counter!("batchq.batches.delivered").increment(1);
        tracing::debug!(
            label = %self.opts.label,
            delivered,
            remaining = pending.len(),
            "batch delivered"
        );
        self.try_batch()
    }

    /// Failure path: bump the persisted error count, derive the next
    /// backoff delay, and schedule the retry of the same snapshot.
    fn fail_batch(&mut self, error: &ProcessError) -> Result<(), StorageError> {
        let errors = self
            .storage
            .get_error_count(&self.opts.label)?
            .saturating_add(1);
        self.storage.set_error_count(&self.opts.label, errors)?;
        counter!("batchq.batches.failed").increment(1);

        if let Some(max_retries) = self.opts.max_retries {
            if errors > max_retries {
                return self.discard_batch(errors, error);
            }
        }

        let delay = self.opts.backoff.delay(errors);
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.storage.set_backoff_ms(&self.opts.label, delay_ms)?;
        self.backoff_deadline = Some(Instant::now() + delay);
        tracing::warn!(
            label = %self.opts.label,
            errors,
            delay_ms,
            error = %error,
            "batch processing failed; backing off"
        );
        Ok(())
    }

    /// Retry budget exhausted: drop the batch so the queue is not wedged
    /// behind it forever.
    fn discard_batch(&mut self, errors: u32, error: &ProcessError) -> Result<(), StorageError> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };
        let mut pending = self.storage.get_queue(&self.opts.label)?;
        let dropped = active.entries.len().min(pending.len());
        pending.drain(..dropped);
        self.storage.set_queue(&self.opts.label, &pending)?;
        self.storage.clear_active_batch(&self.opts.label)?;
        self.storage.set_error_count(&self.opts.label, 0)?;
        self.storage.set_backoff_ms(&self.opts.label, 0)?;
        counter!("batchq.batches.discarded").increment(1);
        tracing::error!(
            label = %self.opts.label,
            dropped,
            errors,
            error = %error,
            "retry budget exhausted; discarding batch"
        );
        self.try_batch()
    }

    fn on_backoff_elapsed(&mut self) {
        self.backoff_deadline = None;
        let Some(id) = self.active.as_ref().map(|active| active.id) else {
            return;
        };
        // Renew the checkout timestamp so siblings do not reclaim the
        // batch mid-retry.
        if let Err(error) = self.storage.set_active_batch(&self.opts.label, id) {
            tracing::error!(
                label = %self.opts.label,
                error = %error,
                suggestion = error.suggestion(),
                "failed to renew batch checkout before retry"
            );
        }
        let next = self.attempt.saturating_add(1);
        self.start_attempt(next);
    }
}
