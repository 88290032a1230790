//! Per-generation operation state.
//!
//! A [`Record`] is created by the first caller of an operation id and shared
//! by every caller that joins before it is evicted. Its result slot is written
//! exactly once by the executor; callers only read it after observing either
//! the completion signal or the completed flag.

use crate::core::{FunnelError, Outcome, SharedResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Shared state of one in-flight or cached operation generation.
pub struct Record<T, E> {
    operation_id: String,
    started_at: Instant,
    outcome: OnceLock<Outcome<T, E>>,
    completed: AtomicBool,
    deleted: AtomicBool,
    done: watch::Sender<bool>,
}

impl<T, E> Record<T, E> {
    /// Creates a pending record. The shared deadline starts now.
    pub fn new(operation_id: impl Into<String>) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            operation_id: operation_id.into(),
            started_at: Instant::now(),
            outcome: OnceLock::new(),
            completed: AtomicBool::new(false),
            deleted: AtomicBool::new(false),
            done,
        }
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    /// Returns the outcome once the operation has completed.
    pub fn outcome(&self) -> Option<&Outcome<T, E>> {
        if self.is_completed() {
            self.outcome.get()
        } else {
            None
        }
    }

    /// Stores the outcome and marks the record completed.
    ///
    /// Returns false if the record already had an outcome; the first write wins.
    pub(crate) fn complete(&self, outcome: Outcome<T, E>) -> bool {
        let stored = self.outcome.set(outcome).is_ok();
        self.completed.store(true, Ordering::SeqCst);
        stored
    }

    /// Marks the record as removed from its registry.
    ///
    /// Returns true only for the call that flipped the flag.
    pub(crate) fn mark_deleted(&self) -> bool {
        !self.deleted.swap(true, Ordering::SeqCst)
    }

    /// Wakes every waiter. Firing more than once has no further effect.
    pub(crate) fn fire(&self) {
        self.done.send_replace(true);
    }

    /// Waits for the operation to complete, bounded by the shared deadline.
    ///
    /// The deadline is `started_at + timeout`: a caller that joins late only
    /// gets what is left of it. When the deadline passes the completed flag is
    /// checked once more, because the executor does not fire the signal for a
    /// record that was already evicted. A panicked outcome found this way is
    /// re-raised like any other completed outcome, not reported as a timeout.
    ///
    /// # Panics
    ///
    /// Re-raises the operation's panic if the operation body panicked.
    pub async fn wait(&self, timeout: Duration) -> SharedResult<T, E> {
        let mut done = self.done.subscribe();
        let signalled = async move {
            // The sender lives as long as `self`, so this only fails if the
            // record is torn down underneath us; fall back to the deadline.
            if done.wait_for(|fired| *fired).await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        let fired = match self.started_at.checked_add(timeout) {
            Some(deadline) => tokio::time::timeout_at(deadline, signalled).await.is_ok(),
            None => {
                signalled.await;
                true
            }
        };

        if fired || self.is_completed() {
            if let Some(outcome) = self.outcome() {
                return outcome.resolve();
            }
        }

        Err(FunnelError::Timeout {
            operation_id: self.operation_id.clone(),
            timeout,
        })
    }
}

impl<T, E> std::fmt::Debug for Record<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("operation_id", &self.operation_id)
            .field("elapsed", &self.elapsed())
            .field("completed", &self.is_completed())
            .field("deleted", &self.is_deleted())
            .finish()
    }
}
