//! # Durable log backends.
//!
//! [`EventStore`] is the seam between the batching appender and whatever
//! actually persists the log (a KVS transaction, a file, a test buffer).
//! A store commits one ordered batch per call; the appender guarantees it
//! never interleaves batches for the same path.
//!
//! [`MemoryStore`] is the built-in backend used by tests and demos. It can
//! be scripted to fail upcoming commits, which is how transport failures
//! are exercised.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use thiserror::Error;

use super::entry::Entry;

/// Errors produced by a durable log backend.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend could not be reached; the batch may be retried.
    #[error("event store unavailable: {reason}")]
    Unavailable {
        /// Backend-specific detail.
        reason: String,
    },

    /// The backend refused the batch; retrying the same batch is futile.
    #[error("event store rejected batch: {reason}")]
    Rejected {
        /// Backend-specific detail.
        reason: String,
    },
}

impl StoreError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            StoreError::Unavailable { .. } => "store_unavailable",
            StoreError::Rejected { .. } => "store_rejected",
        }
    }
}

/// A durable, path-addressed, append-only event log.
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    /// Durably appends `entries`, in order, to the log at `path`.
    ///
    /// Either the whole batch is committed or none of it is.
    async fn commit(&self, path: &str, entries: Vec<Entry>) -> Result<(), StoreError>;
}

/// In-memory [`EventStore`] for tests and demos.
#[derive(Default)]
pub struct MemoryStore {
    logs: Mutex<HashMap<String, Vec<Entry>>>,
    commits: AtomicUsize,
    fail_budget: AtomicUsize,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` commits fail with [`StoreError::Unavailable`].
    pub fn fail_next(&self, n: usize) {
        self.fail_budget.store(n, Ordering::SeqCst);
    }

    /// Returns the number of successful commits so far.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Returns a copy of the log at `path` (empty if never written).
    pub fn entries(&self, path: &str) -> Vec<Entry> {
        self.lock().get(path).cloned().unwrap_or_default()
    }

    /// Returns just the event names at `path`, in log order.
    pub fn names(&self, path: &str) -> Vec<String> {
        self.entries(path).into_iter().map(|e| e.name).collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Entry>>> {
        self.logs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn commit(&self, path: &str, entries: Vec<Entry>) -> Result<(), StoreError> {
        let failing = self
            .fail_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Unavailable {
                reason: "scripted failure".into(),
            });
        }

        self.lock().entry(path.to_string()).or_default().extend(entries);
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
