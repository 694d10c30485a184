//! # Batched event log appends.
//!
//! [`Appender`] coalesces entries into batches and commits them to an
//! [`EventStore`] from a dedicated worker task.
//!
//! ## Architecture
//! ```text
//! append(mode, path, entry) ──► [mpsc] ──► worker ──► batch
//!                                             │          │ timeout / Wait / flush()
//!                                             │          ▼
//!                                             │     store.commit(path, entries)
//!                                             │          │
//!                                             └──────────┴──► observer hooks
//!                                                            (busy / idle / error)
//! ```
//!
//! ## Rules
//! - Entries appended to the **same path** reach the store in append order,
//!   regardless of mode. Cross-path order is unspecified.
//! - [`AppendMode::Async`] resolves at enqueue; the batch commits after the
//!   configured timeout of inactivity, on the next `Wait` append, or on
//!   [`flush`](Appender::flush).
//! - [`AppendMode::Wait`] forces an immediate commit of the containing
//!   batch and resolves with its outcome.
//! - A failed commit terminates its batch: the error hook runs once per
//!   affected entry and the worker returns to idle. Whether to re-append
//!   is the observer's decision.
//! - Observer hooks are panic-isolated; a panicking observer cannot take
//!   the worker down.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::entry::Entry;
use super::store::{EventStore, StoreError};

/// Worker command queue depth.
const COMMAND_CAPACITY: usize = 256;

/// Idle placeholder deadline; never observed because the timer branch is
/// disabled while no batch is pending.
const PARKED: Duration = Duration::from_secs(3600);

/// How an append resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendMode {
    /// Resolve once the entry is queued; commit on the batch timer.
    Async,
    /// Commit the containing batch now and resolve with its outcome.
    Wait,
}

/// Errors surfaced to append callers.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppendError {
    /// The appender worker is gone (shut down or crashed).
    #[error("appender is shut down")]
    Closed,

    /// The containing batch failed to commit (only for `Wait` appends).
    #[error("commit failed: {0}")]
    Store(#[from] StoreError),
}

impl AppendError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            AppendError::Closed => "append_closed",
            AppendError::Store(_) => "append_store",
        }
    }
}

/// Hooks into the appender's batching lifecycle.
///
/// All hooks run on the worker task and are panic-isolated. The default
/// implementations do nothing, so implementors pick the transitions they
/// care about.
#[async_trait::async_trait]
pub trait AppendObserver: Send + Sync + 'static {
    /// A batch now exists where the worker was idle.
    async fn on_busy(&self) {}

    /// The last pending batch was committed (or terminated by failure).
    async fn on_idle(&self) {}

    /// One entry failed to commit. Called once per affected entry;
    /// re-appending the entry is the observer's decision.
    async fn on_error(&self, err: &StoreError, entry: &Entry) {
        let _ = (err, entry);
    }

    /// Returns the observer name for diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

enum Command {
    Append {
        path: String,
        entry: Entry,
        ack: Option<oneshot::Sender<Result<(), StoreError>>>,
    },
    Flush {
        done: oneshot::Sender<Result<(), StoreError>>,
    },
    SetTimeout(Duration),
}

/// Batched, ordered appends to a durable event log.
///
/// Created with [`Appender::new`], which spawns the worker onto the current
/// tokio runtime. Dropping the appender lets the worker flush what is
/// pending and exit; [`shutdown`](Appender::shutdown) does the same but
/// waits for it.
pub struct Appender {
    tx: mpsc::Sender<Command>,
    worker: JoinHandle<()>,
}

impl Appender {
    /// Creates an appender committing to `store`, batching for
    /// `batch_timeout` of inactivity.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        store: Arc<dyn EventStore>,
        batch_timeout: Duration,
        observer: Option<Arc<dyn AppendObserver>>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let worker = Worker {
            store,
            observer,
            rx,
            batch: Vec::new(),
            timeout: batch_timeout,
            deadline: None,
        };
        Self {
            tx,
            worker: tokio::spawn(worker.run()),
        }
    }

    /// Appends an event built from `name` and `context` to the log at
    /// `path`.
    pub async fn append(
        &self,
        mode: AppendMode,
        path: &str,
        name: &str,
        context: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), AppendError> {
        let mut entry = Entry::new(name);
        entry.context = context;
        self.append_entry(mode, path, entry).await
    }

    /// Appends a prebuilt entry to the log at `path`.
    pub async fn append_entry(
        &self,
        mode: AppendMode,
        path: &str,
        entry: Entry,
    ) -> Result<(), AppendError> {
        match mode {
            AppendMode::Async => {
                self.send(Command::Append {
                    path: path.to_string(),
                    entry,
                    ack: None,
                })
                .await
            }
            AppendMode::Wait => {
                let (ack, committed) = oneshot::channel();
                self.send(Command::Append {
                    path: path.to_string(),
                    entry,
                    ack: Some(ack),
                })
                .await?;
                committed
                    .await
                    .map_err(|_| AppendError::Closed)?
                    .map_err(AppendError::from)
            }
        }
    }

    /// Retunes the batch timeout for subsequent batches.
    pub async fn set_commit_timeout(&self, timeout: Duration) -> Result<(), AppendError> {
        self.send(Command::SetTimeout(timeout)).await
    }

    /// Commits the pending batch now and waits for the outcome.
    pub async fn flush(&self) -> Result<(), AppendError> {
        let (done, outcome) = oneshot::channel();
        self.send(Command::Flush { done }).await?;
        outcome
            .await
            .map_err(|_| AppendError::Closed)?
            .map_err(AppendError::from)
    }

    /// Flushes whatever is pending and waits for the worker to exit.
    pub async fn shutdown(self) {
        let Appender { tx, worker } = self;
        drop(tx);
        let _ = worker.await;
    }

    async fn send(&self, cmd: Command) -> Result<(), AppendError> {
        self.tx.send(cmd).await.map_err(|_| AppendError::Closed)
    }
}

struct Pending {
    path: String,
    entry: Entry,
    ack: Option<oneshot::Sender<Result<(), StoreError>>>,
}

struct Worker {
    store: Arc<dyn EventStore>,
    observer: Option<Arc<dyn AppendObserver>>,
    rx: mpsc::Receiver<Command>,
    batch: Vec<Pending>,
    timeout: Duration,
    deadline: Option<Instant>,
}

impl Worker {
    async fn run(mut self) {
        loop {
            let deadline = self.deadline.unwrap_or_else(|| Instant::now() + PARKED);
            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd).await,
                    None => {
                        // All appender handles dropped: final flush.
                        if let Err(err) = self.commit().await {
                            tracing::warn!(error = %err, "eventlog: shutdown flush failed");
                        }
                        break;
                    }
                },
                _ = tokio::time::sleep_until(deadline), if self.deadline.is_some() => {
                    if let Err(err) = self.commit().await {
                        tracing::warn!(error = %err, "eventlog: batch commit failed");
                    }
                }
            }
        }
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Append { path, entry, ack } => {
                let commit_now = ack.is_some();
                let was_idle = self.batch.is_empty();
                self.batch.push(Pending { path, entry, ack });
                if was_idle {
                    self.notify_busy().await;
                }
                if commit_now {
                    // Wait-mode appends resolve through their ack.
                    let _ = self.commit().await;
                } else if self.deadline.is_none() {
                    self.deadline = Some(Instant::now() + self.timeout);
                }
            }
            Command::Flush { done } => {
                let _ = done.send(self.commit().await);
            }
            Command::SetTimeout(timeout) => {
                self.timeout = timeout;
            }
        }
    }

    /// Commits the pending batch, path by path, preserving append order.
    async fn commit(&mut self) -> Result<(), StoreError> {
        self.deadline = None;
        if self.batch.is_empty() {
            return Ok(());
        }

        let mut groups: Vec<(String, Vec<Pending>)> = Vec::new();
        for pending in std::mem::take(&mut self.batch) {
            match groups.iter_mut().find(|(path, _)| *path == pending.path) {
                Some((_, group)) => group.push(pending),
                None => groups.push((pending.path.clone(), vec![pending])),
            }
        }

        let mut first_err = None;
        for (path, group) in groups {
            let entries: Vec<Entry> = group.iter().map(|p| p.entry.clone()).collect();
            match self.store.commit(&path, entries).await {
                Ok(()) => {
                    for pending in group {
                        if let Some(ack) = pending.ack {
                            let _ = ack.send(Ok(()));
                        }
                    }
                }
                Err(err) => {
                    for pending in group {
                        self.notify_error(&err, &pending.entry).await;
                        if let Some(ack) = pending.ack {
                            let _ = ack.send(Err(err.clone()));
                        }
                    }
                    first_err.get_or_insert(err);
                }
            }
        }

        self.notify_idle().await;
        match first_err {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    async fn notify_busy(&self) {
        if let Some(obs) = &self.observer {
            if AssertUnwindSafe(obs.on_busy()).catch_unwind().await.is_err() {
                tracing::error!(observer = obs.name(), "append observer panicked in on_busy");
            }
        }
    }

    async fn notify_idle(&self) {
        if let Some(obs) = &self.observer {
            if AssertUnwindSafe(obs.on_idle()).catch_unwind().await.is_err() {
                tracing::error!(observer = obs.name(), "append observer panicked in on_idle");
            }
        }
    }

    async fn notify_error(&self, err: &StoreError, entry: &Entry) {
        if let Some(obs) = &self.observer {
            let hook = obs.on_error(err, entry);
            if AssertUnwindSafe(hook).catch_unwind().await.is_err() {
                tracing::error!(observer = obs.name(), "append observer panicked in on_error");
            }
        }
    }
}
