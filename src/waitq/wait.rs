//! # Parked continuations.
//!
//! A [`Wait`] is created with a use-count of zero and picks up one
//! reference per queue membership. The owning queues release references as
//! they drain; whoever releases the last one fires the callback and the
//! wait is spent.
//!
//! Two callback shapes exist:
//! - **plain** a closure invoked with no arguments;
//! - **message-bearing** a closure invoked with the request message the
//!   wait was parked for. The message stays owned by the wait until it is
//!   destroyed, and this shape is what
//!   [`WaitQueue::cull`](super::WaitQueue::cull) matches on when a client
//!   goes away.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

/// Failure recorded on a parked wait, delivered to its error hook.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WaitError {
    /// The condition the wait was parked on can no longer complete.
    #[error("wait abandoned: {reason}")]
    Abandoned {
        /// Why the owner gave up on this wait.
        reason: String,
    },

    /// The condition completed, but with an error.
    #[error("wait failed: {reason}")]
    Failed {
        /// What went wrong.
        reason: String,
    },
}

impl WaitError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            WaitError::Abandoned { .. } => "wait_abandoned",
            WaitError::Failed { .. } => "wait_failed",
        }
    }
}

/// The two callback shapes a wait can carry.
///
/// Firing takes the closure out, leaving the shape in place: a
/// message-bearing wait stays message-bearing after its handler is cleared,
/// which keeps queue message counters consistent across multi-queue
/// membership.
enum Callback<M: Send + Sync + 'static> {
    Plain(Option<Box<dyn FnOnce() + Send>>),
    Handler {
        msg: Arc<M>,
        run: Option<Box<dyn FnOnce(Arc<M>) + Send>>,
    },
}

impl<M: Send + Sync + 'static> Callback<M> {
    fn take_runnable(&mut self) -> Option<Box<dyn FnOnce() + Send>> {
        match self {
            Callback::Plain(run) => run.take(),
            Callback::Handler { msg, run } => run.take().map(|f| {
                let msg = Arc::clone(msg);
                Box::new(move || f(msg)) as Box<dyn FnOnce() + Send>
            }),
        }
    }

    fn clear(&mut self) {
        match self {
            Callback::Plain(run) => *run = None,
            Callback::Handler { run, .. } => *run = None,
        }
    }
}

struct Inner<M: Send + Sync + 'static> {
    usecount: usize,
    callback: Callback<M>,
    error: Option<WaitError>,
    error_hook: Option<Arc<dyn Fn(&WaitError) + Send + Sync>>,
}

/// A deferred continuation with shared ownership.
///
/// Cloning a `Wait` clones the handle, not the continuation: all clones
/// refer to the same use-count and callback. The use-count tracks queue
/// memberships only, so user-held handles never delay or trigger firing.
pub struct Wait<M: Send + Sync + 'static> {
    shared: Arc<Mutex<Inner<M>>>,
}

impl<M: Send + Sync + 'static> Clone for Wait<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M: Send + Sync + 'static> Wait<M> {
    /// Creates a wait with a plain callback and a use-count of zero.
    pub fn new(run: impl FnOnce() + Send + 'static) -> Self {
        Self::from_callback(Callback::Plain(Some(Box::new(run))))
    }

    /// Creates a message-bearing wait with a use-count of zero.
    ///
    /// The handler receives `msg` when the wait fires; the wait keeps the
    /// message alive until it is destroyed.
    pub fn with_message(msg: M, run: impl FnOnce(Arc<M>) + Send + 'static) -> Self {
        Self::from_callback(Callback::Handler {
            msg: Arc::new(msg),
            run: Some(Box::new(run)),
        })
    }

    fn from_callback(callback: Callback<M>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Inner {
                usecount: 0,
                callback,
                error: None,
                error_hook: None,
            })),
        }
    }

    /// Returns the current use-count (number of queue memberships).
    pub fn usecount(&self) -> usize {
        self.lock().usecount
    }

    /// Returns true when the wait carries a message-bearing callback.
    ///
    /// This stays true after the handler has been cleared by
    /// [`WaitQueue::cull`](super::WaitQueue::cull).
    pub fn is_message(&self) -> bool {
        matches!(self.lock().callback, Callback::Handler { .. })
    }

    /// Installs a hook invoked synchronously by [`set_error`](Self::set_error).
    pub fn set_error_hook(&self, hook: impl Fn(&WaitError) + Send + Sync + 'static) {
        self.lock().error_hook = Some(Arc::new(hook));
    }

    /// Records an error on the wait and invokes the error hook, if any.
    ///
    /// The hook runs synchronously, outside the wait's internal lock, so it
    /// may inspect the wait it was given.
    pub fn set_error(&self, err: WaitError) {
        let hook = {
            let mut inner = self.lock();
            inner.error = Some(err.clone());
            inner.error_hook.clone()
        };
        if let Some(hook) = hook {
            hook(&err);
        }
    }

    /// Returns the most recently recorded error, if any.
    pub fn error(&self) -> Option<WaitError> {
        self.lock().error.clone()
    }

    /// Returns the message carried by a message-bearing wait.
    pub fn message(&self) -> Option<Arc<M>> {
        match &self.lock().callback {
            Callback::Handler { msg, .. } => Some(Arc::clone(msg)),
            Callback::Plain(_) => None,
        }
    }

    /// Adds one queue-membership reference.
    pub(super) fn acquire(&self) {
        self.lock().usecount += 1;
    }

    /// Releases one reference; on the last one, hands back the callback.
    ///
    /// Returns `None` either because other queues still hold the wait or
    /// because the callback was cleared by a cull.
    pub(super) fn release(&self) -> Option<Box<dyn FnOnce() + Send>> {
        let mut inner = self.lock();
        debug_assert!(inner.usecount > 0, "wait released more often than enqueued");
        inner.usecount = inner.usecount.saturating_sub(1);
        if inner.usecount != 0 {
            return None;
        }
        inner.callback.take_runnable()
    }

    /// Releases one reference without ever firing the callback.
    pub(super) fn release_quiet(&self) {
        let mut inner = self.lock();
        debug_assert!(inner.usecount > 0, "wait released more often than enqueued");
        inner.usecount = inner.usecount.saturating_sub(1);
        if inner.usecount == 0 {
            inner.callback.clear();
        }
    }

    /// Clears the handler so later queue drains release without firing.
    pub(super) fn clear_handler(&self) {
        self.lock().callback.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Inner<M>> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn plain_wait_starts_unreferenced() {
        let w: Wait<()> = Wait::new(|| {});
        assert_eq!(w.usecount(), 0);
        assert!(!w.is_message());
    }

    #[test]
    fn message_wait_exposes_its_message() {
        let w = Wait::with_message("req-7".to_string(), |_msg| {});
        assert!(w.is_message());
        assert_eq!(w.message().unwrap().as_str(), "req-7");
    }

    #[test]
    fn error_hook_fires_synchronously() {
        let calls = Arc::new(AtomicUsize::new(0));
        let w: Wait<()> = Wait::new(|| {});

        let seen = Arc::clone(&calls);
        w.set_error_hook(move |err| {
            assert_eq!(err.as_label(), "wait_failed");
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert!(w.error().is_none());
        w.set_error(WaitError::Failed {
            reason: "lookup failed".into(),
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            w.error(),
            Some(WaitError::Failed {
                reason: "lookup failed".into()
            })
        );
    }
}
