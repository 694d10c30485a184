//! # Insertion-ordered queues of parked waits.
//!
//! [`WaitQueue`] owns references to [`Wait`]s and releases them in bulk.
//! The interesting contract is multi-queue membership:
//!
//! ```text
//!   wait w (usecount 2)
//!      │
//!      ├── q1 ── run()  → usecount 1, nothing fires
//!      └── q2 ── run()  → usecount 0, callback fires once, w is spent
//! ```
//!
//! ## Rules
//! - [`run`](WaitQueue::run) observes the queue as of its start; waits
//!   enqueued by callbacks during the run wait for the next run.
//! - [`cull`](WaitQueue::cull) cancels matching message-bearing waits:
//!   cleared in place, removed from this queue, never fired anywhere.
//! - `len` and `msgs_count` are O(1).

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::wait::Wait;

struct State<M: Send + Sync + 'static> {
    items: VecDeque<Wait<M>>,
    msgs: usize,
}

/// An ordered queue of [`Wait`]s with an O(1) message-bearing counter.
///
/// All methods take `&self`; the queue is internally locked so wait
/// callbacks fired by [`run`](Self::run) may re-enqueue on the same queue.
pub struct WaitQueue<M: Send + Sync + 'static> {
    state: Mutex<State<M>>,
}

impl<M: Send + Sync + 'static> WaitQueue<M> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                msgs: 0,
            }),
        }
    }

    /// Appends `wait` and takes one use-count reference on it.
    pub fn add(&self, wait: &Wait<M>) {
        wait.acquire();
        let mut st = self.lock();
        if wait.is_message() {
            st.msgs += 1;
        }
        st.items.push_back(wait.clone());
    }

    /// Returns the number of queued waits.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Returns true when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Returns the number of queued message-bearing waits.
    pub fn msgs_count(&self) -> usize {
        self.lock().msgs
    }

    /// Visits every queued wait in insertion order without dequeuing.
    ///
    /// The queue is locked for the duration; `f` must not call back into
    /// this queue.
    pub fn for_each(&self, mut f: impl FnMut(&Wait<M>)) {
        let st = self.lock();
        for w in &st.items {
            f(w);
        }
    }

    /// Releases every wait queued as of the call, firing the ones whose
    /// last reference this was.
    ///
    /// The whole queue is moved to a private list first, so callbacks that
    /// enqueue new waits here never extend the current run. Returns the
    /// number of waits processed.
    pub fn run(&self) -> usize {
        let drained: Vec<Wait<M>> = {
            let mut st = self.lock();
            let drained: Vec<_> = st.items.drain(..).collect();
            for w in &drained {
                if w.is_message() {
                    st.msgs -= 1;
                }
            }
            drained
        };

        let count = drained.len();
        for w in &drained {
            if let Some(callback) = w.release() {
                callback();
            }
        }
        count
    }

    /// Cancels every message-bearing wait whose message satisfies `pred`.
    ///
    /// Matching waits have their handler cleared (so sibling queues release
    /// them without firing), are unlinked from this queue, and give up this
    /// queue's reference. Returns the number of waits cancelled.
    pub fn cull(&self, pred: impl Fn(&M) -> bool) -> usize {
        let culled: Vec<Wait<M>> = {
            let mut st = self.lock();
            let items = std::mem::take(&mut st.items);
            let mut culled = Vec::new();
            for w in items {
                let matched = w.message().map(|m| pred(&m)).unwrap_or(false);
                if matched {
                    w.clear_handler();
                    st.msgs -= 1;
                    culled.push(w);
                } else {
                    st.items.push_back(w);
                }
            }
            culled
        };

        let count = culled.len();
        for w in &culled {
            w.release_quiet();
        }
        count
    }

    fn lock(&self) -> MutexGuard<'_, State<M>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<M: Send + Sync + 'static> Default for WaitQueue<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Send + Sync + 'static> Drop for WaitQueue<M> {
    /// Releases the queue's references without firing callbacks.
    fn drop(&mut self) {
        let st = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        for w in st.items.drain(..) {
            w.release_quiet();
        }
    }
}
