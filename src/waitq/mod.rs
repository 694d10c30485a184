//! Reference-counted deferral primitive: parked continuations and the
//! queues that hold them.
//!
//! A [`Wait`] packages a continuation that should fire once, later, when
//! some asynchronous condition completes. The same wait may be parked on
//! several [`WaitQueue`]s at once ("fire when the last of these wakes me");
//! each queue membership holds one use-count reference and the callback
//! runs exactly once, on the queue that releases the final reference.
//!
//! ## Contents
//! - [`Wait`], [`WaitError`] the continuation, its two callback shapes
//!   (plain and message-bearing), and the error slot/hook.
//! - [`WaitQueue`] insertion-ordered container with bulk
//!   [`run`](WaitQueue::run) and selective [`cull`](WaitQueue::cull).
//!
//! ## Rules
//! - Callbacks fire **at most once**, no matter how many queues held the
//!   wait or in which order they drained.
//! - [`cull`](WaitQueue::cull) cancels message-bearing waits across every
//!   queue they sit on: the handler is cleared in place, so a later `run`
//!   on a sibling queue releases the wait without firing it.
//! - Dropping a queue releases its references **without** firing anything.

mod queue;
mod wait;

pub use queue::WaitQueue;
pub use wait::{Wait, WaitError};
