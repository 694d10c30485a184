//! # Error types used by the membership monitor surface.
//!
//! [`MonitorError`] is what [`MonitorHandle`](crate::MonitorHandle) callers
//! see. Subsystem errors ([`IdsetError`](crate::IdsetError),
//! [`AppendError`](crate::AppendError),
//! [`GroupError`](crate::GroupError)) flow through it transparently, so a
//! force-down request with a malformed idset string reports the parser's
//! caller-facing text unchanged.
//!
//! All error types in this crate provide `as_label()` for logs/metrics.

use thiserror::Error;

use crate::eventlog::AppendError;
use crate::idset::IdsetError;
use crate::monitor::GroupError;

/// # Errors produced by the membership monitor.
///
/// Requests never mutate state when they fail: a rejected force-down
/// leaves the online set exactly as it was.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum MonitorError {
    /// A leader-only request reached a follower rank.
    #[error("this RPC only works on rank 0")]
    NotLeader,

    /// A waitup request asked for more ranks than the instance has.
    #[error("up value is out of range")]
    WaitupOutOfRange {
        /// The requested online count.
        want: u32,
        /// The instance size.
        size: u32,
    },

    /// The monitor loop is not running (shut down or never started).
    #[error("monitor is not running")]
    Closed,

    /// A rank-set argument failed to parse or apply.
    #[error(transparent)]
    Idset(#[from] IdsetError),

    /// Posting a membership event to the log failed.
    #[error(transparent)]
    Append(#[from] AppendError),

    /// A group subscription could not be opened.
    #[error(transparent)]
    Group(#[from] GroupError),
}

impl MonitorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            MonitorError::NotLeader => "monitor_not_leader",
            MonitorError::WaitupOutOfRange { .. } => "monitor_waitup_out_of_range",
            MonitorError::Closed => "monitor_closed",
            MonitorError::Idset(err) => err.as_label(),
            MonitorError::Append(err) => err.as_label(),
            MonitorError::Group(_) => "monitor_group",
        }
    }
}
