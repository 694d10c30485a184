//! # RPC surface of the membership monitor.
//!
//! [`MonitorHandle`] is the cloneable front door other components use to
//! talk to a running [`Monitor`](super::Monitor): requests are queued to
//! the monitor loop and answered over oneshot channels.
//!
//! ## Rules
//! - All requests are **leader-only**; on follower ranks every call fails
//!   with [`MonitorError::NotLeader`](crate::MonitorError::NotLeader)
//!   without touching any state.
//! - [`waitup`](MonitorHandle::waitup) may defer its reply indefinitely;
//!   dropping the future cancels the request (the monitor discards the
//!   entry when the reply fails to deliver).

use tokio::sync::{mpsc, oneshot};

use crate::error::MonitorError;
use crate::idset::IdSet;

/// A point-in-time copy of the monitor's membership state.
#[derive(Debug, Clone)]
pub struct Membership {
    /// Instance size; ranks are `[0, size)`.
    pub size: u32,
    /// Ranks currently online.
    pub up: IdSet,
    /// Ranks currently offline (`[0, size)` minus `up`).
    pub down: IdSet,
    /// Ranks currently unresponsive (may overlap `up`).
    pub torpid: IdSet,
    /// Offline ranks that were online earlier in this session.
    pub lost: IdSet,
}

pub(super) enum Request {
    Waitup {
        want: u32,
        reply: oneshot::Sender<Result<(), MonitorError>>,
    },
    ForceDown {
        ranks: String,
        reply: oneshot::Sender<Result<(), MonitorError>>,
    },
    Membership {
        reply: oneshot::Sender<Result<Membership, MonitorError>>,
    },
}

/// Handle for querying and steering a running monitor.
#[derive(Clone)]
pub struct MonitorHandle {
    pub(super) tx: mpsc::Sender<Request>,
}

impl MonitorHandle {
    /// Resolves once the number of online ranks equals `up`.
    ///
    /// Replies immediately when the count already matches; otherwise the
    /// reply is deferred until a membership change makes it match. Values
    /// above the instance size are rejected up front.
    pub async fn waitup(&self, up: u32) -> Result<(), MonitorError> {
        let (reply, outcome) = oneshot::channel();
        self.send(Request::Waitup { want: up, reply }).await?;
        outcome.await.map_err(|_| MonitorError::Closed)?
    }

    /// Removes `ranks` (an idset string) from the online set, posting the
    /// same `offline` event an overlay disconnect would.
    pub async fn force_down(&self, ranks: &str) -> Result<(), MonitorError> {
        let (reply, outcome) = oneshot::channel();
        self.send(Request::ForceDown {
            ranks: ranks.to_string(),
            reply,
        })
        .await?;
        outcome.await.map_err(|_| MonitorError::Closed)?
    }

    /// Returns a snapshot of the current membership state.
    pub async fn membership(&self) -> Result<Membership, MonitorError> {
        let (reply, outcome) = oneshot::channel();
        self.send(Request::Membership { reply }).await?;
        outcome.await.map_err(|_| MonitorError::Closed)?
    }

    async fn send(&self, req: Request) -> Result<(), MonitorError> {
        self.tx.send(req).await.map_err(|_| MonitorError::Closed)
    }
}
