//! # Streaming broker group snapshots.
//!
//! The overlay publishes named groups of ranks (`broker.online`,
//! `broker.torpid`, ...). [`GroupSource`] is the seam the monitor watches
//! them through: one streaming subscription per group, each update carrying
//! the full encoded membership.
//!
//! [`GroupHub`] is the built-in in-process source used by tests and demos:
//! snapshots pushed with [`GroupHub::publish`] fan out to every watcher of
//! that group.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// The broker-maintained group of online ranks.
pub const BROKER_ONLINE: &str = "broker.online";

/// Online group variant joined only after systemd unit cleanup has been
/// verified on the node.
pub const SDMON_ONLINE: &str = "sdmon.online";

/// The broker-maintained group of unresponsive ranks.
pub const BROKER_TORPID: &str = "broker.torpid";

/// Per-watcher snapshot channel depth.
const WATCH_CAPACITY: usize = 16;

/// One full snapshot of a group's membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupUpdate {
    /// Encoded idset of the group's current members.
    pub members: String,
}

/// Errors produced when opening a group watch.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GroupError {
    /// The source does not publish a group by this name.
    #[error("unknown group '{name}'")]
    Unknown {
        /// The requested group name.
        name: String,
    },

    /// The subscription could not be established.
    #[error("group watch failed: {reason}")]
    Watch {
        /// Source-specific detail.
        reason: String,
    },
}

/// A source of streaming group membership snapshots.
#[async_trait]
pub trait GroupSource: Send + Sync + 'static {
    /// Opens a streaming watch on group `name`.
    ///
    /// Every subsequent membership change arrives as a full snapshot on the
    /// returned channel; the channel closes when the source goes away.
    async fn watch(&self, name: &str) -> Result<mpsc::Receiver<GroupUpdate>, GroupError>;
}

/// In-process [`GroupSource`] for tests and demos.
///
/// Like a streaming `groups.get`, a fresh watch is seeded with the group's
/// current membership (if one was ever published) before receiving
/// subsequent changes.
#[derive(Default)]
pub struct GroupHub {
    topics: Mutex<HashMap<String, Topic>>,
}

#[derive(Default)]
struct Topic {
    latest: Option<String>,
    watchers: Vec<mpsc::Sender<GroupUpdate>>,
}

impl GroupHub {
    /// Creates a hub with no groups and no watchers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a snapshot of `name` to every current watcher and retains
    /// it for watchers that arrive later.
    pub async fn publish(&self, name: &str, members: &str) {
        let watchers = {
            let mut topics = self.lock();
            let topic = topics.entry(name.to_string()).or_default();
            topic.latest = Some(members.to_string());
            topic.watchers.clone()
        };
        for tx in watchers {
            let _ = tx
                .send(GroupUpdate {
                    members: members.to_string(),
                })
                .await;
        }

        let mut topics = self.lock();
        if let Some(topic) = topics.get_mut(name) {
            topic.watchers.retain(|tx| !tx.is_closed());
        }
    }

    /// Returns the number of live watchers on `name`.
    pub fn watcher_count(&self, name: &str) -> usize {
        self.lock()
            .get(name)
            .map(|topic| topic.watchers.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Topic>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl GroupSource for GroupHub {
    async fn watch(&self, name: &str) -> Result<mpsc::Receiver<GroupUpdate>, GroupError> {
        let (tx, rx) = mpsc::channel(WATCH_CAPACITY);
        let seed = {
            let mut topics = self.lock();
            let topic = topics.entry(name.to_string()).or_default();
            topic.watchers.push(tx.clone());
            topic.latest.clone()
        };
        if let Some(members) = seed {
            let _ = tx.send(GroupUpdate { members }).await;
        }
        Ok(rx)
    }
}
