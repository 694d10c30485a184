//! # Membership monitor: tracks ranks joining and leaving the instance.
//!
//! Watches the online and torpid broker groups and posts membership
//! transition events to the resource event log as the groups change.
//!
//! ## Architecture
//! ```text
//! GroupSource ──► online snapshots ──┐
//!             ──► torpid snapshots ──┤
//!                                    ▼
//! MonitorHandle ──► requests ──► Monitor::run() ──► Appender ──► event log
//!                                    │
//!                                    └──► deferred waitup replies
//! ```
//!
//! ## Rules
//! - Fully active on the **leader** (rank 0) only; followers exist solely
//!   to reject requests with a readable error.
//! - For one snapshot diff the join event is always posted **before** the
//!   leave event, so a rank present in both never looks absent.
//! - A cached group set is replaced only after its events were posted; a
//!   failed post drops the snapshot and the next one re-diffs from the
//!   same base.
//! - Waitup replies are sent strictly after the online-set change that
//!   satisfies them.
//! - `lost` collects ranks that left the online group; ranks that never
//!   joined are not lost.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::eventlog::{AppendMode, Appender, Entry};
use crate::idset::{IdSet, IdsetError};

use super::groups::{GroupSource, GroupUpdate, BROKER_ONLINE, BROKER_TORPID, SDMON_ONLINE};
use super::handle::{Membership, MonitorHandle, Request};
use super::waitup::WaitupQueue;

const EVENT_ONLINE: &str = "online";
const EVENT_OFFLINE: &str = "offline";
const EVENT_TORPID: &str = "torpid";
const EVENT_LIVELY: &str = "lively";

struct LeaderState {
    size: u32,
    up: IdSet,
    torpid: IdSet,
    lost: IdSet,
    waitup: WaitupQueue,
}

impl LeaderState {
    /// Offline ranks, derived from the online set and the instance size.
    fn down(&self) -> IdSet {
        let mut down = IdSet::full(self.size);
        down.subtract_set(&self.up);
        down
    }

    fn membership(&self) -> Membership {
        Membership {
            size: self.size,
            up: self.up.clone(),
            down: self.down(),
            torpid: self.torpid.clone(),
            lost: self.lost.clone(),
        }
    }

    /// Folds one online diff into the lost set: leavers are lost until
    /// they rejoin.
    fn record_lost(&mut self, diff: &Diff) -> Result<(), IdsetError> {
        self.lost.add_set(&diff.leave)?;
        self.lost.subtract_set(&diff.join);
        Ok(())
    }
}

enum Role {
    Leader(LeaderState),
    Follower,
}

/// Tracks execution targets joining and leaving the instance.
///
/// One monitor exists per rank; only the rank-0 instance watches groups,
/// posts events, and answers requests. Create with [`Monitor::new`], hand
/// out [`MonitorHandle`]s, then drive with [`Monitor::run`].
pub struct Monitor {
    cfg: MonitorConfig,
    appender: Appender,
    groups: Arc<dyn GroupSource>,
    role: Role,
    tx: mpsc::Sender<Request>,
    rx: Option<mpsc::Receiver<Request>>,
}

impl Monitor {
    /// Creates a monitor for the rank described by `cfg`.
    ///
    /// On the leader the online set starts empty (events will record ranks
    /// as they join) unless `cfg.force_up` preloads the full range.
    pub fn new(cfg: MonitorConfig, appender: Appender, groups: Arc<dyn GroupSource>) -> Self {
        let role = if cfg.rank == 0 {
            let size = cfg.size.max(cfg.inventory_size);
            let up = if cfg.force_up {
                IdSet::full(size)
            } else {
                IdSet::new(size)
            };
            Role::Leader(LeaderState {
                size,
                up,
                torpid: IdSet::new(size),
                lost: IdSet::new(size),
                waitup: WaitupQueue::new(),
            })
        } else {
            Role::Follower
        };

        let (tx, rx) = mpsc::channel(cfg.request_capacity.max(1));
        Self {
            cfg,
            appender,
            groups,
            role,
            tx,
            rx: Some(rx),
        }
    }

    /// Returns a handle for sending requests to this monitor.
    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            tx: self.tx.clone(),
        }
    }

    /// Runs the monitor until `token` is cancelled.
    ///
    /// On the leader this opens the group watches, posts the `restart`
    /// event, and then serves snapshots and requests; followers only serve
    /// (and reject) requests.
    pub async fn run(mut self, token: CancellationToken) -> Result<(), MonitorError> {
        let mut rx = self.rx.take().ok_or(MonitorError::Closed)?;
        let (mut online_rx, mut torpid_rx) = self.open_watches().await?;
        self.post_restart().await?;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                req = rx.recv() => match req {
                    Some(req) => self.handle_request(req).await,
                    None => break,
                },
                update = next_update(&mut online_rx) => match update {
                    Some(update) => self.apply_online(update).await,
                    None => {
                        tracing::warn!(group = self.online_group(), "group stream closed");
                        online_rx = None;
                    }
                },
                update = next_update(&mut torpid_rx) => match update {
                    Some(update) => self.apply_torpid(update).await,
                    None => {
                        tracing::warn!(group = BROKER_TORPID, "group stream closed");
                        torpid_rx = None;
                    }
                },
            }
        }
        Ok(())
    }

    fn online_group(&self) -> &'static str {
        if self.cfg.systemd_enable {
            SDMON_ONLINE
        } else {
            BROKER_ONLINE
        }
    }

    /// Opens the streaming group watches on the leader.
    ///
    /// Skipped entirely when the online set is forced up or the broker is
    /// recovering from a previous instance's log.
    async fn open_watches(
        &self,
    ) -> Result<
        (
            Option<mpsc::Receiver<GroupUpdate>>,
            Option<mpsc::Receiver<GroupUpdate>>,
        ),
        MonitorError,
    > {
        if !matches!(self.role, Role::Leader(_)) || self.cfg.force_up || self.cfg.recovery_mode {
            return Ok((None, None));
        }
        let online = self.groups.watch(self.online_group()).await?;
        let torpid = self.groups.watch(BROKER_TORPID).await?;
        Ok((Some(online), Some(torpid)))
    }

    /// Posts the `restart` event recording the initial online set.
    async fn post_restart(&self) -> Result<(), MonitorError> {
        let Role::Leader(state) = &self.role else {
            return Ok(());
        };
        let ranks = IdSet::full(state.size);
        let nodelist = self.cfg.hostlist.clone().unwrap_or_default();
        self.appender
            .append_entry(
                AppendMode::Wait,
                &self.cfg.eventlog_path,
                Entry::restart(&ranks, &state.up, &nodelist),
            )
            .await?;
        Ok(())
    }

    async fn handle_request(&mut self, req: Request) {
        match req {
            Request::Waitup { want, reply } => match &mut self.role {
                Role::Follower => {
                    let _ = reply.send(Err(MonitorError::NotLeader));
                }
                Role::Leader(state) => {
                    if want > state.size {
                        let _ = reply.send(Err(MonitorError::WaitupOutOfRange {
                            want,
                            size: state.size,
                        }));
                    } else if state.up.count() as u32 == want {
                        let _ = reply.send(Ok(()));
                    } else {
                        state.waitup.push(want, reply);
                    }
                }
            },
            Request::ForceDown { ranks, reply } => {
                let _ = reply.send(self.force_down(&ranks).await);
            }
            Request::Membership { reply } => {
                let result = match &self.role {
                    Role::Follower => Err(MonitorError::NotLeader),
                    Role::Leader(state) => Ok(state.membership()),
                };
                let _ = reply.send(result);
            }
        }
    }

    /// Removes `ranks` from the online set as if the overlay had dropped
    /// them, reusing the regular join/leave posting path.
    async fn force_down(&mut self, ranks: &str) -> Result<(), MonitorError> {
        let Role::Leader(state) = &mut self.role else {
            return Err(MonitorError::NotLeader);
        };

        let mut next = state.up.clone();
        next.decode_subtract(ranks)?;

        let diff = post_join_leave(
            &self.appender,
            &self.cfg.eventlog_path,
            &state.up,
            &next,
            EVENT_ONLINE,
            EVENT_OFFLINE,
        )
        .await?;
        state.record_lost(&diff)?;
        state.up = next;
        state.waitup.notify(state.up.count() as u32);
        Ok(())
    }

    /// Leader: the set of online brokers changed.
    async fn apply_online(&mut self, update: GroupUpdate) {
        let new = match IdSet::decode(&update.members) {
            Ok(set) => set,
            Err(err) => {
                tracing::warn!(group = self.online_group(), error = %err, "ignoring bad snapshot");
                return;
            }
        };
        let Role::Leader(state) = &mut self.role else {
            return;
        };

        let diff = match post_join_leave(
            &self.appender,
            &self.cfg.eventlog_path,
            &state.up,
            &new,
            EVENT_ONLINE,
            EVENT_OFFLINE,
        )
        .await
        {
            Ok(diff) => diff,
            Err(err) => {
                tracing::warn!(error = %err, "error posting online/offline event");
                return;
            }
        };
        if let Err(err) = state.record_lost(&diff) {
            tracing::warn!(error = %err, "error updating lost ranks");
            return;
        }

        state.up = new;
        state.waitup.notify(state.up.count() as u32);
    }

    /// Leader: the set of torpid brokers changed.
    async fn apply_torpid(&mut self, update: GroupUpdate) {
        let new = match IdSet::decode(&update.members) {
            Ok(set) => set,
            Err(err) => {
                tracing::warn!(group = BROKER_TORPID, error = %err, "ignoring bad snapshot");
                return;
            }
        };
        let Role::Leader(state) = &mut self.role else {
            return;
        };

        if let Err(err) = post_join_leave(
            &self.appender,
            &self.cfg.eventlog_path,
            &state.torpid,
            &new,
            EVENT_TORPID,
            EVENT_LIVELY,
        )
        .await
        {
            tracing::warn!(error = %err, "error posting torpid/lively event");
            return;
        }

        state.torpid = new;
    }
}

struct Diff {
    join: IdSet,
    leave: IdSet,
}

/// Posts `join_name` and/or `leave_name` events recording ids added or
/// removed in `new` relative to `old`. Empty diffs post nothing.
async fn post_join_leave(
    appender: &Appender,
    path: &str,
    old: &IdSet,
    new: &IdSet,
    join_name: &str,
    leave_name: &str,
) -> Result<Diff, MonitorError> {
    let join = new.difference(old);
    let leave = old.difference(new);
    post_idset_event(appender, path, join_name, &join).await?;
    post_idset_event(appender, path, leave_name, &leave).await?;
    Ok(Diff { join, leave })
}

async fn post_idset_event(
    appender: &Appender,
    path: &str,
    name: &str,
    ids: &IdSet,
) -> Result<(), MonitorError> {
    if ids.is_empty() {
        return Ok(());
    }
    appender
        .append_entry(AppendMode::Wait, path, Entry::idset_event(name, ids))
        .await?;
    Ok(())
}

async fn next_update(rx: &mut Option<mpsc::Receiver<GroupUpdate>>) -> Option<GroupUpdate> {
    match rx.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
