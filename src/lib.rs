//! # rankvisor
//!
//! **Rankvisor** is a lightweight membership-tracking library for
//! hierarchical broker overlays.
//!
//! It maintains an authoritative, eventually-consistent view of which
//! execution targets (ranks) are online, offline, torpid, or lost, and
//! publishes every transition to an append-only resource event log. The
//! crate is designed as a building block for higher-level schedulers and
//! job managers.
//!
//! ## Features
//!
//! | Area            | Description                                                          | Key types / traits                        |
//! |-----------------|----------------------------------------------------------------------|-------------------------------------------|
//! | **Rank sets**   | Compact rank sets with a canonical run-length string codec.          | [`IdSet`]                                 |
//! | **Wait queues** | Refcounted parked continuations with bulk wake and selective cull.   | [`Wait`], [`WaitQueue`]                   |
//! | **Event log**   | Batched, ordered appends to a durable log with lifecycle hooks.      | [`Appender`], [`EventStore`], [`Entry`]   |
//! | **Monitor**     | Group snapshot diffing, join/leave events, waitup and force-down.    | [`Monitor`], [`MonitorHandle`]            |
//! | **Errors**      | Typed errors with stable labels for logs/metrics.                    | [`MonitorError`], [`IdsetError`]          |
//! | **Configuration** | Per-rank monitor settings.                                         | [`MonitorConfig`]                         |
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use rankvisor::{Appender, GroupHub, MemoryStore, Monitor, MonitorConfig, BROKER_ONLINE};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::new());
//!     let groups = Arc::new(GroupHub::new());
//!
//!     let mut cfg = MonitorConfig::default();
//!     cfg.size = 4;
//!     cfg.hostlist = Some("node[0-3]".to_string());
//!
//!     let appender = Appender::new(store.clone(), Duration::from_millis(50), None);
//!     let monitor = Monitor::new(cfg, appender, groups.clone());
//!     let handle = monitor.handle();
//!
//!     let token = CancellationToken::new();
//!     tokio::spawn(monitor.run(token.clone()));
//!
//!     // The overlay reports all four ranks online; wait for the quorum.
//!     groups.publish(BROKER_ONLINE, "0-3").await;
//!     handle.waitup(4).await?;
//!
//!     for entry in store.entries("resource.eventlog") {
//!         println!("{}", entry.name);
//!     }
//!     token.cancel();
//!     Ok(())
//! }
//! ```
//!
//! ---

mod config;
mod error;
mod eventlog;
mod idset;
mod monitor;
mod waitq;

// ---- Public re-exports ----

pub use config::MonitorConfig;
pub use error::MonitorError;
pub use eventlog::{
    AppendError, AppendMode, AppendObserver, Appender, Entry, EventStore, MemoryStore, StoreError,
};
pub use idset::{IdSet, IdsetError};
pub use monitor::{
    GroupError, GroupHub, GroupSource, GroupUpdate, Membership, Monitor, MonitorHandle,
    BROKER_ONLINE, BROKER_TORPID, SDMON_ONLINE,
};
pub use waitq::{Wait, WaitError, WaitQueue};
