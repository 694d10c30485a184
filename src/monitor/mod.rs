//! Membership monitor: authoritative view of which ranks are online,
//! torpid, or lost, published as resource event log entries.
//!
//! ## Contents
//! - [`Monitor`] the per-rank engine (fully active on rank 0 only).
//! - [`MonitorHandle`], [`Membership`] the request surface (waitup,
//!   force-down, membership snapshots).
//! - [`GroupSource`], [`GroupUpdate`], [`GroupHub`] the streaming group
//!   snapshot seam and its in-process implementation.
//!
//! ## Quick reference
//! - **Inputs**: streaming snapshots of [`BROKER_ONLINE`] (or
//!   [`SDMON_ONLINE`]) and [`BROKER_TORPID`]; handle requests.
//! - **Outputs**: `restart`/`online`/`offline`/`torpid`/`lively` entries on
//!   the configured event log path; deferred waitup replies.

mod core;
mod groups;
mod handle;
mod waitup;

pub use self::core::Monitor;
pub use groups::{
    GroupError, GroupHub, GroupSource, GroupUpdate, BROKER_ONLINE, BROKER_TORPID, SDMON_ONLINE,
};
pub use handle::{Membership, MonitorHandle};
