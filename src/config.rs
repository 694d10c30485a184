//! # Monitor configuration.
//!
//! [`MonitorConfig`] describes the rank a [`Monitor`](crate::Monitor) runs
//! on and how it should behave: instance shape, startup overrides, which
//! online group to watch, and where membership events are logged.
//!
//! # Example
//! ```
//! use rankvisor::MonitorConfig;
//!
//! let mut cfg = MonitorConfig::default();
//! cfg.size = 8;
//! cfg.hostlist = Some("node[0-7]".to_string());
//!
//! assert_eq!(cfg.rank, 0);
//! assert_eq!(cfg.eventlog_path, "resource.eventlog");
//! ```

/// Per-rank configuration for the membership monitor.
#[derive(Clone, Debug)]
pub struct MonitorConfig {
    /// This broker's rank; the monitor is fully active on rank 0 only.
    pub rank: u32,
    /// Instance size (number of ranks).
    pub size: u32,
    /// Resource inventory size; the effective size is
    /// `max(size, inventory_size)`, so a recovery instance of one rank
    /// still builds sets covering the whole inventory.
    pub inventory_size: u32,
    /// Start with every rank online and skip group subscriptions.
    /// Useful with fake or preconfigured resources.
    pub force_up: bool,
    /// Watch `sdmon.online` instead of `broker.online`, so ranks only
    /// count as online after systemd unit cleanup has been verified.
    pub systemd_enable: bool,
    /// Broker is recovering from a previous instance's log: skip group
    /// subscriptions and let the log re-materialize membership.
    pub recovery_mode: bool,
    /// Hostlist string recorded in the `restart` event's `nodelist`.
    pub hostlist: Option<String>,
    /// Event log path membership events are appended to.
    pub eventlog_path: String,
    /// Capacity of the request queue feeding the monitor loop.
    pub request_capacity: usize,
}

impl Default for MonitorConfig {
    /// Provides a default configuration:
    /// - `rank = 0`, `size = 1`, `inventory_size = 0`
    /// - all behavior flags off, no hostlist
    /// - `eventlog_path = "resource.eventlog"`
    /// - `request_capacity = 64`
    fn default() -> Self {
        Self {
            rank: 0,
            size: 1,
            inventory_size: 0,
            force_up: false,
            systemd_enable: false,
            recovery_mode: false,
            hostlist: None,
            eventlog_path: "resource.eventlog".to_string(),
            request_capacity: 64,
        }
    }
}
