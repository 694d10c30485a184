//! # Event log entries.
//!
//! An [`Entry`] is one element of the append-only resource event log:
//! a wall-clock timestamp, an event name, and a structured JSON context.
//!
//! The membership events this crate posts use two context shapes:
//!
//! | name                                  | context keys                      |
//! |---------------------------------------|-----------------------------------|
//! | `restart`                             | `ranks`, `online`, `nodelist`     |
//! | `online`/`offline`/`torpid`/`lively`  | `idset`                           |
//!
//! ## Example
//! ```rust
//! use rankvisor::{Entry, IdSet};
//!
//! let joined = IdSet::decode("0-3").unwrap();
//! let ev = Entry::idset_event("online", &joined);
//!
//! assert_eq!(ev.name, "online");
//! assert_eq!(ev.context_str("idset"), Some("0-3"));
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::idset::IdSet;

/// One event log entry: `{timestamp, name, context}`.
///
/// The timestamp is seconds since the Unix epoch as a float (sub-second
/// precision, wall clock: use it for display and replay, not for interval
/// math).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    /// Event name (e.g. `"online"`).
    pub name: String,
    /// Structured event context.
    pub context: Map<String, Value>,
}

impl Entry {
    /// Creates an entry named `name`, stamped with the current wall clock.
    pub fn new(name: impl Into<String>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        Self::at(timestamp, name)
    }

    /// Creates an entry with an explicit timestamp.
    pub fn at(timestamp: f64, name: impl Into<String>) -> Self {
        Self {
            timestamp,
            name: name.into(),
            context: Map::new(),
        }
    }

    /// Adds one context field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Builds a `restart` entry recording the instance shape at startup.
    pub fn restart(ranks: &IdSet, online: &IdSet, nodelist: &str) -> Self {
        Entry::new("restart")
            .with("ranks", ranks.encode())
            .with("online", online.encode())
            .with("nodelist", nodelist)
    }

    /// Builds a membership transition entry (`{idset: "..."}`).
    pub fn idset_event(name: impl Into<String>, ids: &IdSet) -> Self {
        Entry::new(name).with("idset", ids.encode())
    }

    /// Returns a string-valued context field, if present.
    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_carries_instance_shape() {
        let ranks = IdSet::full(4);
        let online = IdSet::new(4);
        let ev = Entry::restart(&ranks, &online, "node[0-3]");

        assert_eq!(ev.name, "restart");
        assert_eq!(ev.context_str("ranks"), Some("0-3"));
        assert_eq!(ev.context_str("online"), Some(""));
        assert_eq!(ev.context_str("nodelist"), Some("node[0-3]"));
        assert!(ev.timestamp > 0.0);
    }

    #[test]
    fn serde_round_trip() {
        let ev = Entry::at(42.5, "offline").with("idset", "3");
        let json = serde_json::to_string(&ev).unwrap();
        let back: Entry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ev);
        assert!(json.contains("\"timestamp\":42.5"));
    }

    #[test]
    fn builder_overwrites_duplicate_keys() {
        let ev = Entry::at(1.0, "x").with("k", "a").with("k", "b");
        assert_eq!(ev.context_str("k"), Some("b"));
        assert_eq!(ev.context.len(), 1);
    }
}
