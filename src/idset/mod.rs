//! Compact sets of broker ranks.
//!
//! This module groups the rank-set **data model** and its **string codec**:
//!
//! - [`IdSet`] ordered set of `u32` ranks with an optional capacity bound
//!   and the usual set algebra (difference, union, subtraction).
//! - Canonical run-length string form (`"0-3,7"`) via [`IdSet::encode`] /
//!   [`IdSet::decode`], plus [`IdSet::decode_subtract`] for parse-then-remove
//!   request handling.
//!
//! ## Quick reference
//! - **Producers**: group snapshot handlers decode overlay membership
//!   strings; RPC handlers decode rank arguments.
//! - **Consumers**: the membership monitor diffs cached sets against fresh
//!   snapshots; the event log stores the encoded form in entry contexts.

mod codec;
mod set;

pub use set::{IdSet, IdsetError};
