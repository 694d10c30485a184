//! # Ordered rank sets with a capacity bound.
//!
//! [`IdSet`] is the working currency of the membership monitor: every group
//! snapshot, diff, and event context is a set of unsigned rank ids.
//!
//! ## Rules
//! - A set created with [`IdSet::new`] only admits ids below its capacity;
//!   [`IdSet::decode`](crate::IdSet::decode) produces an unbounded set.
//! - Mutating operations either apply completely or leave the target
//!   unchanged (capacity violations are detected before any insertion).
//! - Iteration and encoding are always in ascending rank order.

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

/// Capacity value meaning "no bound".
const UNBOUNDED: u32 = u32::MAX;

/// Errors produced by rank-set operations.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdsetError {
    /// The input string does not match the idset grammar.
    ///
    /// The message is caller-facing and safe to copy into an RPC error
    /// response verbatim.
    #[error("invalid idset '{input}': {reason}")]
    Parse {
        /// The rejected input, as received.
        input: String,
        /// What made it unparseable.
        reason: String,
    },

    /// An id does not fit below the set's capacity bound.
    #[error("id {id} exceeds idset capacity {capacity}")]
    Capacity {
        /// The offending id.
        id: u32,
        /// The set's capacity bound.
        capacity: u32,
    },
}

impl IdsetError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            IdsetError::Parse { .. } => "idset_parse",
            IdsetError::Capacity { .. } => "idset_capacity",
        }
    }
}

/// A set of broker ranks (`u32`), ordered, with an optional capacity bound.
///
/// The canonical string form is sorted and range-compressed (`"0-3,7"`);
/// the empty set encodes as `""`. See the codec half of this module for
/// [`encode`](IdSet::encode) / [`decode`](IdSet::decode).
#[derive(Clone, PartialEq, Eq)]
pub struct IdSet {
    pub(super) ids: BTreeSet<u32>,
    capacity: u32,
}

impl IdSet {
    /// Creates an empty set admitting ids in `[0, capacity)`.
    pub fn new(capacity: u32) -> Self {
        Self {
            ids: BTreeSet::new(),
            capacity,
        }
    }

    /// Creates an empty set with no capacity bound.
    pub fn unbounded() -> Self {
        Self::new(UNBOUNDED)
    }

    /// Creates the full set `[0, capacity)`.
    pub fn full(capacity: u32) -> Self {
        Self {
            ids: (0..capacity).collect(),
            capacity,
        }
    }

    /// Returns the capacity bound.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Returns the number of members.
    pub fn count(&self) -> usize {
        self.ids.len()
    }

    /// Returns true when the set has no members.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns true when `id` is a member.
    pub fn test(&self, id: u32) -> bool {
        self.ids.contains(&id)
    }

    /// Adds `id` to the set.
    ///
    /// Fails with [`IdsetError::Capacity`] when `id` does not fit below the
    /// capacity bound; the set is unchanged in that case.
    pub fn set(&mut self, id: u32) -> Result<(), IdsetError> {
        self.check(id)?;
        self.ids.insert(id);
        Ok(())
    }

    /// Removes `id` from the set. Removing a non-member is a no-op.
    pub fn clear(&mut self, id: u32) {
        self.ids.remove(&id);
    }

    /// Adds the inclusive range `[lo, hi]` to the set.
    ///
    /// An inverted range (`lo > hi`) adds nothing. Fails without side
    /// effects when `hi` does not fit below the capacity bound.
    pub fn range_set(&mut self, lo: u32, hi: u32) -> Result<(), IdsetError> {
        if lo <= hi {
            self.check(hi)?;
            self.ids.extend(lo..=hi);
        }
        Ok(())
    }

    /// Adds every member of `other` to this set.
    ///
    /// Fails without side effects when any member of `other` does not fit
    /// below this set's capacity bound.
    pub fn add_set(&mut self, other: &IdSet) -> Result<(), IdsetError> {
        if let Some(&max) = other.ids.last() {
            self.check(max)?;
        }
        self.ids.extend(other.ids.iter().copied());
        Ok(())
    }

    /// Removes every member of `other` from this set.
    pub fn subtract_set(&mut self, other: &IdSet) {
        for id in &other.ids {
            self.ids.remove(id);
        }
    }

    /// Returns the members of `self` that are not members of `other`.
    ///
    /// The result inherits this set's capacity bound.
    pub fn difference(&self, other: &IdSet) -> IdSet {
        IdSet {
            ids: self.ids.difference(&other.ids).copied().collect(),
            capacity: self.capacity,
        }
    }

    /// Iterates the members in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.ids.iter().copied()
    }

    fn check(&self, id: u32) -> Result<(), IdsetError> {
        if self.capacity != UNBOUNDED && id >= self.capacity {
            return Err(IdsetError::Capacity {
                id,
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}

impl Default for IdSet {
    /// An empty set with no capacity bound.
    fn default() -> Self {
        Self::unbounded()
    }
}

impl fmt::Debug for IdSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdSet(\"{}\")", self.encode())
    }
}

impl fmt::Display for IdSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
