//! # String codec for rank sets.
//!
//! The wire grammar is `ids := id ("," id)*` with `id := N | N "-" M`
//! (`M >= N`). Encoding is canonical: members ascending, maximal ranges
//! compressed, no whitespace. `decode(encode(s)) == s` for every set.

use std::fmt::Write as _;

use super::set::{IdSet, IdsetError};

impl IdSet {
    /// Encodes the set into its canonical run-length string form.
    ///
    /// The empty set encodes as `""`.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        let mut members = self.iter();
        let Some(first) = members.next() else {
            return out;
        };

        let (mut start, mut end) = (first, first);
        for id in members {
            if end.checked_add(1) == Some(id) {
                end = id;
                continue;
            }
            push_range(&mut out, start, end);
            start = id;
            end = id;
        }
        push_range(&mut out, start, end);
        out
    }

    /// Parses an idset string into an unbounded set.
    ///
    /// Accepts single ids, comma lists, ranges, and any mix (`"0-3,7,9"`),
    /// plus the empty string for the empty set. Surrounding whitespace is
    /// tolerated; anything else fails with a caller-facing
    /// [`IdsetError::Parse`].
    pub fn decode(input: &str) -> Result<IdSet, IdsetError> {
        let mut set = IdSet::unbounded();
        let body = input.trim();
        if body.is_empty() {
            return Ok(set);
        }

        for piece in body.split(',') {
            let piece = piece.trim();
            let (lo, hi) = match piece.split_once('-') {
                Some((a, b)) => (parse_id(input, a)?, parse_id(input, b)?),
                None => {
                    let id = parse_id(input, piece)?;
                    (id, id)
                }
            };
            if hi < lo {
                return Err(IdsetError::Parse {
                    input: input.to_string(),
                    reason: format!("descending range '{piece}'"),
                });
            }
            set.ids.extend(lo..=hi);
        }
        Ok(set)
    }

    /// Parses `input` and removes the parsed ids from this set in one step.
    ///
    /// On parse failure the set is left unchanged and the error carries a
    /// message suitable for returning to the requester verbatim.
    pub fn decode_subtract(&mut self, input: &str) -> Result<(), IdsetError> {
        let parsed = IdSet::decode(input)?;
        self.subtract_set(&parsed);
        Ok(())
    }
}

fn push_range(out: &mut String, start: u32, end: u32) {
    if !out.is_empty() {
        out.push(',');
    }
    if start == end {
        let _ = write!(out, "{start}");
    } else {
        let _ = write!(out, "{start}-{end}");
    }
}

fn parse_id(input: &str, token: &str) -> Result<u32, IdsetError> {
    token.trim().parse::<u32>().map_err(|_| IdsetError::Parse {
        input: input.to_string(),
        reason: format!("'{token}' is not an id"),
    })
}
