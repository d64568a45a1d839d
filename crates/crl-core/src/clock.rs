//! Causal clock computation over a message's parent set.

use crate::message::MessageId;
use std::collections::HashSet;
use thiserror::Error;

/// Failures while computing a message's clock from its parents.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClockError {
    /// The parent set names the same id twice. Permanent rejection.
    #[error("duplicate parent: {}", .0.short())]
    DuplicateParent(MessageId),

    /// One or more parents are not in the local store. Recoverable: fetch
    /// them, then retry acceptance.
    #[error("missing parents: {0:?}")]
    MissingParents(Vec<MessageId>),
}

/// Compute the logical clock for a message with the given parents.
///
/// An empty parent set yields clock 0 (a root). Otherwise the clock is
/// `1 + max(parent clocks)`, with the parent clocks supplied by `lookup`
/// (typically a store read). All unknown parents are gathered into one
/// [`ClockError::MissingParents`] so the caller can fetch them in a single
/// round trip.
pub fn compute_clock<F>(parents: &[MessageId], lookup: F) -> Result<u64, ClockError>
where
    F: Fn(&MessageId) -> Option<u64>,
{
    if parents.is_empty() {
        return Ok(0);
    }

    let mut seen = HashSet::with_capacity(parents.len());
    for parent in parents {
        if !seen.insert(*parent) {
            return Err(ClockError::DuplicateParent(*parent));
        }
    }

    let mut max_clock = 0u64;
    let mut missing = Vec::new();
    for parent in parents {
        match lookup(parent) {
            Some(clock) => max_clock = max_clock.max(clock),
            None => missing.push(*parent),
        }
    }

    if !missing.is_empty() {
        return Err(ClockError::MissingParents(missing));
    }

    Ok(max_clock + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Hash;
    use std::collections::HashMap;

    fn id(n: u8) -> MessageId {
        MessageId(Hash::digest(&[n]))
    }

    #[test]
    fn empty_parents_is_clock_zero() {
        assert_eq!(compute_clock(&[], |_| None), Ok(0));
    }

    #[test]
    fn clock_is_one_past_max_parent() {
        let clocks: HashMap<MessageId, u64> = [(id(1), 0), (id(2), 4)].into();
        let parents = [id(1), id(2)];
        assert_eq!(
            compute_clock(&parents, |p| clocks.get(p).copied()),
            Ok(5)
        );
    }

    #[test]
    fn duplicate_parent_is_rejected() {
        let parents = [id(1), id(1)];
        assert_eq!(
            compute_clock(&parents, |_| Some(0)),
            Err(ClockError::DuplicateParent(id(1)))
        );
    }

    #[test]
    fn all_missing_parents_are_reported() {
        let clocks: HashMap<MessageId, u64> = [(id(1), 0)].into();
        let parents = [id(1), id(2), id(3)];
        assert_eq!(
            compute_clock(&parents, |p| clocks.get(p).copied()),
            Err(ClockError::MissingParents(vec![id(2), id(3)]))
        );
    }
}
