//! # Item Diff
//!
//! Set difference between the item ids of two snapshots. The reconciler
//! hands the result to the entity-lifecycle listener after each swap.

use std::collections::BTreeSet;

use crate::cache::CacheSnapshot;

/// Item ids that appeared or disappeared between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemDiff {
    /// Ids present now but not before.
    pub added: BTreeSet<String>,

    /// Ids present before but not now.
    pub removed: BTreeSet<String>,
}

impl ItemDiff {
    /// Diffs the item ids of `previous` against `next`.
    pub fn between(previous: &CacheSnapshot, next: &CacheSnapshot) -> Self {
        Self::from_ids(previous.item_ids(), next.item_ids())
    }

    /// Diffs two id sets.
    pub fn from_ids(previous: BTreeSet<String>, next: BTreeSet<String>) -> Self {
        ItemDiff {
            added: next.difference(&previous).cloned().collect(),
            removed: previous.difference(&next).cloned().collect(),
        }
    }

    /// True when nothing was added or removed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_added_and_removed() {
        let diff = ItemDiff::from_ids(ids(&["A", "B", "C"]), ids(&["B", "C", "D"]));
        assert_eq!(diff.added, ids(&["D"]));
        assert_eq!(diff.removed, ids(&["A"]));
        assert!(!diff.is_empty());
    }

    #[test]
    fn test_unchanged_sets() {
        let diff = ItemDiff::from_ids(ids(&["A", "B"]), ids(&["B", "A"]));
        assert!(diff.is_empty());
    }

    #[test]
    fn test_cold_start_reports_everything_added() {
        let diff = ItemDiff::from_ids(BTreeSet::new(), ids(&["A", "B"]));
        assert_eq!(diff.added.len(), 2);
        assert!(diff.removed.is_empty());
    }
}
