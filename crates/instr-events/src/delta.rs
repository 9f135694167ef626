//! Snapshot diffing

use instr_core::ElementHandle;
use std::collections::BTreeSet;

/// Elements that appeared or disappeared between two snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementDelta {
    /// Sorted ascending
    pub added: Vec<ElementHandle>,
    /// Sorted ascending
    pub removed: Vec<ElementHandle>,
}

impl ElementDelta {
    /// `current - known` and `known - current`
    #[must_use]
    pub fn between(known: &BTreeSet<ElementHandle>, current: &BTreeSet<ElementHandle>) -> Self {
        Self {
            added: current.difference(known).copied().collect(),
            removed: known.difference(current).copied().collect(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Total number of changed handles
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len()
    }

    /// Keep only handles matching `keep`, on both sides
    pub fn retain(&mut self, mut keep: impl FnMut(ElementHandle) -> bool) {
        self.added.retain(|h| keep(*h));
        self.removed.retain(|h| keep(*h));
    }
}

/// Last observed element set
#[derive(Debug, Clone, Default)]
pub struct DeltaTracker {
    known: BTreeSet<ElementHandle>,
}

impl DeltaTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_known(known: BTreeSet<ElementHandle>) -> Self {
        Self { known }
    }

    #[inline]
    #[must_use]
    pub fn known(&self) -> &BTreeSet<ElementHandle> {
        &self.known
    }

    /// Replace the known set with `current`; `None` if nothing changed
    pub fn observe(&mut self, current: BTreeSet<ElementHandle>) -> Option<ElementDelta> {
        let delta = ElementDelta::between(&self.known, &current);
        self.known = current;
        (!delta.is_empty()).then_some(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn set(ids: &[u64]) -> BTreeSet<ElementHandle> {
        ids.iter().copied().map(ElementHandle::new).collect()
    }

    fn handles(ids: &[u64]) -> Vec<ElementHandle> {
        ids.iter().copied().map(ElementHandle::new).collect()
    }

    #[test]
    fn test_added_and_removed() {
        let mut tracker = DeltaTracker::with_known(set(&[1, 2, 3]));
        let delta = tracker.observe(set(&[2, 3, 4])).unwrap();
        assert_eq!(
            delta,
            ElementDelta {
                added: handles(&[4]),
                removed: handles(&[1]),
            }
        );
        assert_eq!(tracker.known(), &set(&[2, 3, 4]));
    }

    #[test]
    fn test_unchanged_snapshot_is_none() {
        let mut tracker = DeltaTracker::with_known(set(&[1, 2]));
        assert!(tracker.observe(set(&[1, 2])).is_none());
    }

    #[test]
    fn test_empty_to_empty() {
        let mut tracker = DeltaTracker::new();
        assert!(tracker.observe(BTreeSet::new()).is_none());
    }

    #[test]
    fn test_retain_filters_both_sides() {
        let mut delta = ElementDelta {
            added: handles(&[1, 2]),
            removed: handles(&[3, 4]),
        };
        delta.retain(|h| h.raw() % 2 == 0);
        assert_eq!(delta.added, handles(&[2]));
        assert_eq!(delta.removed, handles(&[4]));
        assert_eq!(delta.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_delta_reconstructs_current(
            known in proptest::collection::btree_set(0u64..64, 0..32),
            current in proptest::collection::btree_set(0u64..64, 0..32),
        ) {
            let known: BTreeSet<ElementHandle> = known.into_iter().map(ElementHandle::new).collect();
            let current: BTreeSet<ElementHandle> = current.into_iter().map(ElementHandle::new).collect();
            let delta = ElementDelta::between(&known, &current);

            let mut rebuilt = known.clone();
            for h in &delta.removed {
                rebuilt.remove(h);
            }
            rebuilt.extend(delta.added.iter().copied());
            prop_assert_eq!(rebuilt, current.clone());
            prop_assert_eq!(delta.is_empty(), known == current);
        }
    }
}
