//! Checked/missing location bookkeeping.

use std::collections::BTreeSet;

use archlink_protocol::LocationId;

/// The slot's locations, split into checked and missing.
///
/// Invariant: `checked ∩ missing = ∅`. Every mutator preserves it; a
/// location reported as checked always wins over "missing".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationSets {
    checked: BTreeSet<LocationId>,
    missing: BTreeSet<LocationId>,
}

impl LocationSets {
    /// Builds the sets from the authentication reply.
    pub fn new(
        checked: impl IntoIterator<Item = LocationId>,
        missing: impl IntoIterator<Item = LocationId>,
    ) -> Self {
        let checked: BTreeSet<_> = checked.into_iter().collect();
        let missing = missing
            .into_iter()
            .filter(|id| !checked.contains(id))
            .collect();
        Self { checked, missing }
    }

    /// Marks locations as checked, removing them from `missing`.
    ///
    /// Returns the ids that were not already checked, in ascending order.
    pub fn mark_checked(
        &mut self,
        ids: impl IntoIterator<Item = LocationId>,
    ) -> Vec<LocationId> {
        let mut newly = Vec::new();
        for id in ids {
            self.missing.remove(&id);
            if self.checked.insert(id) {
                newly.push(id);
            }
        }
        newly.sort_unstable();
        newly
    }

    /// Adds locations to `missing`, unless they are already checked.
    pub fn mark_missing(&mut self, ids: impl IntoIterator<Item = LocationId>) {
        for id in ids {
            if !self.checked.contains(&id) {
                self.missing.insert(id);
            }
        }
    }

    pub fn checked(&self) -> &BTreeSet<LocationId> {
        &self.checked
    }

    pub fn missing(&self) -> &BTreeSet<LocationId> {
        &self.missing
    }

    pub fn is_checked(&self, id: LocationId) -> bool {
        self.checked.contains(&id)
    }

    /// Every known location of the slot.
    pub fn all(&self) -> BTreeSet<LocationId> {
        self.checked.union(&self.missing).copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set(ids: &[LocationId]) -> BTreeSet<LocationId> {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_new_overlap_resolves_to_checked() {
        let sets = LocationSets::new([2], [1, 2, 3]);
        assert_eq!(*sets.checked(), set(&[2]));
        assert_eq!(*sets.missing(), set(&[1, 3]));
    }

    #[test]
    fn test_mark_checked_moves_out_of_missing() {
        let mut sets = LocationSets::new([], [1, 2, 3]);
        let newly = sets.mark_checked([2]);

        assert_eq!(newly, vec![2]);
        assert_eq!(*sets.checked(), set(&[2]));
        assert_eq!(*sets.missing(), set(&[1, 3]));
    }

    #[test]
    fn test_mark_checked_repeat_reports_nothing_new() {
        let mut sets = LocationSets::new([], [1, 2]);
        sets.mark_checked([1]);
        assert!(sets.mark_checked([1]).is_empty());
    }

    #[test]
    fn test_mark_missing_ignores_checked() {
        let mut sets = LocationSets::new([5], []);
        sets.mark_missing([5, 6]);
        assert_eq!(*sets.missing(), set(&[6]));
        assert_eq!(sets.all(), set(&[5, 6]));
    }

    fn ids() -> impl Strategy<Value = Vec<LocationId>> {
        prop::collection::vec(0i64..20, 0..5)
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

        #[test]
        fn test_sets_stay_disjoint_over_update_sequences(
            checked in ids(),
            missing in ids(),
            steps in prop::collection::vec((any::<bool>(), ids()), 0..50)
        ) {
            let mut sets = LocationSets::new(checked, missing);
            prop_assert!(sets.checked().is_disjoint(sets.missing()));

            for (mark_checked, step) in steps {
                let before = sets.checked().clone();
                if mark_checked {
                    sets.mark_checked(step);
                } else {
                    sets.mark_missing(step);
                }
                prop_assert!(
                    sets.checked().is_disjoint(sets.missing()),
                    "checked {:?} overlaps missing {:?}",
                    sets.checked(),
                    sets.missing()
                );
                prop_assert!(before.is_subset(sets.checked()));
            }
        }
    }
}
