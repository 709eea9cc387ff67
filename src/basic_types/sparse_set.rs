use super::KeyedVec;
use super::Random;
use super::StorageKey;
#[cfg(any(test, feature = "debug-checks"))]
use crate::asserts::sphynx_assert_moderate;
use crate::asserts::sphynx_assert_simple;

/// Marker for a key that is not a member of the set.
const ABSENT: u32 = u32::MAX;

/// A capacity-bounded set of keys supporting O(1) insertion, removal, membership testing,
/// clearing, and uniform random sampling.
///
/// The search loop keeps two of these hot: the set of currently unsatisfied constraints and the
/// set of propositions whose flip would raise the total utility. Both need all five operations in
/// constant time, which rules out the general-purpose hash containers.
///
/// Internally `dense` packs the members contiguously while `position` maps a key back to its slot
/// in `dense` (or [ABSENT]). Removal swaps the victim with the last member, so iteration order is
/// unspecified.
#[derive(Debug, Clone)]
pub(crate) struct SparseSet<Key> {
    dense: Vec<Key>,
    position: KeyedVec<Key, u32>,
}

impl<Key: StorageKey + Copy> SparseSet<Key> {
    /// An empty set able to hold keys with indices in `[0, capacity)`.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        SparseSet {
            dense: Vec::with_capacity(capacity),
            position: KeyedVec::filled_with(capacity, ABSENT),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.dense.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    pub(crate) fn contains(&self, key: Key) -> bool {
        self.position[key] != ABSENT
    }

    /// Add `key` to the set. Returns false if it was already a member.
    pub(crate) fn insert(&mut self, key: Key) -> bool {
        if self.contains(key) {
            return false;
        }
        self.position[key] = self.dense.len() as u32;
        self.dense.push(key);
        true
    }

    /// Remove `key` from the set. Returns false if it was not a member.
    pub(crate) fn remove(&mut self, key: Key) -> bool {
        if !self.contains(key) {
            return false;
        }
        let slot = self.position[key] as usize;
        let last = self.dense.swap_remove(slot);
        if slot < self.dense.len() {
            // `last` was moved into the vacated slot.
            self.position[last] = slot as u32;
        }
        self.position[key] = ABSENT;
        true
    }

    pub(crate) fn clear(&mut self) {
        // Reset positions member by member rather than rebuilding the whole map; the set is
        // usually much smaller than its capacity.
        while let Some(key) = self.dense.pop() {
            self.position[key] = ABSENT;
        }
    }

    /// A uniformly random member. The set must be nonempty.
    pub(crate) fn random_element(&self, random: &mut impl Random) -> Key {
        sphynx_assert_simple!(
            !self.dense.is_empty(),
            "random_element called on an empty set"
        );
        self.dense[random.in_range(self.dense.len())]
    }

    #[allow(unused, reason = "-")]
    pub(crate) fn iter(&self) -> impl Iterator<Item = Key> + '_ {
        self.dense.iter().copied()
    }

    /// Validates the dense/position cross-references.
    #[cfg(any(test, feature = "debug-checks"))]
    pub(crate) fn debug_check_consistency(&self) -> bool {
        for (slot, key) in self.dense.iter().enumerate() {
            sphynx_assert_moderate!(self.position[*key] == slot as u32);
        }
        let members = self.position.iter().filter(|slot| **slot != ABSENT).count();
        sphynx_assert_moderate!(members == self.dense.len());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic_types::XorShiftRandom;

    #[test]
    fn insert_remove_contains() {
        let mut set: SparseSet<usize> = SparseSet::with_capacity(10);
        assert!(set.insert(3));
        assert!(set.insert(7));
        assert!(!set.insert(3));
        assert!(set.contains(3));
        assert!(set.contains(7));
        assert!(!set.contains(4));
        assert_eq!(set.len(), 2);

        assert!(set.remove(3));
        assert!(!set.remove(3));
        assert!(!set.contains(3));
        assert_eq!(set.len(), 1);
        assert!(set.debug_check_consistency());
    }

    #[test]
    fn removal_keeps_remaining_members() {
        let mut set: SparseSet<usize> = SparseSet::with_capacity(8);
        for key in 0..8 {
            assert!(set.insert(key));
        }
        assert!(set.remove(0));
        assert!(set.remove(4));
        let mut members: Vec<_> = set.iter().collect();
        members.sort_unstable();
        assert_eq!(members, vec![1, 2, 3, 5, 6, 7]);
        assert!(set.debug_check_consistency());
    }

    #[test]
    fn clear_empties_the_set() {
        let mut set: SparseSet<usize> = SparseSet::with_capacity(5);
        for key in 0..5 {
            assert!(set.insert(key));
        }
        set.clear();
        assert!(set.is_empty());
        for key in 0..5 {
            assert!(!set.contains(key));
        }
        // Keys are insertable again after a clear.
        assert!(set.insert(2));
        assert!(set.debug_check_consistency());
    }

    #[test]
    fn random_element_only_returns_members() {
        let mut set: SparseSet<usize> = SparseSet::with_capacity(100);
        for key in [5, 17, 42, 99] {
            assert!(set.insert(key));
        }
        let mut random = XorShiftRandom::with_seed(1);
        for _ in 0..200 {
            let element = set.random_element(&mut random);
            assert!(set.contains(element));
        }
    }

    #[test]
    fn random_element_reaches_every_member() {
        let mut set: SparseSet<usize> = SparseSet::with_capacity(4);
        for key in 0..4 {
            assert!(set.insert(key));
        }
        let mut random = XorShiftRandom::with_seed(99);
        let mut seen = [false; 4];
        for _ in 0..500 {
            seen[set.random_element(&mut random)] = true;
        }
        assert!(seen.iter().all(|hit| *hit));
    }
}
