//! PP sets: immutable-on-publication bitsets over the registry id space
//!
//! The C source lays this out as a flexible-array-member struct (a header
//! followed by an inline `bool[]`). Modeled here as an ordinary `Vec<bool>`
//! with the same two rules that matter to callers: `capacity` is a snapshot
//! of the registry size at creation time, and bits beyond `capacity` are
//! implicitly false (load-bearing in `subset` and `contains`).

use crate::registry::{Pp, Registry, PRIORITY_ALL, PRIORITY_NONE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PpSet {
    bits: Vec<bool>,
}

impl PpSet {
    /// An empty set with zero capacity.
    pub fn empty() -> Self {
        Self { bits: Vec::new() }
    }

    pub fn capacity(&self) -> u32 {
        self.bits.len() as u32
    }

    pub fn size(&self) -> u32 {
        self.bits.iter().filter(|b| **b).count() as u32
    }

    /// Snapshot every registry PP whose priority bitwise-ANDs nonzero with
    /// `priority_mask`. Capacity becomes the current registry size.
    pub fn create(priority_mask: u32, registry: &Registry) -> Self {
        let n = registry.len();
        let mut bits = vec![false; n as usize];
        for id in 0..n {
            let pp = registry.get(id);
            bits[id as usize] = priority_mask & pp.priority != 0;
        }
        Self { bits }
    }

    /// Return a new set with `pp.id` set, growing capacity if needed.
    pub fn add(&self, pp: &Pp) -> Self {
        let new_cap = self.bits.len().max(pp.id as usize + 1);
        let mut bits = vec![false; new_cap];
        bits[..self.bits.len()].copy_from_slice(&self.bits);
        bits[pp.id as usize] = true;
        Self { bits }
    }

    pub fn contains(&self, pp: &Pp) -> bool {
        (pp.id as usize) < self.bits.len() && self.bits[pp.id as usize]
    }

    /// True iff every bit set in `self` is set in `other`. Bits in `self`
    /// beyond `other`'s capacity are treated as "not subset" if set, "ok"
    /// if unset.
    pub fn subset(&self, other: &PpSet) -> bool {
        for (i, &set) in self.bits.iter().enumerate() {
            if !set {
                continue;
            }
            if i >= other.bits.len() || !other.bits[i] {
                return false;
            }
        }
        true
    }

    /// Ascending ids of members. Finite, restartable (a plain iterator, not
    /// a stateful cursor).
    pub fn iter_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.bits
            .iter()
            .enumerate()
            .filter_map(|(i, &set)| set.then_some(i as u32))
    }

    /// Members in ascending id order, resolved against `registry`.
    pub fn iter<'a>(&'a self, registry: &'a Registry) -> impl Iterator<Item = Pp> + 'a {
        self.iter_ids().map(move |id| registry.get(id))
    }

    /// `1 + max(pp.generation for pp in set)`, or 0 for an empty set.
    pub fn generation(&self, registry: &Registry) -> u32 {
        let mut max_gen = 0u32;
        for pp in self.iter(registry) {
            if pp.generation >= max_gen {
                max_gen = pp.generation + 1;
            }
        }
        max_gen
    }

    /// Members with `explored == false`, or `None` if every member is explored
    /// (including the trivial case of an empty set).
    pub fn filter_unexplored(&self, registry: &Registry) -> Option<Self> {
        let mut bits = self.bits.clone();
        let mut any = false;
        for id in self.iter_ids() {
            let pp = registry.get(id);
            if pp.explored {
                bits[id as usize] = false;
            } else {
                any = true;
            }
        }
        any.then_some(Self { bits })
    }

    /// Minimum priority over unexplored members. `PRIORITY_ALL` if nonempty
    /// but fully explored; `PRIORITY_NONE` if empty.
    pub fn unexplored_priority(&self, registry: &Registry) -> u32 {
        let mut min = PRIORITY_ALL;
        let mut empty = true;
        for pp in self.iter(registry) {
            empty = false;
            if !pp.explored && pp.priority < min {
                min = pp.priority;
            }
        }
        if empty {
            PRIORITY_NONE
        } else {
            min
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{PRIORITY_MUTEX_LOCK, PRIORITY_MUTEX_UNLOCK, PRIORITY_ORDINARY};
    use proptest::prelude::*;

    #[test]
    fn bootstrap_set_has_two_mutex_pps() {
        let reg = Registry::new();
        let set = PpSet::create(PRIORITY_MUTEX_LOCK | PRIORITY_MUTEX_UNLOCK, &reg);
        assert_eq!(set.size(), 2);
        let names: Vec<_> = set.iter(&reg).map(|pp| pp.short).collect();
        assert_eq!(names, vec!["mutex_lock", "mutex_unlock"]);
    }

    #[test]
    fn subset_is_reflexive_and_transitive() {
        let reg = Registry::new();
        reg.get_or_intern("extra", "extra", "<extra>", PRIORITY_ORDINARY, 0);
        let a = PpSet::create(PRIORITY_MUTEX_LOCK, &reg);
        let b = PpSet::create(PRIORITY_MUTEX_LOCK | PRIORITY_MUTEX_UNLOCK, &reg);
        let c = PpSet::create(PRIORITY_MUTEX_LOCK | PRIORITY_MUTEX_UNLOCK | PRIORITY_ORDINARY, &reg);
        assert!(a.subset(&a));
        assert!(a.subset(&b));
        assert!(b.subset(&c));
        assert!(a.subset(&c));
        assert!(!c.subset(&a));
    }

    #[test]
    fn add_then_contains() {
        let reg = Registry::new();
        let pp = reg.get(0);
        let set = PpSet::empty().add(&pp);
        assert!(set.contains(&pp));
        assert_eq!(set.size(), 1);
    }

    #[test]
    fn generation_of_empty_is_zero() {
        let reg = Registry::new();
        assert_eq!(PpSet::empty().generation(&reg), 0);
    }

    #[test]
    fn generation_monotonicity() {
        let reg = Registry::new();
        reg.get_or_intern("a", "a", "<a>", PRIORITY_ORDINARY, 2);
        reg.get_or_intern("b", "b", "<b>", PRIORITY_ORDINARY, 5);
        reg.get_or_intern("c", "c", "<c>", PRIORITY_ORDINARY, 5);
        let set = PpSet::create(PRIORITY_ORDINARY, &reg);
        assert_eq!(set.generation(&reg), 6);
    }

    #[test]
    fn filter_unexplored_none_when_all_explored() {
        let reg = Registry::new();
        let set = PpSet::create(PRIORITY_MUTEX_LOCK | PRIORITY_MUTEX_UNLOCK, &reg);
        reg.mark_explored(&set, 10);
        assert!(set.filter_unexplored(&reg).is_none());
    }

    #[test]
    fn filter_unexplored_is_never_a_superset() {
        let reg = Registry::new();
        let set = PpSet::create(PRIORITY_MUTEX_LOCK | PRIORITY_MUTEX_UNLOCK, &reg);
        let lock = reg.get(0);
        reg.mark_explored(&PpSet::empty().add(&lock), 10);
        let filtered = set.filter_unexplored(&reg).expect("unlock still unexplored");
        assert!(filtered.subset(&set));
        assert!(!filtered.contains(&lock));
    }

    #[test]
    fn unexplored_priority_sentinels() {
        let reg = Registry::new();
        assert_eq!(PpSet::empty().unexplored_priority(&reg), PRIORITY_NONE);
        let set = PpSet::create(PRIORITY_MUTEX_LOCK | PRIORITY_MUTEX_UNLOCK, &reg);
        reg.mark_explored(&set, 10);
        assert_eq!(set.unexplored_priority(&reg), PRIORITY_ALL);
    }

    fn registry_with_directives(generations: &[u32]) -> Registry {
        let reg = Registry::new();
        for (i, &gen) in generations.iter().enumerate() {
            reg.get_or_intern(&format!("d{i}"), &format!("d{i}"), "<d>", PRIORITY_ORDINARY, gen);
        }
        reg
    }

    proptest! {
        /// Property 4: subset is a partial order (reflexive, transitive) over
        /// masks drawn from an arbitrary registry.
        #[test]
        fn subset_is_a_partial_order(
            generations in prop::collection::vec(0u32..20, 0..6),
            mask_a in 0u32..8,
            mask_b in 0u32..8,
            mask_c in 0u32..8,
        ) {
            let reg = registry_with_directives(&generations);
            let a = PpSet::create(mask_a, &reg);
            let b = PpSet::create(mask_b, &reg);
            let c = PpSet::create(mask_c, &reg);
            prop_assert!(a.subset(&a));
            if a.subset(&b) && b.subset(&c) {
                prop_assert!(a.subset(&c));
            }
        }

        /// Property 5: a cloned set has identical members and size.
        #[test]
        fn clone_preserves_members_and_size(
            generations in prop::collection::vec(0u32..20, 0..6),
            mask in 0u32..8,
        ) {
            let reg = registry_with_directives(&generations);
            let set = PpSet::create(mask, &reg);
            let cloned = set.clone();
            prop_assert_eq!(&set, &cloned);
            prop_assert_eq!(set.size(), cloned.size());
        }

        /// Property 6: generation of the empty set is zero; adding a member
        /// never decreases it.
        #[test]
        fn generation_is_monotone_under_add(
            generations in prop::collection::vec(0u32..20, 1..6),
        ) {
            let reg = registry_with_directives(&generations);
            prop_assert_eq!(PpSet::empty().generation(&reg), 0);

            let mut set = PpSet::empty();
            let mut prev_gen = set.generation(&reg);
            for id in 0..reg.len() {
                let pp = reg.get(id);
                set = set.add(&pp);
                let next_gen = set.generation(&reg);
                prop_assert!(next_gen >= prev_gen);
                prev_gen = next_gen;
            }
        }
    }
}
