// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use std::collections::BTreeMap;

use crate::body::BodyId;
use crate::narrow::CollisionAlgorithm;

/// Canonical identity of an unordered body pair: `(min_id << 32) | max_id`.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct PairKey(u64);

impl PairKey {
    /// Key of `{a, b}`; argument order does not matter.
    pub fn new(a: BodyId, b: BodyId) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self((u64::from(low.value()) << 32) | u64::from(high.value()))
    }

    /// Smaller body id.
    pub fn body1(self) -> BodyId {
        BodyId::from_raw((self.0 >> 32) as u32)
    }

    /// Larger body id.
    pub fn body2(self) -> BodyId {
        BodyId::from_raw(self.0 as u32)
    }

    /// `true` when `id` is one of the two bodies.
    pub fn involves(self, id: BodyId) -> bool {
        self.body1() == id || self.body2() == id
    }
}

/// Two bodies whose fattened AABBs overlap.
///
/// The collision algorithm is created lazily by the narrow phase and lives
/// exactly as long as the pair.
#[derive(Debug, Clone)]
pub struct OverlappingPair {
    key: PairKey,
    pub(crate) algorithm: Option<CollisionAlgorithm>,
}

impl OverlappingPair {
    fn new(key: PairKey) -> Self {
        Self { key, algorithm: None }
    }

    /// Canonical key.
    pub fn key(&self) -> PairKey {
        self.key
    }

    /// Body with the smaller id.
    pub fn body1(&self) -> BodyId {
        self.key.body1()
    }

    /// Body with the larger id.
    pub fn body2(&self) -> BodyId {
        self.key.body2()
    }

    /// Collision algorithm, once the narrow phase created it.
    pub fn algorithm(&self) -> Option<&CollisionAlgorithm> {
        self.algorithm.as_ref()
    }
}

/// Ordered set of overlapping pairs.
#[derive(Debug, Clone, Default)]
pub struct PairContainer {
    pairs: BTreeMap<PairKey, OverlappingPair>,
}

impl PairContainer {
    /// Empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the pair unless already present.
    pub fn add_pair(&mut self, a: BodyId, b: BodyId) {
        let key = PairKey::new(a, b);
        self.pairs.entry(key).or_insert_with(|| OverlappingPair::new(key));
    }

    /// Forgets the pair and its algorithm.
    pub fn remove_pair(&mut self, a: BodyId, b: BodyId) {
        self.pairs.remove(&PairKey::new(a, b));
    }

    /// Forgets every pair involving `id`.
    pub fn remove_pairs_with(&mut self, id: BodyId) {
        self.pairs.retain(|key, _| !key.involves(id));
    }

    /// Recorded pair, mutable.
    pub fn pair_mut(&mut self, a: BodyId, b: BodyId) -> Option<&mut OverlappingPair> {
        self.pairs.get_mut(&PairKey::new(a, b))
    }

    /// `true` when the pair is recorded.
    pub fn contains(&self, a: BodyId, b: BodyId) -> bool {
        self.pairs.contains_key(&PairKey::new(a, b))
    }

    /// Pairs ascending by key.
    pub fn pairs(&self) -> impl Iterator<Item = &OverlappingPair> {
        self.pairs.values()
    }

    /// Mutable pairs ascending by key.
    pub fn pairs_mut(&mut self) -> impl Iterator<Item = &mut OverlappingPair> {
        self.pairs.values_mut()
    }

    /// Keys ascending.
    pub fn keys(&self) -> Vec<PairKey> {
        self.pairs.keys().copied().collect()
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// `true` without pairs.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Default pair container plus one alternate container per body that asked
/// for one (ghost bodies).
///
/// Invariants:
/// - A pair involving a body with an alternate container is recorded only in
///   alternate containers, never in the default one.
/// - When both bodies own alternates, both containers record the pair.
#[derive(Debug, Clone, Default)]
pub struct PairStore {
    default: PairContainer,
    alternates: BTreeMap<BodyId, PairContainer>,
}

impl PairStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gives `owner` an alternate container.
    pub fn register_alternate(&mut self, owner: BodyId) {
        self.alternates.entry(owner).or_default();
    }

    /// `true` when `owner` has an alternate container.
    pub fn has_alternate(&self, owner: BodyId) -> bool {
        self.alternates.contains_key(&owner)
    }

    /// Routes a new overlap to the right container(s).
    pub fn add_pair(&mut self, a: BodyId, b: BodyId) {
        if a == b {
            return;
        }
        let mut routed = false;
        for owner in [a, b] {
            if let Some(container) = self.alternates.get_mut(&owner) {
                container.add_pair(a, b);
                routed = true;
            }
        }
        if !routed {
            self.default.add_pair(a, b);
        }
    }

    /// Removes an overlap from every container.
    pub fn remove_pair(&mut self, a: BodyId, b: BodyId) {
        self.default.remove_pair(a, b);
        for owner in [a, b] {
            if let Some(container) = self.alternates.get_mut(&owner) {
                container.remove_pair(a, b);
            }
        }
    }

    /// Purges `id` from every container and drops its alternate.
    pub fn remove_body(&mut self, id: BodyId) {
        self.default.remove_pairs_with(id);
        self.alternates.remove(&id);
        for container in self.alternates.values_mut() {
            container.remove_pairs_with(id);
        }
    }

    /// Bodies currently paired with `id` in any container, ascending.
    pub fn partners_of(&self, id: BodyId) -> Vec<BodyId> {
        let mut partners: Vec<BodyId> = core::iter::once(&self.default)
            .chain(self.alternates.values())
            .flat_map(|container| container.pairs.keys())
            .filter(|key| key.involves(id))
            .map(|key| if key.body1() == id { key.body2() } else { key.body1() })
            .collect();
        partners.sort_unstable();
        partners.dedup();
        partners
    }

    /// Default (simulation) pairs.
    pub fn default_pairs(&self) -> &PairContainer {
        &self.default
    }

    /// Mutable default pairs.
    pub fn default_pairs_mut(&mut self) -> &mut PairContainer {
        &mut self.default
    }

    /// Alternate container of `owner`.
    pub fn alternate(&self, owner: BodyId) -> Option<&PairContainer> {
        self.alternates.get(&owner)
    }

    /// Owners and their alternate containers, mutable.
    pub fn alternates_mut(&mut self) -> impl Iterator<Item = (&BodyId, &mut PairContainer)> {
        self.alternates.iter_mut()
    }

    /// Total number of pairs across containers.
    pub fn len(&self) -> usize {
        self.default.len() + self.alternates.values().map(PairContainer::len).sum::<usize>()
    }

    /// `true` when no container holds a pair.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_order_independent() {
        let a = BodyId::from_raw(7);
        let b = BodyId::from_raw(3);
        assert_eq!(PairKey::new(a, b), PairKey::new(b, a));
        assert_eq!(PairKey::new(a, b).body1(), b);
        assert_eq!(PairKey::new(a, b).body2(), a);
    }

    #[test]
    fn ghost_pairs_stay_out_of_default_container() {
        let ghost = BodyId::from_raw(1);
        let body = BodyId::from_raw(2);
        let mut store = PairStore::new();
        store.register_alternate(ghost);
        store.add_pair(ghost, body);
        assert!(store.default_pairs().is_empty());
        assert!(store.alternate(ghost).is_some_and(|c| c.contains(body, ghost)));
        store.remove_body(body);
        assert!(store.is_empty());
    }
}
