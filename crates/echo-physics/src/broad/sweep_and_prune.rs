// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use tracing::trace;

use super::{enforce_world_boundary, swept_aabb, BroadPhase, PairStore};
use crate::body::{BodyId, WorkBody};
use crate::types::{aabb::Aabb, ray::Ray, transform::PhysicsTransform};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Endpoint {
    value: f32,
    body: BodyId,
    is_min: bool,
}

impl Endpoint {
    /// Sort key; a min endpoint precedes a max endpoint of equal value so
    /// touching boxes overlap.
    fn precedes(&self, other: &Self) -> bool {
        self.value < other.value || (self.value == other.value && self.is_min && !other.is_min)
    }

    fn side(&self) -> usize {
        usize::from(!self.is_min)
    }
}

/// Index of a proxy's endpoints in each axis array, `[axis][min, max]`.
type EndpointSlots = [[usize; 2]; 3];

/// Incremental sweep-and-prune over three sorted endpoint arrays.
///
/// Invariants:
/// - Each axis array holds exactly one min and one max endpoint per proxy
///   and is sorted by [`Endpoint::precedes`] between updates.
/// - A pair is recorded iff both stored boxes overlap.
/// - `slots` holds the current array index of every endpoint, so a moved
///   body updates its six values without scanning the arrays.
#[derive(Debug, Clone)]
pub struct SweepAndPrune {
    axes: [Vec<Endpoint>; 3],
    slots: FxHashMap<BodyId, EndpointSlots>,
    proxies: BTreeMap<BodyId, Aabb>,
    pairs: PairStore,
    margin: f32,
    world_min_y: f32,
}

impl SweepAndPrune {
    /// Empty broad phase storing boxes enlarged by `margin`.
    pub fn new(margin: f32, world_min_y: f32) -> Self {
        Self {
            axes: [Vec::new(), Vec::new(), Vec::new()],
            slots: FxHashMap::default(),
            proxies: BTreeMap::new(),
            pairs: PairStore::new(),
            margin,
            world_min_y,
        }
    }

    /// Stored box of a body.
    pub fn proxy(&self, id: BodyId) -> Option<Aabb> {
        self.proxies.get(&id).copied()
    }

    fn set_endpoint_values(&mut self, id: BodyId, aabb: &Aabb) {
        let Some(slots) = self.slots.get(&id).copied() else {
            return;
        };
        for (axis, [min, max]) in slots.into_iter().enumerate() {
            self.axes[axis][min].value = aabb.min().component(axis);
            self.axes[axis][max].value = aabb.max().component(axis);
        }
    }

    fn set_slot(&mut self, endpoint: &Endpoint, axis: usize, index: usize) {
        if let Some(slots) = self.slots.get_mut(&endpoint.body) {
            slots[axis][endpoint.side()] = index;
        }
    }

    /// Rebuilds the slots of one axis after an insertion or removal.
    fn reindex_axis(&mut self, axis: usize) {
        for (index, endpoint) in self.axes[axis].iter().enumerate() {
            self.slots.entry(endpoint.body).or_default()[axis][endpoint.side()] = index;
        }
    }

    /// Insertion sort of one axis; every swap is an overlap event.
    fn sort_axis(&mut self, axis: usize) {
        let mut endpoints = std::mem::take(&mut self.axes[axis]);
        for i in 1..endpoints.len() {
            let mut j = i;
            while j > 0 && endpoints[j].precedes(&endpoints[j - 1]) {
                let moving = endpoints[j];
                let passed = endpoints[j - 1];
                if moving.body != passed.body {
                    if moving.is_min && !passed.is_min {
                        self.begin_overlap(moving.body, passed.body);
                    } else if !moving.is_min && passed.is_min {
                        self.pairs.remove_pair(moving.body, passed.body);
                    }
                }
                endpoints.swap(j, j - 1);
                self.set_slot(&moving, axis, j - 1);
                self.set_slot(&passed, axis, j);
                j -= 1;
            }
        }
        self.axes[axis] = endpoints;
    }

    fn begin_overlap(&mut self, a: BodyId, b: BodyId) {
        if let (Some(box_a), Some(box_b)) = (self.proxies.get(&a), self.proxies.get(&b)) {
            if box_a.overlaps(box_b) {
                self.pairs.add_pair(a, b);
            }
        }
    }
}

impl BroadPhase for SweepAndPrune {
    fn add_body(&mut self, body: &WorkBody, alternate: bool) {
        let id = body.id();
        if self.proxies.contains_key(&id) {
            return;
        }
        if alternate {
            self.pairs.register_alternate(id);
        }
        let aabb = body.aabb().inflate(self.margin);
        let overlapping: Vec<BodyId> = self
            .proxies
            .iter()
            .filter(|(_, other)| other.overlaps(&aabb))
            .map(|(other_id, _)| *other_id)
            .collect();
        self.proxies.insert(id, aabb);

        for (axis, endpoints) in self.axes.iter_mut().enumerate() {
            for endpoint in [
                Endpoint { value: aabb.min().component(axis), body: id, is_min: true },
                Endpoint { value: aabb.max().component(axis), body: id, is_min: false },
            ] {
                let position = endpoints.partition_point(|e| e.precedes(&endpoint));
                endpoints.insert(position, endpoint);
            }
        }
        for axis in 0..3 {
            self.reindex_axis(axis);
        }
        for other in overlapping {
            self.pairs.add_pair(id, other);
        }
    }

    fn remove_body(&mut self, id: BodyId) {
        if self.proxies.remove(&id).is_none() {
            return;
        }
        self.slots.remove(&id);
        for endpoints in &mut self.axes {
            endpoints.retain(|e| e.body != id);
        }
        for axis in 0..3 {
            self.reindex_axis(axis);
        }
        self.pairs.remove_body(id);
    }

    fn update_bodies(&mut self, bodies: &mut BTreeMap<BodyId, WorkBody>) {
        let mut moved = 0_usize;
        for (id, body) in bodies.iter_mut() {
            enforce_world_boundary(body, self.world_min_y);
            let moved_by_user = body.take_moved();
            if !(body.is_active() || moved_by_user) || !self.proxies.contains_key(id) {
                continue;
            }
            let aabb = body.aabb().inflate(self.margin);
            self.proxies.insert(*id, aabb);
            self.set_endpoint_values(*id, &aabb);
            moved += 1;
        }
        if moved == 0 {
            return;
        }
        for axis in 0..3 {
            self.sort_axis(axis);
        }
        trace!(moved, pairs = self.pairs.len(), "sweep and prune updated");
    }

    fn pairs(&self) -> &PairStore {
        &self.pairs
    }

    fn pairs_mut(&mut self) -> &mut PairStore {
        &mut self.pairs
    }

    fn ray_test(&self, ray: &Ray) -> Vec<BodyId> {
        self.proxies
            .iter()
            .filter(|(_, aabb)| aabb.intersects_ray(ray))
            .map(|(id, _)| *id)
            .collect()
    }

    fn body_test(
        &self,
        body: &WorkBody,
        from: &PhysicsTransform,
        to: &PhysicsTransform,
    ) -> Vec<BodyId> {
        let swept = swept_aabb(body, from, to, self.margin);
        self.proxies
            .iter()
            .filter(|(id, aabb)| **id != body.id() && aabb.overlaps(&swept))
            .map(|(id, _)| *id)
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::math::Vec3;
    use crate::shape::CollisionShape;

    fn cube(id: u32, x: f32) -> WorkBody {
        let shape = Arc::new(CollisionShape::cuboid(Vec3::splat(0.5)).expect("valid box"));
        let transform = PhysicsTransform::from_position(Vec3::new(x, 0.0, 0.0));
        WorkBody::rigid(BodyId::from_raw(id), shape, transform, 0.4)
    }

    fn assert_slots_match(sap: &SweepAndPrune) {
        for (axis, endpoints) in sap.axes.iter().enumerate() {
            for (index, endpoint) in endpoints.iter().enumerate() {
                let slots = sap.slots.get(&endpoint.body).expect("every endpoint has slots");
                assert_eq!(slots[axis][endpoint.side()], index, "axis {axis} {endpoint:?}");
            }
        }
        assert_eq!(sap.slots.len(), sap.proxies.len());
    }

    #[test]
    fn endpoint_slots_follow_sorting_and_removal() {
        let mut sap = SweepAndPrune::new(0.0, -1000.0);
        let mut bodies: BTreeMap<BodyId, WorkBody> =
            (1..=5).map(|i| cube(i, 3.0 * i as f32)).map(|b| (b.id(), b)).collect();
        for body in bodies.values() {
            sap.add_body(body, false);
        }
        assert_slots_match(&sap);
        assert!(sap.pairs().is_empty());

        // Body 5 jumps onto body 1, body 2 slides past body 3.
        for (id, x) in [(5, 3.5), (2, 9.5)] {
            if let Some(body) = bodies.get_mut(&BodyId::from_raw(id)) {
                body.set_transform(PhysicsTransform::from_position(Vec3::new(x, 0.0, 0.0)));
            }
        }
        sap.update_bodies(&mut bodies);
        assert_slots_match(&sap);
        let pair = |a: u32, b: u32| {
            sap.pairs().default_pairs().contains(BodyId::from_raw(a), BodyId::from_raw(b))
        };
        assert!(pair(1, 5));
        assert!(pair(2, 3));
        assert_eq!(sap.pairs().len(), 2);
        assert_eq!(sap.proxy(BodyId::from_raw(5)).map(|aabb| aabb.min().x()), Some(3.0));

        sap.remove_body(BodyId::from_raw(1));
        assert_slots_match(&sap);
        assert_eq!(sap.pairs().len(), 1);
    }

    #[test]
    fn touching_values_sort_min_first() {
        let a = Endpoint { value: 1.0, body: BodyId::from_raw(1), is_min: false };
        let b = Endpoint { value: 1.0, body: BodyId::from_raw(2), is_min: true };
        assert!(b.precedes(&a));
        assert!(!a.precedes(&b));
    }
}
