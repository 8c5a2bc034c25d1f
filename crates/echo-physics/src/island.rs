// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! Islands of touching bodies and the sleep/wake decision made per island.

use std::collections::BTreeMap;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use crate::body::{BodyId, WorkBody};
use crate::config::IslandConfig;
use crate::math::Vec3;
use crate::narrow::ManifoldResult;

/// Disjoint-set forest over dense element indices.
#[derive(Debug, Clone, Default)]
pub struct IslandContainer {
    parent: Vec<usize>,
    rank: Vec<u32>,
    linked_to_static: Vec<bool>,
}

impl IslandContainer {
    /// Forest of `count` singleton islands.
    pub fn new(count: usize) -> Self {
        Self {
            parent: (0..count).collect(),
            rank: vec![0; count],
            linked_to_static: vec![false; count],
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    /// `true` without elements.
    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Root of the island holding `element`, halving paths on the way.
    pub fn find(&mut self, mut element: usize) -> usize {
        while self.parent[element] != element {
            self.parent[element] = self.parent[self.parent[element]];
            element = self.parent[element];
        }
        element
    }

    /// Joins the islands of `a` and `b`.
    pub fn merge(&mut self, a: usize, b: usize) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return;
        }
        let (child, root) = match self.rank[root_a].cmp(&self.rank[root_b]) {
            core::cmp::Ordering::Less => (root_a, root_b),
            core::cmp::Ordering::Greater => (root_b, root_a),
            core::cmp::Ordering::Equal => {
                self.rank[root_a] += 1;
                (root_b, root_a)
            }
        };
        self.parent[child] = root;
    }

    /// Marks `element` as touching a static body.
    pub fn link_to_static(&mut self, element: usize) {
        self.linked_to_static[element] = true;
    }

    /// Islands as `(members, linked_to_static)`, ordered by their smallest
    /// member; members ascend.
    pub fn islands(&mut self) -> Vec<(Vec<usize>, bool)> {
        let mut by_root: FxHashMap<usize, usize> = FxHashMap::default();
        let mut islands: Vec<(Vec<usize>, bool)> = Vec::new();
        for element in 0..self.len() {
            let root = self.find(element);
            let index = *by_root.entry(root).or_insert_with(|| {
                islands.push((Vec::new(), false));
                islands.len() - 1
            });
            islands[index].0.push(element);
            islands[index].1 |= self.linked_to_static[element];
        }
        islands
    }
}

/// One group of connected bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Island {
    /// Members, ascending.
    pub bodies: Vec<BodyId>,
    /// `true` when a member touches a static body.
    pub linked_to_static: bool,
    /// `true` when the island was put to sleep this step.
    pub sleeping: bool,
}

/// Rebuilds islands every step and deactivates settled ones.
///
/// Invariants:
/// - An island sleeps only if every member is below both speed thresholds and
///   the island touches a static body; otherwise every member is active.
/// - Sleeping zeroes the velocities of every member.
#[derive(Debug, Clone)]
pub struct IslandManager {
    squared_linear_threshold: f32,
    squared_angular_threshold: f32,
}

impl IslandManager {
    /// Manager using the configured sleeping thresholds.
    pub fn new(config: &IslandConfig) -> Self {
        Self {
            squared_linear_threshold: config.linear_sleeping_threshold.powi(2),
            squared_angular_threshold: config.angular_sleeping_threshold.powi(2),
        }
    }

    /// Groups bodies through `manifolds` and updates their active flags.
    ///
    /// Elements are the active dynamic bodies plus any sleeping dynamic body
    /// touched by a manifold, so a moving body wakes what it hits. Ghosts take
    /// no part.
    pub fn update(
        &self,
        bodies: &mut BTreeMap<BodyId, WorkBody>,
        manifolds: &[ManifoldResult],
    ) -> Vec<Island> {
        let is_element = |body: &WorkBody| !body.is_static() && !body.is_ghost();
        let touched: FxHashSet<BodyId> = manifolds
            .iter()
            .filter(|manifold| !manifold.is_empty())
            .flat_map(|manifold| [manifold.body1(), manifold.body2()])
            .collect();

        let elements: Vec<BodyId> = bodies
            .values()
            .filter(|body| is_element(body) && (body.is_active() || touched.contains(&body.id())))
            .map(WorkBody::id)
            .collect();
        let index: FxHashMap<BodyId, usize> =
            elements.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let index_of = |id: BodyId| index.get(&id).copied();

        let mut container = IslandContainer::new(elements.len());
        for manifold in manifolds.iter().filter(|manifold| !manifold.is_empty()) {
            match (index_of(manifold.body1()), index_of(manifold.body2())) {
                (Some(a), Some(b)) => container.merge(a, b),
                (Some(a), None) if is_static(bodies, manifold.body2()) => {
                    container.link_to_static(a);
                }
                (None, Some(b)) if is_static(bodies, manifold.body1()) => {
                    container.link_to_static(b);
                }
                _ => {}
            }
        }

        let mut islands = Vec::new();
        for (members, linked_to_static) in container.islands() {
            let members: Vec<BodyId> = members.into_iter().map(|index| elements[index]).collect();
            let settled = members
                .iter()
                .all(|id| bodies.get(id).is_some_and(|body| !self.is_moving(body)));
            let sleeping = settled && linked_to_static;
            for id in &members {
                let Some(body) = bodies.get_mut(id) else {
                    continue;
                };
                if body.is_active() == !sleeping {
                    continue;
                }
                body.set_active(!sleeping);
                if sleeping {
                    body.linear_velocity = Vec3::ZERO;
                    body.angular_velocity = Vec3::ZERO;
                    debug!(body = %id, "body fell asleep");
                } else {
                    debug!(body = %id, "body woke up");
                }
            }
            islands.push(Island { bodies: members, linked_to_static, sleeping });
        }
        trace!(
            islands = islands.len(),
            sleeping = islands.iter().filter(|island| island.sleeping).count(),
            "islands refreshed"
        );
        islands
    }

    fn is_moving(&self, body: &WorkBody) -> bool {
        !(body.linear_velocity().length_squared() < self.squared_linear_threshold
            && body.angular_velocity().length_squared() < self.squared_angular_threshold)
    }
}

fn is_static(bodies: &BTreeMap<BodyId, WorkBody>, id: BodyId) -> bool {
    bodies.get(&id).is_some_and(WorkBody::is_static)
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::shape::CollisionShape;
    use crate::types::transform::PhysicsTransform;

    fn body(id: u32, y: f32, mass: f32) -> WorkBody {
        let shape = Arc::new(CollisionShape::cuboid(Vec3::splat(0.5)).expect("valid box"));
        let transform = PhysicsTransform::from_position(Vec3::new(0.0, y, 0.0));
        let mut body = WorkBody::rigid(BodyId::from_raw(id), shape, transform, 0.4);
        body.set_mass_properties(mass, Vec3::splat(mass / 6.0));
        body
    }

    /// Ground (1), a box resting on it (2) and a box on top of that (3).
    fn stack() -> (BTreeMap<BodyId, WorkBody>, Vec<ManifoldResult>) {
        let bodies: BTreeMap<BodyId, WorkBody> =
            [body(1, -0.5, 0.0), body(2, 0.5, 1.0), body(3, 1.5, 1.0)]
                .into_iter()
                .map(|body| (body.id(), body))
                .collect();
        let contact = |upper: u32, lower: u32, y: f32| {
            let transform = |id: u32| bodies[&BodyId::from_raw(id)].transform();
            let mut manifold = ManifoldResult::new(
                BodyId::from_raw(upper),
                BodyId::from_raw(lower),
                transform(upper),
                transform(lower),
                0.02,
            );
            manifold.add_contact_point(Vec3::UNIT_Y, Vec3::new(0.0, y, 0.0), -0.001, false);
            manifold
        };
        let manifolds = vec![contact(2, 1, 0.0), contact(3, 2, 1.0)];
        (bodies, manifolds)
    }

    #[test]
    fn one_moving_member_keeps_the_whole_island_awake() {
        let manager = IslandManager::new(&IslandConfig::default());
        let (mut bodies, manifolds) = stack();
        let top = BodyId::from_raw(3);
        let middle = BodyId::from_raw(2);
        if let Some(body) = bodies.get_mut(&top) {
            body.linear_velocity = Vec3::new(1.0, 0.0, 0.0);
        }

        let islands = manager.update(&mut bodies, &manifolds);
        assert_eq!(islands.len(), 1);
        assert_eq!(islands[0].bodies, vec![middle, top]);
        assert!(islands[0].linked_to_static);
        assert!(!islands[0].sleeping);
        assert!(bodies[&middle].is_active() && bodies[&top].is_active());
        assert_eq!(bodies[&top].linear_velocity(), Vec3::new(1.0, 0.0, 0.0));

        if let Some(body) = bodies.get_mut(&top) {
            body.linear_velocity = Vec3::new(0.1, 0.0, 0.0);
        }
        let islands = manager.update(&mut bodies, &manifolds);
        assert!(islands[0].sleeping);
        assert!(!bodies[&middle].is_active() && !bodies[&top].is_active());
        assert_eq!(bodies[&top].linear_velocity(), Vec3::ZERO);
    }

    #[test]
    fn merge_groups_transitively() {
        let mut container = IslandContainer::new(4);
        container.merge(0, 2);
        container.merge(2, 3);
        container.link_to_static(3);
        let islands = container.islands();
        assert_eq!(islands, vec![(vec![0, 2, 3], true), (vec![1], false)]);
    }
}
