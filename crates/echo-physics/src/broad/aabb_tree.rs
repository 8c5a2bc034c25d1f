// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use std::collections::BTreeMap;

use tracing::trace;

use super::{enforce_world_boundary, swept_aabb, BroadPhase, PairStore};
use crate::body::{BodyId, WorkBody};
use crate::types::{aabb::Aabb, ray::Ray, transform::PhysicsTransform};

#[derive(Debug, Clone)]
struct Node {
    aabb: Aabb,
    parent: Option<usize>,
    kind: NodeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Leaf(BodyId),
    Branch(usize, usize),
    Free,
}

/// Dynamic bounding-volume tree with fat leaves.
///
/// Leaves store the body box enlarged by the contact breaking threshold and
/// then by `fat_margin`. A body is reinserted only when its enlarged box
/// leaves the fat leaf, so slow bodies rarely touch the tree.
///
/// Invariants:
/// - Every branch box contains both children's boxes.
/// - A pair is recorded iff both fat leaves overlap.
#[derive(Debug, Clone)]
pub struct AabbTree {
    nodes: Vec<Node>,
    free: Vec<usize>,
    root: Option<usize>,
    leaves: BTreeMap<BodyId, usize>,
    pairs: PairStore,
    margin: f32,
    fat_margin: f32,
    world_min_y: f32,
}

impl AabbTree {
    /// Empty tree.
    #[must_use]
    pub fn new(margin: f32, fat_margin: f32, world_min_y: f32) -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
            leaves: BTreeMap::new(),
            pairs: PairStore::new(),
            margin,
            fat_margin,
            world_min_y,
        }
    }

    /// Fat leaf box of a body.
    pub fn fat_aabb(&self, id: BodyId) -> Option<Aabb> {
        self.leaves.get(&id).map(|&leaf| self.nodes[leaf].aabb)
    }

    /// Height of the tree (0 when empty).
    pub fn height(&self) -> usize {
        fn depth(tree: &AabbTree, node: usize) -> usize {
            match tree.nodes[node].kind {
                NodeKind::Branch(left, right) => 1 + depth(tree, left).max(depth(tree, right)),
                NodeKind::Leaf(_) | NodeKind::Free => 1,
            }
        }
        self.root.map_or(0, |root| depth(self, root))
    }

    fn allocate(&mut self, node: Node) -> usize {
        if let Some(index) = self.free.pop() {
            self.nodes[index] = node;
            index
        } else {
            self.nodes.push(node);
            self.nodes.len() - 1
        }
    }

    fn release(&mut self, index: usize) {
        self.nodes[index].kind = NodeKind::Free;
        self.nodes[index].parent = None;
        self.free.push(index);
    }

    fn insert_leaf(&mut self, id: BodyId, aabb: Aabb) -> usize {
        let leaf = self.allocate(Node { aabb, parent: None, kind: NodeKind::Leaf(id) });
        let Some(root) = self.root else {
            self.root = Some(leaf);
            return leaf;
        };

        // Descend toward the child whose box grows the least.
        let mut sibling = root;
        while let NodeKind::Branch(left, right) = self.nodes[sibling].kind {
            let cost = |child: usize| {
                let current = self.nodes[child].aabb;
                current.union(&aabb).surface_area() - current.surface_area()
            };
            sibling = if cost(left) <= cost(right) { left } else { right };
        }

        let old_parent = self.nodes[sibling].parent;
        let branch_box = self.nodes[sibling].aabb.union(&aabb);
        let branch = self.allocate(Node {
            aabb: branch_box,
            parent: old_parent,
            kind: NodeKind::Branch(sibling, leaf),
        });
        self.nodes[sibling].parent = Some(branch);
        self.nodes[leaf].parent = Some(branch);
        match old_parent {
            Some(parent) => {
                self.replace_child(parent, sibling, branch);
                self.refit(parent);
            }
            None => self.root = Some(branch),
        }
        leaf
    }

    fn remove_leaf(&mut self, leaf: usize) {
        let Some(parent) = self.nodes[leaf].parent else {
            self.root = None;
            self.release(leaf);
            return;
        };
        let sibling = match self.nodes[parent].kind {
            NodeKind::Branch(left, right) if left == leaf => right,
            NodeKind::Branch(left, _) => left,
            NodeKind::Leaf(_) | NodeKind::Free => return,
        };
        let grandparent = self.nodes[parent].parent;
        self.nodes[sibling].parent = grandparent;
        match grandparent {
            Some(grandparent) => {
                self.replace_child(grandparent, parent, sibling);
                self.refit(grandparent);
            }
            None => self.root = Some(sibling),
        }
        self.release(parent);
        self.release(leaf);
    }

    fn replace_child(&mut self, parent: usize, old: usize, new: usize) {
        if let NodeKind::Branch(left, right) = self.nodes[parent].kind {
            self.nodes[parent].kind = if left == old {
                NodeKind::Branch(new, right)
            } else {
                NodeKind::Branch(left, new)
            };
        }
    }

    fn refit(&mut self, mut index: usize) {
        loop {
            if let NodeKind::Branch(left, right) = self.nodes[index].kind {
                self.nodes[index].aabb = self.nodes[left].aabb.union(&self.nodes[right].aabb);
            }
            match self.nodes[index].parent {
                Some(parent) => index = parent,
                None => break,
            }
        }
    }

    /// Leaves whose box satisfies `hit`, ascending by body id.
    fn query(&self, mut hit: impl FnMut(&Aabb) -> bool) -> Vec<BodyId> {
        let mut found = Vec::new();
        let mut stack: Vec<usize> = self.root.into_iter().collect();
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !hit(&node.aabb) {
                continue;
            }
            match node.kind {
                NodeKind::Leaf(id) => found.push(id),
                NodeKind::Branch(left, right) => {
                    stack.push(left);
                    stack.push(right);
                }
                NodeKind::Free => {}
            }
        }
        found.sort_unstable();
        found
    }

    fn refresh_pairs_of(&mut self, id: BodyId) {
        let Some(fat) = self.fat_aabb(id) else {
            return;
        };
        let overlapping = self.query(|aabb| aabb.overlaps(&fat));
        for partner in self.pairs.partners_of(id) {
            if overlapping.binary_search(&partner).is_err() {
                self.pairs.remove_pair(id, partner);
            }
        }
        for other in overlapping.into_iter().filter(|other| *other != id) {
            self.pairs.add_pair(id, other);
        }
    }
}

impl BroadPhase for AabbTree {
    fn add_body(&mut self, body: &WorkBody, alternate: bool) {
        let id = body.id();
        if self.leaves.contains_key(&id) {
            return;
        }
        if alternate {
            self.pairs.register_alternate(id);
        }
        let fat = body.aabb().inflate(self.margin + self.fat_margin);
        let leaf = self.insert_leaf(id, fat);
        self.leaves.insert(id, leaf);
        self.refresh_pairs_of(id);
    }

    fn remove_body(&mut self, id: BodyId) {
        if let Some(leaf) = self.leaves.remove(&id) {
            self.remove_leaf(leaf);
            self.pairs.remove_body(id);
        }
    }

    fn update_bodies(&mut self, bodies: &mut BTreeMap<BodyId, WorkBody>) {
        let mut reinserted = Vec::new();
        for (id, body) in bodies.iter_mut() {
            enforce_world_boundary(body, self.world_min_y);
            let moved_by_user = body.take_moved();
            if !(body.is_active() || moved_by_user) {
                continue;
            }
            let Some(&leaf) = self.leaves.get(id) else {
                continue;
            };
            let tight = body.aabb().inflate(self.margin);
            if self.nodes[leaf].aabb.contains(&tight) {
                continue;
            }
            self.remove_leaf(leaf);
            let leaf = self.insert_leaf(*id, tight.inflate(self.fat_margin));
            self.leaves.insert(*id, leaf);
            reinserted.push(*id);
        }
        for id in &reinserted {
            self.refresh_pairs_of(*id);
        }
        if !reinserted.is_empty() {
            trace!(reinserted = reinserted.len(), pairs = self.pairs.len(), "aabb tree updated");
        }
    }

    fn pairs(&self) -> &PairStore {
        &self.pairs
    }

    fn pairs_mut(&mut self) -> &mut PairStore {
        &mut self.pairs
    }

    fn ray_test(&self, ray: &Ray) -> Vec<BodyId> {
        self.query(|aabb| aabb.intersects_ray(ray))
    }

    fn body_test(
        &self,
        body: &WorkBody,
        from: &PhysicsTransform,
        to: &PhysicsTransform,
    ) -> Vec<BodyId> {
        let swept = swept_aabb(body, from, to, self.margin);
        let id = body.id();
        let mut found = self.query(|aabb| aabb.overlaps(&swept));
        found.retain(|other| *other != id);
        found
    }
}
