// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! Broad phase: cheap AABB pruning of candidate body pairs.
//!
//! Determinism contract (applies to all implementations used here):
//! - Pair identity is canonicalized as `(min_id, max_id)` ([`PairKey`]).
//! - Pair containers iterate ascending by that key.
//! - Overlap is inclusive on faces (touching AABBs are considered overlapping).
//!
//! Every stored box is the body AABB enlarged by the contact breaking
//! threshold, so pairs exist slightly before contact and survive jitter.
//! Ghost bodies register with an alternate pair container; their overlaps
//! never reach the default (simulated) set.

#[doc = "Dynamic AABB tree broad phase with fat leaves."]
pub mod aabb_tree;
#[doc = "Overlapping pair records and the containers that own them."]
pub mod pair;
#[doc = "Incremental sweep-and-prune broad phase."]
pub mod sweep_and_prune;

use std::collections::BTreeMap;

use tracing::warn;

pub use aabb_tree::AabbTree;
pub use pair::{OverlappingPair, PairContainer, PairKey, PairStore};
pub use sweep_and_prune::SweepAndPrune;

use crate::body::{BodyId, WorkBody};
use crate::config::{BroadPhaseKind, PhysicsConfig};
use crate::temporal::timespan::Timespan;
use crate::types::{aabb::Aabb, ray::Ray, transform::PhysicsTransform};

/// Broad-phase interface shared by sweep-and-prune and the AABB tree.
pub trait BroadPhase: core::fmt::Debug + Send {
    /// Registers a body and records its current overlaps. With `alternate`
    /// its pairs go to its own container.
    fn add_body(&mut self, body: &WorkBody, alternate: bool);
    /// Unregisters a body and purges every pair referencing it.
    fn remove_body(&mut self, id: BodyId);
    /// Refreshes the boxes of active bodies and creates/destroys pairs as
    /// boxes start or stop overlapping. Active bodies below the world
    /// boundary are made static.
    fn update_bodies(&mut self, bodies: &mut BTreeMap<BodyId, WorkBody>);
    /// Pair containers.
    fn pairs(&self) -> &PairStore;
    /// Mutable pair containers (narrow-phase algorithms live on the pairs).
    fn pairs_mut(&mut self) -> &mut PairStore;
    /// Bodies whose stored box the ray crosses, ascending by id.
    fn ray_test(&self, ray: &Ray) -> Vec<BodyId>;
    /// Bodies (other than `body`) whose stored box overlaps the box swept by
    /// `body` from `from` to `to`, ascending by id.
    fn body_test(
        &self,
        body: &WorkBody,
        from: &PhysicsTransform,
        to: &PhysicsTransform,
    ) -> Vec<BodyId>;
}

/// Builds the broad phase selected by `config.broad_phase.kind`.
pub fn build_broad_phase(config: &PhysicsConfig) -> Box<dyn BroadPhase> {
    let margin = config.narrow_phase.contact_breaking_threshold;
    let world_min_y = config.broad_phase.world_min_y;
    match config.broad_phase.kind {
        BroadPhaseKind::SweepAndPrune => Box::new(SweepAndPrune::new(margin, world_min_y)),
        BroadPhaseKind::AabbTree => {
            Box::new(AabbTree::new(margin, config.broad_phase.aabb_tree_fat_margin, world_min_y))
        }
    }
}

/// Makes an active body static once its box lies entirely below
/// `world_min_y`. Returns `true` when the body was changed.
pub(crate) fn enforce_world_boundary(body: &mut WorkBody, world_min_y: f32) -> bool {
    if !body.is_active() || body.is_ghost() || body.aabb().max().y() >= world_min_y {
        return false;
    }
    warn!(body = %body.id(), world_min_y, "body fell below the world boundary; making it static");
    body.make_static();
    true
}

/// Box swept by `body` between two transforms, enlarged by `margin`.
pub(crate) fn swept_aabb(
    body: &WorkBody,
    from: &PhysicsTransform,
    to: &PhysicsTransform,
    margin: f32,
) -> Aabb {
    Timespan::new(*from, *to).swept_aabb(body.shape()).inflate(margin)
}
