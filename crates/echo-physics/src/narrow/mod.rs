// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! Narrow phase: exact contact geometry for broad-phase candidates.
//!
//! Per step the narrow phase
//! - runs the persistent [`CollisionAlgorithm`] of every default pair with at
//!   least one active body and collects non-empty manifolds;
//! - runs ghost pairs the same way and reports the contact manifolds of
//!   each ghost;
//! - casts every fast body along its motion (conservative advancement) and
//!   turns the earliest hit into a one-point predictive manifold.
//!
//! Contact convention: normals point from object 2 toward object 1, and depth
//! is negative while interpenetrating.

#[doc = "Per-pair collision routines and the settings they share."]
pub mod algorithm;
#[doc = "Conservative-advancement time of impact for translating convex objects."]
pub mod ccd;
#[doc = "Shape-kind to algorithm lookup table."]
pub mod dispatch;
#[doc = "Expanding polytope penetration depth."]
pub mod epa;
#[doc = "GJK distance and intersection query."]
pub mod gjk;
#[doc = "Persistent contact manifold (up to four points per pair)."]
pub mod manifold;
#[doc = "Simplex reduction toward the origin used by GJK."]
pub mod simplex;

use std::collections::BTreeMap;

use tracing::{instrument, trace};

pub use algorithm::{CollisionAlgorithm, CollisionObject, NarrowPhaseSettings};
pub use ccd::{refine_time_of_impact, time_of_impact, CcdSettings, TimeOfImpact};
pub use dispatch::{AlgorithmKind, AlgorithmRegistration, AlgorithmSelection, AlgorithmSelector};
pub use epa::{epa, EpaResult, EpaSettings};
pub use gjk::{gjk, GjkResult, GjkSettings};
pub use manifold::{AccumulatedImpulse, ManifoldContactPoint, ManifoldResult, MAX_MANIFOLD_POINTS};
pub use simplex::{Simplex, SupportMapping};

use crate::body::{BodyId, WorkBody};
use crate::broad::{BroadPhase, OverlappingPair};
use crate::error::Result;
use crate::math::Vec3;
use crate::shape::{CollisionShape, ConvexGeometry, ConvexObject};
use crate::temporal::timespan::Timespan;
use crate::types::{aabb::Aabb, ray::Ray, transform::PhysicsTransform};

/// Earliest hit of a moving object (a fast body or a ray) against a body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContinuousCollisionResult {
    /// Body that was hit.
    pub body: BodyId,
    /// Unit normal on the hit body, pointing toward the moving object.
    pub normal: Vec3,
    /// Hit point on the hit body.
    pub hit_point: Vec3,
    /// Fraction of the motion at which the hit happens, in `[0, 1]`.
    pub time_to_hit: f32,
}

/// Everything one narrow-phase pass produced.
#[derive(Debug, Clone, Default)]
pub struct NarrowPhaseOutput {
    /// Non-empty manifolds of the default pairs, then predictive manifolds.
    pub manifolds: Vec<ManifoldResult>,
    /// Non-empty manifolds of each ghost, ordered by the other body's id.
    pub ghost_contacts: Vec<(BodyId, Vec<ManifoldResult>)>,
}

/// Dispatch table plus tolerances.
#[derive(Debug, Clone)]
pub struct NarrowPhase {
    selector: AlgorithmSelector,
    settings: NarrowPhaseSettings,
}

impl NarrowPhase {
    /// Narrow phase over the built-in algorithms.
    ///
    /// # Errors
    /// [`crate::error::PhysicsError::MissingAlgorithm`] if the dispatch table
    /// is incomplete.
    pub fn new(settings: NarrowPhaseSettings) -> Result<Self> {
        Ok(Self { selector: AlgorithmSelector::new()?, settings })
    }

    /// Tolerances in use.
    pub fn settings(&self) -> &NarrowPhaseSettings {
        &self.settings
    }

    /// Dispatch table in use.
    pub fn selector(&self) -> &AlgorithmSelector {
        &self.selector
    }

    /// Runs the discrete, ghost and predictive passes for one step.
    #[instrument(level = "trace", skip(self, broad, bodies))]
    pub fn process(
        &self,
        broad: &mut dyn BroadPhase,
        bodies: &BTreeMap<BodyId, WorkBody>,
        dt: f32,
    ) -> NarrowPhaseOutput {
        let mut output = NarrowPhaseOutput::default();

        for pair in broad.pairs_mut().default_pairs_mut().pairs_mut() {
            let involves_active = [pair.body1(), pair.body2()]
                .iter()
                .any(|id| bodies.get(id).is_some_and(WorkBody::is_active));
            if !involves_active {
                continue;
            }
            if let Some(manifold) = self.process_pair(pair, bodies) {
                if !manifold.is_empty() {
                    output.manifolds.push(manifold.clone());
                }
            }
        }

        for (ghost, container) in broad.pairs_mut().alternates_mut() {
            let mut contacts = Vec::new();
            for pair in container.pairs_mut() {
                let manifold = self.process_pair(pair, bodies).filter(|m| !m.is_empty());
                if let Some(manifold) = manifold {
                    contacts.push(manifold.clone());
                }
            }
            output.ghost_contacts.push((*ghost, contacts));
        }

        let discrete = output.manifolds.len();
        for body in bodies.values() {
            if !body.is_active() || body.is_ghost() || body.is_static() {
                continue;
            }
            let motion = body.linear_velocity().scale(dt);
            if motion.length() <= body.ccd_motion_threshold() {
                continue;
            }
            let timespan = Timespan::new(body.transform(), body.predicted_transform(dt));
            if let Some(hit) = self.handle_continuous_collision(body, &timespan, &*broad, bodies) {
                output.manifolds.push(self.predictive_manifold(body, &timespan, &hit, bodies));
            }
        }

        trace!(
            manifolds = discrete,
            predictive = output.manifolds.len() - discrete,
            ghosts = output.ghost_contacts.len(),
            "narrow phase processed"
        );
        output
    }

    fn process_pair<'p>(
        &self,
        pair: &'p mut OverlappingPair,
        bodies: &BTreeMap<BodyId, WorkBody>,
    ) -> Option<&'p ManifoldResult> {
        let (Some(body1), Some(body2)) = (bodies.get(&pair.body1()), bodies.get(&pair.body2()))
        else {
            return None;
        };
        let algorithm = pair.algorithm.get_or_insert_with(|| {
            CollisionAlgorithm::new(
                self.selector.select(body1.shape().kind(), body2.shape().kind()),
                (body1.id(), body1.transform()),
                (body2.id(), body2.transform()),
                self.settings.contact_breaking_threshold,
            )
        });
        algorithm.process_collision(
            &CollisionObject::new(body1.shape(), body1.transform()),
            &CollisionObject::new(body2.shape(), body2.transform()),
            &self.selector,
            &self.settings,
        );
        Some(algorithm.manifold())
    }

    /// Earliest hit of `body` moving over `timespan` against the broad-phase
    /// candidates along its path. Ghosts are ignored.
    pub fn handle_continuous_collision(
        &self,
        body: &WorkBody,
        timespan: &Timespan,
        broad: &dyn BroadPhase,
        bodies: &BTreeMap<BodyId, WorkBody>,
    ) -> Option<ContinuousCollisionResult> {
        let from = timespan.from();
        let motion = timespan.displacement();
        let moving = convex_parts(body.shape(), &from);
        if moving.is_empty() {
            return None;
        }

        let mut earliest: Option<ContinuousCollisionResult> = None;
        for candidate in broad.body_test(body, &from, &timespan.to()) {
            let Some(target) = bodies.get(&candidate) else {
                continue;
            };
            if target.is_ghost() {
                continue;
            }
            let margin = self.settings.contact_breaking_threshold;
            let query = |local_transform: &PhysicsTransform| {
                let local_span = Timespan::new(
                    local_transform.multiply(&from),
                    local_transform.multiply(&timespan.to()),
                );
                TargetQuery::Aabb(local_span.swept_aabb(body.shape()).inflate(margin))
            };
            let targets = target_parts(target.shape(), &target.transform(), &query);
            for object in &moving {
                for target_object in &targets {
                    let ccd = &self.settings.ccd;
                    let Some(toi) = time_of_impact(object, &motion, target_object, &Vec3::ZERO, ccd)
                    else {
                        continue;
                    };
                    let toi = refine_time_of_impact(
                        object,
                        &motion,
                        target_object,
                        &Vec3::ZERO,
                        toi,
                        &self.settings.gjk,
                    );
                    keep_earliest(
                        &mut earliest,
                        ContinuousCollisionResult {
                            body: candidate,
                            normal: toi.normal,
                            hit_point: toi.hit_point_b,
                            time_to_hit: toi.time,
                        },
                    );
                }
            }
        }
        earliest
    }

    fn predictive_manifold(
        &self,
        body: &WorkBody,
        timespan: &Timespan,
        hit: &ContinuousCollisionResult,
        bodies: &BTreeMap<BodyId, WorkBody>,
    ) -> ManifoldResult {
        let other_transform =
            bodies.get(&hit.body).map_or(PhysicsTransform::identity(), WorkBody::transform);
        let mut manifold = ManifoldResult::new(
            body.id(),
            hit.body,
            body.transform(),
            other_transform,
            self.settings.contact_breaking_threshold,
        );
        let depth = timespan.displacement().scale(hit.time_to_hit).dot(&hit.normal.scale(-1.0));
        manifold.add_contact_point(hit.normal, hit.hit_point, depth, true);
        trace!(
            body = %body.id(),
            hit = %hit.body,
            time_to_hit = hit.time_to_hit,
            "predictive contact"
        );
        manifold
    }

    /// Hits of `ray` against every body it crosses (ghosts excluded), sorted
    /// by time to hit.
    pub fn ray_test(
        &self,
        ray: &Ray,
        broad: &dyn BroadPhase,
        bodies: &BTreeMap<BodyId, WorkBody>,
    ) -> Vec<ContinuousCollisionResult> {
        let probe = ConvexObject::new(ConvexGeometry::Point(ray.from()), 0.0);
        let motion = ray.to().sub(&ray.from());
        let mut hits = Vec::new();
        for candidate in broad.ray_test(ray) {
            let Some(target) = bodies.get(&candidate) else {
                continue;
            };
            if target.is_ghost() {
                continue;
            }
            let query = |local_transform: &PhysicsTransform| {
                TargetQuery::Ray(Ray::new(
                    local_transform.transform(&ray.from()),
                    local_transform.transform(&ray.to()),
                ))
            };
            let targets = target_parts(target.shape(), &target.transform(), &query);
            let mut earliest = None;
            for target_object in &targets {
                let ccd = &self.settings.ccd;
                let toi = time_of_impact(&probe, &motion, target_object, &Vec3::ZERO, ccd);
                if let Some(toi) = toi {
                    keep_earliest(
                        &mut earliest,
                        ContinuousCollisionResult {
                            body: candidate,
                            normal: toi.normal,
                            hit_point: toi.hit_point_b,
                            time_to_hit: toi.time,
                        },
                    );
                }
            }
            hits.extend(earliest);
        }
        hits.sort_by(|a, b| a.time_to_hit.total_cmp(&b.time_to_hit));
        hits
    }

    /// Copies solver impulses from solved manifolds back into the persistent
    /// pair manifolds for warm starting.
    pub fn store_impulses(&self, broad: &mut dyn BroadPhase, solved: &[ManifoldResult]) {
        let pairs = broad.pairs_mut().default_pairs_mut();
        for manifold in solved {
            let Some(algorithm) = pairs
                .pair_mut(manifold.body1(), manifold.body2())
                .and_then(|pair| pair.algorithm.as_mut())
            else {
                continue;
            };
            let persistent = algorithm.manifold_mut();
            if persistent.body1() != manifold.body1() || persistent.len() != manifold.len() {
                continue;
            }
            for (target, source) in persistent.points_mut().iter_mut().zip(manifold.points()) {
                if !source.is_predictive() {
                    target.set_accumulated_impulse(source.accumulated_impulse());
                }
            }
        }
    }
}

/// Region of a concave target worth decomposing, in the target's frame.
enum TargetQuery {
    Aabb(Aabb),
    Ray(Ray),
}

/// World-space convex pieces of a moving shape; concave shapes have none.
fn convex_parts(shape: &CollisionShape, transform: &PhysicsTransform) -> Vec<ConvexObject> {
    match shape {
        CollisionShape::Compound(compound) => compound
            .children()
            .iter()
            .flat_map(|child| convex_parts(&child.shape, &transform.multiply(&child.transform)))
            .collect(),
        _ => shape.convex_object(transform).into_iter().collect(),
    }
}

/// World-space convex pieces of a hit target. Concave targets contribute the
/// triangles selected by `query`, which receives the world-to-local transform.
fn target_parts(
    shape: &CollisionShape,
    transform: &PhysicsTransform,
    query: &dyn Fn(&PhysicsTransform) -> TargetQuery,
) -> Vec<ConvexObject> {
    if let Some(concave) = shape.as_concave() {
        let triangles = match query(&transform.inverse()) {
            TargetQuery::Aabb(aabb) => concave.find_triangles_in_aabb(&aabb),
            TargetQuery::Ray(ray) => concave.find_triangles_hit_by_ray(&ray),
        };
        return triangles
            .into_iter()
            .map(|triangle| {
                let points = triangle.points().map(|p| transform.transform(&p));
                ConvexObject::new(ConvexGeometry::Triangle(points), 0.0)
            })
            .collect();
    }
    match shape {
        CollisionShape::Compound(compound) => compound
            .children()
            .iter()
            .flat_map(|child| {
                target_parts(&child.shape, &transform.multiply(&child.transform), query)
            })
            .collect(),
        _ => shape.convex_object(transform).into_iter().collect(),
    }
}

fn keep_earliest(
    earliest: &mut Option<ContinuousCollisionResult>,
    candidate: ContinuousCollisionResult,
) {
    if earliest.as_ref().is_none_or(|current| candidate.time_to_hit < current.time_to_hit) {
        *earliest = Some(candidate);
    }
}
