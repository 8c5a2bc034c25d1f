// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use core::f32::consts::PI;

use tracing::trace;

use super::ccd::CcdSettings;
use super::dispatch::{AlgorithmKind, AlgorithmSelection, AlgorithmSelector};
use super::epa::{epa, EpaResult, EpaSettings};
use super::gjk::{gjk, GjkResult, GjkSettings};
use super::manifold::{ManifoldResult, MAX_MANIFOLD_POINTS};
use crate::body::BodyId;
use crate::config::NarrowPhaseConfig;
use crate::math::{Quat, Vec3, EPSILON};
use crate::shape::{CollisionShape, ConvexObject, ShapeKind};
use crate::types::transform::PhysicsTransform;

/// Largest tilt applied when sampling extra contacts by perturbation.
const MAX_PERTURBATION_ANGLE: f32 = 0.125 * PI;

/// Tolerances shared by every collision routine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NarrowPhaseSettings {
    /// Distance under which contacts are created and kept.
    pub contact_breaking_threshold: f32,
    /// Distance query limits.
    pub gjk: GjkSettings,
    /// Penetration query limits.
    pub epa: EpaSettings,
    /// Time-of-impact query limits.
    pub ccd: CcdSettings,
}

impl From<&NarrowPhaseConfig> for NarrowPhaseSettings {
    fn from(config: &NarrowPhaseConfig) -> Self {
        Self {
            contact_breaking_threshold: config.contact_breaking_threshold,
            gjk: GjkSettings::from(config),
            epa: EpaSettings::from(config),
            ccd: CcdSettings::from(config),
        }
    }
}

impl Default for NarrowPhaseSettings {
    fn default() -> Self {
        Self::from(&NarrowPhaseConfig::default())
    }
}

/// A shape placed in world space for one collision query.
#[derive(Debug, Clone, Copy)]
pub struct CollisionObject<'a> {
    /// Geometry.
    pub shape: &'a CollisionShape,
    /// World transform of the geometry.
    pub transform: PhysicsTransform,
}

impl<'a> CollisionObject<'a> {
    /// Places `shape` at `transform`.
    pub fn new(shape: &'a CollisionShape, transform: PhysicsTransform) -> Self {
        Self { shape, transform }
    }
}

/// Persistent collision routine of one overlapping pair.
///
/// The manifold lists the bodies in the routine's order: reversed from the
/// pair when the selection is swapped.
#[derive(Debug, Clone)]
pub struct CollisionAlgorithm {
    selection: AlgorithmSelection,
    manifold: ManifoldResult,
}

impl CollisionAlgorithm {
    /// Routine for `body1`/`body2` (pair order) with their transforms.
    pub fn new(
        selection: AlgorithmSelection,
        body1: (BodyId, PhysicsTransform),
        body2: (BodyId, PhysicsTransform),
        contact_breaking_threshold: f32,
    ) -> Self {
        let ((id1, t1), (id2, t2)) =
            if selection.swapped { (body2, body1) } else { (body1, body2) };
        let manifold = ManifoldResult::new(id1, id2, t1, t2, contact_breaking_threshold);
        Self { selection, manifold }
    }

    /// Chosen routine.
    pub fn kind(&self) -> AlgorithmKind {
        self.selection.kind
    }

    /// `true` when the routine runs on (object2, object1).
    pub fn is_swapped(&self) -> bool {
        self.selection.swapped
    }

    /// Persistent contact points.
    pub fn manifold(&self) -> &ManifoldResult {
        &self.manifold
    }

    pub(crate) fn manifold_mut(&mut self) -> &mut ManifoldResult {
        &mut self.manifold
    }

    /// Refreshes the persistent points, then adds this step's contacts.
    ///
    /// `object1` and `object2` are given in pair order at their body
    /// transforms.
    pub fn process_collision(
        &mut self,
        object1: &CollisionObject<'_>,
        object2: &CollisionObject<'_>,
        selector: &AlgorithmSelector,
        settings: &NarrowPhaseSettings,
    ) {
        let (a, b) = if self.selection.swapped { (object2, object1) } else { (object1, object2) };
        self.manifold.refresh(a.transform, b.transform);
        process_kind(self.selection.kind, a, b, &mut self.manifold, selector, settings);
    }
}

fn process_kind(
    kind: AlgorithmKind,
    a: &CollisionObject<'_>,
    b: &CollisionObject<'_>,
    manifold: &mut ManifoldResult,
    selector: &AlgorithmSelector,
    settings: &NarrowPhaseSettings,
) {
    match kind {
        AlgorithmKind::SphereSphere => sphere_sphere(a, b, manifold, settings),
        AlgorithmKind::SphereBox => sphere_box(a, b, manifold, settings),
        AlgorithmKind::ConvexConvex => convex_convex(a, b, manifold, settings),
        AlgorithmKind::CompoundAny => compound_any(a, b, manifold, selector, settings),
        AlgorithmKind::ConcaveAny => concave_any(a, b, manifold, selector, settings),
    }
}

fn sphere_sphere(
    a: &CollisionObject<'_>,
    b: &CollisionObject<'_>,
    manifold: &mut ManifoldResult,
    settings: &NarrowPhaseSettings,
) {
    let (CollisionShape::Sphere(sphere1), CollisionShape::Sphere(sphere2)) = (a.shape, b.shape)
    else {
        return;
    };
    let center1 = a.transform.position();
    let center2 = b.transform.position();
    let delta = center1.sub(&center2);
    let distance = delta.length();
    let radii = sphere1.radius() + sphere2.radius();
    if distance - radii >= settings.contact_breaking_threshold {
        return;
    }
    let normal = if distance > EPSILON { delta.scale(1.0 / distance) } else { Vec3::UNIT_X };
    let point_on_2 = center2.add(&normal.scale(sphere2.radius()));
    manifold.add_contact_point(normal, point_on_2, distance - radii, false);
}

fn sphere_box(
    a: &CollisionObject<'_>,
    b: &CollisionObject<'_>,
    manifold: &mut ManifoldResult,
    settings: &NarrowPhaseSettings,
) {
    let (CollisionShape::Sphere(sphere), CollisionShape::Box(cuboid)) = (a.shape, b.shape) else {
        return;
    };
    let radius = sphere.radius();
    let half = cuboid.half_extents();
    let center = b.transform.inverse_transform(&a.transform.position());
    let mut closest = center.max(&half.scale(-1.0)).min(&half);
    let length = closest.sub(&center).length();
    if length - settings.contact_breaking_threshold >= radius {
        return;
    }

    let (normal, depth) = if length > EPSILON {
        (center.sub(&closest).scale(1.0 / length), length - radius)
    } else {
        let penetration = half.sub(&center.abs());
        let mut axis = 0;
        for i in 1..3 {
            if penetration.component(i) < penetration.component(axis) {
                axis = i;
            }
        }
        let sign = if center.component(axis) < 0.0 { -1.0 } else { 1.0 };
        let face_distance = penetration.component(axis);
        closest = center.with_component(axis, center.component(axis) + face_distance * sign);
        (Vec3::ZERO.with_component(axis, sign), -(face_distance + radius))
    };

    let point_on_2 = b.transform.transform(&closest);
    manifold.add_contact_point(b.transform.rotate(&normal), point_on_2, depth, false);
}

/// One contact from convex geometry: `(normal_from_2, point_on_2, depth)`.
fn convex_contact(
    a: &ConvexObject,
    b: &ConvexObject,
    settings: &NarrowPhaseSettings,
) -> Option<(Vec3, Vec3, f32)> {
    match gjk(a, b, false, &settings.gjk) {
        GjkResult::Invalid => {
            trace!("discarding contact: GJK result invalid");
            None
        }
        GjkResult::Collide { .. } => {
            let with_margin = gjk(a, b, true, &settings.gjk);
            match epa(a, b, true, &with_margin, &settings.epa) {
                EpaResult::Collide { contact_b, normal, penetration_depth, .. } => {
                    Some((normal.scale(-1.0), contact_b, -penetration_depth))
                }
                EpaResult::NoCollide | EpaResult::Invalid => {
                    trace!("discarding contact: EPA found no penetration");
                    None
                }
            }
        }
        result @ GjkResult::NoCollide { distance, .. } => {
            let margins = a.outer_margin() + b.outer_margin();
            if distance - margins >= settings.contact_breaking_threshold {
                return None;
            }
            let (closest_a, closest_b) = result.closest_points()?;
            let normal = closest_a.sub(&closest_b).normalize();
            if normal.is_zero() {
                return None;
            }
            Some((normal, closest_b.add(&normal.scale(b.outer_margin())), distance - margins))
        }
    }
}

fn convex_convex(
    a: &CollisionObject<'_>,
    b: &CollisionObject<'_>,
    manifold: &mut ManifoldResult,
    settings: &NarrowPhaseSettings,
) {
    let (Ok(convex_a), Ok(convex_b)) =
        (a.shape.convex_object(&a.transform), b.shape.convex_object(&b.transform))
    else {
        return;
    };
    let Some((normal, point_on_2, depth)) = convex_contact(&convex_a, &convex_b, settings) else {
        return;
    };
    manifold.add_contact_point(normal, point_on_2, depth, false);

    let rounded = |kind: ShapeKind| matches!(kind, ShapeKind::Sphere | ShapeKind::Capsule);
    let polyhedral = !rounded(a.shape.kind()) && !rounded(b.shape.kind());
    if manifold.len() < MAX_MANIFOLD_POINTS && polyhedral {
        add_perturbed_contacts(a, b, &normal, manifold, settings);
    }
}

/// Samples extra contacts by tilting the smaller object around axes
/// perpendicular to the first normal, then mapping each hit back onto the
/// unperturbed geometry.
fn add_perturbed_contacts(
    a: &CollisionObject<'_>,
    b: &CollisionObject<'_>,
    normal: &Vec3,
    manifold: &mut ManifoldResult,
    settings: &NarrowPhaseSettings,
) {
    let perturb_a = a.shape.max_distance_to_center() <= b.shape.max_distance_to_center();
    let perturbed = if perturb_a { a } else { b };
    let radius = perturbed.shape.max_distance_to_center();
    if radius <= EPSILON {
        return;
    }
    let angle = (settings.contact_breaking_threshold / radius).min(MAX_PERTURBATION_ANGLE);
    let base_axis = normal.any_perpendicular();
    let original = perturbed.transform;
    let threshold = settings.contact_breaking_threshold;

    for i in 0..4 {
        let axis = Quat::from_axis_angle(*normal, i as f32 * 0.5 * PI).rotate(&base_axis);
        let tilt = Quat::from_axis_angle(axis, angle).multiply(&original.orientation()).normalize();
        let tilted = PhysicsTransform::new(original.position(), tilt);
        let back = original.multiply(&tilted.inverse());

        let (convex_a, convex_b) = if perturb_a {
            (a.shape.convex_object(&tilted), b.shape.convex_object(&b.transform))
        } else {
            (a.shape.convex_object(&a.transform), b.shape.convex_object(&tilted))
        };
        let (Ok(convex_a), Ok(convex_b)) = (convex_a, convex_b) else {
            return;
        };
        let Some((n, point_on_2, depth)) = convex_contact(&convex_a, &convex_b, settings) else {
            continue;
        };

        let point_on_1 = point_on_2.add(&n.scale(depth));
        let (point_on_2, depth) = if perturb_a {
            let true_point_on_1 = back.transform(&point_on_1);
            let depth = true_point_on_1.sub(&point_on_2).dot(&n);
            (true_point_on_1.sub(&n.scale(depth)), depth)
        } else {
            let true_point_on_2 = back.transform(&point_on_2);
            let depth = point_on_1.sub(&true_point_on_2).dot(&n);
            (point_on_1.sub(&n.scale(depth)), depth)
        };
        if depth <= threshold {
            manifold.add_contact_point(n, point_on_2, depth, false);
        }
    }
}

/// Runs the routine for a sub-object and merges its contacts into `parent`.
fn process_child(
    a: &CollisionObject<'_>,
    b: &CollisionObject<'_>,
    parent: &mut ManifoldResult,
    selector: &AlgorithmSelector,
    settings: &NarrowPhaseSettings,
) {
    let selection = selector.select(a.shape.kind(), b.shape.kind());
    let (t1, t2) = parent.body_transforms();
    let threshold = parent.contact_breaking_threshold();
    let child = if selection.swapped {
        let mut child = ManifoldResult::new(parent.body2(), parent.body1(), t2, t1, threshold);
        process_kind(selection.kind, b, a, &mut child, selector, settings);
        child
    } else {
        let mut child = ManifoldResult::new(parent.body1(), parent.body2(), t1, t2, threshold);
        process_kind(selection.kind, a, b, &mut child, selector, settings);
        child
    };

    for point in child.points() {
        if selection.swapped {
            parent.add_contact_point(
                point.normal_from_2().scale(-1.0),
                point.point_on_1(),
                point.depth(),
                point.is_predictive(),
            );
        } else {
            parent.add_contact_point(
                point.normal_from_2(),
                point.point_on_2(),
                point.depth(),
                point.is_predictive(),
            );
        }
    }
}

fn compound_any(
    a: &CollisionObject<'_>,
    b: &CollisionObject<'_>,
    manifold: &mut ManifoldResult,
    selector: &AlgorithmSelector,
    settings: &NarrowPhaseSettings,
) {
    let CollisionShape::Compound(compound) = a.shape else {
        return;
    };
    let other_aabb = b.shape.aabb(&b.transform).inflate(settings.contact_breaking_threshold);
    for child in compound.children() {
        let child_object =
            CollisionObject::new(&child.shape, a.transform.multiply(&child.transform));
        if !child_object.shape.aabb(&child_object.transform).overlaps(&other_aabb) {
            continue;
        }
        process_child(&child_object, b, manifold, selector, settings);
    }
}

fn concave_any(
    a: &CollisionObject<'_>,
    b: &CollisionObject<'_>,
    manifold: &mut ManifoldResult,
    selector: &AlgorithmSelector,
    settings: &NarrowPhaseSettings,
) {
    let Some(concave) = a.shape.as_concave() else {
        return;
    };
    let relative = a.transform.inverse().multiply(&b.transform);
    let query = b.shape.aabb(&relative).inflate(settings.contact_breaking_threshold);
    for triangle in concave.find_triangles_in_aabb(&query) {
        let shape = CollisionShape::Triangle(triangle);
        process_child(&CollisionObject::new(&shape, a.transform), b, manifold, selector, settings);
    }
}
