// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use crate::body::BodyId;
use crate::math::Vec3;
use crate::types::transform::PhysicsTransform;

/// Maximum number of points kept per manifold.
pub const MAX_MANIFOLD_POINTS: usize = 4;

/// Impulses accumulated by the solver on one contact point.
///
/// Carried over between steps for warm starting.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AccumulatedImpulse {
    /// Along the contact normal (never negative).
    pub normal: f32,
    /// Along the two friction directions derived from the normal.
    pub tangent: [f32; 2],
}

/// One persistent contact between two bodies.
///
/// Invariants:
/// - `normal_from_2` is unit length and points from object 2 toward object 1.
/// - `point_on_1 == point_on_2 + normal_from_2 * depth`.
/// - `depth < 0` means interpenetration.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifoldContactPoint {
    normal_from_2: Vec3,
    point_on_1: Vec3,
    point_on_2: Vec3,
    local_point_on_1: Vec3,
    local_point_on_2: Vec3,
    depth: f32,
    predictive: bool,
    accumulated: AccumulatedImpulse,
}

impl ManifoldContactPoint {
    /// Contact normal from object 2 toward object 1.
    pub fn normal_from_2(&self) -> Vec3 {
        self.normal_from_2
    }

    /// World contact point on object 1.
    pub fn point_on_1(&self) -> Vec3 {
        self.point_on_1
    }

    /// World contact point on object 2.
    pub fn point_on_2(&self) -> Vec3 {
        self.point_on_2
    }

    /// Contact point on object 1 in body 1's frame.
    pub fn local_point_on_1(&self) -> Vec3 {
        self.local_point_on_1
    }

    /// Contact point on object 2 in body 2's frame.
    pub fn local_point_on_2(&self) -> Vec3 {
        self.local_point_on_2
    }

    /// Signed separation along the normal; negative while interpenetrating.
    pub fn depth(&self) -> f32 {
        self.depth
    }

    /// `true` when produced by continuous collision detection.
    pub fn is_predictive(&self) -> bool {
        self.predictive
    }

    /// Solver impulses accumulated on this point.
    pub fn accumulated_impulse(&self) -> AccumulatedImpulse {
        self.accumulated
    }

    pub(crate) fn set_accumulated_impulse(&mut self, impulse: AccumulatedImpulse) {
        self.accumulated = impulse;
    }
}

/// Up to four persistent contact points between two bodies.
///
/// Body order is the order of the collision algorithm that owns the
/// manifold, which may be the reverse of the broad-phase pair order.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifoldResult {
    body1: BodyId,
    body2: BodyId,
    transform1: PhysicsTransform,
    transform2: PhysicsTransform,
    contact_breaking_threshold: f32,
    points: Vec<ManifoldContactPoint>,
}

impl ManifoldResult {
    /// Empty manifold between two bodies at their current transforms.
    pub fn new(
        body1: BodyId,
        body2: BodyId,
        transform1: PhysicsTransform,
        transform2: PhysicsTransform,
        contact_breaking_threshold: f32,
    ) -> Self {
        Self {
            body1,
            body2,
            transform1,
            transform2,
            contact_breaking_threshold,
            points: Vec::with_capacity(MAX_MANIFOLD_POINTS),
        }
    }

    /// First body.
    pub fn body1(&self) -> BodyId {
        self.body1
    }

    /// Second body.
    pub fn body2(&self) -> BodyId {
        self.body2
    }

    /// Body transforms used for local/world conversion.
    pub fn body_transforms(&self) -> (PhysicsTransform, PhysicsTransform) {
        (self.transform1, self.transform2)
    }

    /// Distance under which contacts are created and kept.
    pub fn contact_breaking_threshold(&self) -> f32 {
        self.contact_breaking_threshold
    }

    /// Contact points.
    pub fn points(&self) -> &[ManifoldContactPoint] {
        &self.points
    }

    pub(crate) fn points_mut(&mut self) -> &mut [ManifoldContactPoint] {
        &mut self.points
    }

    /// Number of contact points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// `true` without contact points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Drops every point.
    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Replaces the body transforms used by subsequent insertions.
    pub fn set_body_transforms(
        &mut self,
        transform1: PhysicsTransform,
        transform2: PhysicsTransform,
    ) {
        self.transform1 = transform1;
        self.transform2 = transform2;
    }

    /// Adds a contact point given on object 2.
    ///
    /// A point whose local position on object 2 lies within the breaking
    /// threshold of an existing point replaces it and keeps its accumulated
    /// impulse. A full manifold keeps its deepest point and replaces the one
    /// whose substitution spans the largest area.
    pub fn add_contact_point(
        &mut self,
        normal_from_2: Vec3,
        point_on_2: Vec3,
        depth: f32,
        predictive: bool,
    ) {
        let point_on_1 = point_on_2.add(&normal_from_2.scale(depth));
        let candidate = ManifoldContactPoint {
            normal_from_2,
            point_on_1,
            point_on_2,
            local_point_on_1: self.transform1.inverse_transform(&point_on_1),
            local_point_on_2: self.transform2.inverse_transform(&point_on_2),
            depth,
            predictive,
            accumulated: AccumulatedImpulse::default(),
        };

        if let Some(index) = self.nearest_point(&candidate.local_point_on_2) {
            let accumulated = self.points[index].accumulated;
            self.points[index] = ManifoldContactPoint { accumulated, ..candidate };
        } else if self.points.len() < MAX_MANIFOLD_POINTS {
            self.points.push(candidate);
        } else {
            let index = self.insertion_index(&candidate.local_point_on_2);
            self.points[index] = candidate;
        }
    }

    /// Recomputes world points and depths from the current body transforms
    /// and drops points that separated or slid beyond the breaking threshold.
    pub fn refresh(&mut self, transform1: PhysicsTransform, transform2: PhysicsTransform) {
        self.set_body_transforms(transform1, transform2);
        let threshold = self.contact_breaking_threshold;
        for point in &mut self.points {
            point.point_on_1 = transform1.transform(&point.local_point_on_1);
            point.point_on_2 = transform2.transform(&point.local_point_on_2);
            point.depth = point.point_on_1.sub(&point.point_on_2).dot(&point.normal_from_2);
        }

        let mut index = self.points.len();
        while index > 0 {
            index -= 1;
            let point = &self.points[index];
            let projected = point.point_on_1.sub(&point.normal_from_2.scale(point.depth));
            let drift = projected.distance_squared(&point.point_on_2);
            if point.depth > threshold || drift > threshold * threshold {
                self.points.swap_remove(index);
            }
        }
    }

    fn nearest_point(&self, local_point_on_2: &Vec3) -> Option<usize> {
        let threshold_sq = self.contact_breaking_threshold * self.contact_breaking_threshold;
        self.points
            .iter()
            .enumerate()
            .map(|(i, p)| (i, p.local_point_on_2.distance_squared(local_point_on_2)))
            .filter(|(_, distance)| *distance < threshold_sq)
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(i, _)| i)
    }

    fn insertion_index(&self, local_point_on_2: &Vec3) -> usize {
        let deepest = self
            .points
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.depth.total_cmp(&b.depth))
            .map_or(0, |(i, _)| i);

        let mut best_index = if deepest == 0 { 1 } else { 0 };
        let mut best_area = f32::MIN;
        for index in (0..MAX_MANIFOLD_POINTS).filter(|i| *i != deepest) {
            let mut corners = [Vec3::ZERO; MAX_MANIFOLD_POINTS];
            for (slot, point) in corners.iter_mut().zip(&self.points) {
                *slot = point.local_point_on_2;
            }
            corners[index] = *local_point_on_2;
            let area = quadrilateral_area_squared(&corners);
            if area > best_area {
                best_area = area;
                best_index = index;
            }
        }
        best_index
    }
}

/// Squared-area proxy of four points: the largest diagonal cross product
/// over the three possible pairings.
fn quadrilateral_area_squared([p0, p1, p2, p3]: &[Vec3; MAX_MANIFOLD_POINTS]) -> f32 {
    let a = p1.sub(p0).cross(&p3.sub(p2)).length_squared();
    let b = p2.sub(p0).cross(&p3.sub(p1)).length_squared();
    let c = p3.sub(p0).cross(&p2.sub(p1)).length_squared();
    a.max(b).max(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifold() -> ManifoldResult {
        ManifoldResult::new(
            BodyId::from_raw(1),
            BodyId::from_raw(2),
            PhysicsTransform::from_position(Vec3::new(0.0, 0.5, 0.0)),
            PhysicsTransform::identity(),
            0.02,
        )
    }

    #[test]
    fn nearby_replacement_keeps_the_accumulated_impulse() {
        let mut manifold = manifold();
        manifold.add_contact_point(Vec3::UNIT_Y, Vec3::ZERO, -0.01, false);
        let warm = AccumulatedImpulse { normal: 3.5, tangent: [0.25, -0.5] };
        manifold.points_mut()[0].set_accumulated_impulse(warm);

        manifold.add_contact_point(Vec3::UNIT_Y, Vec3::new(0.005, 0.0, 0.0), -0.015, false);
        assert_eq!(manifold.len(), 1);
        let point = &manifold.points()[0];
        assert_eq!(point.depth(), -0.015);
        assert_eq!(point.point_on_2(), Vec3::new(0.005, 0.0, 0.0));
        assert_eq!(point.accumulated_impulse(), warm);
    }

    #[test]
    fn distant_point_starts_cold() {
        let mut manifold = manifold();
        manifold.add_contact_point(Vec3::UNIT_Y, Vec3::ZERO, -0.01, false);
        manifold.points_mut()[0]
            .set_accumulated_impulse(AccumulatedImpulse { normal: 2.0, tangent: [0.0; 2] });

        manifold.add_contact_point(Vec3::UNIT_Y, Vec3::new(0.5, 0.0, 0.0), -0.01, false);
        assert_eq!(manifold.len(), 2);
        assert_eq!(manifold.points()[0].accumulated_impulse().normal, 2.0);
        assert_eq!(manifold.points()[1].accumulated_impulse(), AccumulatedImpulse::default());
    }
}
