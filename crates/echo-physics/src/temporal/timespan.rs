// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use crate::math::Vec3;
use crate::shape::CollisionShape;
use crate::types::{aabb::Aabb, transform::PhysicsTransform};

/// Transforms at the start and end of one simulation step.
///
/// - `from` is the body's transform before integration.
/// - `to` is the transform it would reach after integrating its current
///   velocities over `dt`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Timespan {
    from: PhysicsTransform,
    to: PhysicsTransform,
}

impl Timespan {
    /// Creates a new `Timespan` from start and end transforms.
    #[must_use]
    pub const fn new(from: PhysicsTransform, to: PhysicsTransform) -> Self {
        Self { from, to }
    }

    /// A timespan with no motion.
    #[must_use]
    pub const fn stationary(at: PhysicsTransform) -> Self {
        Self { from: at, to: at }
    }

    /// Returns the start transform.
    #[must_use]
    pub const fn from(&self) -> PhysicsTransform {
        self.from
    }

    /// Returns the end transform.
    #[must_use]
    pub const fn to(&self) -> PhysicsTransform {
        self.to
    }

    /// Linear displacement over the step.
    #[must_use]
    pub fn displacement(&self) -> Vec3 {
        self.to.position().sub(&self.from.position())
    }

    /// Position interpolated at fraction `t` (orientation is not interpolated).
    #[must_use]
    pub fn position_at(&self, t: f32) -> Vec3 {
        self.from.position().lerp(&self.to.position(), t)
    }

    /// Conservative swept AABB of `shape` over the timespan.
    ///
    /// Unions the AABBs at three sample poses: start, midpoint and end. The
    /// midpoint pose blends orientations with a normalised linear blend, which
    /// captures protrusions during rotation that a start/end union can miss.
    #[must_use]
    pub fn swept_aabb(&self, shape: &CollisionShape) -> Aabb {
        let a0 = shape.aabb(&self.from);
        let a1 = shape.aabb(&self.to);

        let q0 = self.from.orientation().to_array();
        let q1 = self.to.orientation().to_array();
        let qm = crate::math::Quat::new(
            0.5 * (q0[0] + q1[0]),
            0.5 * (q0[1] + q1[1]),
            0.5 * (q0[2] + q1[2]),
            0.5 * (q0[3] + q1[3]),
        );
        let mid = PhysicsTransform::new(self.position_at(0.5), qm);
        let am = shape.aabb(&mid);

        a0.union(&a1).union(&am)
    }
}
