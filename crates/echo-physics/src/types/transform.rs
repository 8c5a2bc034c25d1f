// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

use crate::math::{Mat3, Quat, Vec3};

/// Rigid transform (position + orientation) used for bodies and shape placement.
///
/// Conventions:
/// - `position` in meters (world space).
/// - `orientation` is a unit quaternion; every constructor, composition and
///   integration re-normalises it.
/// - Composition `a.multiply(&b)` applies `b` first, then `a` (parent * local).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PhysicsTransform {
    position: Vec3,
    orientation: Quat,
}

impl Default for PhysicsTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl PhysicsTransform {
    /// Identity transform (origin, no rotation).
    #[must_use]
    pub const fn identity() -> Self {
        Self { position: Vec3::ZERO, orientation: Quat::identity() }
    }

    /// Creates a transform from components. The orientation is normalised.
    #[must_use]
    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self { position, orientation: orientation.normalize() }
    }

    /// Pure translation.
    #[must_use]
    pub const fn from_position(position: Vec3) -> Self {
        Self { position, orientation: Quat::identity() }
    }

    /// Position component.
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Orientation component.
    #[must_use]
    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    /// Returns a copy with a different position.
    #[must_use]
    pub fn with_position(&self, position: Vec3) -> Self {
        Self { position, orientation: self.orientation }
    }

    /// Rotation matrix of the orientation.
    #[must_use]
    pub fn orientation_matrix(&self) -> Mat3 {
        self.orientation.to_mat3()
    }

    /// Transforms a local point into world space.
    #[must_use]
    pub fn transform(&self, point: &Vec3) -> Vec3 {
        self.orientation.rotate(point).add(&self.position)
    }

    /// Transforms a world point into local space.
    #[must_use]
    pub fn inverse_transform(&self, point: &Vec3) -> Vec3 {
        self.orientation.conjugate().rotate(&point.sub(&self.position))
    }

    /// Rotates a local direction into world space (no translation).
    #[must_use]
    pub fn rotate(&self, direction: &Vec3) -> Vec3 {
        self.orientation.rotate(direction)
    }

    /// Rotates a world direction into local space (no translation).
    #[must_use]
    pub fn inverse_rotate(&self, direction: &Vec3) -> Vec3 {
        self.orientation.conjugate().rotate(direction)
    }

    /// Composition `self * other`: `other` is expressed in `self`'s frame.
    #[must_use]
    pub fn multiply(&self, other: &Self) -> Self {
        Self {
            position: self.transform(&other.position),
            orientation: self.orientation.multiply(&other.orientation).normalize(),
        }
    }

    /// Inverse transform such that `t.multiply(&t.inverse())` is the identity.
    #[must_use]
    pub fn inverse(&self) -> Self {
        let inv_orientation = self.orientation.conjugate();
        Self {
            position: inv_orientation.rotate(&self.position).scale(-1.0),
            orientation: inv_orientation,
        }
    }

    /// Explicit Euler integration of position and orientation over `dt`.
    ///
    /// The orientation follows `q' = q + 0.5 * (ω, 0) * q * dt` and is
    /// re-normalised.
    #[must_use]
    pub fn integrate(&self, linear_velocity: &Vec3, angular_velocity: &Vec3, dt: f32) -> Self {
        let position = self.position.add(&linear_velocity.scale(dt));
        let spin = Quat::new(angular_velocity.x(), angular_velocity.y(), angular_velocity.z(), 0.0)
            .multiply(&self.orientation);
        let [sx, sy, sz, sw] = spin.to_array();
        let [qx, qy, qz, qw] = self.orientation.to_array();
        let half_dt = 0.5 * dt;
        let orientation = Quat::new(
            qx + sx * half_dt,
            qy + sy * half_dt,
            qz + sz * half_dt,
            qw + sw * half_dt,
        )
        .normalize();
        Self { position, orientation }
    }

    /// Approximate equality on position and rotation.
    ///
    /// Quaternions `q` and `-q` encode the same rotation, so the orientation
    /// check uses `|q1·q2| ≈ 1`.
    #[must_use]
    pub fn approx_eq(&self, other: &Self, epsilon: f32) -> bool {
        self.position.distance_squared(&other.position) <= epsilon * epsilon
            && (1.0 - self.orientation.dot(&other.orientation).abs()) <= epsilon
    }
}

impl core::ops::Mul for PhysicsTransform {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        self.multiply(&rhs)
    }
}
