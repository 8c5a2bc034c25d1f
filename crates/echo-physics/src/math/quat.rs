// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use crate::math::{Mat3, Vec3, EPSILON};

/// Orientation quaternion stored as `(x, y, z, w)`.
///
/// * All angles are expressed in radians.
/// * Body orientations are kept normalised; constructors and
///   [`Quat::multiply`] callers in the physics pipeline re-normalise after
///   every integration step.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Quat {
    data: [f32; 4],
}

impl Default for Quat {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quat {
    /// Creates a quaternion from components.
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { data: [x, y, z, w] }
    }

    /// Returns the identity quaternion.
    pub const fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }

    /// Returns the quaternion as an array.
    pub fn to_array(self) -> [f32; 4] {
        self.data
    }

    /// Vector (imaginary) part.
    pub fn vector_part(&self) -> Vec3 {
        Vec3::new(self.data[0], self.data[1], self.data[2])
    }

    /// Scalar part.
    pub fn w(&self) -> f32 {
        self.data[3]
    }

    /// Constructs a quaternion from a rotation axis and angle in radians.
    ///
    /// Returns the identity quaternion when the axis length is ≤ `EPSILON`.
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let len_sq = axis.length_squared();
        if len_sq <= EPSILON * EPSILON {
            return Self::identity();
        }
        let norm_axis = axis.scale(1.0 / len_sq.sqrt());
        let (sin_half, cos_half) = (angle * 0.5).sin_cos();
        let scaled = norm_axis.scale(sin_half);
        Self::new(scaled.x(), scaled.y(), scaled.z(), cos_half)
    }

    /// Hamilton product of two quaternions (`self * other`).
    ///
    /// Applying the result to a vector rotates by `other` first, then by
    /// `self`. The product is non-commutative.
    pub fn multiply(&self, other: &Self) -> Self {
        let [ax, ay, az, aw] = self.data;
        let [bx, by, bz, bw] = other.data;
        Self::new(
            aw * bx + ax * bw + ay * bz - az * by,
            aw * by - ax * bz + ay * bw + az * bx,
            aw * bz + ax * by - ay * bx + az * bw,
            aw * bw - ax * bx - ay * by - az * bz,
        )
    }

    /// Squared norm.
    pub fn length_squared(&self) -> f32 {
        self.dot(self)
    }

    /// Four-component dot product.
    pub fn dot(&self, other: &Self) -> f32 {
        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| a * b)
            .sum()
    }

    /// Normalises the quaternion; returns identity when norm is ~0.
    pub fn normalize(&self) -> Self {
        let len = self.length_squared().sqrt();
        if len <= EPSILON {
            return Self::identity();
        }
        let inv = 1.0 / len;
        Self::new(
            self.data[0] * inv,
            self.data[1] * inv,
            self.data[2] * inv,
            self.data[3] * inv,
        )
    }

    /// Conjugate; equals the inverse for unit quaternions.
    pub fn conjugate(&self) -> Self {
        Self::new(-self.data[0], -self.data[1], -self.data[2], self.data[3])
    }

    /// Inverse rotation. Normalises first so non-unit inputs stay usable.
    pub fn inverse(&self) -> Self {
        self.normalize().conjugate()
    }

    /// Rotates a vector by this (unit) quaternion.
    pub fn rotate(&self, v: &Vec3) -> Vec3 {
        // v' = v + 2w(u × v) + 2u × (u × v)
        let u = self.vector_part();
        let uv = u.cross(v);
        let uuv = u.cross(&uv);
        v.add(&uv.scale(2.0 * self.w())).add(&uuv.scale(2.0))
    }

    /// Converts the quaternion to a 3×3 rotation matrix (column-major).
    pub fn to_mat3(&self) -> Mat3 {
        let q = self.normalize();
        let [x, y, z, w] = q.data;
        let (xx, yy, zz) = (x * x, y * y, z * z);
        let (xy, xz, yz) = (x * y, x * z, y * z);
        let (wx, wy, wz) = (w * x, w * y, w * z);
        Mat3::new([
            1.0 - 2.0 * (yy + zz),
            2.0 * (xy + wz),
            2.0 * (xz - wy),
            2.0 * (xy - wz),
            1.0 - 2.0 * (xx + zz),
            2.0 * (yz + wx),
            2.0 * (xz + wy),
            2.0 * (yz - wx),
            1.0 - 2.0 * (xx + yy),
        ])
    }
}

impl From<[f32; 4]> for Quat {
    fn from(value: [f32; 4]) -> Self {
        Self { data: value }
    }
}
