// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use crate::math::EPSILON;

/// 3D vector used for points, directions, velocities and inertia diagonals.
///
/// * Components are `f32` metres (or metres per second, radians per second)
///   depending on the calling context.
/// * Arithmetic goes through named methods (`add`, `sub`, `scale`); only
///   negation, scalar multiplication and the compound assignments have
///   operator forms.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Vec3 {
    data: [f32; 3],
}

impl Vec3 {
    /// The zero vector.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Vector with every component set to one.
    pub const ONE: Self = Self::new(1.0, 1.0, 1.0);

    /// Unit vector pointing along the positive X axis.
    pub const UNIT_X: Self = Self::new(1.0, 0.0, 0.0);

    /// Unit vector pointing along the positive Y axis.
    pub const UNIT_Y: Self = Self::new(0.0, 1.0, 0.0);

    /// Unit vector pointing along the positive Z axis.
    pub const UNIT_Z: Self = Self::new(0.0, 0.0, 1.0);

    /// Creates a vector from components.
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { data: [x, y, z] }
    }

    /// Creates a vector with all three components equal to `value`.
    pub const fn splat(value: f32) -> Self {
        Self::new(value, value, value)
    }

    /// Returns the components as an array.
    pub fn to_array(self) -> [f32; 3] {
        self.data
    }

    /// X component.
    pub fn x(&self) -> f32 {
        self.data[0]
    }

    /// Y component.
    pub fn y(&self) -> f32 {
        self.data[1]
    }

    /// Z component.
    pub fn z(&self) -> f32 {
        self.data[2]
    }

    /// Component by axis index (`0 = x`, `1 = y`, `2 = z`).
    ///
    /// # Panics
    /// Panics if `idx > 2`.
    pub fn component(&self, idx: usize) -> f32 {
        self.data[idx]
    }

    /// Returns a copy with the component at `idx` replaced.
    pub fn with_component(&self, idx: usize, value: f32) -> Self {
        let mut data = self.data;
        data[idx] = value;
        Self { data }
    }

    /// Adds two vectors.
    pub fn add(&self, other: &Self) -> Self {
        Self::new(
            self.data[0] + other.data[0],
            self.data[1] + other.data[1],
            self.data[2] + other.data[2],
        )
    }

    /// Subtracts another vector.
    pub fn sub(&self, other: &Self) -> Self {
        Self::new(
            self.data[0] - other.data[0],
            self.data[1] - other.data[1],
            self.data[2] - other.data[2],
        )
    }

    /// Scales the vector by a scalar.
    pub fn scale(&self, scalar: f32) -> Self {
        Self::new(
            self.data[0] * scalar,
            self.data[1] * scalar,
            self.data[2] * scalar,
        )
    }

    /// Component-wise product.
    pub fn mul_components(&self, other: &Self) -> Self {
        Self::new(
            self.data[0] * other.data[0],
            self.data[1] * other.data[1],
            self.data[2] * other.data[2],
        )
    }

    /// Component-wise minimum.
    pub fn min(&self, other: &Self) -> Self {
        Self::new(
            self.data[0].min(other.data[0]),
            self.data[1].min(other.data[1]),
            self.data[2].min(other.data[2]),
        )
    }

    /// Component-wise maximum.
    pub fn max(&self, other: &Self) -> Self {
        Self::new(
            self.data[0].max(other.data[0]),
            self.data[1].max(other.data[1]),
            self.data[2].max(other.data[2]),
        )
    }

    /// Component-wise absolute value.
    pub fn abs(&self) -> Self {
        Self::new(self.data[0].abs(), self.data[1].abs(), self.data[2].abs())
    }

    /// Smallest component.
    pub fn min_component(&self) -> f32 {
        self.data[0].min(self.data[1]).min(self.data[2])
    }

    /// Largest component.
    pub fn max_component(&self) -> f32 {
        self.data[0].max(self.data[1]).max(self.data[2])
    }

    /// Dot product with another vector.
    pub fn dot(&self, other: &Self) -> f32 {
        self.data[0] * other.data[0] + self.data[1] * other.data[1] + self.data[2] * other.data[2]
    }

    /// Cross product with another vector.
    pub fn cross(&self, other: &Self) -> Self {
        let [ax, ay, az] = self.data;
        let [bx, by, bz] = other.data;
        Self::new(ay * bz - az * by, az * bx - ax * bz, ax * by - ay * bx)
    }

    /// Vector length (magnitude).
    pub fn length(&self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Squared magnitude of the vector.
    pub fn length_squared(&self) -> f32 {
        self.dot(self)
    }

    /// Squared distance between two points.
    pub fn distance_squared(&self, other: &Self) -> f32 {
        self.sub(other).length_squared()
    }

    /// Normalises the vector, returning the zero vector if length ≤ `EPSILON`.
    ///
    /// Degenerate inputs normalise to zero so callers can detect them with
    /// [`Vec3::is_zero`] instead of propagating NaNs.
    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len <= EPSILON {
            return Self::ZERO;
        }
        self.scale(1.0 / len)
    }

    /// Returns `true` when every component is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.data == [0.0; 3]
    }

    /// Returns `true` when every component is finite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|c| c.is_finite())
    }

    /// Linear interpolation: `self` at `t = 0`, `other` at `t = 1`.
    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        self.scale(1.0 - t).add(&other.scale(t))
    }

    /// Returns a unit vector perpendicular to `self`.
    ///
    /// Picks the world axis least aligned with `self` to keep the cross
    /// product well conditioned. Returns [`Vec3::UNIT_X`] for a zero input.
    pub fn any_perpendicular(&self) -> Self {
        let abs = self.abs();
        let axis = if abs.x() <= abs.y() && abs.x() <= abs.z() {
            Self::UNIT_X
        } else if abs.y() <= abs.z() {
            Self::UNIT_Y
        } else {
            Self::UNIT_Z
        };
        let perpendicular = self.cross(&axis).normalize();
        if perpendicular.is_zero() {
            Self::UNIT_X
        } else {
            perpendicular
        }
    }
}

/// Converts a 3-element `[f32; 3]` array into a `Vec3` interpreted as `(x, y, z)`.
///
/// # Examples
/// ```
/// use echo_physics::math::Vec3;
/// let v = Vec3::from([1.0, 2.0, 3.0]);
/// assert_eq!(v.to_array(), [1.0, 2.0, 3.0]);
/// ```
impl From<[f32; 3]> for Vec3 {
    fn from(value: [f32; 3]) -> Self {
        Self { data: value }
    }
}

impl core::ops::AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Self) {
        *self = Vec3::add(self, &rhs);
    }
}

impl core::ops::SubAssign for Vec3 {
    fn sub_assign(&mut self, rhs: Self) {
        *self = Vec3::sub(self, &rhs);
    }
}

impl core::ops::Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        self.scale(-1.0)
    }
}

impl core::ops::Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        self.scale(rhs)
    }
}
