// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use crate::math::Vec3;

/// Finite ray expressed as the segment `from → to`.
///
/// Hit fractions reported by ray queries are in `[0, 1]` along this segment.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    from: Vec3,
    to: Vec3,
}

impl Ray {
    /// Creates a ray segment.
    #[must_use]
    pub const fn new(from: Vec3, to: Vec3) -> Self {
        Self { from, to }
    }

    /// Start point.
    #[must_use]
    pub fn from(&self) -> Vec3 {
        self.from
    }

    /// End point.
    #[must_use]
    pub fn to(&self) -> Vec3 {
        self.to
    }

    /// Segment length.
    #[must_use]
    pub fn length(&self) -> f32 {
        self.to.sub(&self.from).length()
    }

    /// Point at fraction `t` of the segment.
    #[must_use]
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.from.lerp(&self.to, t)
    }
}
