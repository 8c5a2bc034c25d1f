// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use crate::math::{Mat3, Vec3};
use crate::types::ray::Ray;

/// Axis-aligned bounding box in world coordinates.
///
/// Invariants:
/// - `min` components are less than or equal to `max` components.
/// - Values are `f32` and represent meters in world space.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    min: Vec3,
    max: Vec3,
}

impl Aabb {
    /// Constructs an AABB from its minimum and maximum corners.
    ///
    /// # Panics
    /// Panics if any component of `min` is greater than its counterpart in `max`.
    #[must_use]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        let a = min.to_array();
        let b = max.to_array();
        assert!(a[0] <= b[0] && a[1] <= b[1] && a[2] <= b[2], "invalid AABB: min > max");
        Self { min, max }
    }

    /// Returns the minimum corner.
    #[must_use]
    pub fn min(&self) -> Vec3 {
        self.min
    }

    /// Returns the maximum corner.
    #[must_use]
    pub fn max(&self) -> Vec3 {
        self.max
    }

    /// Center of the box.
    #[must_use]
    pub fn center(&self) -> Vec3 {
        self.min.add(&self.max).scale(0.5)
    }

    /// Half extents along each axis.
    #[must_use]
    pub fn half_extents(&self) -> Vec3 {
        self.max.sub(&self.min).scale(0.5)
    }

    /// Builds an AABB centered at `center` with the given half extents.
    #[must_use]
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        let he = half_extents.abs();
        Self { min: center.sub(&he), max: center.add(&he) }
    }

    /// Bounds a box of `local_half_extents` rotated by `orientation` and
    /// centered at `center`.
    #[must_use]
    pub fn from_oriented_box(center: Vec3, local_half_extents: Vec3, orientation: &Mat3) -> Self {
        let extent = orientation.abs().mul_vec(&local_half_extents);
        Self::from_center_half_extents(center, extent)
    }

    /// Returns `true` if this AABB overlaps another (inclusive on faces).
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        let a_min = self.min.to_array();
        let a_max = self.max.to_array();
        let b_min = other.min.to_array();
        let b_max = other.max.to_array();
        // Inclusive to treat touching faces as overlap for broad-phase pairing.
        !(a_max[0] < b_min[0]
            || a_min[0] > b_max[0]
            || a_max[1] < b_min[1]
            || a_min[1] > b_max[1]
            || a_max[2] < b_min[2]
            || a_min[2] > b_max[2])
    }

    /// Returns `true` if `other` lies entirely inside this box.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        let a_min = self.min.to_array();
        let a_max = self.max.to_array();
        let b_min = other.min.to_array();
        let b_max = other.max.to_array();
        (0..3).all(|i| a_min[i] <= b_min[i] && b_max[i] <= a_max[i])
    }

    /// Returns the union of two AABBs.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self { min: self.min.min(&other.min), max: self.max.max(&other.max) }
    }

    /// Inflates the box by a uniform margin `m` in all directions.
    #[must_use]
    pub fn inflate(&self, m: f32) -> Self {
        let delta = Vec3::splat(m);
        Self { min: self.min.sub(&delta), max: self.max.add(&delta) }
    }

    /// Moves the box by `offset`.
    #[must_use]
    pub fn translated(&self, offset: &Vec3) -> Self {
        Self { min: self.min.add(offset), max: self.max.add(offset) }
    }

    /// Surface area; used as the insertion cost of the dynamic AABB tree.
    #[must_use]
    pub fn surface_area(&self) -> f32 {
        let d = self.max.sub(&self.min);
        2.0 * (d.x() * d.y() + d.y() * d.z() + d.z() * d.x())
    }

    /// Slab test of the ray segment against the box.
    ///
    /// Returns `true` when some point of the segment `[from, to]` lies in the
    /// box (inclusive). Axis-parallel rays are handled without dividing by zero.
    #[must_use]
    pub fn intersects_ray(&self, ray: &Ray) -> bool {
        let origin = ray.from();
        let delta = ray.to().sub(&origin);
        let mut t_min = 0.0_f32;
        let mut t_max = 1.0_f32;
        for axis in 0..3 {
            let o = origin.component(axis);
            let d = delta.component(axis);
            let lo = self.min.component(axis);
            let hi = self.max.component(axis);
            if d.abs() <= f32::EPSILON {
                if o < lo || o > hi {
                    return false;
                }
                continue;
            }
            let inv = 1.0 / d;
            let (t1, t2) = ((lo - o) * inv, (hi - o) * inv);
            t_min = t_min.max(t1.min(t2));
            t_max = t_max.min(t1.max(t2));
            if t_min > t_max {
                return false;
            }
        }
        true
    }

    /// Builds the minimal AABB that contains all `points`.
    ///
    /// Returns `None` when `points` is empty.
    #[must_use]
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut min = *first;
        let mut max = *first;
        for p in rest {
            min = min.min(p);
            max = max.max(p);
        }
        Some(Self { min, max })
    }
}
