// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use crate::math::{Mat3, Vec3};

/// World-space core geometry of a convex object (margin excluded).
#[derive(Debug, Clone, PartialEq)]
pub enum ConvexGeometry {
    /// A single point (sphere core).
    Point(Vec3),
    /// A segment (capsule core).
    Segment(Vec3, Vec3),
    /// Oriented box; `axes` columns are the box axes in world space.
    Box {
        /// Box center.
        center: Vec3,
        /// Rotation matrix of the box.
        axes: Mat3,
        /// Half extents with the margin already removed.
        half_extents: Vec3,
    },
    /// Cylinder around `axis`.
    Cylinder {
        /// Center.
        center: Vec3,
        /// Unit axis in world space.
        axis: Vec3,
        /// Reduced radius.
        radius: f32,
        /// Reduced half height.
        half_height: f32,
    },
    /// Cone with apex at `center + axis * half_height`.
    Cone {
        /// Center.
        center: Vec3,
        /// Unit axis in world space, base to apex.
        axis: Vec3,
        /// Reduced base radius.
        radius: f32,
        /// Reduced half height.
        half_height: f32,
    },
    /// Point cloud.
    Hull(Vec<Vec3>),
    /// Triangle.
    Triangle([Vec3; 3]),
}

/// Convex geometry placed in world space, as consumed by GJK, EPA and CCD.
///
/// Invariants:
/// - `outer_margin >= 0`.
/// - `support_point(d, true) == support_point(d, false) + normalize(d) * outer_margin`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvexObject {
    geometry: ConvexGeometry,
    outer_margin: f32,
}

impl ConvexObject {
    /// Wraps world-space geometry with its margin.
    pub fn new(geometry: ConvexGeometry, outer_margin: f32) -> Self {
        Self { geometry, outer_margin: outer_margin.max(0.0) }
    }

    /// Core geometry.
    pub fn geometry(&self) -> &ConvexGeometry {
        &self.geometry
    }

    /// Margin added around the core.
    pub fn outer_margin(&self) -> f32 {
        self.outer_margin
    }

    /// Farthest point of the object along `direction`.
    ///
    /// With `include_margin` the margin sphere is added along the normalised
    /// direction. A zero direction yields an arbitrary point of the core.
    pub fn support_point(&self, direction: &Vec3, include_margin: bool) -> Vec3 {
        let core = self.core_support(direction);
        if include_margin && self.outer_margin > 0.0 {
            core.add(&direction.normalize().scale(self.outer_margin))
        } else {
            core
        }
    }

    fn core_support(&self, direction: &Vec3) -> Vec3 {
        match &self.geometry {
            ConvexGeometry::Point(p) => *p,
            ConvexGeometry::Segment(a, b) => {
                if direction.dot(a) >= direction.dot(b) {
                    *a
                } else {
                    *b
                }
            }
            ConvexGeometry::Box { center, axes, half_extents } => {
                let mut result = *center;
                for i in 0..3 {
                    let axis = axes.column(i);
                    let sign = if axis.dot(direction) >= 0.0 { 1.0 } else { -1.0 };
                    result += axis.scale(sign * half_extents.component(i));
                }
                result
            }
            ConvexGeometry::Cylinder { center, axis, radius, half_height } => {
                let along = axis.dot(direction);
                let sign = if along >= 0.0 { 1.0 } else { -1.0 };
                let radial = direction.sub(&axis.scale(along)).normalize();
                center.add(&axis.scale(sign * half_height)).add(&radial.scale(*radius))
            }
            ConvexGeometry::Cone { center, axis, radius, half_height } => {
                let apex = center.add(&axis.scale(*half_height));
                let radial = direction.sub(&axis.scale(axis.dot(direction))).normalize();
                let rim = center.sub(&axis.scale(*half_height)).add(&radial.scale(*radius));
                if direction.dot(&apex) >= direction.dot(&rim) {
                    apex
                } else {
                    rim
                }
            }
            ConvexGeometry::Hull(points) => farthest(points, direction),
            ConvexGeometry::Triangle(points) => farthest(points, direction),
        }
    }

    /// Representative interior point, used to seed searches.
    pub fn center(&self) -> Vec3 {
        match &self.geometry {
            ConvexGeometry::Point(p) => *p,
            ConvexGeometry::Segment(a, b) => a.lerp(b, 0.5),
            ConvexGeometry::Box { center, .. }
            | ConvexGeometry::Cylinder { center, .. }
            | ConvexGeometry::Cone { center, .. } => *center,
            ConvexGeometry::Hull(points) => centroid(points),
            ConvexGeometry::Triangle(points) => centroid(points),
        }
    }

    /// Same object moved by `offset`.
    pub fn translated(&self, offset: &Vec3) -> Self {
        let geometry = match &self.geometry {
            ConvexGeometry::Point(p) => ConvexGeometry::Point(p.add(offset)),
            ConvexGeometry::Segment(a, b) => ConvexGeometry::Segment(a.add(offset), b.add(offset)),
            ConvexGeometry::Box { center, axes, half_extents } => ConvexGeometry::Box {
                center: center.add(offset),
                axes: *axes,
                half_extents: *half_extents,
            },
            ConvexGeometry::Cylinder { center, axis, radius, half_height } => {
                ConvexGeometry::Cylinder {
                    center: center.add(offset),
                    axis: *axis,
                    radius: *radius,
                    half_height: *half_height,
                }
            }
            ConvexGeometry::Cone { center, axis, radius, half_height } => ConvexGeometry::Cone {
                center: center.add(offset),
                axis: *axis,
                radius: *radius,
                half_height: *half_height,
            },
            ConvexGeometry::Hull(points) => {
                ConvexGeometry::Hull(points.iter().map(|p| p.add(offset)).collect())
            }
            ConvexGeometry::Triangle(points) => {
                ConvexGeometry::Triangle(points.map(|p| p.add(offset)))
            }
        };
        Self { geometry, outer_margin: self.outer_margin }
    }
}

fn farthest(points: &[Vec3], direction: &Vec3) -> Vec3 {
    let mut best = Vec3::ZERO;
    let mut best_dot = f32::NEG_INFINITY;
    for point in points {
        let dot = point.dot(direction);
        if dot > best_dot {
            best_dot = dot;
            best = *point;
        }
    }
    best
}

fn centroid(points: &[Vec3]) -> Vec3 {
    if points.is_empty() {
        return Vec3::ZERO;
    }
    let sum = points.iter().fold(Vec3::ZERO, |acc, p| acc.add(p));
    sum.scale(1.0 / points.len() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_support_picks_corner() {
        let object = ConvexObject::new(
            ConvexGeometry::Box {
                center: Vec3::new(1.0, 0.0, 0.0),
                axes: Mat3::identity(),
                half_extents: Vec3::new(0.5, 1.0, 2.0),
            },
            0.0,
        );
        let p = object.support_point(&Vec3::new(1.0, -1.0, 1.0), false);
        assert_eq!(p, Vec3::new(1.5, -1.0, 2.0));
    }

    #[test]
    fn margin_extends_along_direction() {
        let object = ConvexObject::new(ConvexGeometry::Point(Vec3::ZERO), 2.0);
        let p = object.support_point(&Vec3::new(0.0, 3.0, 0.0), true);
        assert_eq!(p, Vec3::new(0.0, 2.0, 0.0));
        assert_eq!(object.support_point(&Vec3::UNIT_Y, false), Vec3::ZERO);
    }

    #[test]
    fn cone_support_prefers_apex_upwards() {
        let object = ConvexObject::new(
            ConvexGeometry::Cone {
                center: Vec3::ZERO,
                axis: Vec3::UNIT_Y,
                radius: 1.0,
                half_height: 1.0,
            },
            0.0,
        );
        assert_eq!(object.support_point(&Vec3::UNIT_Y, false), Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(object.support_point(&Vec3::UNIT_X, false), Vec3::new(1.0, -1.0, 0.0));
    }

    #[test]
    fn translation_moves_support_and_keeps_margin() {
        let object = ConvexObject::new(ConvexGeometry::Segment(Vec3::ZERO, Vec3::UNIT_Y), 0.25);
        let moved = object.translated(&Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(moved.support_point(&Vec3::UNIT_Y, false), Vec3::new(2.0, 1.0, 0.0));
        assert_eq!(moved.outer_margin(), 0.25);
        assert_eq!(moved.center(), object.center().add(&Vec3::new(2.0, 0.0, 0.0)));
    }
}
