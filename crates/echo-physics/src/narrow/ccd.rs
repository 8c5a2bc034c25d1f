// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use tracing::trace;

use super::gjk::{gjk, GjkSettings};
use super::simplex::Simplex;
use crate::config::NarrowPhaseConfig;
use crate::math::{Vec3, EPSILON};
use crate::shape::ConvexObject;

/// Conservative-advancement limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CcdSettings {
    /// Iterations before giving up.
    pub max_iteration: u32,
    /// Squared distance at which the objects count as touching.
    pub termination_tolerance: f32,
}

impl From<&NarrowPhaseConfig> for CcdSettings {
    fn from(config: &NarrowPhaseConfig) -> Self {
        Self {
            max_iteration: config.gjk_continuous_collision_max_iteration,
            termination_tolerance: config.gjk_continuous_collision_termination_tolerance,
        }
    }
}

impl Default for CcdSettings {
    fn default() -> Self {
        Self::from(&NarrowPhaseConfig::default())
    }
}

/// First contact between two translating convex objects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeOfImpact {
    /// Unit contact normal pointing from B toward A.
    pub normal: Vec3,
    /// Contact point on B at the time of impact.
    pub hit_point_b: Vec3,
    /// Fraction of the motion in `[0, 1]` at which the objects touch.
    pub time: f32,
}

/// Time of impact of `a` moving by `motion_a` against `b` moving by `motion_b`.
///
/// Both objects keep their starting orientation over the motion; margins are
/// part of the swept volumes. Returns `None` when the objects already overlap
/// at the start, separate, or do not meet within the motion.
pub fn time_of_impact(
    a: &ConvexObject,
    motion_a: &Vec3,
    b: &ConvexObject,
    motion_b: &Vec3,
    settings: &CcdSettings,
) -> Option<TimeOfImpact> {
    let relative_motion = motion_a.sub(motion_b);
    let mut lambda = 0.0_f32;
    let mut normal = Vec3::ZERO;
    let mut simplex = Simplex::new();

    let initial_point = a
        .support_point(&relative_motion.scale(-1.0), true)
        .sub(&b.support_point(&relative_motion, true));
    let mut direction = initial_point.scale(-1.0);

    for iteration in 0..settings.max_iteration {
        let mut support_a = a.support_point(&direction, true).add(&motion_a.scale(lambda));
        let mut support_b =
            b.support_point(&direction.scale(-1.0), true).add(&motion_b.scale(lambda));
        let v = direction.scale(-1.0);
        let v_dot_w = v.dot(&support_a.sub(&support_b));

        if lambda > 1.0 {
            return None;
        }

        if v_dot_w > 0.0 {
            let v_dot_r = v.dot(&relative_motion);
            if v_dot_r >= -EPSILON * EPSILON {
                return None;
            }
            let advance = -v_dot_w / v_dot_r;
            lambda += advance;
            if lambda > 1.0 {
                return None;
            }
            let shift_a = motion_a.scale(advance);
            let shift_b = motion_b.scale(advance);
            support_a = support_a.add(&shift_a);
            support_b = support_b.add(&shift_b);
            simplex.shift(&shift_a, &shift_b);
            normal = v;
        }

        if !simplex.contains_point(&support_a.sub(&support_b)) {
            simplex.add_point(support_a, support_b);
        }

        let closest = simplex.closest_point_to_origin();
        direction = closest.scale(-1.0);
        if closest.length_squared() < settings.termination_tolerance {
            let normal = normal.normalize();
            if normal.is_zero() {
                return None;
            }
            trace!(iteration, time = lambda, "time of impact found");
            let hit_point_b = simplex.closest_points().1;
            return Some(TimeOfImpact { normal, hit_point_b, time: lambda });
        }
    }
    None
}

/// Recomputes the normal and hit point of `toi` from the closest points of
/// the object cores at the impact pose.
///
/// Conservative advancement stops within its tolerance of the surface, so its
/// normal can lean a little off the face. Keeps `toi` when the cores overlap
/// or the refined normal disagrees with the advancement normal.
pub fn refine_time_of_impact(
    a: &ConvexObject,
    motion_a: &Vec3,
    b: &ConvexObject,
    motion_b: &Vec3,
    toi: TimeOfImpact,
    settings: &GjkSettings,
) -> TimeOfImpact {
    let a_at_hit = a.translated(&motion_a.scale(toi.time));
    let b_at_hit = b.translated(&motion_b.scale(toi.time));
    let Some((closest_a, closest_b)) = gjk(&a_at_hit, &b_at_hit, false, settings).closest_points()
    else {
        return toi;
    };
    let normal = closest_a.sub(&closest_b).normalize();
    if normal.is_zero() || normal.dot(&toi.normal) <= 0.0 {
        return toi;
    }
    TimeOfImpact {
        normal,
        hit_point_b: closest_b.add(&normal.scale(b.outer_margin())),
        time: toi.time,
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::math::Mat3;
    use crate::shape::ConvexGeometry;

    #[test]
    fn sphere_hits_wall_half_way() {
        let sphere = ConvexObject::new(ConvexGeometry::Point(Vec3::new(-4.0, 0.0, 0.0)), 0.5);
        let wall = ConvexObject::new(
            ConvexGeometry::Box {
                center: Vec3::ZERO,
                axes: Mat3::identity(),
                half_extents: Vec3::new(0.5, 5.0, 5.0),
            },
            0.0,
        );
        let toi = time_of_impact(
            &sphere,
            &Vec3::new(6.0, 0.0, 0.0),
            &wall,
            &Vec3::ZERO,
            &CcdSettings::default(),
        )
        .expect("sphere must hit the wall");
        assert!((toi.time - 0.5).abs() < 0.01, "toi {}", toi.time);
        assert!(toi.normal.dot(&Vec3::new(-1.0, 0.0, 0.0)) > 0.99);
        assert!((toi.hit_point_b.x() + 0.5).abs() < 0.02);
    }

    #[test]
    fn receding_objects_never_hit() {
        let sphere = ConvexObject::new(ConvexGeometry::Point(Vec3::new(-4.0, 0.0, 0.0)), 0.5);
        let other = ConvexObject::new(ConvexGeometry::Point(Vec3::ZERO), 0.5);
        let motion = Vec3::new(-3.0, 0.0, 0.0);
        assert!(
            time_of_impact(&sphere, &motion, &other, &Vec3::ZERO, &CcdSettings::default())
                .is_none()
        );
    }

    #[test]
    fn refined_normal_is_the_face_normal() {
        let bullet = ConvexObject::new(ConvexGeometry::Point(Vec3::ZERO), 0.1);
        let wall = ConvexObject::new(
            ConvexGeometry::Box {
                center: Vec3::new(3.0, 0.0, 0.0),
                axes: Mat3::identity(),
                half_extents: Vec3::new(0.05, 2.0, 2.0),
            },
            0.0,
        );
        let motion = Vec3::new(5.0, 0.0, 0.0);
        let toi = time_of_impact(&bullet, &motion, &wall, &Vec3::ZERO, &CcdSettings::default())
            .expect("bullet must hit the wall");
        let settings = GjkSettings::default();
        let refined = refine_time_of_impact(&bullet, &motion, &wall, &Vec3::ZERO, toi, &settings);

        assert_eq!(refined.time, toi.time);
        assert!((refined.normal.x() + 1.0).abs() < 1.0e-5, "normal {:?}", refined.normal);
        assert!(refined.normal.y().abs() < 1.0e-4 && refined.normal.z().abs() < 1.0e-4);
        assert!((refined.hit_point_b.x() - 2.95).abs() < 1.0e-4, "{:?}", refined.hit_point_b);
    }
}
