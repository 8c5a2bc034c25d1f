// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
//! GJK, EPA, time of impact and the persistent contact manifold.

use proptest::prelude::*;
use proptest::test_runner::{Config as PropConfig, RngAlgorithm, TestRng, TestRunner};

use echo_physics::body::BodyId;
use echo_physics::math::Vec3;
use echo_physics::narrow::{
    epa, gjk, time_of_impact, CcdSettings, EpaResult, EpaSettings, GjkResult, GjkSettings,
    ManifoldResult, MAX_MANIFOLD_POINTS,
};
use echo_physics::shape::{CollisionShape, ConvexObject};
use echo_physics::types::transform::PhysicsTransform;

fn convex(shape: &CollisionShape, position: Vec3) -> ConvexObject {
    shape.convex_object(&PhysicsTransform::from_position(position)).expect("convex shape")
}

fn approx(a: f32, b: f32, eps: f32) -> bool {
    (a - b).abs() <= eps
}

#[test]
fn gjk_reports_distance_between_separated_spheres() {
    let sphere = CollisionShape::sphere(0.5).expect("valid sphere");
    let a = convex(&sphere, Vec3::ZERO);
    let b = convex(&sphere, Vec3::new(3.0, 0.0, 0.0));

    let with_margin = gjk(&a, &b, true, &GjkSettings::default());
    let GjkResult::NoCollide { distance, .. } = with_margin else {
        panic!("expected separated spheres, got {with_margin:?}");
    };
    assert!(approx(distance, 2.0, 1.0e-3), "distance {distance}");

    // Without margins only the two centre points remain.
    let GjkResult::NoCollide { distance, .. } = gjk(&a, &b, false, &GjkSettings::default()) else {
        panic!("expected separated cores");
    };
    assert!(approx(distance, 3.0, 1.0e-3), "distance {distance}");
}

#[test]
fn gjk_closest_points_lie_on_the_boxes() {
    let cube = CollisionShape::cuboid(Vec3::splat(0.5)).expect("valid cube");
    let a = convex(&cube, Vec3::ZERO);
    let b = convex(&cube, Vec3::new(0.0, 2.0, 0.0));
    let result = gjk(&a, &b, true, &GjkSettings::default());
    let (on_a, on_b) = result.closest_points().expect("separated boxes");
    assert!(approx(on_a.y(), 0.5, 1.0e-3), "{on_a:?}");
    assert!(approx(on_b.y(), 1.5, 1.0e-3), "{on_b:?}");
}

#[test]
fn epa_measures_box_penetration() {
    let cube = CollisionShape::cuboid(Vec3::splat(0.5)).expect("valid cube");
    let a = convex(&cube, Vec3::ZERO);
    let b = convex(&cube, Vec3::new(0.0, 0.8, 0.0));

    let simplex = gjk(&a, &b, true, &GjkSettings::default());
    assert!(simplex.is_collide());
    let EpaResult::Collide { contact_a, contact_b, normal, penetration_depth } =
        epa(&a, &b, true, &simplex, &EpaSettings::default())
    else {
        panic!("expected penetration");
    };
    assert!(approx(penetration_depth, 0.2, 0.01), "depth {penetration_depth}");
    // Normal points from A toward B.
    assert!(normal.y() > 0.99, "normal {normal:?}");
    let gap = contact_a.sub(&contact_b);
    assert!(gap.sub(&normal.scale(penetration_depth)).length() < 0.01);
}

#[test]
fn epa_passes_through_non_colliding_results() {
    let sphere = CollisionShape::sphere(0.5).expect("valid sphere");
    let a = convex(&sphere, Vec3::ZERO);
    let b = convex(&sphere, Vec3::new(5.0, 0.0, 0.0));
    let result = gjk(&a, &b, true, &GjkSettings::default());
    assert_eq!(epa(&a, &b, true, &result, &EpaSettings::default()), EpaResult::NoCollide);
    assert_eq!(epa(&a, &b, true, &GjkResult::Invalid, &EpaSettings::default()), EpaResult::Invalid);
}

#[test]
fn time_of_impact_finds_first_contact_along_the_motion() {
    let sphere = CollisionShape::sphere(0.5).expect("valid sphere");
    let wall = CollisionShape::cuboid(Vec3::new(0.5, 5.0, 5.0)).expect("valid wall");
    let a = convex(&sphere, Vec3::ZERO);
    let b = convex(&wall, Vec3::new(5.0, 0.0, 0.0));

    let motion = Vec3::new(10.0, 0.0, 0.0);
    let toi = time_of_impact(&a, &motion, &b, &Vec3::ZERO, &CcdSettings::default())
        .expect("sphere reaches the wall");
    // Surfaces meet after 4 of the 10 metres.
    assert!(approx(toi.time, 0.4, 0.01), "time {}", toi.time);
    // Normal points from the wall back toward the sphere.
    assert!(toi.normal.x() < -0.99, "normal {:?}", toi.normal);
    assert!(approx(toi.hit_point_b.x(), 4.5, 0.02), "hit {:?}", toi.hit_point_b);
}

#[test]
fn time_of_impact_misses_when_moving_away_or_short() {
    let sphere = CollisionShape::sphere(0.5).expect("valid sphere");
    let a = convex(&sphere, Vec3::ZERO);
    let b = convex(&sphere, Vec3::new(5.0, 0.0, 0.0));
    let settings = CcdSettings::default();
    assert!(time_of_impact(&a, &Vec3::new(-10.0, 0.0, 0.0), &b, &Vec3::ZERO, &settings).is_none());
    assert!(time_of_impact(&a, &Vec3::new(1.0, 0.0, 0.0), &b, &Vec3::ZERO, &settings).is_none());
}

fn manifold(threshold: f32) -> ManifoldResult {
    ManifoldResult::new(
        BodyId::from_raw(1),
        BodyId::from_raw(2),
        PhysicsTransform::identity(),
        PhysicsTransform::identity(),
        threshold,
    )
}

#[test]
fn nearby_contact_replaces_the_existing_point() {
    let mut result = manifold(0.02);
    result.add_contact_point(Vec3::UNIT_Y, Vec3::new(0.0, 0.0, 0.0), -0.01, false);
    result.add_contact_point(Vec3::UNIT_Y, Vec3::new(0.005, 0.0, 0.0), -0.02, false);
    assert_eq!(result.len(), 1);
    assert_eq!(result.points()[0].depth(), -0.02);

    result.add_contact_point(Vec3::UNIT_Y, Vec3::new(1.0, 0.0, 0.0), -0.01, false);
    assert_eq!(result.len(), 2);
}

#[test]
fn contact_point_sides_follow_the_normal() {
    let mut result = manifold(0.02);
    result.add_contact_point(Vec3::UNIT_Y, Vec3::new(0.0, 1.0, 0.0), -0.1, false);
    let point = &result.points()[0];
    // Penetrating: the point on 1 sits below the point on 2 along the normal.
    assert!(approx(point.point_on_1().y(), 0.9, 1.0e-6));
    assert_eq!(point.normal_from_2(), Vec3::UNIT_Y);
    assert!(!point.is_predictive());
}

#[test]
fn full_manifold_keeps_the_deepest_point_and_maximises_area() {
    let mut result = manifold(0.02);
    let corners = [
        Vec3::new(-1.0, 0.0, -1.0),
        Vec3::new(1.0, 0.0, -1.0),
        Vec3::new(1.0, 0.0, 1.0),
        Vec3::new(0.1, 0.0, 0.1),
    ];
    for (i, corner) in corners.iter().enumerate() {
        result.add_contact_point(Vec3::UNIT_Y, *corner, -0.01 * (i as f32 + 1.0), false);
    }
    assert_eq!(result.len(), MAX_MANIFOLD_POINTS);

    // The inner point (also the deepest) stays; the new corner enlarges the area.
    result.add_contact_point(Vec3::UNIT_Y, Vec3::new(-1.0, 0.0, 1.0), -0.001, false);
    assert_eq!(result.len(), MAX_MANIFOLD_POINTS);
    let kept: Vec<Vec3> = result.points().iter().map(|p| p.point_on_2()).collect();
    assert!(kept.contains(&Vec3::new(0.1, 0.0, 0.1)));
    assert!(kept.contains(&Vec3::new(-1.0, 0.0, 1.0)));
}

#[test]
fn refresh_drops_separated_and_slid_points() {
    let mut result = manifold(0.02);
    result.add_contact_point(Vec3::UNIT_Y, Vec3::new(0.0, 0.0, 0.0), -0.01, false);
    result.add_contact_point(Vec3::UNIT_Y, Vec3::new(1.0, 0.0, 0.0), -0.01, false);

    // Body 1 lifts away by more than the threshold.
    let lifted = PhysicsTransform::from_position(Vec3::new(0.0, 0.5, 0.0));
    result.refresh(lifted, PhysicsTransform::identity());
    assert!(result.is_empty());

    let mut result = manifold(0.02);
    result.add_contact_point(Vec3::UNIT_Y, Vec3::new(0.0, 0.0, 0.0), -0.01, false);
    // Body 1 slides sideways along the contact plane.
    let slid = PhysicsTransform::from_position(Vec3::new(0.3, 0.0, 0.0));
    result.refresh(slid, PhysicsTransform::identity());
    assert!(result.is_empty());

    let mut result = manifold(0.02);
    result.add_contact_point(Vec3::UNIT_Y, Vec3::new(0.0, 0.0, 0.0), -0.01, false);
    let sunk = PhysicsTransform::from_position(Vec3::new(0.0, -0.005, 0.0));
    result.refresh(sunk, PhysicsTransform::identity());
    assert_eq!(result.len(), 1);
    assert!(approx(result.points()[0].depth(), -0.015, 1.0e-5));
}

#[test]
fn proptest_seed_pinned_manifold_bounded_and_keeps_deepest() {
    const SEED_BYTES: [u8; 32] = [
        0x4d, 0x46, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        0, 0, 0,
    ];
    let rng = TestRng::from_seed(RngAlgorithm::ChaCha, &SEED_BYTES);
    let mut runner = TestRunner::new_with_rng(PropConfig::default(), rng);

    // Grid points one metre apart never merge under a 2 cm threshold.
    let contact = ((-5_i32..5, -5_i32..5), -0.05_f32..0.0);
    let strategy = prop::collection::vec(contact, 1..16);

    runner
        .run(&strategy, |contacts| {
            let mut result = manifold(0.02);
            let mut seen: Vec<(i32, i32)> = Vec::new();
            let mut deepest = f32::MAX;
            for ((x, z), depth) in contacts {
                if seen.contains(&(x, z)) {
                    continue;
                }
                seen.push((x, z));
                deepest = deepest.min(depth);
                let point = Vec3::new(x as f32, 0.0, z as f32);
                result.add_contact_point(Vec3::UNIT_Y, point, depth, false);
                prop_assert!(result.len() <= MAX_MANIFOLD_POINTS);
            }
            prop_assert_eq!(result.len(), seen.len().min(MAX_MANIFOLD_POINTS));
            let kept_deepest = result.points().iter().map(|p| p.depth()).fold(f32::MAX, f32::min);
            prop_assert_eq!(kept_deepest, deepest);
            Ok(())
        })
        .expect("manifold invariants hold");
}
