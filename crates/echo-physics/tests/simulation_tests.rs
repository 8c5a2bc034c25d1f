// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
//! End-to-end steps of the single-threaded simulation: contacts, solver,
//! sleeping, CCD, ghosts, queries and hooks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use echo_physics::body::GhostBody;
use echo_physics::config::BroadPhaseKind;
use echo_physics::math::Vec3;
use echo_physics::shape::CollisionShape;
use echo_physics::types::transform::PhysicsTransform;
use echo_physics::{PhysicsConfig, PhysicsError, Processable, RigidBody, Simulation};

const DT: f32 = 1.0 / 60.0;
const GRAVITY: Vec3 = Vec3::new(0.0, -9.81, 0.0);

fn sphere(radius: f32, position: Vec3, mass: f32) -> Arc<RigidBody> {
    let shape = Arc::new(CollisionShape::sphere(radius).expect("valid sphere"));
    let body = Arc::new(RigidBody::new(shape, PhysicsTransform::from_position(position)));
    body.set_mass(mass).expect("valid mass");
    body
}

fn cuboid(half_extents: Vec3, position: Vec3, mass: f32) -> Arc<RigidBody> {
    let shape = Arc::new(CollisionShape::cuboid(half_extents).expect("valid box"));
    let body = Arc::new(RigidBody::new(shape, PhysicsTransform::from_position(position)));
    body.set_mass(mass).expect("valid mass");
    body
}

fn ground() -> Arc<RigidBody> {
    cuboid(Vec3::new(10.0, 0.5, 10.0), Vec3::new(0.0, -0.5, 0.0), 0.0)
}

fn configs() -> Vec<PhysicsConfig> {
    let sweep_and_prune = PhysicsConfig::default();
    let mut tree = PhysicsConfig::default();
    tree.broad_phase.kind = BroadPhaseKind::AabbTree;
    vec![sweep_and_prune, tree]
}

fn run(simulation: &mut Simulation, steps: usize, gravity: Vec3) {
    for _ in 0..steps {
        simulation.step(DT, gravity).expect("step succeeds");
    }
}

#[test]
fn overlapping_spheres_report_negative_depth_and_normal_toward_body1() {
    let mut simulation = Simulation::new(&PhysicsConfig::default()).expect("simulation");
    let left = sphere(0.5, Vec3::ZERO, 1.0);
    let right = sphere(0.5, Vec3::new(0.9, 0.0, 0.0), 1.0);
    simulation.add_body(Arc::clone(&left));
    simulation.add_body(Arc::clone(&right));
    let summary = simulation.step(DT, Vec3::ZERO).expect("step");
    assert_eq!(summary.manifolds, 1);
    assert_eq!(summary.contacts, 1);

    let manifold = &simulation.manifolds()[0];
    let point = &manifold.points()[0];
    assert!((point.depth() + 0.1).abs() < 1.0e-4, "depth {}", point.depth());
    let (transform1, transform2) = manifold.body_transforms();
    let from_2_to_1 = transform1.position().sub(&transform2.position());
    assert!(point.normal_from_2().dot(&from_2_to_1) > 0.0);
    assert!(point.accumulated_impulse().normal > 0.0);

    // The solver pushed the spheres apart.
    assert!(left.linear_velocity().x() < 0.0);
    assert!(right.linear_velocity().x() > 0.0);
}

#[test]
fn inelastic_head_on_collision_stops_the_approach() {
    for config in configs() {
        let mut simulation = Simulation::new(&config).expect("simulation");
        let left = sphere(0.5, Vec3::new(-0.5025, 0.0, 0.0), 1.0);
        let right = sphere(0.5, Vec3::new(0.5025, 0.0, 0.0), 1.0);
        for (body, speed) in [(&left, 0.3), (&right, -0.3)] {
            body.set_restitution(0.0);
            body.set_linear_velocity(Vec3::new(speed, 0.0, 0.0));
            simulation.add_body(Arc::clone(body));
        }
        run(&mut simulation, 30, Vec3::ZERO);

        let v_left = left.linear_velocity().x();
        let v_right = right.linear_velocity().x();
        assert!((v_left + v_right).abs() < 1.0e-3, "momentum {v_left} + {v_right}");
        assert!(v_left.abs() < 0.1, "left still moving at {v_left}");
        assert!(v_right >= v_left, "bodies still approaching");
        let gap = right.transform().position().x() - left.transform().position().x() - 1.0;
        assert!(gap > -0.02, "penetration {gap}");
    }
}

#[test]
fn inelastic_collision_at_speed_leaves_no_rebound() {
    for config in configs() {
        for speed in [3.0, 10.0] {
            let mut simulation = Simulation::new(&config).expect("simulation");
            let left = sphere(0.5, Vec3::new(-0.6, 0.0, 0.0), 1.0);
            let right = sphere(0.5, Vec3::new(0.6, 0.0, 0.0), 1.0);
            for (body, velocity) in [(&left, speed), (&right, -speed)] {
                body.set_restitution(0.0);
                body.set_linear_velocity(Vec3::new(velocity, 0.0, 0.0));
                simulation.add_body(Arc::clone(body));
            }
            run(&mut simulation, 40, Vec3::ZERO);

            let (v_left, v_right) = (left.linear_velocity().x(), right.linear_velocity().x());
            assert!(v_left.abs() < 0.05, "left leaves at {v_left} after a {speed} m/s hit");
            assert!(v_right.abs() < 0.05, "right leaves at {v_right} after a {speed} m/s hit");
            let gap = right.transform().position().x() - left.transform().position().x() - 1.0;
            assert!(gap > -0.02, "penetration {gap} after a {speed} m/s hit");
        }
    }
}

#[test]
fn elastic_head_on_collision_swaps_velocities() {
    for config in configs() {
        let mut simulation = Simulation::new(&config).expect("simulation");
        let left = sphere(0.5, Vec3::new(-0.51, 0.0, 0.0), 1.0);
        let right = sphere(0.5, Vec3::new(0.51, 0.0, 0.0), 1.0);
        for (body, speed) in [(&left, 1.0), (&right, -1.0)] {
            body.set_restitution(1.0);
            body.set_linear_velocity(Vec3::new(speed, 0.0, 0.0));
            simulation.add_body(Arc::clone(body));
        }
        run(&mut simulation, 20, Vec3::ZERO);

        let (left_velocity, right_velocity) = (left.linear_velocity(), right.linear_velocity());
        assert!((left_velocity.x() + 1.0).abs() < 0.1, "left {left_velocity:?}");
        assert!((right_velocity.x() - 1.0).abs() < 0.1, "right {right_velocity:?}");
    }
}

#[test]
fn resting_sphere_falls_asleep_and_wakes_on_demand() {
    let mut simulation = Simulation::new(&PhysicsConfig::default()).expect("simulation");
    let floor = ground();
    let ball = sphere(0.5, Vec3::new(0.0, 0.6, 0.0), 1.0);
    simulation.add_body(Arc::clone(&floor));
    simulation.add_body(Arc::clone(&ball));

    let mut slept = false;
    for _ in 0..600 {
        let summary = simulation.step(DT, GRAVITY).expect("step");
        if summary.sleeping_islands > 0 {
            slept = true;
            break;
        }
    }
    assert!(slept, "sphere never fell asleep");
    assert!(!ball.is_active());
    assert_eq!(ball.linear_velocity(), Vec3::ZERO);
    let y = ball.transform().position().y();
    assert!((y - 0.5).abs() < 0.05, "resting height {y}");

    // Asleep bodies stay put.
    run(&mut simulation, 10, GRAVITY);
    assert!(!ball.is_active());
    assert_eq!(ball.transform().position().y(), y);

    ball.set_linear_velocity(Vec3::new(0.0, 2.0, 0.0));
    simulation.step(DT, GRAVITY).expect("step");
    assert!(ball.is_active());
    assert!(ball.transform().position().y() > y);
}

#[test]
fn falling_body_never_sleeps_in_mid_air() {
    let mut simulation = Simulation::new(&PhysicsConfig::default()).expect("simulation");
    let ball = sphere(0.5, Vec3::new(0.0, 100.0, 0.0), 1.0);
    simulation.add_body(Arc::clone(&ball));
    // Below the speed thresholds for the first steps, but touching no static body.
    for _ in 0..5 {
        let summary = simulation.step(DT, GRAVITY).expect("step");
        assert_eq!(summary.sleeping_islands, 0);
    }
    assert!(ball.is_active());
}

#[test]
fn box_settles_on_ground_with_a_multi_point_manifold() {
    let mut simulation = Simulation::new(&PhysicsConfig::default()).expect("simulation");
    let floor = ground();
    let crate_box = cuboid(Vec3::splat(0.5), Vec3::new(0.0, 0.52, 0.0), 1.0);
    simulation.add_body(Arc::clone(&floor));
    simulation.add_body(Arc::clone(&crate_box));

    let mut most_points = 0;
    let mut asleep_at = None;
    for _ in 0..120 {
        let summary = simulation.step(DT, GRAVITY).expect("step");
        most_points = simulation.manifolds().iter().map(|m| m.len()).fold(most_points, usize::max);
        if asleep_at.is_none() && summary.sleeping_islands > 0 {
            asleep_at = Some(summary.step);
        }
    }
    assert!(most_points >= 3, "manifold peaked at {most_points} points");
    let y = crate_box.transform().position().y();
    assert!((0.4..0.6).contains(&y), "box height {y}");
    assert!(asleep_at.is_some_and(|step| step <= 100), "box asleep at {asleep_at:?}");
    assert!(!crate_box.is_active());
    assert!(crate_box.linear_velocity().length() < 1.0e-3, "{:?}", crate_box.linear_velocity());
    assert!(crate_box.angular_velocity().length() < 1.0e-3, "{:?}", crate_box.angular_velocity());
}

#[test]
fn fast_sphere_does_not_tunnel_through_a_thin_wall() {
    let mut simulation = Simulation::new(&PhysicsConfig::default()).expect("simulation");
    let wall = cuboid(Vec3::new(0.05, 2.0, 2.0), Vec3::new(3.0, 0.0, 0.0), 0.0);
    let bullet = sphere(0.1, Vec3::ZERO, 1.0);
    bullet.set_linear_velocity(Vec3::new(75.0, 0.0, 0.0));
    simulation.add_body(Arc::clone(&wall));
    simulation.add_body(Arc::clone(&bullet));

    run(&mut simulation, 30, Vec3::ZERO);
    let x = bullet.transform().position().x();
    assert!(x < 2.95, "bullet passed the wall: x = {x}");
}

#[test]
fn stopped_bullet_keeps_no_sideways_speed() {
    let mut simulation = Simulation::new(&PhysicsConfig::default()).expect("simulation");
    let wall = cuboid(Vec3::new(0.05, 2.0, 2.0), Vec3::new(3.0, 0.0, 0.0), 0.0);
    let bullet = sphere(0.1, Vec3::ZERO, 1.0);
    bullet.set_linear_velocity(Vec3::new(300.0, 0.0, 0.0));
    simulation.add_body(Arc::clone(&wall));
    simulation.add_body(Arc::clone(&bullet));

    for _ in 0..10 {
        simulation.step(DT, Vec3::ZERO).expect("step");
        let position = bullet.transform().position();
        let velocity = bullet.linear_velocity();
        assert!(position.x() < 2.95, "bullet passed the wall: {position:?}");
        let sideways = Vec3::new(0.0, velocity.y(), velocity.z()).length();
        assert!(sideways < 0.01, "sideways speed {sideways} ({velocity:?})");
    }
}

#[test]
fn ghost_reports_overlaps_without_pushing() {
    let mut simulation = Simulation::new(&PhysicsConfig::default()).expect("simulation");
    let trigger_shape = Arc::new(CollisionShape::sphere(1.0).expect("valid sphere"));
    let trigger = Arc::new(GhostBody::new(trigger_shape, PhysicsTransform::identity()));
    let ball = sphere(0.5, Vec3::new(0.5, 0.0, 0.0), 1.0);
    let outsider = sphere(0.5, Vec3::new(10.0, 0.0, 0.0), 1.0);
    simulation.add_body(Arc::clone(&trigger));
    simulation.add_body(Arc::clone(&ball));
    simulation.add_body(Arc::clone(&outsider));

    let summary = simulation.step(DT, Vec3::ZERO).expect("step");
    assert_eq!(trigger.overlapping_bodies(), vec![ball.id()]);
    let contacts = trigger.contacts();
    assert_eq!(contacts.len(), 1);
    assert!(contacts[0].points().iter().any(|point| point.depth() < 0.0));
    assert_eq!(summary.manifolds, 0);
    assert_eq!(ball.linear_velocity(), Vec3::ZERO);

    simulation.remove_body(ball.id()).expect("registered body");
    simulation.step(DT, Vec3::ZERO).expect("step");
    assert!(trigger.overlapping_bodies().is_empty());
    assert!(trigger.contacts().is_empty());
    assert!(simulation.body(ball.id()).is_none());
    assert!(simulation.broad_phase().pairs().partners_of(ball.id()).is_empty());
}

#[test]
fn removing_an_unknown_body_is_an_error() {
    let mut simulation = Simulation::new(&PhysicsConfig::default()).expect("simulation");
    let ball = sphere(0.5, Vec3::ZERO, 1.0);
    let stranger = sphere(0.5, Vec3::ZERO, 1.0);
    assert!(matches!(simulation.remove_body(stranger.id()), Err(PhysicsError::UnknownBody(_))));

    // Queued additions can be withdrawn before they are applied.
    simulation.add_body(Arc::clone(&ball));
    simulation.remove_body(ball.id()).expect("queued body");
    let err = simulation.remove_body(ball.id()).expect_err("removal already queued");
    assert!(matches!(err, PhysicsError::UnknownBody(id) if id == ball.id()), "{err}");

    let summary = simulation.step(DT, Vec3::ZERO).expect("step");
    assert_eq!(summary.bodies, 0);
}

#[test]
fn ray_test_returns_hits_nearest_first() {
    let mut simulation = Simulation::new(&PhysicsConfig::default()).expect("simulation");
    let far = sphere(0.5, Vec3::new(5.0, 0.0, 0.0), 0.0);
    let near = cuboid(Vec3::splat(0.5), Vec3::new(2.0, 0.0, 0.0), 0.0);
    let trigger = Arc::new(GhostBody::new(
        Arc::new(CollisionShape::sphere(0.5).expect("valid sphere")),
        PhysicsTransform::from_position(Vec3::new(-2.0, 0.0, 0.0)),
    ));
    simulation.add_body(Arc::clone(&far));
    simulation.add_body(Arc::clone(&near));
    simulation.add_body(Arc::clone(&trigger));
    simulation.step(DT, Vec3::ZERO).expect("step");

    let hits = simulation.ray_test(Vec3::new(-10.0, 0.0, 0.0), Vec3::new(10.0, 0.0, 0.0));
    let bodies: Vec<_> = hits.iter().map(|hit| hit.body).collect();
    assert_eq!(bodies, vec![near.id(), far.id()]);
    let first = &hits[0];
    assert!((first.hit_point.x() - 1.5).abs() < 0.02, "hit {:?}", first.hit_point);
    assert!(first.normal.x() < -0.9, "normal {:?}", first.normal);
    assert!((first.time_to_hit - 11.5 / 20.0).abs() < 0.01);

    assert!(simulation.ray_test(Vec3::ZERO, Vec3::ZERO).is_empty());
}

#[test]
fn body_below_world_boundary_becomes_static() {
    let mut config = PhysicsConfig::default();
    config.broad_phase.world_min_y = -10.0;
    let mut simulation = Simulation::new(&config).expect("simulation");
    let ball = sphere(0.5, Vec3::new(0.0, -20.0, 0.0), 1.0);
    simulation.add_body(Arc::clone(&ball));
    simulation.step(DT, GRAVITY).expect("step");
    run(&mut simulation, 1, GRAVITY);
    assert!(ball.is_static());
    assert!(!ball.is_active());
}

#[derive(Debug, Default)]
struct Counter {
    setups: Arc<AtomicUsize>,
    processes: Arc<AtomicUsize>,
}

impl Processable for Counter {
    fn setup(&mut self, _dt: f32, _gravity: &Vec3) {
        self.setups.fetch_add(1, Ordering::SeqCst);
    }

    fn process(&mut self, _dt: f32, _gravity: &Vec3) -> echo_physics::Result<()> {
        self.processes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Failing;

impl Processable for Failing {
    fn process(&mut self, _dt: f32, _gravity: &Vec3) -> echo_physics::Result<()> {
        Err(PhysicsError::SimulationFailed("controller lost its body".into()))
    }
}

#[test]
fn processables_run_around_every_step() {
    let mut simulation = Simulation::new(&PhysicsConfig::default()).expect("simulation");
    let counter = Counter::default();
    let (setups, processes) = (Arc::clone(&counter.setups), Arc::clone(&counter.processes));
    simulation.add_processable(Box::new(counter));
    run(&mut simulation, 3, GRAVITY);
    assert_eq!(setups.load(Ordering::SeqCst), 3);
    assert_eq!(processes.load(Ordering::SeqCst), 3);
    assert_eq!(simulation.step_count(), 3);

    simulation.add_processable(Box::new(Failing));
    let err = simulation.step(DT, GRAVITY).expect_err("failing hook aborts the step");
    assert!(matches!(err, PhysicsError::SimulationFailed(_)), "{err}");
}

/// Turns a static body dynamic from inside the step it is simulated in.
struct LateMass {
    body: Arc<RigidBody>,
    steps: usize,
}

impl Processable for LateMass {
    fn process(&mut self, _dt: f32, _gravity: &Vec3) -> echo_physics::Result<()> {
        self.steps += 1;
        if self.steps == 2 {
            self.body.set_mass(2.0)?;
        }
        Ok(())
    }
}

#[test]
fn mass_set_during_a_step_survives_publication() {
    let mut simulation = Simulation::new(&PhysicsConfig::default()).expect("simulation");
    let crate_box = cuboid(Vec3::splat(0.5), Vec3::new(0.0, 5.0, 0.0), 0.0);
    simulation.add_body(Arc::clone(&crate_box));
    simulation.add_processable(Box::new(LateMass { body: Arc::clone(&crate_box), steps: 0 }));

    run(&mut simulation, 2, GRAVITY);
    assert_eq!(crate_box.mass(), 2.0);
    assert!(!crate_box.is_static());
    assert!(crate_box.is_active());

    run(&mut simulation, 10, GRAVITY);
    assert_eq!(crate_box.mass(), 2.0);
    assert!(crate_box.transform().position().y() < 5.0, "{:?}", crate_box.transform());
}

#[test]
fn active_body_moves_only_by_teleport() {
    let mut simulation = Simulation::new(&PhysicsConfig::default()).expect("simulation");
    let ball = sphere(0.5, Vec3::ZERO, 1.0);
    let target = PhysicsTransform::from_position(Vec3::new(4.0, 1.0, -2.0));
    ball.set_transform(PhysicsTransform::from_position(Vec3::new(1.0, 0.0, 0.0)))
        .expect("new bodies may be placed freely");
    simulation.add_body(Arc::clone(&ball));
    simulation.step(DT, Vec3::ZERO).expect("step");
    assert!((ball.transform().position().x() - 1.0).abs() < 1.0e-6);

    let err = ball.set_transform(target).expect_err("active simulated body");
    assert!(matches!(err, PhysicsError::ActiveBodyTeleport(id) if id == ball.id()), "{err}");

    ball.teleport(target);
    simulation.step(DT, Vec3::ZERO).expect("step");
    let position = ball.transform().position();
    assert!(position.distance_squared(&target.position()) < 1.0e-10, "{position:?}");
    assert!(ball.is_active());
}

#[test]
fn invalid_time_step_is_rejected() {
    let mut simulation = Simulation::new(&PhysicsConfig::default()).expect("simulation");
    for dt in [0.0, -DT, f32::NAN, f32::INFINITY] {
        assert!(matches!(simulation.step(dt, GRAVITY), Err(PhysicsError::InvalidConfig(_))));
    }
    assert_eq!(simulation.step_count(), 0);
}

#[test]
fn invalid_configuration_is_rejected() {
    let mut config = PhysicsConfig::default();
    config.constraint_solver.iterations = 0;
    assert!(matches!(Simulation::new(&config), Err(PhysicsError::InvalidConfig(_))));
}
