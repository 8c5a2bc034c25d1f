// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
//! Character controller stepping against static scenery.

use std::sync::Arc;

use echo_physics::config::BroadPhaseKind;
use echo_physics::math::{Quat, Vec3};
use echo_physics::shape::CollisionShape;
use echo_physics::types::transform::PhysicsTransform;
use echo_physics::{PhysicsCharacter, PhysicsConfig, PhysicsError, RigidBody, Simulation};

const DT: f32 = 1.0 / 60.0;
const GRAVITY: Vec3 = Vec3::new(0.0, -9.81, 0.0);
const MASS: f32 = 80.0;

fn scenery(half_extents: Vec3, transform: PhysicsTransform) -> Arc<RigidBody> {
    let shape = Arc::new(CollisionShape::cuboid(half_extents).expect("valid box"));
    Arc::new(RigidBody::new(shape, transform))
}

fn ground() -> Arc<RigidBody> {
    let at = PhysicsTransform::from_position(Vec3::new(0.0, -0.5, 0.0));
    scenery(Vec3::new(20.0, 0.5, 20.0), at)
}

fn character(position: Vec3) -> Arc<PhysicsCharacter> {
    let shape = Arc::new(CollisionShape::sphere(0.5).expect("valid sphere"));
    let transform = PhysicsTransform::from_position(position);
    Arc::new(PhysicsCharacter::new(shape, transform, MASS, 5.0, 0.8).expect("valid character"))
}

fn configs() -> Vec<PhysicsConfig> {
    let sweep_and_prune = PhysicsConfig::default();
    let mut tree = PhysicsConfig::default();
    tree.broad_phase.kind = BroadPhaseKind::AabbTree;
    vec![sweep_and_prune, tree]
}

fn run(simulation: &mut Simulation, steps: usize) {
    for _ in 0..steps {
        simulation.step(DT, GRAVITY).expect("step");
    }
}

/// Simulation holding `scenery` and one character dropped onto it.
fn landed(
    config: &PhysicsConfig,
    scenery: &[Arc<RigidBody>],
    at: Vec3,
) -> (Simulation, Arc<PhysicsCharacter>) {
    let mut simulation = Simulation::new(config).expect("simulation");
    for body in scenery {
        simulation.add_body(Arc::clone(body));
    }
    let character = character(at);
    simulation.add_character(Arc::clone(&character));
    run(&mut simulation, 90);
    (simulation, character)
}

fn landed_on_ground() -> (Simulation, Arc<PhysicsCharacter>) {
    landed(&PhysicsConfig::default(), &[ground()], Vec3::new(0.0, 1.0, 0.0))
}

#[test]
fn character_lands_and_stands_on_the_ground() {
    for config in configs() {
        let (mut simulation, character) = landed(&config, &[ground()], Vec3::new(0.0, 2.0, 0.0));
        let status = character.status();
        assert!(status.on_ground, "{status:?}");
        assert!(!status.hit_roof);
        assert_eq!(status.time_in_air, 0.0);
        assert_eq!(status.hits, 1);

        let rest = character.transform().position().y();
        assert!((rest - 0.5).abs() < 0.02, "rest height {rest}");
        run(&mut simulation, 60);
        let later = character.transform().position().y();
        assert!((later - rest).abs() < 0.01, "drifted from {rest} to {later}");
        assert!(character.status().on_ground);
    }
}

#[test]
fn character_falls_while_nothing_is_below() {
    let mut simulation = Simulation::new(&PhysicsConfig::default()).expect("simulation");
    let character = character(Vec3::new(0.0, 10.0, 0.0));
    simulation.add_character(Arc::clone(&character));
    run(&mut simulation, 30);

    let status = character.status();
    assert!(!status.on_ground);
    assert_eq!(status.hits, 0);
    assert!((status.time_in_air - 30.0 * DT).abs() < 1e-4, "{status:?}");
    // Half a second of free fall covers about 1.2 m.
    let drop = 10.0 - character.transform().position().y();
    assert!((1.0..1.4).contains(&drop), "fell {drop}");
}

#[test]
fn jump_leaves_the_ground_and_lands_again() {
    let (mut simulation, character) = landed_on_ground();
    assert!(character.status().on_ground);
    let rest = character.transform().position().y();

    character.jump();
    run(&mut simulation, 1);
    assert!(!character.status().on_ground);

    let mut apex = rest;
    for _ in 0..30 {
        simulation.step(DT, GRAVITY).expect("step");
        apex = apex.max(character.transform().position().y());
    }
    // v²/2g with v = 5 m/s.
    assert!(apex - rest > 1.0, "apex {apex} from rest {rest}");

    run(&mut simulation, 90);
    assert!(character.status().on_ground);
    let touchdown = character.transform().position().y();
    assert!((touchdown - rest).abs() < 0.02, "landed at {touchdown}");
}

#[test]
fn jump_requested_in_mid_air_is_ignored() {
    let mut simulation = Simulation::new(&PhysicsConfig::default()).expect("simulation");
    simulation.add_body(ground());
    let character = character(Vec3::new(0.0, 5.0, 0.0));
    simulation.add_character(Arc::clone(&character));
    run(&mut simulation, 20);

    let before = character.transform().position().y();
    character.jump();
    run(&mut simulation, 1);
    assert!(character.transform().position().y() < before);
}

#[test]
fn walking_moves_and_turns_the_character() {
    let (mut simulation, character) = landed_on_ground();
    character.set_momentum(Vec3::new(2.0 * MASS, 0.0, 0.0));
    run(&mut simulation, 60);

    let position = character.transform().position();
    assert!((position.x() - 2.0).abs() < 0.05, "{position:?}");
    assert!((position.y() - 0.5).abs() < 0.02, "{position:?}");
    assert!(character.status().on_ground);
    let forward = character.transform().orientation().rotate(&Vec3::UNIT_Z);
    assert!(forward.sub(&Vec3::UNIT_X).length() < 1e-4, "{forward:?}");
}

#[test]
fn wall_stops_the_character() {
    let wall_at = PhysicsTransform::from_position(Vec3::new(3.0, 2.0, 0.0));
    let wall = scenery(Vec3::new(0.5, 2.0, 5.0), wall_at);
    let (mut simulation, character) =
        landed(&PhysicsConfig::default(), &[ground(), wall], Vec3::new(0.0, 1.0, 0.0));
    character.set_momentum(Vec3::new(3.0 * MASS, 0.0, 0.0));
    run(&mut simulation, 120);

    let position = character.transform().position();
    // Wall face at x = 2.5, sphere radius 0.5.
    assert!(position.x() < 2.02 && position.x() > 1.9, "{position:?}");
    assert!((position.y() - 0.5).abs() < 0.03, "{position:?}");
    let status = character.status();
    assert!(status.on_ground, "{status:?}");
    assert_eq!(status.hits, 2);
}

#[test]
fn climbing_a_ramp_reports_its_slope() {
    let angle = 0.2_f32;
    let ramp_orientation = Quat::from_axis_angle(Vec3::UNIT_Z, angle);
    let ramp_at = PhysicsTransform::new(Vec3::ZERO, ramp_orientation);
    let ramp = scenery(Vec3::new(10.0, 0.5, 5.0), ramp_at);
    let surface = 0.5 / angle.cos();
    let (mut simulation, character) =
        landed(&PhysicsConfig::default(), &[ramp], Vec3::new(0.0, surface + 1.0, 0.0));
    assert!(character.status().on_ground, "{:?}", character.status());

    character.set_momentum(Vec3::new(MASS, 0.0, 0.0));
    run(&mut simulation, 30);
    let status = character.status();
    assert!(status.on_ground, "{status:?}");
    assert!((status.slope - angle.tan()).abs() < 0.05, "{status:?}");
    assert!(character.transform().position().x() > 0.2);
}

#[test]
fn removed_character_stops_being_driven() {
    let (mut simulation, character) = landed_on_ground();
    simulation.remove_character(character.id()).expect("known character");
    run(&mut simulation, 1);
    assert!(simulation.body(character.id()).is_none());

    character.set_momentum(Vec3::new(MASS, 0.0, 0.0));
    let before = character.transform();
    run(&mut simulation, 10);
    assert_eq!(character.transform(), before);

    let err = simulation.remove_character(character.id()).expect_err("already removed");
    assert!(matches!(err, PhysicsError::UnknownBody(id) if id == character.id()), "{err}");
}
