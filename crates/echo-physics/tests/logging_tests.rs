// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
//! Structured log events emitted by the simulation, captured through a
//! `tracing-subscriber` fmt layer.

use std::io;
use std::sync::{Arc, Mutex};

use echo_physics::math::Vec3;
use echo_physics::shape::CollisionShape;
use echo_physics::types::transform::PhysicsTransform;
use echo_physics::{PhysicsConfig, RigidBody, Simulation};
use tracing_subscriber::EnvFilter;

/// In-memory sink shared between the subscriber and the test.
#[derive(Debug, Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("log buffer")).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log buffer").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture(filter: &str, run: impl FnOnce()) -> String {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(subscriber, run);
    logs.text()
}

fn ball(position: Vec3) -> Arc<RigidBody> {
    let shape = Arc::new(CollisionShape::sphere(0.5).expect("valid sphere"));
    let body = Arc::new(RigidBody::new(shape, PhysicsTransform::from_position(position)));
    body.set_mass(1.0).expect("valid mass");
    body
}

#[test]
fn world_boundary_demotion_is_logged_as_a_warning() {
    let mut config = PhysicsConfig::default();
    config.broad_phase.world_min_y = -10.0;
    let lost = ball(Vec3::new(0.0, -20.0, 0.0));
    let kept = ball(Vec3::new(0.0, 5.0, 0.0));

    let logs = capture("echo_physics=warn", || {
        let mut simulation = Simulation::new(&config).expect("simulation");
        simulation.add_body(Arc::clone(&lost));
        simulation.add_body(Arc::clone(&kept));
        simulation.step(1.0 / 60.0, Vec3::new(0.0, -9.81, 0.0)).expect("step");
    });

    let warnings: Vec<&str> = logs.lines().filter(|line| line.contains("WARN")).collect();
    assert_eq!(warnings.len(), 1, "{logs}");
    assert!(warnings[0].contains("world boundary"), "{logs}");
    assert!(warnings[0].contains(&format!("body={}", lost.id())), "{logs}");
    assert!(lost.is_static());
    assert!(!kept.is_static());
}

#[test]
fn body_registration_is_logged_at_debug_level() {
    let body = ball(Vec3::ZERO);
    let quiet = capture("echo_physics=info", || {
        let mut simulation = Simulation::new(&PhysicsConfig::default()).expect("simulation");
        simulation.add_body(Arc::clone(&body));
        simulation.step(1.0 / 60.0, Vec3::ZERO).expect("step");
    });
    assert!(!quiet.contains("body added"), "{quiet}");

    let verbose = capture("echo_physics=debug", || {
        let mut simulation = Simulation::new(&PhysicsConfig::default()).expect("simulation");
        simulation.add_body(Arc::clone(&body));
        simulation.step(1.0 / 60.0, Vec3::ZERO).expect("step");
    });
    let added = verbose.lines().find(|line| line.contains("body added")).expect("debug event");
    assert!(added.contains(&format!("body={}", body.id())), "{verbose}");
    assert!(added.contains("static_body=false"), "{verbose}");
}
