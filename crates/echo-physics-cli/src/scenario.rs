// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Canonical headless scenes and the report produced by running them.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;
use tracing::{debug, info};

use echo_physics::config::BroadPhaseKind;
use echo_physics::math::Vec3;
use echo_physics::shape::CollisionShape;
use echo_physics::{PhysicsConfig, PhysicsTransform, RigidBody, Simulation, StepSummary};

const GRAVITY: Vec3 = Vec3::new(0.0, -9.81, 0.0);

/// Scenes the CLI knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// A box dropped onto a static ground slab.
    DropBox,
    /// Two equal spheres approaching along X.
    HeadOn,
    /// A small fast sphere fired at a thin static wall.
    Ccd,
}

impl Scenario {
    /// Steps run when `--steps` is not given.
    pub const fn default_steps(self) -> u32 {
        match self {
            Self::DropBox => 600,
            Self::HeadOn | Self::Ccd => 30,
        }
    }
}

/// Per-run knobs taken from the command line.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub steps: u32,
    pub dt: f32,
    pub restitution: f32,
}

/// Final state of one named body.
#[derive(Debug, Serialize)]
pub struct BodyReport {
    pub name: &'static str,
    pub position: [f32; 3],
    pub linear_velocity: [f32; 3],
    pub active: bool,
}

/// JSON document printed after a run.
#[derive(Debug, Serialize)]
pub struct Report {
    pub scenario: Scenario,
    pub broad_phase: BroadPhaseKind,
    pub steps: u32,
    pub dt: f32,
    pub last_step: StepSummary,
    pub most_manifold_points: usize,
    pub first_sleep_step: Option<u64>,
    pub bodies: Vec<BodyReport>,
    /// Whether the scene met its expected outcome.
    pub passed: bool,
}

struct Scene {
    bodies: Vec<(&'static str, Arc<RigidBody>)>,
    gravity: Vec3,
}

impl Scene {
    fn body(&self, name: &str) -> Option<&Arc<RigidBody>> {
        self.bodies.iter().find(|(n, _)| *n == name).map(|(_, b)| b)
    }
}

fn make_body(shape: CollisionShape, position: Vec3, mass: f32) -> Result<Arc<RigidBody>> {
    let body = RigidBody::new(Arc::new(shape), PhysicsTransform::from_position(position));
    body.set_mass(mass)?;
    Ok(Arc::new(body))
}

fn build(scenario: Scenario, options: &RunOptions) -> Result<Scene> {
    let scene = match scenario {
        Scenario::DropBox => {
            let slab = CollisionShape::cuboid(Vec3::new(10.0, 0.5, 10.0))?;
            let ground = make_body(slab, Vec3::new(0.0, -0.5, 0.0), 0.0)?;
            let cube = CollisionShape::cuboid(Vec3::splat(0.5))?;
            let falling = make_body(cube, Vec3::new(0.0, 1.0, 0.0), 1.0)?;
            Scene { bodies: vec![("ground", ground), ("box", falling)], gravity: GRAVITY }
        }
        Scenario::HeadOn => {
            let left = make_body(CollisionShape::sphere(0.5)?, Vec3::new(-0.51, 0.0, 0.0), 1.0)?;
            let right = make_body(CollisionShape::sphere(0.5)?, Vec3::new(0.51, 0.0, 0.0), 1.0)?;
            for (body, speed) in [(&left, 1.0), (&right, -1.0)] {
                body.set_restitution(options.restitution);
                body.set_linear_velocity(Vec3::new(speed, 0.0, 0.0));
            }
            Scene { bodies: vec![("left", left), ("right", right)], gravity: Vec3::ZERO }
        }
        Scenario::Ccd => {
            let panel = CollisionShape::cuboid(Vec3::new(0.05, 2.0, 2.0))?;
            let wall = make_body(panel, Vec3::new(3.0, 0.0, 0.0), 0.0)?;
            let bullet = make_body(CollisionShape::sphere(0.1)?, Vec3::ZERO, 1.0)?;
            bullet.set_linear_velocity(Vec3::new(75.0, 0.0, 0.0));
            Scene { bodies: vec![("wall", wall), ("bullet", bullet)], gravity: Vec3::ZERO }
        }
    };
    Ok(scene)
}

fn meets_expectation(
    scenario: Scenario,
    scene: &Scene,
    options: &RunOptions,
    most_points: usize,
) -> bool {
    match scenario {
        Scenario::DropBox => scene.body("box").is_some_and(|b| {
            let y = b.transform().position().y();
            most_points >= 3 && (0.4..0.6).contains(&y)
        }),
        Scenario::HeadOn => match (scene.body("left"), scene.body("right")) {
            (Some(left), Some(right)) => {
                // Equal masses: each sphere leaves with the restitution-scaled reverse speed.
                let expected = options.restitution;
                (left.linear_velocity().x() + expected).abs() < 0.25
                    && (right.linear_velocity().x() - expected).abs() < 0.25
            }
            _ => false,
        },
        Scenario::Ccd => scene.body("bullet").is_some_and(|b| b.transform().position().x() < 2.95),
    }
}

/// Builds `scenario`, steps it and reports the final state.
pub fn run(scenario: Scenario, config: &PhysicsConfig, options: &RunOptions) -> Result<Report> {
    let scene = build(scenario, options).context("failed to build scenario")?;
    let mut simulation = Simulation::new(config).context("failed to create simulation")?;
    for (_, body) in &scene.bodies {
        simulation.add_body(Arc::clone(body));
    }

    info!(?scenario, steps = options.steps, dt = options.dt, "running scenario");
    let mut last_step = StepSummary::default();
    let mut most_points = 0;
    let mut first_sleep_step = None;
    for _ in 0..options.steps {
        last_step = simulation.step(options.dt, scene.gravity)?;
        most_points = simulation.manifolds().iter().map(|m| m.len()).fold(most_points, usize::max);
        if first_sleep_step.is_none() && last_step.sleeping_islands > 0 {
            debug!(step = last_step.step, "first island asleep");
            first_sleep_step = Some(last_step.step);
        }
    }

    let passed = meets_expectation(scenario, &scene, options, most_points);
    let bodies = scene
        .bodies
        .iter()
        .map(|(name, body)| BodyReport {
            name: *name,
            position: body.transform().position().to_array(),
            linear_velocity: body.linear_velocity().to_array(),
            active: body.is_active(),
        })
        .collect();
    Ok(Report {
        scenario,
        broad_phase: config.broad_phase.kind,
        steps: options.steps,
        dt: options.dt,
        last_step,
        most_manifold_points: most_points,
        first_sleep_step,
        bodies,
        passed,
    })
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    fn options(scenario: Scenario) -> RunOptions {
        RunOptions { steps: scenario.default_steps(), dt: 1.0 / 60.0, restitution: 0.0 }
    }

    #[test]
    fn ccd_scene_stops_the_bullet() {
        let report =
            run(Scenario::Ccd, &PhysicsConfig::default(), &options(Scenario::Ccd)).expect("run");
        assert!(report.passed, "{report:?}");
        assert_eq!(report.last_step.step, 30);
        assert_eq!(report.bodies.len(), 2);
    }

    #[test]
    fn reports_name_every_body() {
        let mut opts = options(Scenario::HeadOn);
        opts.steps = 1;
        let report = run(Scenario::HeadOn, &PhysicsConfig::default(), &opts).expect("run");
        let names: Vec<_> = report.bodies.iter().map(|b| b.name).collect();
        assert_eq!(names, ["left", "right"]);
    }
}
