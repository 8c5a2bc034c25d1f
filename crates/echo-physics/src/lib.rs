// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![doc = r"Rigid-body physics core for Echo.

This crate provides:
- Collision shapes (sphere, box, capsule, cylinder, cone, convex hull,
  compound, heightfield, triangle mesh) with margins and support mapping.
- Two broad phases: sweep-and-prune and a dynamic AABB tree, each with a
  separate container for ghost (overlap-only) pairs.
- A narrow phase built on GJK, EPA and conservative-advancement CCD, with
  persistent four-point contact manifolds.
- Islands with sleeping, and a sequential-impulse contact solver with
  friction, rolling friction, restitution and warm starting.
- A kinematic character controller driven by a ghost body.
- [`world::PhysicsWorld`], stepping a [`simulation::Simulation`] at a fixed
  rate on its own thread.

Design notes:
- Float32 throughout; right-handed, Y up.
- Pair and island iteration order is canonical (sorted by body id).
- Rustdoc is treated as part of the contract; public items are documented.
"]

pub mod body;
pub mod broad;
pub mod character;
pub mod config;
pub mod error;
pub mod island;
pub mod math;
pub mod narrow;
pub mod shape;
pub mod simulation;
pub mod solver;
/// Motion over one step.
pub mod temporal;
/// Foundational geometric types.
pub mod types;
pub mod world;

pub use body::{BodyHandle, BodyId, GhostBody, RigidBody};
pub use character::{CharacterController, CharacterStatus, PhysicsCharacter};
pub use config::PhysicsConfig;
pub use error::{PhysicsError, Result};
pub use math::{Quat, Vec3};
pub use shape::CollisionShape;
pub use simulation::{Processable, Simulation, StepSummary};
pub use types::aabb::Aabb;
pub use types::transform::PhysicsTransform;
pub use world::PhysicsWorld;
