// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! Single-threaded collision step.
//!
//! One [`Simulation::step`] runs, in order:
//! 1. `setup` hooks of the character controllers and processables;
//! 2. apply queued body additions/removals and pull user-side changes;
//! 3. integrate velocities (gravity, forces, damping);
//! 4. broad-phase update;
//! 5. narrow phase (discrete, ghosts, predictive);
//! 6. island refresh and sleeping;
//! 7. constraint solving, impulses stored for warm starting;
//! 8. integrate transforms;
//! 9. `process` hooks of the character controllers and processables;
//! 10. publish results to the body handles.
//!
//! [`crate::world::PhysicsWorld`] drives this on its own thread; tests and
//! tools may step it directly.

use std::sync::Arc;

use serde::Serialize;
use tracing::{instrument, trace};

use crate::body::{BodyHandle, BodyId, BodyManager, BodyQueue, WorkBody};
use crate::broad::{build_broad_phase, BroadPhase};
use crate::character::{CharacterController, PhysicsCharacter};
use crate::config::{CharacterConfig, PhysicsConfig};
use crate::error::{PhysicsError, Result};
use crate::island::{Island, IslandManager};
use crate::math::Vec3;
use crate::narrow::{ContinuousCollisionResult, ManifoldResult, NarrowPhase, NarrowPhaseSettings};
use crate::solver::ConstraintSolver;
use crate::types::ray::Ray;

/// Hook run on the simulation thread around every collision step.
///
/// Character controllers and vehicles use these to read and steer bodies in
/// lock-step with the simulation.
pub trait Processable: Send {
    /// Runs before the collision step.
    fn setup(&mut self, dt: f32, gravity: &Vec3) {
        let _ = (dt, gravity);
    }

    /// Runs after the collision step.
    ///
    /// # Errors
    /// A returned error aborts the step and is reported through
    /// [`crate::world::PhysicsWorld::check_no_exception_raised`].
    fn process(&mut self, dt: f32, gravity: &Vec3) -> Result<()>;
}

/// Counters describing one completed step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StepSummary {
    /// Steps completed so far, this one included.
    pub step: u64,
    /// Registered bodies.
    pub bodies: usize,
    /// Overlapping pairs across all containers.
    pub pairs: usize,
    /// Manifolds handed to the solver.
    pub manifolds: usize,
    /// Solved contact points.
    pub contacts: usize,
    /// Islands built this step.
    pub islands: usize,
    /// Islands put to sleep this step.
    pub sleeping_islands: usize,
}

/// The collision pipeline with everything it owns.
pub struct Simulation {
    bodies: BodyManager,
    broad_phase: Box<dyn BroadPhase>,
    narrow_phase: NarrowPhase,
    island_manager: IslandManager,
    solver: ConstraintSolver,
    characters: Vec<CharacterController>,
    character_config: CharacterConfig,
    processables: Vec<Box<dyn Processable>>,
    manifolds: Vec<ManifoldResult>,
    islands: Vec<Island>,
    step_count: u64,
}

impl core::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Simulation")
            .field("bodies", &self.bodies.len())
            .field("pairs", &self.broad_phase.pairs().len())
            .field("characters", &self.characters.len())
            .field("processables", &self.processables.len())
            .field("step_count", &self.step_count)
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// Builds a simulation with its own body queue.
    ///
    /// # Errors
    /// [`PhysicsError::InvalidConfig`] when `config` fails validation, and
    /// [`PhysicsError::MissingAlgorithm`] when the dispatch table is incomplete.
    pub fn new(config: &PhysicsConfig) -> Result<Self> {
        Self::with_queue(config, Arc::new(BodyQueue::new()))
    }

    /// Builds a simulation draining `queue`.
    ///
    /// # Errors
    /// See [`Simulation::new`].
    pub fn with_queue(config: &PhysicsConfig, queue: Arc<BodyQueue>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            bodies: BodyManager::new(queue, config.collision_shape.ccd_motion_threshold_factor),
            broad_phase: build_broad_phase(config),
            narrow_phase: NarrowPhase::new(NarrowPhaseSettings::from(&config.narrow_phase))?,
            island_manager: IslandManager::new(&config.island),
            solver: ConstraintSolver::new(&config.constraint_solver),
            characters: Vec::new(),
            character_config: config.character.clone(),
            processables: Vec::new(),
            manifolds: Vec::with_capacity(config.narrow_phase.algorithm_pool_size),
            islands: Vec::new(),
            step_count: 0,
        })
    }

    /// Queue feeding body additions and removals.
    pub fn body_queue(&self) -> &Arc<BodyQueue> {
        self.bodies.queue()
    }

    /// Queues a body; it joins the simulation at the next step.
    pub fn add_body(&self, body: impl Into<BodyHandle>) {
        self.bodies.queue().add(body);
    }

    /// Queues a removal; the body and every pair and manifold referencing it
    /// are purged at the next step.
    ///
    /// # Errors
    /// [`PhysicsError::UnknownBody`] when `id` is neither registered nor
    /// queued for addition, or its removal is already queued.
    pub fn remove_body(&self, id: BodyId) -> Result<()> {
        let queue = self.bodies.queue();
        let known = queue.queued_membership(id).unwrap_or_else(|| self.bodies.handle(id).is_some());
        if !known {
            return Err(PhysicsError::UnknownBody(id));
        }
        queue.remove(id);
        Ok(())
    }

    /// Registers a hook run around every step.
    pub fn add_processable(&mut self, processable: Box<dyn Processable>) {
        self.processables.push(processable);
    }

    /// Queues the character's ghost and starts controlling it from the next
    /// step.
    pub fn add_character(&mut self, character: Arc<PhysicsCharacter>) {
        self.add_body(Arc::clone(character.ghost()));
        self.characters.push(CharacterController::new(character, &self.character_config));
    }

    /// Stops controlling a character and queues its ghost for removal.
    ///
    /// # Errors
    /// [`PhysicsError::UnknownBody`] when no character with this ghost id
    /// was added.
    pub fn remove_character(&mut self, id: BodyId) -> Result<()> {
        let index = self
            .characters
            .iter()
            .position(|controller| controller.character().id() == id)
            .ok_or(PhysicsError::UnknownBody(id))?;
        self.characters.remove(index);
        self.remove_body(id)
    }

    /// Registered bodies.
    pub fn bodies(&self) -> &BodyManager {
        &self.bodies
    }

    /// Work body by id.
    pub fn body(&self, id: BodyId) -> Option<&WorkBody> {
        self.bodies.body(id)
    }

    /// Broad phase in use.
    pub fn broad_phase(&self) -> &dyn BroadPhase {
        self.broad_phase.as_ref()
    }

    /// Manifolds solved by the last step.
    pub fn manifolds(&self) -> &[ManifoldResult] {
        &self.manifolds
    }

    /// Islands built by the last step.
    pub fn islands(&self) -> &[Island] {
        &self.islands
    }

    /// Completed steps.
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Advances the simulation by `dt` seconds under `gravity`.
    ///
    /// # Errors
    /// [`PhysicsError::InvalidConfig`] for a non-positive or non-finite `dt`,
    /// [`PhysicsError::SimulationFailed`] when a processable fails or a body
    /// state becomes non-finite.
    #[instrument(level = "trace", skip(self), fields(step = self.step_count + 1))]
    pub fn step(&mut self, dt: f32, gravity: Vec3) -> Result<StepSummary> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(PhysicsError::InvalidConfig(format!(
                "time step must be finite and > 0 (got {dt})"
            )));
        }

        for controller in &mut self.characters {
            controller.setup(dt, &gravity);
        }
        for processable in &mut self.processables {
            processable.setup(dt, &gravity);
        }
        self.refresh_body_list();

        integrate_velocities(self.bodies.bodies_mut().values_mut(), dt, &gravity);
        self.broad_phase.update_bodies(self.bodies.bodies_mut());

        let output = self.narrow_phase.process(self.broad_phase.as_mut(), self.bodies.bodies(), dt);
        for (ghost, contacts) in output.ghost_contacts {
            self.bodies.publish_ghost_contacts(ghost, contacts);
        }
        let mut manifolds = output.manifolds;

        self.islands = self.island_manager.update(self.bodies.bodies_mut(), &manifolds);
        let contacts = self.solver.solve(dt, self.bodies.bodies_mut(), &mut manifolds);
        self.narrow_phase.store_impulses(self.broad_phase.as_mut(), &manifolds);

        integrate_transforms(self.bodies.bodies_mut().values_mut(), dt);
        check_finite(self.bodies.bodies().values())?;

        for controller in &mut self.characters {
            controller.process(dt, &gravity)?;
        }
        for processable in &mut self.processables {
            processable.process(dt, &gravity)?;
        }
        self.bodies.push_to_handles();
        self.manifolds = manifolds;
        self.step_count += 1;

        let summary = StepSummary {
            step: self.step_count,
            bodies: self.bodies.len(),
            pairs: self.broad_phase.pairs().len(),
            manifolds: self.manifolds.len(),
            contacts,
            islands: self.islands.len(),
            sleeping_islands: self.islands.iter().filter(|island| island.sleeping).count(),
        };
        trace!(?summary, "step completed");
        Ok(summary)
    }

    /// Bodies crossed by the segment `from → to`, nearest first.
    ///
    /// A zero-length segment hits nothing.
    pub fn ray_test(&self, from: Vec3, to: Vec3) -> Vec<ContinuousCollisionResult> {
        if from.distance_squared(&to) == 0.0 {
            return Vec::new();
        }
        let ray = Ray::new(from, to);
        self.narrow_phase.ray_test(&ray, self.broad_phase.as_ref(), self.bodies.bodies())
    }

    fn refresh_body_list(&mut self) {
        let applied = self.bodies.apply_pending();
        for id in &applied.removed {
            self.broad_phase.remove_body(*id);
        }
        self.bodies.pull_from_handles();
        for id in &applied.added {
            if let Some(body) = self.bodies.body(*id) {
                self.broad_phase.add_body(body, body.is_ghost());
            }
        }
    }
}

/// Gravity and accumulated forces become velocity; damping decays it. Only
/// active dynamic bodies move. Force accumulators are cleared for everyone.
fn integrate_velocities<'a>(
    bodies: impl Iterator<Item = &'a mut WorkBody>,
    dt: f32,
    gravity: &Vec3,
) {
    for body in bodies {
        if body.is_active() && !body.is_static() && !body.is_ghost() {
            let acceleration = gravity.add(&body.total_force.scale(body.inv_mass()));
            body.linear_velocity += acceleration.scale(dt).mul_components(&body.linear_factor);
            let angular_acceleration = body.inv_world_inertia().mul_vec(&body.total_torque);
            body.angular_velocity +=
                angular_acceleration.scale(dt).mul_components(&body.angular_factor);

            let linear_decay = (1.0 - body.linear_damping).powf(dt);
            let angular_decay = (1.0 - body.angular_damping).powf(dt);
            body.linear_velocity = body.linear_velocity.scale(linear_decay);
            body.angular_velocity = body.angular_velocity.scale(angular_decay);
        }
        body.total_force = Vec3::ZERO;
        body.total_torque = Vec3::ZERO;
    }
}

fn integrate_transforms<'a>(bodies: impl Iterator<Item = &'a mut WorkBody>, dt: f32) {
    for body in bodies {
        if body.is_active() && !body.is_static() && !body.is_ghost() {
            body.integrate_transform(dt);
        }
    }
}

fn check_finite<'a>(bodies: impl Iterator<Item = &'a WorkBody>) -> Result<()> {
    for body in bodies {
        let position = body.transform().position();
        let finite = position.is_finite()
            && body.linear_velocity().is_finite()
            && body.angular_velocity().is_finite();
        if !finite {
            return Err(PhysicsError::SimulationFailed(format!(
                "{} reached a non-finite state",
                body.id()
            )));
        }
    }
    Ok(())
}
