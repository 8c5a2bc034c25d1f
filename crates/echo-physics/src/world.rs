// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! Physics world: a [`Simulation`] stepped at a fixed rate on its own thread.
//!
//! Threading contract:
//! - Body additions and removals go through the shared [`BodyQueue`] and are
//!   applied at the next step boundary.
//! - The simulation sits behind one mutex, held for a whole step. Queries
//!   (`ray_test`, `manifold_snapshot`) take the same mutex, so they observe a
//!   state between two steps.
//! - A panic or step error on the simulation thread stops the loop. It is
//!   kept and returned by the next [`PhysicsWorld::check_no_exception_raised`].

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::body::{BodyHandle, BodyId, BodyQueue};
use crate::character::PhysicsCharacter;
use crate::config::PhysicsConfig;
use crate::error::{PhysicsError, Result};
use crate::math::Vec3;
use crate::narrow::{ContinuousCollisionResult, ManifoldResult};
use crate::simulation::{Processable, Simulation, StepSummary};

const PAUSED_POLL: Duration = Duration::from_millis(5);

/// State shared between the controlling thread and the simulation thread.
#[derive(Debug)]
struct Shared {
    gravity: Mutex<Vec3>,
    paused: AtomicBool,
    interrupted: AtomicBool,
    failure: Mutex<Option<PhysicsError>>,
    manifolds: Mutex<Vec<ManifoldResult>>,
    last_step: Mutex<StepSummary>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Threaded physics world.
///
/// # Examples
/// ```no_run
/// use std::sync::Arc;
/// use echo_physics::body::RigidBody;
/// use echo_physics::config::PhysicsConfig;
/// use echo_physics::math::Vec3;
/// use echo_physics::shape::CollisionShape;
/// use echo_physics::types::transform::PhysicsTransform;
/// use echo_physics::world::PhysicsWorld;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut world = PhysicsWorld::new(&PhysicsConfig::default())?;
/// let ball = Arc::new(RigidBody::new(
///     Arc::new(CollisionShape::sphere(0.5)?),
///     PhysicsTransform::from_position(Vec3::new(0.0, 5.0, 0.0)),
/// ));
/// ball.set_mass(1.0)?;
/// world.add_body(Arc::clone(&ball));
/// world.start(1.0 / 60.0, 3)?;
/// std::thread::sleep(std::time::Duration::from_millis(100));
/// world.check_no_exception_raised()?;
/// assert!(ball.transform().position().y() < 5.0);
/// # Ok(())
/// # }
/// ```
pub struct PhysicsWorld {
    simulation: Arc<Mutex<Simulation>>,
    queue: Arc<BodyQueue>,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl core::fmt::Debug for PhysicsWorld {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PhysicsWorld")
            .field("running", &self.is_running())
            .field("paused", &self.is_paused())
            .field("gravity", &self.gravity())
            .finish_non_exhaustive()
    }
}

impl PhysicsWorld {
    /// Builds a stopped world with gravity `(0, -9.81, 0)`.
    ///
    /// # Errors
    /// See [`Simulation::new`].
    pub fn new(config: &PhysicsConfig) -> Result<Self> {
        let queue = Arc::new(BodyQueue::new());
        let simulation = Simulation::with_queue(config, Arc::clone(&queue))?;
        Ok(Self {
            simulation: Arc::new(Mutex::new(simulation)),
            queue,
            shared: Arc::new(Shared {
                gravity: Mutex::new(Vec3::new(0.0, -9.81, 0.0)),
                paused: AtomicBool::new(false),
                interrupted: AtomicBool::new(false),
                failure: Mutex::new(None),
                manifolds: Mutex::new(Vec::new()),
                last_step: Mutex::new(StepSummary::default()),
            }),
            thread: None,
        })
    }

    /// Queues a body for the next step. Callable from any thread.
    pub fn add_body(&self, body: impl Into<BodyHandle>) {
        self.queue.add(body);
    }

    /// Queues a body removal for the next step. Callable from any thread;
    /// waits for a running step to finish.
    ///
    /// # Errors
    /// See [`Simulation::remove_body`].
    pub fn remove_body(&self, id: BodyId) -> Result<()> {
        lock(&self.simulation).remove_body(id)
    }

    /// Registers a hook run around every step. Waits for a running step to
    /// finish.
    pub fn add_processable(&self, processable: Box<dyn Processable>) {
        lock(&self.simulation).add_processable(processable);
    }

    /// Adds a character controlled on the simulation thread. Waits for a
    /// running step to finish.
    pub fn add_character(&self, character: Arc<PhysicsCharacter>) {
        lock(&self.simulation).add_character(character);
    }

    /// Removes a character and its ghost.
    ///
    /// # Errors
    /// [`PhysicsError::UnknownBody`] when no such character was added.
    pub fn remove_character(&self, id: BodyId) -> Result<()> {
        lock(&self.simulation).remove_character(id)
    }

    /// Gravity applied from the next step on.
    pub fn set_gravity(&self, gravity: Vec3) {
        *lock(&self.shared.gravity) = gravity;
    }

    /// Current gravity.
    pub fn gravity(&self) -> Vec3 {
        *lock(&self.shared.gravity)
    }

    /// Spawns the simulation thread stepping every `time_step` seconds.
    ///
    /// When the thread falls behind it runs up to `max_sub_step` steps in a
    /// row, then drops the remaining backlog.
    ///
    /// # Errors
    /// [`PhysicsError::AlreadyStarted`] while a thread runs,
    /// [`PhysicsError::InvalidConfig`] for a non-positive `time_step` or a
    /// zero `max_sub_step`, and [`PhysicsError::ThreadSpawn`] when the OS
    /// refuses the thread.
    pub fn start(&mut self, time_step: f32, max_sub_step: u32) -> Result<()> {
        if self.is_running() {
            return Err(PhysicsError::AlreadyStarted);
        }
        if !(time_step.is_finite() && time_step > 0.0) {
            return Err(PhysicsError::InvalidConfig(format!(
                "time step must be finite and > 0 (got {time_step})"
            )));
        }
        if max_sub_step == 0 {
            return Err(PhysicsError::InvalidConfig("max sub steps must be >= 1".into()));
        }
        self.join_finished();
        self.shared.interrupted.store(false, Ordering::Release);

        let simulation = Arc::clone(&self.simulation);
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("echo-physics".into())
            .spawn(move || run(&simulation, &shared, time_step, max_sub_step))?;
        self.thread = Some(handle);
        info!(time_step, max_sub_step, "physics thread started");
        Ok(())
    }

    /// `true` while the simulation thread is alive.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Stops stepping at the next step boundary.
    pub fn pause(&self) {
        if !self.shared.paused.swap(true, Ordering::AcqRel) {
            info!("physics paused");
        }
    }

    /// Resumes stepping.
    pub fn play(&self) {
        if self.shared.paused.swap(false, Ordering::AcqRel) {
            info!("physics resumed");
        }
    }

    /// `true` while paused.
    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    /// Asks the simulation thread to exit after the current step.
    pub fn interrupt(&self) {
        self.shared.interrupted.store(true, Ordering::Release);
    }

    /// Returns, and clears, the failure that stopped the simulation thread.
    ///
    /// # Errors
    /// [`PhysicsError::SimulationPanicked`] or the error of the failed step.
    pub fn check_no_exception_raised(&self) -> Result<()> {
        lock(&self.shared.failure).take().map_or(Ok(()), Err)
    }

    /// Bodies crossed by `from → to`, nearest first. Waits for a running
    /// step to finish.
    pub fn ray_test(&self, from: Vec3, to: Vec3) -> Vec<ContinuousCollisionResult> {
        lock(&self.simulation).ray_test(from, to)
    }

    /// Copy of the manifolds solved by the last step.
    pub fn manifold_snapshot(&self) -> Vec<ManifoldResult> {
        lock(&self.shared.manifolds).clone()
    }

    /// Counters of the last completed step.
    pub fn last_step(&self) -> StepSummary {
        *lock(&self.shared.last_step)
    }

    /// Runs one step on the calling thread. Used while the thread is stopped.
    ///
    /// # Errors
    /// [`PhysicsError::AlreadyStarted`] while the thread runs, otherwise see
    /// [`Simulation::step`].
    pub fn step_now(&self, dt: f32) -> Result<StepSummary> {
        if self.is_running() {
            return Err(PhysicsError::AlreadyStarted);
        }
        let mut simulation = lock(&self.simulation);
        let summary = simulation.step(dt, self.gravity())?;
        *lock(&self.shared.manifolds) = simulation.manifolds().to_vec();
        *lock(&self.shared.last_step) = summary;
        Ok(summary)
    }

    fn join_finished(&mut self) {
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!("physics thread terminated abnormally");
            }
            info!("physics thread stopped");
        }
    }
}

impl Drop for PhysicsWorld {
    fn drop(&mut self) {
        self.interrupt();
        self.join_finished();
    }
}

fn run(simulation: &Mutex<Simulation>, shared: &Shared, time_step: f32, max_sub_step: u32) {
    let period = Duration::from_secs_f32(time_step);
    let mut next_step = Instant::now();
    while !shared.interrupted.load(Ordering::Acquire) {
        if shared.paused.load(Ordering::Acquire) {
            thread::sleep(PAUSED_POLL);
            next_step = Instant::now();
            continue;
        }

        let mut steps = 0;
        while steps < max_sub_step && next_step <= Instant::now() {
            if let Err(failure) = step_once(simulation, shared, time_step) {
                error!(%failure, "physics thread stopped on failure");
                *lock(&shared.failure) = Some(failure);
                return;
            }
            next_step += period;
            steps += 1;
        }
        let now = Instant::now();
        if next_step < now {
            debug!(behind_ms = (now - next_step).as_millis(), "physics dropping step backlog");
            next_step = now;
        }
        thread::sleep(next_step.saturating_duration_since(Instant::now()));
    }
}

fn step_once(simulation: &Mutex<Simulation>, shared: &Shared, time_step: f32) -> Result<()> {
    let gravity = *lock(&shared.gravity);
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mut simulation = lock(simulation);
        let summary = simulation.step(time_step, gravity)?;
        *lock(&shared.manifolds) = simulation.manifolds().to_vec();
        *lock(&shared.last_step) = summary;
        Ok(())
    }));
    match outcome {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|message| (*message).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_owned());
            Err(PhysicsError::SimulationPanicked(message))
        }
    }
}
