// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use super::{BodyId, WorkBody};
use crate::error::{PhysicsError, Result};
use crate::math::{clamp, Vec3};
use crate::shape::CollisionShape;
use crate::types::transform::PhysicsTransform;

/// Externally mutable state of a rigid body, guarded by the body mutex.
#[derive(Debug, Clone)]
pub(crate) struct RigidBodyState {
    transform: PhysicsTransform,
    linear_velocity: Vec3,
    angular_velocity: Vec3,
    mass: f32,
    local_inertia: Vec3,
    linear_damping: f32,
    angular_damping: f32,
    linear_factor: Vec3,
    angular_factor: Vec3,
    restitution: f32,
    friction: f32,
    rolling_friction: f32,
    total_force: Vec3,
    total_torque: Vec3,
    total_momentum: Vec3,
    total_angular_momentum: Vec3,
    is_new: bool,
    is_active: bool,
    transform_changed: bool,
    velocity_changed: bool,
    wake_requested: bool,
}

/// User-facing rigid body handle.
///
/// A body with zero mass is static. Static bodies are never active and never
/// receive impulses.
///
/// Every accessor takes the body mutex, so handles are safe to share between
/// the simulation thread and user threads through `Arc`.
///
/// # Examples
/// ```
/// use std::sync::Arc;
/// use echo_physics::body::RigidBody;
/// use echo_physics::math::Vec3;
/// use echo_physics::shape::CollisionShape;
/// use echo_physics::types::transform::PhysicsTransform;
///
/// let shape = Arc::new(CollisionShape::sphere(0.5).unwrap());
/// let body = RigidBody::new(shape, PhysicsTransform::from_position(Vec3::new(0.0, 2.0, 0.0)));
/// assert!(body.is_static());
/// body.set_mass(1.0).unwrap();
/// assert!(!body.is_static());
/// assert!(body.is_active());
/// ```
#[derive(Debug)]
pub struct RigidBody {
    id: BodyId,
    shape: Arc<CollisionShape>,
    state: Mutex<RigidBodyState>,
}

impl RigidBody {
    /// Creates a static body (mass zero) placed at `transform`.
    pub fn new(shape: Arc<CollisionShape>, transform: PhysicsTransform) -> Self {
        Self {
            id: BodyId::next(),
            shape,
            state: Mutex::new(RigidBodyState {
                transform,
                linear_velocity: Vec3::ZERO,
                angular_velocity: Vec3::ZERO,
                mass: 0.0,
                local_inertia: Vec3::ZERO,
                linear_damping: 0.0,
                angular_damping: 0.0,
                linear_factor: Vec3::ONE,
                angular_factor: Vec3::ONE,
                restitution: 0.2,
                friction: 0.5,
                rolling_friction: 0.0,
                total_force: Vec3::ZERO,
                total_torque: Vec3::ZERO,
                total_momentum: Vec3::ZERO,
                total_angular_momentum: Vec3::ZERO,
                is_new: true,
                is_active: false,
                transform_changed: false,
                velocity_changed: false,
                wake_requested: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RigidBodyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stable id.
    pub fn id(&self) -> BodyId {
        self.id
    }

    /// Shared collision shape.
    pub fn shape(&self) -> &Arc<CollisionShape> {
        &self.shape
    }

    /// Current transform (as of the last completed step or user change).
    pub fn transform(&self) -> PhysicsTransform {
        self.lock().transform
    }

    /// Places the body.
    ///
    /// # Errors
    /// [`PhysicsError::ActiveBodyTeleport`] when the body is active and has
    /// already been simulated; use [`RigidBody::teleport`] instead.
    pub fn set_transform(&self, transform: PhysicsTransform) -> Result<()> {
        let mut state = self.lock();
        if state.is_active && !state.is_new {
            return Err(PhysicsError::ActiveBodyTeleport(self.id));
        }
        state.transform = transform;
        state.transform_changed = true;
        Ok(())
    }

    /// Moves the body regardless of its activity and wakes it.
    pub fn teleport(&self, transform: PhysicsTransform) {
        let mut state = self.lock();
        state.transform = transform;
        state.transform_changed = true;
        if state.mass > 0.0 {
            state.wake_requested = true;
        }
    }

    /// Mass in kilograms; zero means static.
    pub fn mass(&self) -> f32 {
        self.lock().mass
    }

    /// Sets the mass and recomputes the local inertia from the shape.
    ///
    /// A positive mass makes the body dynamic and active; zero makes it static.
    ///
    /// # Errors
    /// [`PhysicsError::InvalidConfig`] for negative or non-finite masses.
    pub fn set_mass(&self, mass: f32) -> Result<()> {
        if !(mass.is_finite() && mass >= 0.0) {
            return Err(PhysicsError::InvalidConfig(format!("body mass must be >= 0, got {mass}")));
        }
        let local_inertia = self.shape.local_inertia(mass);
        let mut state = self.lock();
        state.mass = mass;
        state.local_inertia = local_inertia;
        state.is_active = mass > 0.0;
        state.wake_requested = mass > 0.0;
        Ok(())
    }

    /// Diagonal of the local inertia tensor.
    pub fn local_inertia(&self) -> Vec3 {
        self.lock().local_inertia
    }

    /// `true` when the mass is zero.
    pub fn is_static(&self) -> bool {
        self.lock().mass == 0.0
    }

    /// `true` while the body is simulated (not sleeping, not static).
    pub fn is_active(&self) -> bool {
        self.lock().is_active
    }

    /// Linear velocity (m/s).
    pub fn linear_velocity(&self) -> Vec3 {
        self.lock().linear_velocity
    }

    /// Overrides the linear velocity and wakes the body.
    pub fn set_linear_velocity(&self, velocity: Vec3) {
        let mut state = self.lock();
        state.linear_velocity = velocity;
        state.velocity_changed = true;
        state.wake_requested = state.mass > 0.0;
    }

    /// Angular velocity (rad/s).
    pub fn angular_velocity(&self) -> Vec3 {
        self.lock().angular_velocity
    }

    /// Overrides the angular velocity and wakes the body.
    pub fn set_angular_velocity(&self, velocity: Vec3) {
        let mut state = self.lock();
        state.angular_velocity = velocity;
        state.velocity_changed = true;
        state.wake_requested = state.mass > 0.0;
    }

    /// Linear and angular damping, each clamped to `[0, 1]`.
    pub fn set_damping(&self, linear: f32, angular: f32) {
        let mut state = self.lock();
        state.linear_damping = clamp(linear, 0.0, 1.0);
        state.angular_damping = clamp(angular, 0.0, 1.0);
    }

    /// `(linear, angular)` damping.
    pub fn damping(&self) -> (f32, f32) {
        let state = self.lock();
        (state.linear_damping, state.angular_damping)
    }

    /// Per-axis linear movement mask, each component clamped to `[0, 1]`.
    pub fn set_linear_factor(&self, factor: Vec3) {
        self.lock().linear_factor = clamp_unit(&factor);
    }

    /// Per-axis angular movement mask, each component clamped to `[0, 1]`.
    pub fn set_angular_factor(&self, factor: Vec3) {
        self.lock().angular_factor = clamp_unit(&factor);
    }

    /// Restitution coefficient (clamped to `[0, 1]`).
    pub fn set_restitution(&self, restitution: f32) {
        self.lock().restitution = clamp(restitution, 0.0, 1.0);
    }

    /// Restitution coefficient.
    pub fn restitution(&self) -> f32 {
        self.lock().restitution
    }

    /// Friction coefficient (clamped to `>= 0`).
    pub fn set_friction(&self, friction: f32) {
        self.lock().friction = friction.max(0.0);
    }

    /// Friction coefficient.
    pub fn friction(&self) -> f32 {
        self.lock().friction
    }

    /// Rolling friction coefficient (clamped to `>= 0`).
    pub fn set_rolling_friction(&self, rolling_friction: f32) {
        self.lock().rolling_friction = rolling_friction.max(0.0);
    }

    /// Applies a force through the center of mass for the next step.
    pub fn apply_central_force(&self, force: Vec3) {
        let mut state = self.lock();
        state.total_force += force;
        state.wake_requested = state.mass > 0.0;
    }

    /// Applies a force at `relative_point` (world-oriented offset from the
    /// center of mass) for the next step.
    pub fn apply_force(&self, force: Vec3, relative_point: Vec3) {
        let mut state = self.lock();
        state.total_force += force;
        state.total_torque += relative_point.cross(&force);
        state.wake_requested = state.mass > 0.0;
    }

    /// Applies an instantaneous momentum through the center of mass.
    pub fn apply_central_momentum(&self, momentum: Vec3) {
        let mut state = self.lock();
        state.total_momentum += momentum;
        state.wake_requested = state.mass > 0.0;
    }

    /// Applies an instantaneous momentum at `relative_point`.
    pub fn apply_momentum(&self, momentum: Vec3, relative_point: Vec3) {
        let mut state = self.lock();
        state.total_momentum += momentum;
        state.total_angular_momentum += relative_point.cross(&momentum);
        state.wake_requested = state.mass > 0.0;
    }

    /// Applies a torque for the next step.
    pub fn apply_torque(&self, torque: Vec3) {
        let mut state = self.lock();
        state.total_torque += torque;
        state.wake_requested = state.mass > 0.0;
    }

    /// Copies user-side changes into the simulation copy.
    ///
    /// Pending forces move to the work body; pending momentum is converted to
    /// velocity immediately. Both accumulators are cleared.
    pub(crate) fn pull_into(&self, work: &mut WorkBody) {
        let mut state = self.lock();
        work.set_mass_properties(state.mass, state.local_inertia);
        work.linear_damping = state.linear_damping;
        work.angular_damping = state.angular_damping;
        work.linear_factor = state.linear_factor;
        work.angular_factor = state.angular_factor;
        work.restitution = state.restitution;
        work.friction = state.friction;
        work.rolling_friction = state.rolling_friction;

        if state.transform_changed {
            work.set_transform(state.transform);
            state.transform_changed = false;
        }
        if state.velocity_changed {
            work.linear_velocity = state.linear_velocity;
            work.angular_velocity = state.angular_velocity;
            state.velocity_changed = false;
        }
        if state.wake_requested {
            if !work.is_static() && !work.is_active() {
                trace!(body = %self.id, "woken by user change");
            }
            work.set_active(true);
            state.wake_requested = false;
        }

        work.total_force = state.total_force;
        work.total_torque = state.total_torque;
        state.total_force = Vec3::ZERO;
        state.total_torque = Vec3::ZERO;

        if !work.is_static() {
            let momentum_velocity = state.total_momentum.scale(work.inv_mass());
            let angular_velocity = work.inv_world_inertia().mul_vec(&state.total_angular_momentum);
            work.linear_velocity += momentum_velocity.mul_components(&work.linear_factor);
            work.angular_velocity += angular_velocity.mul_components(&work.angular_factor);
        }
        state.total_momentum = Vec3::ZERO;
        state.total_angular_momentum = Vec3::ZERO;
    }

    /// Publishes simulation results. Fields the user changed during the step
    /// are left alone so the next pull picks them up.
    pub(crate) fn push_from(&self, work: &WorkBody) {
        let mut state = self.lock();
        if !state.transform_changed {
            state.transform = work.transform();
        }
        if !state.velocity_changed {
            state.linear_velocity = work.linear_velocity;
            state.angular_velocity = work.angular_velocity;
        }
        if work.is_forced_static() && state.mass > 0.0 {
            state.mass = 0.0;
            state.local_inertia = Vec3::ZERO;
        }
        // A pending wake came from the user during the step.
        state.is_active = work.is_active() || (state.wake_requested && state.mass > 0.0);
        state.is_new = false;
    }

    /// Builds the initial simulation copy.
    pub(crate) fn to_work_body(&self, ccd_motion_threshold_factor: f32) -> WorkBody {
        let transform = self.transform();
        let shape = Arc::clone(&self.shape);
        let mut work = WorkBody::rigid(self.id, shape, transform, ccd_motion_threshold_factor);
        {
            let mut state = self.lock();
            // The transform is already in the work body; keep the flag from
            // re-applying it.
            state.transform_changed = false;
            state.velocity_changed = true;
            state.wake_requested = state.mass > 0.0;
        }
        self.pull_into(&mut work);
        work
    }
}

fn clamp_unit(v: &Vec3) -> Vec3 {
    Vec3::new(clamp(v.x(), 0.0, 1.0), clamp(v.y(), 0.0, 1.0), clamp(v.z(), 0.0, 1.0))
}
