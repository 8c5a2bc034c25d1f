// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use std::sync::Arc;

use super::BodyId;
use crate::math::{Mat3, Vec3};
use crate::shape::CollisionShape;
use crate::types::{aabb::Aabb, transform::PhysicsTransform};

/// Simulation-owned copy of a body.
///
/// Only the simulation thread touches work bodies. Flags obey:
/// - a static body is never active (`set_active(true)` is ignored);
/// - making a body static deactivates it and zeroes its velocities;
/// - ghosts are never static and always active.
#[derive(Debug, Clone)]
pub struct WorkBody {
    id: BodyId,
    ghost: bool,
    shape: Arc<CollisionShape>,
    transform: PhysicsTransform,
    pub(crate) linear_velocity: Vec3,
    pub(crate) angular_velocity: Vec3,
    pub(crate) push_velocity: Vec3,
    pub(crate) turn_velocity: Vec3,
    mass: f32,
    inv_mass: f32,
    inv_local_inertia: Vec3,
    inv_world_inertia: Mat3,
    pub(crate) linear_damping: f32,
    pub(crate) angular_damping: f32,
    pub(crate) linear_factor: Vec3,
    pub(crate) angular_factor: Vec3,
    pub(crate) restitution: f32,
    pub(crate) friction: f32,
    pub(crate) rolling_friction: f32,
    pub(crate) total_force: Vec3,
    pub(crate) total_torque: Vec3,
    ccd_motion_threshold: f32,
    is_static: bool,
    forced_static: bool,
    is_active: bool,
    moved: bool,
}

impl WorkBody {
    pub(crate) fn rigid(
        id: BodyId,
        shape: Arc<CollisionShape>,
        transform: PhysicsTransform,
        ccd_motion_threshold_factor: f32,
    ) -> Self {
        let ccd_motion_threshold =
            2.0 * shape.min_distance_to_center() * ccd_motion_threshold_factor;
        Self {
            id,
            ghost: false,
            shape,
            transform,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            push_velocity: Vec3::ZERO,
            turn_velocity: Vec3::ZERO,
            mass: 0.0,
            inv_mass: 0.0,
            inv_local_inertia: Vec3::ZERO,
            inv_world_inertia: Mat3::zero(),
            linear_damping: 0.0,
            angular_damping: 0.0,
            linear_factor: Vec3::ONE,
            angular_factor: Vec3::ONE,
            restitution: 0.0,
            friction: 0.0,
            rolling_friction: 0.0,
            total_force: Vec3::ZERO,
            total_torque: Vec3::ZERO,
            ccd_motion_threshold,
            is_static: true,
            forced_static: false,
            is_active: false,
            moved: false,
        }
    }

    pub(crate) fn ghost(
        id: BodyId,
        shape: Arc<CollisionShape>,
        transform: PhysicsTransform,
    ) -> Self {
        let mut body = Self::rigid(id, shape, transform, 0.0);
        body.ghost = true;
        body.is_static = false;
        body.is_active = true;
        body.ccd_motion_threshold = f32::INFINITY;
        body
    }

    /// Body id.
    pub fn id(&self) -> BodyId {
        self.id
    }

    /// `true` for ghost bodies.
    pub fn is_ghost(&self) -> bool {
        self.ghost
    }

    /// Collision shape.
    pub fn shape(&self) -> &Arc<CollisionShape> {
        &self.shape
    }

    /// Current transform.
    pub fn transform(&self) -> PhysicsTransform {
        self.transform
    }

    /// Replaces the transform and refreshes the world inverse inertia.
    pub fn set_transform(&mut self, transform: PhysicsTransform) {
        self.transform = transform;
        self.moved = true;
        self.refresh_world_inertia();
    }

    /// Reports and clears whether the transform changed since the last call.
    pub(crate) fn take_moved(&mut self) -> bool {
        std::mem::replace(&mut self.moved, false)
    }

    /// Linear velocity.
    pub fn linear_velocity(&self) -> Vec3 {
        self.linear_velocity
    }

    /// Angular velocity.
    pub fn angular_velocity(&self) -> Vec3 {
        self.angular_velocity
    }

    /// Mass (zero for static bodies and ghosts).
    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Inverse mass; zero when the body must not receive impulses.
    pub fn inv_mass(&self) -> f32 {
        self.inv_mass
    }

    /// Inverse inertia tensor in world space.
    pub fn inv_world_inertia(&self) -> Mat3 {
        self.inv_world_inertia
    }

    /// Per-step translation above which CCD runs for this body.
    pub fn ccd_motion_threshold(&self) -> f32 {
        self.ccd_motion_threshold
    }

    /// `true` for static bodies.
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// `true` once [`WorkBody::make_static`] demoted the body.
    pub(crate) fn is_forced_static(&self) -> bool {
        self.forced_static
    }

    /// `true` while simulated.
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Activates or deactivates the body. Ignored for static bodies and ghosts.
    pub fn set_active(&mut self, active: bool) {
        if self.is_static || self.ghost {
            return;
        }
        self.is_active = active;
    }

    /// Turns the body static for good: inactive, zero velocities, infinite
    /// mass. Later mass changes on the handle are ignored.
    pub fn make_static(&mut self) {
        if self.ghost {
            return;
        }
        self.forced_static = true;
        self.become_static();
    }

    fn become_static(&mut self) {
        self.is_static = true;
        self.is_active = false;
        self.mass = 0.0;
        self.inv_mass = 0.0;
        self.inv_local_inertia = Vec3::ZERO;
        self.inv_world_inertia = Mat3::zero();
        self.linear_velocity = Vec3::ZERO;
        self.angular_velocity = Vec3::ZERO;
        self.push_velocity = Vec3::ZERO;
        self.turn_velocity = Vec3::ZERO;
    }

    pub(crate) fn set_mass_properties(&mut self, mass: f32, local_inertia: Vec3) {
        if self.ghost || self.forced_static {
            return;
        }
        let was_static = self.is_static;
        self.mass = mass;
        self.is_static = mass <= 0.0;
        if self.is_static {
            self.become_static();
            return;
        }
        if was_static {
            self.is_active = true;
        }
        self.inv_mass = 1.0 / mass;
        self.inv_local_inertia = Vec3::new(
            inverse_or_zero(local_inertia.x()),
            inverse_or_zero(local_inertia.y()),
            inverse_or_zero(local_inertia.z()),
        );
        self.refresh_world_inertia();
    }

    fn refresh_world_inertia(&mut self) {
        let rotation = self.transform.orientation_matrix();
        self.inv_world_inertia = rotation
            .multiply(&Mat3::from_diagonal(&self.inv_local_inertia))
            .multiply(&rotation.transpose());
    }

    /// World AABB at the current transform.
    pub fn aabb(&self) -> Aabb {
        self.shape.aabb(&self.transform)
    }

    /// Velocity of the material point at world offset `r` from the center of mass.
    pub fn velocity_at(&self, r: &Vec3) -> Vec3 {
        self.linear_velocity.add(&self.angular_velocity.cross(r))
    }

    /// Transform reached by integrating the current velocities over `dt`.
    pub fn predicted_transform(&self, dt: f32) -> PhysicsTransform {
        self.transform.integrate(&self.linear_velocity, &self.angular_velocity, dt)
    }

    /// Moves the body by its velocities plus the solver's penetration
    /// recovery pseudo velocities, which are consumed.
    pub(crate) fn integrate_transform(&mut self, dt: f32) {
        let linear = self.linear_velocity.add(&self.push_velocity);
        let angular = self.angular_velocity.add(&self.turn_velocity);
        self.push_velocity = Vec3::ZERO;
        self.turn_velocity = Vec3::ZERO;
        let next = self.transform.integrate(&linear, &angular, dt);
        self.set_transform(next);
    }
}

fn inverse_or_zero(value: f32) -> f32 {
    if value > 0.0 {
        1.0 / value
    } else {
        0.0
    }
}
