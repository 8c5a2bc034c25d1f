// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! Kinematic character controller built on a ghost body.
//!
//! The character never receives impulses. Each step its controller:
//! 1. moves the ghost by the walk velocity and the vertical speed (`setup`);
//! 2. lets the narrow phase compute the ghost manifolds;
//! 3. pushes the ghost out of every penetration and derives the ground, roof
//!    and slope status from the contact normals (`process`).
//!
//! User threads steer through the shared [`PhysicsCharacter`] handle; the
//! [`CharacterController`] runs on the simulation thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

use crate::body::{BodyId, GhostBody};
use crate::config::CharacterConfig;
use crate::error::{PhysicsError, Result};
use crate::math::{Quat, Vec3};
use crate::narrow::ManifoldResult;
use crate::shape::CollisionShape;
use crate::simulation::Processable;
use crate::types::transform::PhysicsTransform;

/// Penetrations shallower than this are left alone and not counted as hits.
const MIN_RECOVERABLE_DEPTH: f32 = 0.0001;
/// A jump is still allowed this long after leaving the ground (seconds).
const MAX_TIME_IN_AIR_CONSIDERED_AS_ON_GROUND: f32 = 0.15;
/// Terminal falling speed (m/s).
const MAX_VERTICAL_SPEED: f32 = 55.0;
/// Walk speed bounds applied by the slope slowdown.
const MIN_WALK_SPEED_PERCENTAGE: f32 = 0.5;
const MAX_WALK_SPEED_PERCENTAGE: f32 = 1.0;
/// Share of each penetration corrected per step.
const RECOVER_FACTOR: f32 = 0.9;
/// Squared walk speed below which the facing is kept.
const MIN_TURN_SPEED_SQUARED: f32 = 0.001;

/// Contact status computed by the last step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CharacterStatus {
    /// Standing on a surface no steeper than the maximum slope.
    pub on_ground: bool,
    /// Touching a ceiling no steeper than the maximum slope.
    pub hit_roof: bool,
    /// Seconds since the character last stood on ground.
    pub time_in_air: f32,
    /// Rise over horizontal run of the last move; positive when climbing.
    pub slope: f32,
    /// Bodies penetrated during the last step.
    pub hits: usize,
}

/// Shared handle of a character.
#[derive(Debug)]
pub struct PhysicsCharacter {
    ghost: Arc<GhostBody>,
    mass: f32,
    jump_speed: f32,
    max_slope: f32,
    velocity: Mutex<Vec3>,
    jump_requested: AtomicBool,
    status: Mutex<CharacterStatus>,
}

impl PhysicsCharacter {
    /// Character of `shape` at `transform`.
    ///
    /// `max_slope` is the steepest walkable incline in radians.
    ///
    /// # Errors
    /// [`PhysicsError::InvalidCharacter`] unless `mass > 0`, `jump_speed >= 0`
    /// and `max_slope` lies in `(0, π/2)`.
    pub fn new(
        shape: Arc<CollisionShape>,
        transform: PhysicsTransform,
        mass: f32,
        jump_speed: f32,
        max_slope: f32,
    ) -> Result<Self> {
        if !(mass.is_finite() && mass > 0.0) {
            return Err(PhysicsError::InvalidCharacter(format!("mass must be > 0 (got {mass})")));
        }
        if !(jump_speed.is_finite() && jump_speed >= 0.0) {
            return Err(PhysicsError::InvalidCharacter(format!(
                "jump speed must be >= 0 (got {jump_speed})"
            )));
        }
        if !(max_slope > 0.0 && max_slope < std::f32::consts::FRAC_PI_2) {
            return Err(PhysicsError::InvalidCharacter(format!(
                "max slope must lie in (0, π/2) radians (got {max_slope})"
            )));
        }
        Ok(Self {
            ghost: Arc::new(GhostBody::new(shape, transform)),
            mass,
            jump_speed,
            max_slope,
            velocity: Mutex::new(Vec3::ZERO),
            jump_requested: AtomicBool::new(false),
            status: Mutex::new(CharacterStatus::default()),
        })
    }

    /// Id of the underlying ghost body.
    pub fn id(&self) -> BodyId {
        self.ghost.id()
    }

    /// Ghost body moved by the controller.
    pub fn ghost(&self) -> &Arc<GhostBody> {
        &self.ghost
    }

    /// Mass used to turn momentum into walk velocity.
    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Vertical speed given by a jump (m/s).
    pub fn jump_speed(&self) -> f32 {
        self.jump_speed
    }

    /// Steepest walkable incline (radians).
    pub fn max_slope(&self) -> f32 {
        self.max_slope
    }

    /// Current transform of the character.
    pub fn transform(&self) -> PhysicsTransform {
        self.ghost.transform()
    }

    /// Sets the walk velocity to `momentum / mass`.
    pub fn set_momentum(&self, momentum: Vec3) {
        let velocity = momentum.scale(1.0 / self.mass);
        *self.velocity.lock().unwrap_or_else(PoisonError::into_inner) = velocity;
    }

    /// Walk velocity.
    pub fn velocity(&self) -> Vec3 {
        *self.velocity.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Requests a jump, taken at the next step if the character is on or
    /// just above the ground.
    pub fn jump(&self) {
        self.jump_requested.store(true, Ordering::Relaxed);
    }

    /// Status computed by the last step.
    pub fn status(&self) -> CharacterStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_jump_request(&self) -> bool {
        self.jump_requested.swap(false, Ordering::Relaxed)
    }

    fn publish_status(&self, status: CharacterStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }
}

/// Normals of the penetrations resolved in one step.
#[derive(Debug, Clone, Copy)]
struct SignificantContacts {
    hits: usize,
    max_dot_up: f32,
    max_dot_down: f32,
}

impl SignificantContacts {
    const fn new() -> Self {
        Self { hits: 0, max_dot_up: f32::MIN, max_dot_down: f32::MIN }
    }

    /// `push` is the direction the ghost was moved out of the contact.
    fn record(&mut self, push: &Vec3) {
        self.hits += 1;
        self.max_dot_up = self.max_dot_up.max(push.y());
        self.max_dot_down = self.max_dot_down.max(-push.y());
    }
}

/// Steers one character on the simulation thread.
#[derive(Debug)]
pub struct CharacterController {
    character: Arc<PhysicsCharacter>,
    time_keep_move_in_air: f32,
    percentage_control_in_air: f32,
    initial_orientation: Quat,
    previous_position: Vec3,
    last_velocity: Vec3,
    vertical_speed: f32,
    jumping: bool,
    status: CharacterStatus,
}

impl CharacterController {
    /// Controller for `character`.
    pub fn new(character: Arc<PhysicsCharacter>, config: &CharacterConfig) -> Self {
        let transform = character.transform();
        Self {
            character,
            time_keep_move_in_air: config.time_keep_move_in_air,
            percentage_control_in_air: config.percentage_control_in_air,
            initial_orientation: transform.orientation(),
            previous_position: transform.position(),
            last_velocity: Vec3::ZERO,
            vertical_speed: 0.0,
            jumping: false,
            status: CharacterStatus::default(),
        }
    }

    /// Character driven by this controller.
    pub fn character(&self) -> &Arc<PhysicsCharacter> {
        &self.character
    }

    fn max_slope_percentage(&self) -> f32 {
        self.character.max_slope.tan()
    }

    fn walk_displacement(&mut self, velocity: &Vec3, dt: f32) -> Vec3 {
        if self.status.on_ground {
            let slowdown = (1.0 - self.status.slope / self.max_slope_percentage())
                .clamp(MIN_WALK_SPEED_PERCENTAGE, MAX_WALK_SPEED_PERCENTAGE);
            self.last_velocity = *velocity;
            velocity.scale(dt * slowdown)
        } else if self.status.time_in_air < self.time_keep_move_in_air {
            let fade = 1.0 - self.status.time_in_air / self.time_keep_move_in_air;
            let control = self.percentage_control_in_air;
            let steered = self.last_velocity.scale(1.0 - control).add(&velocity.scale(control));
            steered.scale(dt * fade)
        } else {
            self.last_velocity = Vec3::ZERO;
            Vec3::ZERO
        }
    }

    fn facing(&self, velocity: &Vec3, current: Quat) -> Quat {
        let horizontal = Vec3::new(velocity.x(), 0.0, velocity.z());
        if horizontal.length_squared() < MIN_TURN_SPEED_SQUARED {
            return current;
        }
        let yaw = horizontal.x().atan2(horizontal.z());
        Quat::from_axis_angle(Vec3::UNIT_Y, yaw).multiply(&self.initial_orientation).normalize()
    }

    /// Moves `position` out of every penetrating manifold.
    fn recover_from_penetration(
        &self,
        contacts: &[ManifoldResult],
        position: &mut Vec3,
    ) -> SignificantContacts {
        let ghost = self.character.id();
        let mut significant = SignificantContacts::new();
        for manifold in contacts {
            let sign = if manifold.body1() == ghost { -1.0 } else { 1.0 };
            let deepest = manifold
                .points()
                .iter()
                .filter(|point| point.depth() < MIN_RECOVERABLE_DEPTH)
                .min_by(|a, b| a.depth().total_cmp(&b.depth()));
            let Some(point) = deepest else {
                continue;
            };
            // Normal pointing from the ghost into the other body.
            let normal = point.normal_from_2().scale(sign);
            *position += normal.scale(point.depth() * RECOVER_FACTOR);
            significant.record(&-normal);
        }
        significant
    }

    fn compute_slope(&self, position: &Vec3) -> f32 {
        let run = Vec3::new(
            position.x() - self.previous_position.x(),
            0.0,
            position.z() - self.previous_position.z(),
        )
        .length();
        if run == 0.0 {
            return 0.0;
        }
        (position.y() - self.previous_position.y()) / run
    }
}

impl Processable for CharacterController {
    fn setup(&mut self, dt: f32, gravity: &Vec3) {
        let transform = self.character.transform();
        let mut position = transform.position();
        self.previous_position = position;

        let velocity = self.character.velocity();
        position += self.walk_displacement(&velocity, dt);

        let close_to_ground = self.status.time_in_air < MAX_TIME_IN_AIR_CONSIDERED_AS_ON_GROUND;
        if self.character.take_jump_request() && close_to_ground && !self.jumping {
            self.vertical_speed += self.character.jump_speed;
            self.status.on_ground = false;
            self.jumping = true;
        } else if self.status.on_ground && self.jumping {
            self.jumping = false;
        }

        // Resting on a single surface cancels gravity.
        if !self.status.on_ground || self.status.hits > 1 {
            self.vertical_speed = (self.vertical_speed + gravity.y() * dt).max(-MAX_VERTICAL_SPEED);
        }
        position += Vec3::new(0.0, self.vertical_speed * dt, 0.0);

        let orientation = self.facing(&velocity, transform.orientation());
        self.character.ghost.set_transform(PhysicsTransform::new(position, orientation));
    }

    fn process(&mut self, dt: f32, _gravity: &Vec3) -> Result<()> {
        let transform = self.character.transform();
        let mut position = transform.position();
        let contacts = self.character.ghost.contacts();
        let significant = self.recover_from_penetration(&contacts, &mut position);

        let max_slope = self.character.max_slope;
        let walkable = |dot: f32| significant.hits > 0 && dot.clamp(-1.0, 1.0).acos() < max_slope;
        self.status.hits = significant.hits;
        self.status.on_ground = walkable(significant.max_dot_up);
        self.status.hit_roof = walkable(significant.max_dot_down);
        self.status.time_in_air =
            if self.status.on_ground { 0.0 } else { self.status.time_in_air + dt };

        self.status.slope = 0.0;
        if self.status.on_ground {
            self.vertical_speed = 0.0;
            self.status.slope = self.compute_slope(&position);
        }
        if self.status.hit_roof {
            self.vertical_speed = 0.0;
        }

        self.character.ghost.set_transform(transform.with_position(position));
        self.character.publish_status(self.status);
        trace!(
            character = %self.character.id(),
            hits = self.status.hits,
            on_ground = self.status.on_ground,
            "character updated"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    fn character() -> Arc<PhysicsCharacter> {
        let shape = Arc::new(CollisionShape::sphere(0.5).expect("valid sphere"));
        let transform = PhysicsTransform::from_position(Vec3::new(0.0, 1.0, 0.0));
        Arc::new(PhysicsCharacter::new(shape, transform, 80.0, 5.0, 0.8).expect("valid character"))
    }

    #[test]
    fn momentum_becomes_walk_velocity() {
        let character = character();
        character.set_momentum(Vec3::new(160.0, 0.0, -80.0));
        let velocity = character.velocity();
        assert!(velocity.sub(&Vec3::new(2.0, 0.0, -1.0)).length() < 1e-6, "{velocity:?}");
    }

    #[test]
    fn out_of_range_parameters_are_rejected() {
        let shape = Arc::new(CollisionShape::sphere(0.5).expect("valid sphere"));
        let at = PhysicsTransform::identity();
        let cases = [(0.0, 1.0, 0.5), (1.0, -1.0, 0.5), (1.0, 1.0, 1.6), (1.0, 1.0, 0.0)];
        for (mass, jump, slope) in cases {
            let result = PhysicsCharacter::new(Arc::clone(&shape), at, mass, jump, slope);
            let rejected = matches!(result, Err(PhysicsError::InvalidCharacter(_)));
            assert!(rejected, "{mass} {jump} {slope}");
        }
    }

    #[test]
    fn walking_turns_the_character_to_face_its_velocity() {
        let controller = CharacterController::new(character(), &CharacterConfig::default());
        let facing = controller.facing(&Vec3::new(3.0, 0.0, 0.0), Quat::identity());
        let forward = facing.rotate(&Vec3::UNIT_Z);
        assert!(forward.sub(&Vec3::UNIT_X).length() < 1e-5, "{forward:?}");

        let still = controller.facing(&Vec3::new(0.0, -4.0, 0.0), facing);
        assert_eq!(still, facing);
    }

    #[test]
    fn air_control_fades_out() {
        let config = CharacterConfig { time_keep_move_in_air: 1.0, percentage_control_in_air: 0.5 };
        let mut controller = CharacterController::new(character(), &config);
        controller.status.on_ground = true;
        let run = Vec3::new(2.0, 0.0, 0.0);
        assert_eq!(controller.walk_displacement(&run, 0.5), Vec3::new(1.0, 0.0, 0.0));

        controller.status.on_ground = false;
        controller.status.time_in_air = 0.5;
        // Half last velocity, half new input, faded by half.
        let steer = controller.walk_displacement(&Vec3::new(0.0, 0.0, 2.0), 1.0);
        assert!(steer.sub(&Vec3::new(0.5, 0.0, 0.5)).length() < 1e-6, "{steer:?}");

        controller.status.time_in_air = 1.0;
        assert_eq!(controller.walk_displacement(&run, 1.0), Vec3::ZERO);
        assert_eq!(controller.last_velocity, Vec3::ZERO);
    }

    #[test]
    fn climbing_slows_the_walk() {
        let mut controller = CharacterController::new(character(), &CharacterConfig::default());
        controller.status.on_ground = true;
        controller.status.slope = controller.max_slope_percentage() * 0.25;
        let step = controller.walk_displacement(&Vec3::new(4.0, 0.0, 0.0), 1.0);
        assert!((step.x() - 3.0).abs() < 1e-5, "{step:?}");

        controller.status.slope = controller.max_slope_percentage() * 2.0;
        let step = controller.walk_displacement(&Vec3::new(4.0, 0.0, 0.0), 1.0);
        assert!((step.x() - 2.0).abs() < 1e-5, "{step:?}");
    }
}
