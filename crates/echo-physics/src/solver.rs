// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! Sequential impulse contact solver.
//!
//! Sign conventions (matching [`ManifoldResult`]):
//! - `n` points from body 2 toward body 1.
//! - Normal relative velocity is `(v1 - v2) · n`; negative while approaching.
//! - Accumulated normal impulses are non-negative: contacts push, never pull.
//!   An impulse `λ n` is added to body 1 and subtracted from body 2.
//!
//! Contacts with a positive depth are skipped unless predictive. Predictive
//! contacts are speculative: they allow closing speed up to `depth / dt`, so
//! the body arrives at the hit point by the end of the step.
//!
//! Penetration is resolved with split impulses: a second set of pseudo
//! velocities pushes bodies apart during the position update and is then
//! discarded, so an inelastic contact leaves no separating velocity behind.

use std::collections::BTreeMap;

use tracing::{instrument, trace};

use crate::body::{BodyId, WorkBody};
use crate::config::ConstraintSolverConfig;
use crate::math::{clamp, Mat3, Vec3, EPSILON};
use crate::narrow::{AccumulatedImpulse, ManifoldContactPoint, ManifoldResult};

/// Velocity state of one body while solving. Bodies that must not move get
/// zero inverse mass and inertia.
#[derive(Debug, Clone)]
struct SolverBody {
    id: BodyId,
    position: Vec3,
    inv_mass: f32,
    inv_inertia: Mat3,
    linear_factor: Vec3,
    angular_factor: Vec3,
    linear_velocity: Vec3,
    angular_velocity: Vec3,
    friction: f32,
    rolling_friction: f32,
    restitution: f32,
    push_velocity: Vec3,
    turn_velocity: Vec3,
    writable: bool,
}

impl SolverBody {
    fn from_work(body: &WorkBody) -> Self {
        let writable =
            body.is_active() && !body.is_static() && !body.is_ghost() && body.inv_mass() > 0.0;
        Self {
            id: body.id(),
            position: body.transform().position(),
            inv_mass: if writable { body.inv_mass() } else { 0.0 },
            inv_inertia: if writable { body.inv_world_inertia() } else { Mat3::zero() },
            linear_factor: body.linear_factor,
            angular_factor: body.angular_factor,
            linear_velocity: body.linear_velocity(),
            angular_velocity: body.angular_velocity(),
            friction: body.friction,
            rolling_friction: body.rolling_friction,
            restitution: body.restitution,
            push_velocity: Vec3::ZERO,
            turn_velocity: Vec3::ZERO,
            writable,
        }
    }

    fn velocity_at(&self, r: &Vec3) -> Vec3 {
        self.linear_velocity.add(&self.angular_velocity.cross(r))
    }

    fn apply_impulse(&mut self, impulse: &Vec3, r: &Vec3) {
        let linear = impulse.mul_components(&self.linear_factor);
        self.linear_velocity += linear.scale(self.inv_mass);
        self.angular_velocity +=
            self.inv_inertia.mul_vec(&r.cross(&linear)).mul_components(&self.angular_factor);
    }

    fn push_velocity_at(&self, r: &Vec3) -> Vec3 {
        self.push_velocity.add(&self.turn_velocity.cross(r))
    }

    fn apply_push_impulse(&mut self, impulse: &Vec3, r: &Vec3) {
        let linear = impulse.mul_components(&self.linear_factor);
        self.push_velocity += linear.scale(self.inv_mass);
        self.turn_velocity +=
            self.inv_inertia.mul_vec(&r.cross(&linear)).mul_components(&self.angular_factor);
    }

    fn apply_angular_impulse(&mut self, impulse: &Vec3) {
        self.angular_velocity +=
            self.inv_inertia.mul_vec(impulse).mul_components(&self.angular_factor);
    }
}

/// Precomputed data of one contact point.
#[derive(Debug, Clone)]
struct ContactConstraint {
    manifold: usize,
    point: usize,
    body1: usize,
    body2: usize,
    r1: Vec3,
    r2: Vec3,
    normal: Vec3,
    tangents: [Vec3; 2],
    normal_mass: f32,
    tangent_mass: [f32; 2],
    rolling_axis: Vec3,
    rolling_mass: f32,
    friction: f32,
    rolling_friction: f32,
    target_velocity: f32,
    penetration_bias: f32,
    accumulated: AccumulatedImpulse,
    rolling_impulse: f32,
    push_impulse: f32,
}

/// Sequential impulse solver over the contacts of one step.
#[derive(Debug, Clone)]
pub struct ConstraintSolver {
    iterations: u32,
    bias_factor: f32,
    allowed_penetration: f32,
    use_warm_starting: bool,
    restitution_velocity_threshold: f32,
}

impl ConstraintSolver {
    /// Solver using the configured iteration count and biases.
    pub fn new(config: &ConstraintSolverConfig) -> Self {
        Self {
            iterations: config.iterations,
            bias_factor: config.bias_factor,
            allowed_penetration: config.allowed_penetration,
            use_warm_starting: config.use_warm_starting,
            restitution_velocity_threshold: config.restitution_velocity_threshold,
        }
    }

    /// Solves every contact of `manifolds`, writes the new velocities and
    /// penetration-recovery pseudo velocities of the active dynamic bodies,
    /// and stores the accumulated impulses back in the manifold points.
    /// Returns the number of solved contacts.
    #[instrument(level = "trace", skip(self, bodies, manifolds))]
    pub fn solve(
        &self,
        dt: f32,
        bodies: &mut BTreeMap<BodyId, WorkBody>,
        manifolds: &mut [ManifoldResult],
    ) -> usize {
        let mut solver_bodies: Vec<SolverBody> = Vec::new();
        let mut slots: BTreeMap<BodyId, usize> = BTreeMap::new();
        let mut slot_of = |id: BodyId, solver_bodies: &mut Vec<SolverBody>| -> Option<usize> {
            if let Some(slot) = slots.get(&id) {
                return Some(*slot);
            }
            let body = bodies.get(&id)?;
            solver_bodies.push(SolverBody::from_work(body));
            slots.insert(id, solver_bodies.len() - 1);
            Some(solver_bodies.len() - 1)
        };

        let mut constraints = Vec::new();
        for (manifold_index, manifold) in manifolds.iter().enumerate() {
            let (Some(body1), Some(body2)) = (
                slot_of(manifold.body1(), &mut solver_bodies),
                slot_of(manifold.body2(), &mut solver_bodies),
            ) else {
                continue;
            };
            if !solver_bodies[body1].writable && !solver_bodies[body2].writable {
                continue;
            }
            for (point_index, point) in manifold.points().iter().enumerate() {
                if point.depth() > 0.0 && !point.is_predictive() {
                    continue;
                }
                if let Some(constraint) = self.setup_constraint(
                    dt,
                    (manifold_index, point_index),
                    (body1, body2),
                    &solver_bodies,
                    point,
                ) {
                    constraints.push(constraint);
                }
            }
        }

        if self.use_warm_starting {
            for constraint in &constraints {
                let impulse = constraint
                    .normal
                    .scale(constraint.accumulated.normal)
                    .add(&constraint.tangents[0].scale(constraint.accumulated.tangent[0]))
                    .add(&constraint.tangents[1].scale(constraint.accumulated.tangent[1]));
                apply_pair_impulse(&mut solver_bodies, constraint, &impulse);
            }
        } else {
            for constraint in &mut constraints {
                constraint.accumulated = AccumulatedImpulse::default();
            }
        }

        for _ in 0..self.iterations {
            // Friction first: non-penetration gets the last word.
            for constraint in &mut constraints {
                solve_tangents(&mut solver_bodies, constraint);
                solve_rolling(&mut solver_bodies, constraint);
            }
            for constraint in &mut constraints {
                solve_normal(&mut solver_bodies, constraint);
            }
            for constraint in &mut constraints {
                solve_penetration(&mut solver_bodies, constraint);
            }
        }

        for constraint in &constraints {
            let points = manifolds[constraint.manifold].points_mut();
            if let Some(point) = points.get_mut(constraint.point) {
                point.set_accumulated_impulse(constraint.accumulated);
            }
        }
        for solver_body in solver_bodies.iter().filter(|body| body.writable) {
            if let Some(body) = bodies.get_mut(&solver_body.id) {
                body.linear_velocity = solver_body.linear_velocity;
                body.angular_velocity = solver_body.angular_velocity;
                body.push_velocity = solver_body.push_velocity;
                body.turn_velocity = solver_body.turn_velocity;
            }
        }
        trace!(contacts = constraints.len(), bodies = solver_bodies.len(), "constraints solved");
        constraints.len()
    }

    fn setup_constraint(
        &self,
        dt: f32,
        (manifold, point_index): (usize, usize),
        (body1, body2): (usize, usize),
        solver_bodies: &[SolverBody],
        point: &ManifoldContactPoint,
    ) -> Option<ContactConstraint> {
        let b1 = &solver_bodies[body1];
        let b2 = &solver_bodies[body2];
        let normal = point.normal_from_2();
        let contact = point.point_on_2();
        let r1 = contact.sub(&b1.position);
        let r2 = contact.sub(&b2.position);

        let normal_mass = inverse_effective_mass(b1, b2, &r1, &r2, &normal)?;
        let tangent1 = normal.any_perpendicular().normalize();
        let tangent2 = normal.cross(&tangent1);
        let tangent_mass = [
            inverse_effective_mass(b1, b2, &r1, &r2, &tangent1).unwrap_or(0.0),
            inverse_effective_mass(b1, b2, &r1, &r2, &tangent2).unwrap_or(0.0),
        ];

        let relative_angular = b1.angular_velocity.sub(&b2.angular_velocity);
        let rolling_axis = relative_angular.normalize();
        let rolling_denominator = rolling_axis.dot(&b1.inv_inertia.mul_vec(&rolling_axis))
            + rolling_axis.dot(&b2.inv_inertia.mul_vec(&rolling_axis));
        let rolling_mass =
            if rolling_denominator > EPSILON { 1.0 / rolling_denominator } else { 0.0 };

        let inv_dt = if dt > 0.0 { 1.0 / dt } else { 0.0 };
        let normal_velocity = b1.velocity_at(&r1).sub(&b2.velocity_at(&r2)).dot(&normal);
        let depth = point.depth();
        let (target_velocity, penetration_bias) = if depth > 0.0 {
            (-depth * inv_dt, 0.0)
        } else {
            let restitution = if -normal_velocity > self.restitution_velocity_threshold {
                -b1.restitution.max(b2.restitution) * normal_velocity
            } else {
                0.0
            };
            let excess = (-depth - self.allowed_penetration).max(0.0);
            (restitution, self.bias_factor * inv_dt * excess)
        };

        Some(ContactConstraint {
            manifold,
            point: point_index,
            body1,
            body2,
            r1,
            r2,
            normal,
            tangents: [tangent1, tangent2],
            normal_mass,
            tangent_mass,
            rolling_axis,
            rolling_mass,
            friction: (b1.friction * b2.friction).sqrt(),
            rolling_friction: (b1.rolling_friction * b2.rolling_friction).sqrt(),
            target_velocity,
            penetration_bias,
            accumulated: point.accumulated_impulse(),
            rolling_impulse: 0.0,
            push_impulse: 0.0,
        })
    }
}

/// `1 / (m1⁻¹ + m2⁻¹ + d · ((I1⁻¹ (r1 × d)) × r1 + (I2⁻¹ (r2 × d)) × r2))`, or
/// `None` when neither body can respond along `direction`.
fn inverse_effective_mass(
    b1: &SolverBody,
    b2: &SolverBody,
    r1: &Vec3,
    r2: &Vec3,
    direction: &Vec3,
) -> Option<f32> {
    let angular1 = b1.inv_inertia.mul_vec(&r1.cross(direction)).cross(r1);
    let angular2 = b2.inv_inertia.mul_vec(&r2.cross(direction)).cross(r2);
    let denominator = b1.inv_mass + b2.inv_mass + angular1.add(&angular2).dot(direction);
    if denominator > EPSILON {
        Some(1.0 / denominator)
    } else {
        None
    }
}

fn pair_mut(
    bodies: &mut [SolverBody],
    a: usize,
    b: usize,
) -> Option<(&mut SolverBody, &mut SolverBody)> {
    match a.cmp(&b) {
        core::cmp::Ordering::Less => {
            let (low, high) = bodies.split_at_mut(b);
            Some((&mut low[a], &mut high[0]))
        }
        core::cmp::Ordering::Greater => {
            let (low, high) = bodies.split_at_mut(a);
            Some((&mut high[0], &mut low[b]))
        }
        core::cmp::Ordering::Equal => None,
    }
}

fn apply_pair_impulse(bodies: &mut [SolverBody], constraint: &ContactConstraint, impulse: &Vec3) {
    if let Some((b1, b2)) = pair_mut(bodies, constraint.body1, constraint.body2) {
        b1.apply_impulse(impulse, &constraint.r1);
        b2.apply_impulse(&-*impulse, &constraint.r2);
    }
}

fn relative_velocity(bodies: &[SolverBody], constraint: &ContactConstraint) -> Vec3 {
    bodies[constraint.body1]
        .velocity_at(&constraint.r1)
        .sub(&bodies[constraint.body2].velocity_at(&constraint.r2))
}

fn solve_normal(bodies: &mut [SolverBody], constraint: &mut ContactConstraint) {
    let normal_velocity = relative_velocity(bodies, constraint).dot(&constraint.normal);
    let lambda = (constraint.target_velocity - normal_velocity) * constraint.normal_mass;
    let previous = constraint.accumulated.normal;
    constraint.accumulated.normal = (previous + lambda).max(0.0);
    let applied = constraint.accumulated.normal - previous;
    apply_pair_impulse(bodies, constraint, &constraint.normal.scale(applied));
}

/// Drives the pseudo velocities toward the penetration bias. Runs on its own
/// accumulator so the real velocities never see the correction.
fn solve_penetration(bodies: &mut [SolverBody], constraint: &mut ContactConstraint) {
    if constraint.penetration_bias <= 0.0 {
        return;
    }
    let Some((b1, b2)) = pair_mut(bodies, constraint.body1, constraint.body2) else {
        return;
    };
    let push_velocity = b1
        .push_velocity_at(&constraint.r1)
        .sub(&b2.push_velocity_at(&constraint.r2))
        .dot(&constraint.normal);
    let lambda = (constraint.penetration_bias - push_velocity) * constraint.normal_mass;
    let previous = constraint.push_impulse;
    constraint.push_impulse = (previous + lambda).max(0.0);
    let impulse = constraint.normal.scale(constraint.push_impulse - previous);
    b1.apply_push_impulse(&impulse, &constraint.r1);
    b2.apply_push_impulse(&-impulse, &constraint.r2);
}

fn solve_tangents(bodies: &mut [SolverBody], constraint: &mut ContactConstraint) {
    let max_friction = constraint.friction * constraint.accumulated.normal;
    for axis in 0..2 {
        let tangent = constraint.tangents[axis];
        let tangent_velocity = relative_velocity(bodies, constraint).dot(&tangent);
        let lambda = -tangent_velocity * constraint.tangent_mass[axis];
        let previous = constraint.accumulated.tangent[axis];
        constraint.accumulated.tangent[axis] =
            clamp(previous + lambda, -max_friction, max_friction);
        let applied = constraint.accumulated.tangent[axis] - previous;
        apply_pair_impulse(bodies, constraint, &tangent.scale(applied));
    }
}

fn solve_rolling(bodies: &mut [SolverBody], constraint: &mut ContactConstraint) {
    if constraint.rolling_friction <= 0.0 || constraint.rolling_mass <= 0.0 {
        return;
    }
    let Some((b1, b2)) = pair_mut(bodies, constraint.body1, constraint.body2) else {
        return;
    };
    let spin = b1.angular_velocity.sub(&b2.angular_velocity).dot(&constraint.rolling_axis);
    let limit = constraint.rolling_friction * constraint.accumulated.normal;
    let previous = constraint.rolling_impulse;
    constraint.rolling_impulse = clamp(previous - spin * constraint.rolling_mass, -limit, limit);
    let impulse = constraint.rolling_axis.scale(constraint.rolling_impulse - previous);
    b1.apply_angular_impulse(&impulse);
    b2.apply_angular_impulse(&-impulse);
}
