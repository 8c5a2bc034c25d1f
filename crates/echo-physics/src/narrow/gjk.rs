// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use tracing::warn;

use super::simplex::Simplex;
use crate::config::NarrowPhaseConfig;
use crate::math::Vec3;
use crate::shape::ConvexObject;

/// Termination parameters of the distance query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GjkSettings {
    /// Iterations before the result is declared invalid.
    pub max_iteration: u32,
    /// Tolerance relative to the squared closest distance.
    pub relative_tolerance: f32,
    /// Lower bound of the absolute tolerance.
    pub minimum_tolerance: f32,
    /// Growth of the minimum tolerance multiplier per iteration.
    pub percentage_increase: f32,
}

impl From<&NarrowPhaseConfig> for GjkSettings {
    fn from(config: &NarrowPhaseConfig) -> Self {
        Self {
            max_iteration: config.gjk_max_iteration,
            relative_tolerance: config.gjk_relative_termination_tolerance,
            minimum_tolerance: config.gjk_minimum_termination_tolerance,
            percentage_increase: config.gjk_percentage_increase_of_minimum_tolerance,
        }
    }
}

impl Default for GjkSettings {
    fn default() -> Self {
        Self::from(&NarrowPhaseConfig::default())
    }
}

/// Outcome of a GJK query.
#[derive(Debug, Clone, PartialEq)]
pub enum GjkResult {
    /// The objects overlap; the simplex encloses (or touches) the origin and
    /// seeds EPA.
    Collide {
        /// Final simplex.
        simplex: Simplex,
    },
    /// The objects are separated.
    NoCollide {
        /// Final simplex.
        simplex: Simplex,
        /// Distance between the two objects.
        distance: f32,
    },
    /// Iteration limit reached without convergence.
    Invalid,
}

impl GjkResult {
    /// `true` for [`GjkResult::Collide`].
    pub fn is_collide(&self) -> bool {
        matches!(self, Self::Collide { .. })
    }

    /// Closest points `(on A, on B)` for separated objects.
    pub fn closest_points(&self) -> Option<(Vec3, Vec3)> {
        match self {
            Self::NoCollide { simplex, .. } => Some(simplex.closest_points()),
            _ => None,
        }
    }
}

/// Runs GJK on the Minkowski difference `a - b`.
///
/// `include_margin` selects whether the objects' margins are part of the
/// tested volumes.
pub fn gjk(
    a: &ConvexObject,
    b: &ConvexObject,
    include_margin: bool,
    settings: &GjkSettings,
) -> GjkResult {
    let initial_direction = Vec3::UNIT_X;
    let initial_a = a.support_point(&initial_direction, include_margin);
    let initial_b = b.support_point(&initial_direction.scale(-1.0), include_margin);

    let mut simplex = Simplex::new();
    simplex.add_point(initial_a, initial_b);
    let mut direction = simplex.closest_point_to_origin().scale(-1.0);

    let mut tolerance_multiplier = 1.0_f32;
    for _ in 0..settings.max_iteration {
        let support_a = a.support_point(&direction, include_margin);
        let support_b = b.support_point(&direction.scale(-1.0), include_margin);
        let new_point = support_a.sub(&support_b);

        let closest = direction.scale(-1.0);
        let closest_sq = closest.length_squared();
        let closest_dot_new = closest.dot(&new_point);

        let tolerance = (settings.minimum_tolerance * tolerance_multiplier)
            .max(settings.relative_tolerance * closest_sq);
        if closest_sq - closest_dot_new <= tolerance || simplex.contains_point(&new_point) {
            if closest_dot_new <= 0.0 {
                return GjkResult::Collide { simplex };
            }
            return GjkResult::NoCollide { simplex, distance: closest_sq.sqrt() };
        }

        simplex.add_point(support_a, support_b);
        direction = simplex.closest_point_to_origin().scale(-1.0);
        tolerance_multiplier += settings.percentage_increase;
    }

    warn!(max_iteration = settings.max_iteration, "GJK reached its iteration limit");
    GjkResult::Invalid
}
