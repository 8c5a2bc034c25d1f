// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Physics tunables and the storage port used to load them.
//!
//! [`PhysicsConfig`] groups every recognised tunable. Missing fields fall back
//! to their defaults, so a partial JSON document is a valid configuration.
//! [`ConfigService`] serializes values as JSON and delegates raw storage to a
//! [`ConfigStore`] (the filesystem adapter lives in `echo-physics-config-fs`).

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::error::PhysicsError;

/// Key under which the physics configuration is stored.
pub const PHYSICS_CONFIG_KEY: &str = "physics";

/// Complete physics configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Narrow-phase tolerances and iteration limits.
    pub narrow_phase: NarrowPhaseConfig,
    /// Broad-phase selection and margins.
    pub broad_phase: BroadPhaseConfig,
    /// Sequential impulse solver parameters.
    pub constraint_solver: ConstraintSolverConfig,
    /// Sleeping thresholds.
    pub island: IslandConfig,
    /// Shape margin and CCD trigger policy.
    pub collision_shape: CollisionShapeConfig,
    /// Character controller air control.
    pub character: CharacterConfig,
}

/// Narrow-phase tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrowPhaseConfig {
    /// Distance below which contact points are created and kept (metres).
    pub contact_breaking_threshold: f32,
    /// Maximum GJK iterations before the result is declared invalid.
    pub gjk_max_iteration: u32,
    /// GJK termination tolerance relative to the squared closest distance.
    pub gjk_relative_termination_tolerance: f32,
    /// Lower bound of the GJK termination tolerance.
    pub gjk_minimum_termination_tolerance: f32,
    /// Growth of the minimum tolerance per GJK iteration.
    pub gjk_percentage_increase_of_minimum_tolerance: f32,
    /// Maximum EPA expansions.
    pub epa_max_iteration: u32,
    /// Relative EPA convergence tolerance.
    pub epa_termination_tolerance: f32,
    /// Maximum conservative-advancement iterations.
    pub gjk_continuous_collision_max_iteration: u32,
    /// Squared-distance tolerance ending conservative advancement.
    pub gjk_continuous_collision_termination_tolerance: f32,
    /// Capacity hint for per-pair algorithm storage.
    pub algorithm_pool_size: usize,
}

impl Default for NarrowPhaseConfig {
    fn default() -> Self {
        Self {
            contact_breaking_threshold: 0.02,
            gjk_max_iteration: 50,
            gjk_relative_termination_tolerance: 1.0e-4,
            gjk_minimum_termination_tolerance: 1.0e-4,
            gjk_percentage_increase_of_minimum_tolerance: 0.05,
            epa_max_iteration: 50,
            epa_termination_tolerance: 0.01,
            gjk_continuous_collision_max_iteration: 50,
            gjk_continuous_collision_termination_tolerance: 1.0e-4,
            algorithm_pool_size: 4096,
        }
    }
}

/// Broad-phase implementation selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BroadPhaseKind {
    /// Incremental sweep-and-prune over three sorted endpoint arrays.
    #[default]
    SweepAndPrune,
    /// Dynamic AABB tree with fat leaves.
    AabbTree,
}

/// Broad-phase tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadPhaseConfig {
    /// Which broad phase the simulation builds.
    pub kind: BroadPhaseKind,
    /// Extra margin of AABB-tree leaves so slow bodies do not reinsert every step.
    pub aabb_tree_fat_margin: f32,
    /// Active bodies whose AABB falls entirely below this height become static.
    pub world_min_y: f32,
}

impl Default for BroadPhaseConfig {
    fn default() -> Self {
        Self {
            kind: BroadPhaseKind::SweepAndPrune,
            aabb_tree_fat_margin: 0.2,
            world_min_y: -1000.0,
        }
    }
}

/// Constraint-solver tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintSolverConfig {
    /// Gauss-Seidel iterations per step.
    pub iterations: u32,
    /// Fraction of the penetration beyond `allowed_penetration` removed per
    /// step. The correction moves positions only and never adds velocity.
    pub bias_factor: f32,
    /// Penetration depth left uncorrected so resting contacts persist (metres).
    pub allowed_penetration: f32,
    /// Seed the solver with last step's accumulated impulses.
    pub use_warm_starting: bool,
    /// Closing speed above which restitution applies (m/s).
    pub restitution_velocity_threshold: f32,
}

impl Default for ConstraintSolverConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            bias_factor: 0.3,
            allowed_penetration: 0.005,
            use_warm_starting: true,
            restitution_velocity_threshold: 1.0,
        }
    }
}

/// Island sleeping thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IslandConfig {
    /// Linear speed below which a body counts as resting (m/s).
    pub linear_sleeping_threshold: f32,
    /// Angular speed below which a body counts as resting (rad/s).
    pub angular_sleeping_threshold: f32,
}

impl Default for IslandConfig {
    fn default() -> Self {
        Self { linear_sleeping_threshold: 0.3, angular_sleeping_threshold: 0.3 }
    }
}

/// Collision-shape tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionShapeConfig {
    /// Default inner margin subtracted from polyhedral and round shapes.
    pub inner_margin: f32,
    /// Cap on the inner margin as a fraction of the smallest shape dimension.
    pub maximum_margin_percentage: f32,
    /// CCD triggers when per-step motion exceeds
    /// `2 * min_distance_to_center * ccd_motion_threshold_factor`.
    pub ccd_motion_threshold_factor: f32,
}

impl Default for CollisionShapeConfig {
    fn default() -> Self {
        Self {
            inner_margin: 0.04,
            maximum_margin_percentage: 0.3,
            ccd_motion_threshold_factor: 0.4,
        }
    }
}

/// Character controller tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterConfig {
    /// Seconds after leaving the ground during which the walk velocity still
    /// moves the character, fading linearly to nothing.
    pub time_keep_move_in_air: f32,
    /// Share of the walk velocity the user steers while airborne.
    pub percentage_control_in_air: f32,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self { time_keep_move_in_air: 0.8, percentage_control_in_air: 0.4 }
    }
}

impl PhysicsConfig {
    /// Checks every value for range and finiteness.
    ///
    /// # Errors
    /// Returns [`PhysicsError::InvalidConfig`] naming the first offending key.
    pub fn validate(&self) -> Result<(), PhysicsError> {
        let np = &self.narrow_phase;
        non_negative("narrow_phase.contact_breaking_threshold", np.contact_breaking_threshold)?;
        positive(
            "narrow_phase.gjk_relative_termination_tolerance",
            np.gjk_relative_termination_tolerance,
        )?;
        positive(
            "narrow_phase.gjk_minimum_termination_tolerance",
            np.gjk_minimum_termination_tolerance,
        )?;
        non_negative(
            "narrow_phase.gjk_percentage_increase_of_minimum_tolerance",
            np.gjk_percentage_increase_of_minimum_tolerance,
        )?;
        positive("narrow_phase.epa_termination_tolerance", np.epa_termination_tolerance)?;
        positive(
            "narrow_phase.gjk_continuous_collision_termination_tolerance",
            np.gjk_continuous_collision_termination_tolerance,
        )?;
        at_least_one("narrow_phase.gjk_max_iteration", np.gjk_max_iteration)?;
        at_least_one("narrow_phase.epa_max_iteration", np.epa_max_iteration)?;
        at_least_one(
            "narrow_phase.gjk_continuous_collision_max_iteration",
            np.gjk_continuous_collision_max_iteration,
        )?;

        non_negative("broad_phase.aabb_tree_fat_margin", self.broad_phase.aabb_tree_fat_margin)?;
        if self.broad_phase.world_min_y.is_nan() {
            return Err(PhysicsError::InvalidConfig("broad_phase.world_min_y is NaN".into()));
        }

        let cs = &self.constraint_solver;
        at_least_one("constraint_solver.iterations", cs.iterations)?;
        unit_interval("constraint_solver.bias_factor", cs.bias_factor)?;
        non_negative("constraint_solver.allowed_penetration", cs.allowed_penetration)?;
        non_negative(
            "constraint_solver.restitution_velocity_threshold",
            cs.restitution_velocity_threshold,
        )?;

        non_negative("island.linear_sleeping_threshold", self.island.linear_sleeping_threshold)?;
        non_negative("island.angular_sleeping_threshold", self.island.angular_sleeping_threshold)?;

        let shape = &self.collision_shape;
        non_negative("collision_shape.inner_margin", shape.inner_margin)?;
        unit_interval(
            "collision_shape.maximum_margin_percentage",
            shape.maximum_margin_percentage,
        )?;
        positive("collision_shape.ccd_motion_threshold_factor", shape.ccd_motion_threshold_factor)?;

        let character = &self.character;
        non_negative("character.time_keep_move_in_air", character.time_keep_move_in_air)?;
        unit_interval("character.percentage_control_in_air", character.percentage_control_in_air)?;
        Ok(())
    }
}

fn non_negative(key: &str, value: f32) -> Result<(), PhysicsError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(PhysicsError::InvalidConfig(format!("{key} must be finite and >= 0 (got {value})")))
    }
}

fn positive(key: &str, value: f32) -> Result<(), PhysicsError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(PhysicsError::InvalidConfig(format!("{key} must be finite and > 0 (got {value})")))
    }
}

fn unit_interval(key: &str, value: f32) -> Result<(), PhysicsError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PhysicsError::InvalidConfig(format!("{key} must lie in [0, 1] (got {value})")))
    }
}

fn at_least_one(key: &str, value: u32) -> Result<(), PhysicsError> {
    if value >= 1 {
        Ok(())
    } else {
        Err(PhysicsError::InvalidConfig(format!("{key} must be >= 1")))
    }
}

/// Storage port for raw config blobs (keyed by logical name).
pub trait ConfigStore {
    /// Load a raw config blob. Returns `NotFound` when missing.
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError>;
    /// Persist a raw config blob.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError>;
}

/// Error type for config operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Key not present in store.
    #[error("not found")]
    NotFound,
    /// I/O error while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization/deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Loaded values failed validation.
    #[error("invalid config: {0}")]
    Invalid(#[from] PhysicsError),
    /// Catch-all error variant.
    #[error("other: {0}")]
    Other(String),
}

/// Thin service that serializes config values and delegates storage to a `ConfigStore`.
pub struct ConfigService<S> {
    store: S,
}

impl<S> ConfigService<S> {
    /// Create a new service using the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Consume the service and return the inner store.
    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S> ConfigService<S>
where
    S: ConfigStore,
{
    /// Load and deserialize a config value for `key`. Returns `Ok(None)` if missing.
    pub fn load<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: DeserializeOwned,
    {
        match self.store.load_raw(key) {
            Ok(bytes) => {
                if bytes.is_empty() {
                    return Ok(None);
                }
                let value = serde_json::from_slice(&bytes)?;
                Ok(Some(value))
            }
            Err(ConfigError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Serialize and persist a config value for `key`.
    pub fn save<T>(&self, key: &str, value: &T) -> Result<(), ConfigError>
    where
        T: Serialize,
    {
        let data = serde_json::to_vec_pretty(value)?;
        self.store.save_raw(key, &data)
    }

    /// Loads the physics configuration, falling back to defaults when absent.
    ///
    /// # Errors
    /// Propagates store and JSON failures, and returns
    /// [`ConfigError::Invalid`] when the stored values fail validation.
    pub fn load_physics(&self) -> Result<PhysicsConfig, ConfigError> {
        let config: PhysicsConfig = self.load(PHYSICS_CONFIG_KEY)?.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }
}
