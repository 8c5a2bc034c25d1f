// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Error type shared by the physics core.
//!
//! Only configuration and usage failures surface as errors. Numerical edge
//! cases (degenerate simplex, zero-length vectors, zero mass) are absorbed
//! locally by skipping the contact or substituting a safe default.

use thiserror::Error;

use crate::body::BodyId;
use crate::shape::ShapeKind;

/// Errors produced by the physics core.
#[derive(Debug, Error)]
pub enum PhysicsError {
    /// The collision dispatch table has no entry for a shape-kind pair.
    #[error("no collision algorithm registered for {first:?} vs {second:?}")]
    MissingAlgorithm {
        /// Shape kind of the first body.
        first: ShapeKind,
        /// Shape kind of the second body.
        second: ShapeKind,
    },
    /// A configuration value is out of range or not finite.
    #[error("invalid physics configuration: {0}")]
    InvalidConfig(String),
    /// A shape was built from degenerate data (non-positive size, empty buffer).
    #[error("invalid collision shape: {0}")]
    InvalidShape(String),
    /// The requested operation needs a convex shape.
    #[error("shape kind {0:?} is not convex")]
    NotConvex(ShapeKind),
    /// The operation is not supported by this shape kind.
    #[error("operation not supported by shape kind {0:?}")]
    UnsupportedShapeOperation(ShapeKind),
    /// `PhysicsWorld::start` was called while the simulation thread runs.
    #[error("physics thread is already started")]
    AlreadyStarted,
    /// An active body was teleported without acknowledgement.
    #[error("cannot set the transform of active body {0} directly; use `teleport`")]
    ActiveBodyTeleport(BodyId),
    /// The body id is not registered with the simulation.
    #[error("unknown body {0}")]
    UnknownBody(BodyId),
    /// Character parameters out of range.
    #[error("invalid character: {0}")]
    InvalidCharacter(String),
    /// The simulation thread panicked; the payload message is preserved.
    #[error("physics thread panicked: {0}")]
    SimulationPanicked(String),
    /// A processable or a step on the simulation thread returned an error.
    #[error("physics step failed: {0}")]
    SimulationFailed(String),
    /// The simulation thread could not be spawned.
    #[error("failed to spawn physics thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),
}

/// Convenience alias for results returned by the physics core.
pub type Result<T> = core::result::Result<T, PhysicsError>;
