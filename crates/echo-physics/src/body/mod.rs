// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! Bodies: user-facing handles and the simulation-owned work copies.
//!
//! Two layers exist for every body:
//! - A *handle* ([`RigidBody`], [`GhostBody`]) shared through `Arc` with user
//!   code. Its mutable fields sit behind a per-body mutex.
//! - A [`WorkBody`] owned by the simulation. It is synchronised with its
//!   handle at the start of a step (pull) and at the end (push), under the
//!   handle's lock.
//!
//! Body lifecycle: `New → Active ⇄ Sleeping → Deleted`. Additions and removals
//! are queued in a [`BodyQueue`] and applied at the next step boundary.

mod ghost;
mod manager;
mod rigid;
mod work;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub use ghost::GhostBody;
pub use manager::{AppliedChanges, BodyChange, BodyManager, BodyQueue};
pub use rigid::RigidBody;
pub use work::WorkBody;

static NEXT_BODY_ID: AtomicU32 = AtomicU32::new(1);

/// Stable identity of a body.
///
/// # Invariants
/// - Ids are process-unique and never reused.
/// - Zero is never issued.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct BodyId(u32);

impl BodyId {
    pub(crate) fn next() -> Self {
        Self(NEXT_BODY_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Constructs a `BodyId` from a raw value (tests and tooling).
    #[must_use]
    pub const fn from_raw(value: u32) -> Self {
        Self(value)
    }

    /// Returns the underlying raw value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl core::fmt::Display for BodyId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "body#{}", self.0)
    }
}

/// Shared handle to any body kind.
#[derive(Debug, Clone)]
pub enum BodyHandle {
    /// Dynamic or static rigid body.
    Rigid(Arc<RigidBody>),
    /// Ghost body (overlap reporting only).
    Ghost(Arc<GhostBody>),
}

impl BodyHandle {
    /// Id of the underlying body.
    pub fn id(&self) -> BodyId {
        match self {
            Self::Rigid(body) => body.id(),
            Self::Ghost(body) => body.id(),
        }
    }
}

impl From<Arc<RigidBody>> for BodyHandle {
    fn from(body: Arc<RigidBody>) -> Self {
        Self::Rigid(body)
    }
}

impl From<Arc<GhostBody>> for BodyHandle {
    fn from(body: Arc<GhostBody>) -> Self {
        Self::Ghost(body)
    }
}
