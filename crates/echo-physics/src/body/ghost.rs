// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use std::sync::{Arc, Mutex, PoisonError};

use super::{BodyId, WorkBody};
use crate::narrow::ManifoldResult;
use crate::shape::CollisionShape;
use crate::types::transform::PhysicsTransform;

#[derive(Debug)]
struct GhostState {
    transform: PhysicsTransform,
    transform_changed: bool,
}

/// Body with no dynamic response that reports what it overlaps.
///
/// Ghosts own an alternate pair container in the broad phase: their pairs
/// never reach the solver. Each step the simulation runs the narrow phase on
/// those pairs and publishes the non-empty manifolds, readable through
/// [`GhostBody::contacts`] and summarised by [`GhostBody::overlapping_bodies`].
/// Used for trigger volumes and character controllers.
#[derive(Debug)]
pub struct GhostBody {
    id: BodyId,
    shape: Arc<CollisionShape>,
    state: Mutex<GhostState>,
    contacts: Mutex<Vec<ManifoldResult>>,
}

impl GhostBody {
    /// Creates a ghost at `transform`.
    pub fn new(shape: Arc<CollisionShape>, transform: PhysicsTransform) -> Self {
        Self {
            id: BodyId::next(),
            shape,
            state: Mutex::new(GhostState { transform, transform_changed: false }),
            contacts: Mutex::new(Vec::new()),
        }
    }

    /// Stable id.
    pub fn id(&self) -> BodyId {
        self.id
    }

    /// Shared collision shape.
    pub fn shape(&self) -> &Arc<CollisionShape> {
        &self.shape
    }

    /// Current transform.
    pub fn transform(&self) -> PhysicsTransform {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).transform
    }

    /// Moves the ghost. Always allowed: ghosts are positioned kinematically.
    pub fn set_transform(&self, transform: PhysicsTransform) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.transform = transform;
        state.transform_changed = true;
    }

    /// Bodies in contact with the ghost as of the last step, ascending by id.
    pub fn overlapping_bodies(&self) -> Vec<BodyId> {
        let contacts = self.contacts.lock().unwrap_or_else(PoisonError::into_inner);
        let mut bodies: Vec<BodyId> = contacts
            .iter()
            .map(|m| if m.body1() == self.id { m.body2() } else { m.body1() })
            .collect();
        bodies.sort_unstable();
        bodies.dedup();
        bodies
    }

    /// Contact manifolds of the last step.
    ///
    /// Body order inside each manifold is the collision algorithm's, so the
    /// ghost may be either body; normals point from body 2 toward body 1.
    pub fn contacts(&self) -> Vec<ManifoldResult> {
        self.contacts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn publish_contacts(&self, contacts: Vec<ManifoldResult>) {
        *self.contacts.lock().unwrap_or_else(PoisonError::into_inner) = contacts;
    }

    pub(crate) fn pull_into(&self, work: &mut WorkBody) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.transform_changed {
            work.set_transform(state.transform);
            state.transform_changed = false;
        }
    }

    pub(crate) fn to_work_body(&self) -> WorkBody {
        WorkBody::ghost(self.id, Arc::clone(&self.shape), self.transform())
    }
}
