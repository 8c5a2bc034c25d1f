// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use super::{BodyHandle, BodyId, WorkBody};
use crate::narrow::ManifoldResult;

/// A queued change to the body list.
#[derive(Debug, Clone)]
pub enum BodyChange {
    /// Register a body.
    Add(BodyHandle),
    /// Unregister a body and purge every reference to it.
    Remove(BodyId),
}

/// Thread-safe queue of body-list changes, drained at step boundaries.
///
/// Producers (any thread) push under the queue mutex; the simulation thread
/// swaps the whole buffer out at the start of a step.
#[derive(Debug, Default)]
pub struct BodyQueue {
    pending: Mutex<Vec<BodyChange>>,
}

impl BodyQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a body for addition.
    pub fn add(&self, body: impl Into<BodyHandle>) {
        self.push(BodyChange::Add(body.into()));
    }

    /// Queues a body for removal.
    pub fn remove(&self, id: BodyId) {
        self.push(BodyChange::Remove(id));
    }

    /// Membership `id` will have once the queue is applied: `Some(true)`
    /// when its newest queued change adds it, `Some(false)` when it removes
    /// it, `None` when nothing about `id` is queued.
    pub fn queued_membership(&self, id: BodyId) -> Option<bool> {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.iter().rev().find_map(|change| match change {
            BodyChange::Add(handle) if handle.id() == id => Some(true),
            BodyChange::Remove(removed) if *removed == id => Some(false),
            _ => None,
        })
    }

    fn push(&self, change: BodyChange) {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).push(change);
    }

    /// Takes every queued change, oldest first.
    pub fn drain(&self) -> Vec<BodyChange> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Number of queued changes.
    pub fn len(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// `true` when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ids touched by [`BodyManager::apply_pending`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AppliedChanges {
    /// Bodies registered this step.
    pub added: Vec<BodyId>,
    /// Bodies unregistered this step.
    pub removed: Vec<BodyId>,
}

/// Owns the work bodies and the handles they mirror.
///
/// Bodies are kept in a `BTreeMap` so iteration order (and therefore pair
/// creation, island numbering and solver order) is stable across runs.
#[derive(Debug)]
pub struct BodyManager {
    queue: Arc<BodyQueue>,
    handles: BTreeMap<BodyId, BodyHandle>,
    bodies: BTreeMap<BodyId, WorkBody>,
    ccd_motion_threshold_factor: f32,
}

impl BodyManager {
    /// Creates a manager draining `queue`.
    pub fn new(queue: Arc<BodyQueue>, ccd_motion_threshold_factor: f32) -> Self {
        Self {
            queue,
            handles: BTreeMap::new(),
            bodies: BTreeMap::new(),
            ccd_motion_threshold_factor,
        }
    }

    /// Shared change queue.
    pub fn queue(&self) -> &Arc<BodyQueue> {
        &self.queue
    }

    /// Applies queued additions and removals in submission order.
    ///
    /// Adding an already-registered id and removing an unknown id are
    /// ignored with a log line.
    pub fn apply_pending(&mut self) -> AppliedChanges {
        let mut applied = AppliedChanges::default();
        for change in self.queue.drain() {
            match change {
                BodyChange::Add(handle) => {
                    let id = handle.id();
                    if self.handles.contains_key(&id) {
                        debug!(body = %id, "body already registered");
                        continue;
                    }
                    let work = match &handle {
                        BodyHandle::Rigid(body) => {
                            body.to_work_body(self.ccd_motion_threshold_factor)
                        }
                        BodyHandle::Ghost(body) => body.to_work_body(),
                    };
                    debug!(
                        body = %id,
                        ghost = work.is_ghost(),
                        static_body = work.is_static(),
                        "body added"
                    );
                    self.bodies.insert(id, work);
                    self.handles.insert(id, handle);
                    applied.removed.retain(|removed| *removed != id);
                    applied.added.push(id);
                }
                BodyChange::Remove(id) => {
                    if self.handles.remove(&id).is_none() {
                        warn!(body = %id, "remove requested for unknown body");
                        continue;
                    }
                    self.bodies.remove(&id);
                    debug!(body = %id, "body removed");
                    if let Some(pos) = applied.added.iter().position(|added| *added == id) {
                        applied.added.remove(pos);
                    } else {
                        applied.removed.push(id);
                    }
                }
            }
        }
        applied
    }

    /// Copies user-side changes of every handle into its work body.
    pub fn pull_from_handles(&mut self) {
        for (id, handle) in &self.handles {
            let Some(work) = self.bodies.get_mut(id) else {
                continue;
            };
            match handle {
                BodyHandle::Rigid(body) => body.pull_into(work),
                BodyHandle::Ghost(body) => body.pull_into(work),
            }
        }
    }

    /// Publishes work-body results to rigid handles.
    pub fn push_to_handles(&self) {
        for (id, handle) in &self.handles {
            if let (BodyHandle::Rigid(body), Some(work)) = (handle, self.bodies.get(id)) {
                body.push_from(work);
            }
        }
    }

    /// Publishes the contact manifolds of a ghost body.
    pub fn publish_ghost_contacts(&self, ghost: BodyId, contacts: Vec<ManifoldResult>) {
        if let Some(BodyHandle::Ghost(body)) = self.handles.get(&ghost) {
            body.publish_contacts(contacts);
        }
    }

    /// Work bodies ascending by id.
    pub fn bodies(&self) -> &BTreeMap<BodyId, WorkBody> {
        &self.bodies
    }

    /// Mutable work bodies.
    pub fn bodies_mut(&mut self) -> &mut BTreeMap<BodyId, WorkBody> {
        &mut self.bodies
    }

    /// Work body by id.
    pub fn body(&self, id: BodyId) -> Option<&WorkBody> {
        self.bodies.get(&id)
    }

    /// Handle by id.
    pub fn handle(&self, id: BodyId) -> Option<&BodyHandle> {
        self.handles.get(&id)
    }

    /// Number of registered bodies.
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    /// `true` when no body is registered.
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}
