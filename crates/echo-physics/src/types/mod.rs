// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Core geometry types used by the physics pipeline (transform, AABB, ray).
//!
//! Notes:
//! - Overlap semantics are inclusive on faces to avoid pair churn on contact
//!   boundaries.
//! - Transforms are rigid (no scale); shapes are scaled once at construction
//!   through `CollisionShape::scale`.

#[doc = "Axis-aligned bounding boxes (world space)."]
pub mod aabb;
#[doc = "Line segments used by ray queries."]
pub mod ray;
#[doc = "Rigid transforms (position + orientation)."]
pub mod transform;
