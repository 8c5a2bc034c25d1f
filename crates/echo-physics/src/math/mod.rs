// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Linear algebra primitives for the physics core: vectors, quaternions and
//! 3×3 matrices.
//!
//! All operations use `f32`.

mod mat3;
mod quat;
mod vec3;

pub use mat3::Mat3;
pub use quat::Quat;
pub use vec3::Vec3;

/// Global epsilon used by math routines when detecting degenerate values.
pub const EPSILON: f32 = 1e-6;

/// Clamps `value` to the inclusive `[min, max]` range.
///
/// # Panics
/// Panics if `min > max`.
pub fn clamp(value: f32, min: f32, max: f32) -> f32 {
    assert!(min <= max, "invalid clamp range: {min} > {max}");
    value.max(min).min(max)
}
