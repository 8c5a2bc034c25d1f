// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use crate::error::{PhysicsError, Result};
use crate::shape::ShapeKind;

/// Concrete collision routine chosen for a pair of shape kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmKind {
    /// Closed-form sphere against sphere.
    SphereSphere,
    /// Closed-form sphere against box.
    SphereBox,
    /// GJK distance with EPA penetration fallback.
    ConvexConvex,
    /// Recurses over the children of a compound shape.
    CompoundAny,
    /// Recurses over the triangles of a concave shape near the other object.
    ConcaveAny,
}

/// Algorithm plus whether it expects the objects in reverse order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlgorithmSelection {
    /// Routine to run.
    pub kind: AlgorithmKind,
    /// `true` when the routine takes (object2, object1).
    pub swapped: bool,
}

/// Declares that `kind` handles every `(first, second)` combination.
///
/// The mirrored combinations are covered by the same routine run swapped.
#[derive(Debug, Clone, Copy)]
pub struct AlgorithmRegistration {
    /// Routine to register.
    pub kind: AlgorithmKind,
    /// Shape kinds accepted as object 1.
    pub first: &'static [ShapeKind],
    /// Shape kinds accepted as object 2.
    pub second: &'static [ShapeKind],
}

const CONVEX: &[ShapeKind] = &[
    ShapeKind::Sphere,
    ShapeKind::Box,
    ShapeKind::Capsule,
    ShapeKind::Cylinder,
    ShapeKind::Cone,
    ShapeKind::ConvexHull,
    ShapeKind::Triangle,
];
const CONCAVE: &[ShapeKind] = &[ShapeKind::Heightfield, ShapeKind::TriangleMesh];

/// Registrations of the built-in routines, highest precedence first.
pub const DEFAULT_REGISTRATIONS: &[AlgorithmRegistration] = &[
    AlgorithmRegistration {
        kind: AlgorithmKind::SphereSphere,
        first: &[ShapeKind::Sphere],
        second: &[ShapeKind::Sphere],
    },
    AlgorithmRegistration {
        kind: AlgorithmKind::SphereBox,
        first: &[ShapeKind::Sphere],
        second: &[ShapeKind::Box],
    },
    AlgorithmRegistration {
        kind: AlgorithmKind::ConcaveAny,
        first: CONCAVE,
        second: &ShapeKind::ALL,
    },
    AlgorithmRegistration {
        kind: AlgorithmKind::CompoundAny,
        first: &[ShapeKind::Compound],
        second: &ShapeKind::ALL,
    },
    AlgorithmRegistration { kind: AlgorithmKind::ConvexConvex, first: CONVEX, second: CONVEX },
];

/// Shape-kind × shape-kind dispatch table.
///
/// Invariants:
/// - Every cell is populated; construction fails otherwise.
/// - `select(a, b)` and `select(b, a)` name the same routine with opposite
///   `swapped` flags, except on the diagonal.
#[derive(Debug, Clone)]
pub struct AlgorithmSelector {
    table: [[AlgorithmSelection; ShapeKind::COUNT]; ShapeKind::COUNT],
}

impl AlgorithmSelector {
    /// Selector over the built-in routines.
    ///
    /// # Errors
    /// Never fails for the built-in registrations; see [`Self::from_registrations`].
    pub fn new() -> Result<Self> {
        Self::from_registrations(DEFAULT_REGISTRATIONS)
    }

    /// Builds the table from `registrations`; earlier entries win on overlap.
    ///
    /// # Errors
    /// [`PhysicsError::MissingAlgorithm`] naming the first empty cell.
    pub fn from_registrations(registrations: &[AlgorithmRegistration]) -> Result<Self> {
        let mut cells: [[Option<AlgorithmSelection>; ShapeKind::COUNT]; ShapeKind::COUNT] =
            [[None; ShapeKind::COUNT]; ShapeKind::COUNT];
        for registration in registrations {
            for first in registration.first {
                for second in registration.second {
                    let kind = registration.kind;
                    cells[first.index()][second.index()]
                        .get_or_insert(AlgorithmSelection { kind, swapped: false });
                    cells[second.index()][first.index()]
                        .get_or_insert(AlgorithmSelection { kind, swapped: true });
                }
            }
        }

        let placeholder = AlgorithmSelection { kind: AlgorithmKind::ConvexConvex, swapped: false };
        let mut table = [[placeholder; ShapeKind::COUNT]; ShapeKind::COUNT];
        for first in ShapeKind::ALL {
            for second in ShapeKind::ALL {
                table[first.index()][second.index()] = cells[first.index()][second.index()]
                    .ok_or(PhysicsError::MissingAlgorithm { first, second })?;
            }
        }
        Ok(Self { table })
    }

    /// Routine for objects of kinds `(first, second)`.
    pub fn select(&self, first: ShapeKind, second: ShapeKind) -> AlgorithmSelection {
        self.table[first.index()][second.index()]
    }
}
