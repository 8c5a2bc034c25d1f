// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use crate::math::Vec3;

/// Column-major 3×3 matrix used for orientations and world inertia tensors.
///
/// Element `(row, col)` lives at index `col * 3 + row`. Columns of a rotation
/// matrix are the rotated basis axes.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Mat3 {
    data: [f32; 9],
}

impl Default for Mat3 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mat3 {
    /// Creates a matrix from column-major data.
    pub const fn new(data: [f32; 9]) -> Self {
        Self { data }
    }

    /// Identity matrix.
    pub const fn identity() -> Self {
        Self::new([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0])
    }

    /// Zero matrix.
    pub const fn zero() -> Self {
        Self::new([0.0; 9])
    }

    /// Diagonal matrix built from `diagonal`.
    pub fn from_diagonal(diagonal: &Vec3) -> Self {
        Self::new([
            diagonal.x(),
            0.0,
            0.0,
            0.0,
            diagonal.y(),
            0.0,
            0.0,
            0.0,
            diagonal.z(),
        ])
    }

    /// Returns the underlying column-major array.
    pub fn to_array(self) -> [f32; 9] {
        self.data
    }

    /// Element at `(row, col)`.
    pub fn at(&self, row: usize, col: usize) -> f32 {
        self.data[col * 3 + row]
    }

    /// Column `col` as a vector.
    pub fn column(&self, col: usize) -> Vec3 {
        Vec3::new(
            self.data[col * 3],
            self.data[col * 3 + 1],
            self.data[col * 3 + 2],
        )
    }

    /// Transposed matrix.
    pub fn transpose(&self) -> Self {
        let mut out = [0.0; 9];
        for row in 0..3 {
            for col in 0..3 {
                out[row * 3 + col] = self.at(row, col);
            }
        }
        Self::new(out)
    }

    /// Matrix product `self * rhs`.
    pub fn multiply(&self, rhs: &Self) -> Self {
        let mut out = [0.0; 9];
        for col in 0..3 {
            for row in 0..3 {
                out[col * 3 + row] = (0..3).map(|k| self.at(row, k) * rhs.at(k, col)).sum();
            }
        }
        Self::new(out)
    }

    /// Matrix-vector product `self * v`.
    pub fn mul_vec(&self, v: &Vec3) -> Vec3 {
        self.column(0)
            .scale(v.x())
            .add(&self.column(1).scale(v.y()))
            .add(&self.column(2).scale(v.z()))
    }

    /// Matrix with every element replaced by its absolute value.
    ///
    /// `abs(R) * half_extents` gives the world half extents of an oriented box.
    pub fn abs(&self) -> Self {
        Self::new(self.data.map(f32::abs))
    }
}

impl core::ops::Mul for Mat3 {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        self.multiply(&rhs)
    }
}
