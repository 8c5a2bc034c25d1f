// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use crate::error::{PhysicsError, Result};
use crate::math::Vec3;
use crate::types::{aabb::Aabb, ray::Ray};

use super::TriangleShape;

/// Query interface of shapes made of many triangles.
///
/// Triangles are materialised per query; nothing is cached between calls.
/// Boxes and rays are expressed in the shape's local frame.
pub trait ConcaveShape {
    /// Triangles whose bounds may overlap `local_aabb`.
    fn find_triangles_in_aabb(&self, local_aabb: &Aabb) -> Vec<TriangleShape>;

    /// Triangles that may be crossed by `local_ray`.
    fn find_triangles_hit_by_ray(&self, local_ray: &Ray) -> Vec<TriangleShape> {
        let (from, to) = (local_ray.from(), local_ray.to());
        let aabb = Aabb::new(from.min(&to), from.max(&to));
        self.find_triangles_in_aabb(&aabb)
    }
}

/// Heightfield over a regular grid.
///
/// Invariants:
/// - `vertices.len() == x_len * z_len`, row-major: `vertices[x + x_len * z]`.
/// - X strictly increases along a row, Z strictly increases across rows, and
///   spacing is uniform on each axis.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightfieldShape {
    vertices: Vec<Vec3>,
    x_len: usize,
    z_len: usize,
    local_aabb: Aabb,
}

impl HeightfieldShape {
    /// Validates the grid and precomputes the local bounds.
    ///
    /// # Errors
    /// [`PhysicsError::InvalidShape`] when the buffer size does not match
    /// `x_len * z_len`, when either dimension is below two, or when the grid
    /// spacing is not positive.
    pub fn new(vertices: Vec<Vec3>, x_len: usize, z_len: usize) -> Result<Self> {
        if x_len < 2 || z_len < 2 || vertices.len() != x_len * z_len {
            return Err(PhysicsError::InvalidShape(format!(
                "heightfield needs a {x_len}x{z_len} grid of at least 2x2, got {} vertices",
                vertices.len()
            )));
        }
        if vertices[1].x() <= vertices[0].x() || vertices[x_len].z() <= vertices[0].z() {
            return Err(PhysicsError::InvalidShape(
                "heightfield spacing must be positive on X and Z".into(),
            ));
        }
        let (min_y, max_y) = vertices
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(v.y()), hi.max(v.y())));
        let extent_y = min_y.abs().max(max_y.abs());
        let local_aabb = Aabb::new(
            Vec3::new(vertices[0].x(), -extent_y, vertices[0].z()),
            Vec3::new(vertices[x_len - 1].x(), extent_y, vertices[vertices.len() - 1].z()),
        );
        Ok(Self { vertices, x_len, z_len, local_aabb })
    }

    /// Grid vertices.
    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    /// Vertices per row.
    pub fn x_len(&self) -> usize {
        self.x_len
    }

    /// Number of rows.
    pub fn z_len(&self) -> usize {
        self.z_len
    }

    /// Bounds in the local frame; the Y range is symmetric around zero.
    pub fn local_aabb(&self) -> Aabb {
        self.local_aabb
    }

    /// Cell index range `[start, end)` covering `[min, max]` on one axis.
    fn cell_range(&self, min: f32, max: f32, along_x: bool) -> (usize, usize) {
        let first = self.vertices[0];
        let (origin, spacing, cells) = if along_x {
            (first.x(), self.vertices[1].x() - first.x(), self.x_len - 1)
        } else {
            (first.z(), self.vertices[self.x_len].z() - first.z(), self.z_len - 1)
        };
        let to_index = |value: f32| -> usize {
            let raw = ((value - origin) / spacing).floor();
            raw.clamp(0.0, cells as f32) as usize
        };
        (to_index(min), (to_index(max) + 1).min(cells))
    }

    fn push_cell_triangles(
        &self,
        x: usize,
        z: usize,
        min_y: f32,
        max_y: f32,
        out: &mut Vec<TriangleShape>,
    ) {
        let far_left = self.vertices[x + self.x_len * z];
        let far_right = self.vertices[x + 1 + self.x_len * z];
        let near_left = self.vertices[x + self.x_len * (z + 1)];
        let near_right = self.vertices[x + 1 + self.x_len * (z + 1)];

        let diagonal_above = far_right.y() > min_y || near_left.y() > min_y;
        let diagonal_below = far_right.y() < max_y || near_left.y() < max_y;

        let in_band = |corner: &Vec3| {
            (corner.y() > min_y || diagonal_above) && (corner.y() < max_y || diagonal_below)
        };
        if in_band(&far_left) {
            out.push(TriangleShape::new(far_left, near_left, far_right));
        }
        if in_band(&near_right) {
            out.push(TriangleShape::new(far_right, near_left, near_right));
        }
    }
}

impl ConcaveShape for HeightfieldShape {
    fn find_triangles_in_aabb(&self, local_aabb: &Aabb) -> Vec<TriangleShape> {
        let (x_start, x_end) = self.cell_range(local_aabb.min().x(), local_aabb.max().x(), true);
        let (z_start, z_end) = self.cell_range(local_aabb.min().z(), local_aabb.max().z(), false);
        let (min_y, max_y) = (local_aabb.min().y(), local_aabb.max().y());
        let mut triangles = Vec::new();
        for z in z_start..z_end {
            for x in x_start..x_end {
                self.push_cell_triangles(x, z, min_y, max_y, &mut triangles);
            }
        }
        triangles
    }
}

/// Triangle soup with no connectivity.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleMeshShape {
    triangles: Vec<[Vec3; 3]>,
    local_aabb: Aabb,
}

impl TriangleMeshShape {
    /// Builds a mesh from local-space triangles.
    ///
    /// # Errors
    /// [`PhysicsError::InvalidShape`] when `triangles` is empty or holds a
    /// non-finite vertex.
    pub fn new(triangles: Vec<[Vec3; 3]>) -> Result<Self> {
        let points: Vec<Vec3> = triangles.iter().flatten().copied().collect();
        if points.iter().any(|p| !p.is_finite()) {
            return Err(PhysicsError::InvalidShape("triangle mesh vertices must be finite".into()));
        }
        let local_aabb = Aabb::from_points(&points).ok_or_else(|| {
            PhysicsError::InvalidShape("triangle mesh needs at least one triangle".into())
        })?;
        Ok(Self { triangles, local_aabb })
    }

    /// Triangles in the local frame.
    pub fn triangles(&self) -> &[[Vec3; 3]] {
        &self.triangles
    }

    /// Bounds in the local frame.
    pub fn local_aabb(&self) -> Aabb {
        self.local_aabb
    }
}

impl ConcaveShape for TriangleMeshShape {
    fn find_triangles_in_aabb(&self, local_aabb: &Aabb) -> Vec<TriangleShape> {
        self.triangles
            .iter()
            .filter(|t| {
                Aabb::from_points(t.as_slice()).is_some_and(|bounds| bounds.overlaps(local_aabb))
            })
            .map(|[a, b, c]| TriangleShape::new(*a, *b, *c))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn flat_grid(n: usize, spacing: f32) -> HeightfieldShape {
        let half = (n - 1) as f32 * spacing / 2.0;
        let mut vertices = Vec::new();
        for z in 0..n {
            for x in 0..n {
                vertices.push(Vec3::new(x as f32 * spacing - half, 0.0, z as f32 * spacing - half));
            }
        }
        HeightfieldShape::new(vertices, n, n).unwrap()
    }

    #[test]
    fn heightfield_rejects_mismatched_buffer() {
        let err = HeightfieldShape::new(vec![Vec3::ZERO; 5], 2, 2).unwrap_err();
        assert!(matches!(err, PhysicsError::InvalidShape(_)));
    }

    #[test]
    fn heightfield_returns_two_triangles_per_touched_cell() {
        let field = flat_grid(5, 1.0);
        let query = Aabb::new(Vec3::new(-0.5, -0.1, -0.5), Vec3::new(0.5, 0.1, 0.5));
        // x and z each cover cells 1..3 (two cells), so 2 * 2 * 2 triangles.
        assert_eq!(field.find_triangles_in_aabb(&query).len(), 8);
    }

    #[test]
    fn heightfield_skips_cells_above_query() {
        let field = flat_grid(3, 1.0);
        let query = Aabb::new(Vec3::new(-1.0, 1.0, -1.0), Vec3::new(1.0, 2.0, 1.0));
        assert!(field.find_triangles_in_aabb(&query).is_empty());
    }

    #[test]
    fn mesh_filters_by_bounds() {
        let mesh = TriangleMeshShape::new(vec![
            [Vec3::ZERO, Vec3::UNIT_X, Vec3::UNIT_Z],
            [Vec3::new(10.0, 0.0, 0.0), Vec3::new(11.0, 0.0, 0.0), Vec3::new(10.0, 0.0, 1.0)],
        ])
        .unwrap();
        let query = Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5));
        assert_eq!(mesh.find_triangles_in_aabb(&query).len(), 1);
    }
}
