// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use crate::math::{Vec3, EPSILON};

/// One vertex of the Minkowski difference `A - B` with the support points it
/// came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupportMapping {
    /// Support point on object A.
    pub support_a: Vec3,
    /// Support point on object B.
    pub support_b: Vec3,
    /// `support_a - support_b`.
    pub point: Vec3,
    /// Weight of this vertex in the closest point to the origin.
    pub barycentric: f32,
}

/// GJK simplex (1 to 4 vertices of the Minkowski difference).
///
/// Invariants:
/// - After every insertion the simplex is reduced to the smallest feature
///   containing its closest point to the origin; vertices with a zero
///   barycentric weight are dropped.
/// - `closest_point_to_origin == Σ barycentric_i * point_i`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Simplex {
    points: Vec<SupportMapping>,
    closest_point: Vec3,
}

impl Simplex {
    /// Empty simplex.
    pub fn new() -> Self {
        Self { points: Vec::with_capacity(4), closest_point: Vec3::ZERO }
    }

    /// Appends a vertex and reduces the simplex.
    ///
    /// A fifth vertex is ignored; a reduced simplex never holds four vertices
    /// unless it encloses the origin, at which point GJK stops.
    pub fn add_point(&mut self, support_a: Vec3, support_b: Vec3) {
        if self.points.len() >= 4 {
            return;
        }
        self.points.push(SupportMapping {
            support_a,
            support_b,
            point: support_a.sub(&support_b),
            barycentric: f32::MAX,
        });
        self.update();
    }

    /// Number of vertices.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// `true` when no vertex has been added.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Vertices in insertion order.
    pub fn points(&self) -> &[SupportMapping] {
        &self.points
    }

    /// Closest point of the simplex to the origin.
    pub fn closest_point_to_origin(&self) -> Vec3 {
        self.closest_point
    }

    /// Exact membership test on Minkowski points.
    pub fn contains_point(&self, point: &Vec3) -> bool {
        self.points.iter().any(|p| p.point == *point)
    }

    /// Closest points on A and B matching the closest point to the origin.
    pub fn closest_points(&self) -> (Vec3, Vec3) {
        self.points.iter().fold((Vec3::ZERO, Vec3::ZERO), |(a, b), p| {
            (a.add(&p.support_a.scale(p.barycentric)), b.add(&p.support_b.scale(p.barycentric)))
        })
    }

    /// Translates every support point of A by `delta_a` and of B by
    /// `delta_b`, then recomputes the closest point.
    ///
    /// Used by conservative advancement when both objects move to a later
    /// time of impact.
    pub fn shift(&mut self, delta_a: &Vec3, delta_b: &Vec3) {
        for p in &mut self.points {
            p.support_a = p.support_a.add(delta_a);
            p.support_b = p.support_b.add(delta_b);
            p.point = p.support_a.sub(&p.support_b);
        }
        if !self.points.is_empty() {
            self.update();
        }
    }

    fn update(&mut self) {
        let (closest, weights) = match self.points.as_slice() {
            [a] => (a.point, [1.0, 0.0, 0.0, 0.0]),
            [a, b] => {
                let (p, w) = closest_on_segment(&a.point, &b.point);
                (p, [w[0], w[1], 0.0, 0.0])
            }
            [a, b, c] => {
                let (p, w) = closest_on_triangle(&a.point, &b.point, &c.point);
                (p, [w[0], w[1], w[2], 0.0])
            }
            [a, b, c, d] => closest_on_tetrahedron(&a.point, &b.point, &c.point, &d.point),
            _ => return,
        };
        self.closest_point = closest;
        for (p, w) in self.points.iter_mut().zip(weights) {
            p.barycentric = w;
        }
        if self.points.len() > 1 {
            let mut index = self.points.len();
            while index > 0 {
                index -= 1;
                if self.points[index].barycentric == 0.0 && self.points.len() > 1 {
                    self.points.remove(index);
                }
            }
        }
    }
}

/// Closest point to the origin on segment `ab` with weights `(wa, wb)`.
pub(crate) fn closest_on_segment(a: &Vec3, b: &Vec3) -> (Vec3, [f32; 2]) {
    let ab = b.sub(a);
    let len_sq = ab.length_squared();
    if len_sq <= EPSILON * EPSILON {
        return (*a, [1.0, 0.0]);
    }
    let t = -a.dot(&ab) / len_sq;
    if t <= 0.0 {
        (*a, [1.0, 0.0])
    } else if t >= 1.0 {
        (*b, [0.0, 1.0])
    } else {
        (a.add(&ab.scale(t)), [1.0 - t, t])
    }
}

/// Closest point to the origin on triangle `abc` with barycentric weights.
///
/// Voronoi-region walk; degenerate (collinear) triangles fall back to the
/// best of their edges.
pub(crate) fn closest_on_triangle(a: &Vec3, b: &Vec3, c: &Vec3) -> (Vec3, [f32; 3]) {
    let ab = b.sub(a);
    let ac = c.sub(a);
    let ap = a.scale(-1.0);
    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return (*a, [1.0, 0.0, 0.0]);
    }

    let bp = b.scale(-1.0);
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return (*b, [0.0, 1.0, 0.0]);
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 && d1 - d3 != 0.0 {
        let v = d1 / (d1 - d3);
        return (a.add(&ab.scale(v)), [1.0 - v, v, 0.0]);
    }

    let cp = c.scale(-1.0);
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return (*c, [0.0, 0.0, 1.0]);
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 && d2 - d6 != 0.0 {
        let w = d2 / (d2 - d6);
        return (a.add(&ac.scale(w)), [1.0 - w, 0.0, w]);
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 && (d4 - d3) + (d5 - d6) != 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return (b.add(&c.sub(b).scale(w)), [0.0, 1.0 - w, w]);
    }

    let sum = va + vb + vc;
    if sum.abs() <= f32::MIN_POSITIVE {
        return closest_on_degenerate_triangle(a, b, c);
    }
    let denom = 1.0 / sum;
    let v = vb * denom;
    let w = vc * denom;
    (a.add(&ab.scale(v)).add(&ac.scale(w)), [1.0 - v - w, v, w])
}

fn closest_on_degenerate_triangle(a: &Vec3, b: &Vec3, c: &Vec3) -> (Vec3, [f32; 3]) {
    let (p_ab, w_ab) = closest_on_segment(a, b);
    let (p_bc, w_bc) = closest_on_segment(b, c);
    let (p_ac, w_ac) = closest_on_segment(a, c);
    let candidates = [
        (p_ab, [w_ab[0], w_ab[1], 0.0]),
        (p_bc, [0.0, w_bc[0], w_bc[1]]),
        (p_ac, [w_ac[0], 0.0, w_ac[1]]),
    ];
    candidates
        .into_iter()
        .min_by(|x, y| x.0.length_squared().total_cmp(&y.0.length_squared()))
        .unwrap_or((*a, [1.0, 0.0, 0.0]))
}

fn triple(a: &Vec3, b: &Vec3, c: &Vec3) -> f32 {
    a.dot(&b.cross(c))
}

/// Closest point to the origin on tetrahedron `abcd` with barycentric weights.
///
/// Returns the origin itself (with volume weights) when it lies inside.
pub(crate) fn closest_on_tetrahedron(a: &Vec3, b: &Vec3, c: &Vec3, d: &Vec3) -> (Vec3, [f32; 4]) {
    let volume = triple(&b.sub(a), &c.sub(a), &d.sub(a));

    // (face vertex indices, opposite vertex index)
    const FACES: [([usize; 3], usize); 4] =
        [([0, 1, 2], 3), ([0, 2, 3], 1), ([0, 3, 1], 2), ([1, 3, 2], 0)];
    let vertices = [*a, *b, *c, *d];

    let mut best: Option<(Vec3, [f32; 4], f32)> = None;
    let mut outside_any = false;
    for (face, opposite) in FACES {
        let [i, j, k] = face;
        let (p0, p1, p2) = (vertices[i], vertices[j], vertices[k]);
        let normal = p1.sub(&p0).cross(&p2.sub(&p0));
        let origin_side = normal.dot(&p0.scale(-1.0));
        let opposite_side = normal.dot(&vertices[opposite].sub(&p0));
        let outside = origin_side * opposite_side < 0.0 || volume.abs() <= EPSILON * EPSILON;
        if !outside {
            continue;
        }
        outside_any = true;
        let (point, w) = closest_on_triangle(&p0, &p1, &p2);
        let dist = point.length_squared();
        if best.as_ref().map_or(true, |(_, _, best_dist)| dist < *best_dist) {
            let mut weights = [0.0; 4];
            weights[i] = w[0];
            weights[j] = w[1];
            weights[k] = w[2];
            best = Some((point, weights, dist));
        }
    }

    if !outside_any {
        let origin = Vec3::ZERO;
        let wb = triple(&origin.sub(a), &c.sub(a), &d.sub(a)) / volume;
        let wc = triple(&b.sub(a), &origin.sub(a), &d.sub(a)) / volume;
        let wd = triple(&b.sub(a), &c.sub(a), &origin.sub(a)) / volume;
        return (origin, [1.0 - wb - wc - wd, wb, wc, wd]);
    }
    best.map_or((*a, [1.0, 0.0, 0.0, 0.0]), |(point, weights, _)| (point, weights))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: &Vec3, b: &Vec3) -> bool {
        a.distance_squared(b) < 1e-10
    }

    #[test]
    fn segment_interior_projection() {
        let (p, w) = closest_on_segment(&Vec3::new(-1.0, 1.0, 0.0), &Vec3::new(1.0, 1.0, 0.0));
        assert!(approx(&p, &Vec3::new(0.0, 1.0, 0.0)));
        assert!((w[0] - 0.5).abs() < 1e-6 && (w[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn triangle_vertex_region_drops_other_weights() {
        let (p, w) = closest_on_triangle(
            &Vec3::new(1.0, 1.0, 0.0),
            &Vec3::new(2.0, 1.0, 0.0),
            &Vec3::new(1.0, 2.0, 0.0),
        );
        assert!(approx(&p, &Vec3::new(1.0, 1.0, 0.0)));
        assert_eq!(w, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn triangle_face_region() {
        let (p, w) = closest_on_triangle(
            &Vec3::new(-1.0, -1.0, 1.0),
            &Vec3::new(1.0, -1.0, 1.0),
            &Vec3::new(0.0, 1.0, 1.0),
        );
        assert!(approx(&p, &Vec3::new(0.0, 0.0, 1.0)));
        assert!((w.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn tetrahedron_containing_origin_returns_origin() {
        let (p, w) = closest_on_tetrahedron(
            &Vec3::new(1.0, 1.0, 1.0),
            &Vec3::new(-1.0, -1.0, 1.0),
            &Vec3::new(-1.0, 1.0, -1.0),
            &Vec3::new(1.0, -1.0, -1.0),
        );
        assert_eq!(p, Vec3::ZERO);
        for weight in w {
            assert!((weight - 0.25).abs() < 1e-5, "weight {weight}");
        }
    }

    #[test]
    fn simplex_reduces_to_nearest_vertex() {
        let mut simplex = Simplex::new();
        simplex.add_point(Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO);
        simplex.add_point(Vec3::new(3.0, 0.0, 0.0), Vec3::ZERO);
        assert_eq!(simplex.len(), 1);
        assert_eq!(simplex.closest_point_to_origin(), Vec3::new(1.0, 0.0, 0.0));
        let (a, b) = simplex.closest_points();
        assert_eq!(a, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(b, Vec3::ZERO);
    }

    #[test]
    fn shift_moves_closest_point() {
        let mut simplex = Simplex::new();
        simplex.add_point(Vec3::new(2.0, 0.0, 0.0), Vec3::ZERO);
        simplex.shift(&Vec3::new(-1.0, 0.0, 0.0), &Vec3::ZERO);
        assert_eq!(simplex.closest_point_to_origin(), Vec3::new(1.0, 0.0, 0.0));
    }
}
