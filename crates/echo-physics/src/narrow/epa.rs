// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use tracing::{trace, warn};

use super::gjk::GjkResult;
use super::simplex::closest_on_triangle;
use crate::config::NarrowPhaseConfig;
use crate::math::{Quat, Vec3, EPSILON};
use crate::shape::ConvexObject;

/// Termination parameters of the penetration query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpaSettings {
    /// Polytope expansions before the best face so far is accepted.
    pub max_iteration: u32,
    /// Relative gap between the lower and upper depth bounds that ends the search.
    pub termination_tolerance: f32,
}

impl From<&NarrowPhaseConfig> for EpaSettings {
    fn from(config: &NarrowPhaseConfig) -> Self {
        Self {
            max_iteration: config.epa_max_iteration,
            termination_tolerance: config.epa_termination_tolerance,
        }
    }
}

impl Default for EpaSettings {
    fn default() -> Self {
        Self::from(&NarrowPhaseConfig::default())
    }
}

/// Outcome of an EPA query.
#[derive(Debug, Clone, PartialEq)]
pub enum EpaResult {
    /// Penetration found.
    Collide {
        /// Deepest point of A inside B.
        contact_a: Vec3,
        /// Deepest point of B inside A.
        contact_b: Vec3,
        /// Unit normal pointing from A toward B; `contact_a - contact_b`
        /// equals `normal * penetration_depth`.
        normal: Vec3,
        /// Penetration depth (non-negative).
        penetration_depth: f32,
    },
    /// The objects only touch at a point.
    NoCollide,
    /// The polytope degenerated; no reliable contact exists.
    Invalid,
}

#[derive(Debug, Clone, Copy)]
struct Vertex {
    a: Vec3,
    b: Vec3,
    point: Vec3,
}

impl Vertex {
    fn support(a: &ConvexObject, b: &ConvexObject, direction: &Vec3, include_margin: bool) -> Self {
        let support_a = a.support_point(direction, include_margin);
        let support_b = b.support_point(&direction.scale(-1.0), include_margin);
        Self { a: support_a, b: support_b, point: support_a.sub(&support_b) }
    }
}

#[derive(Debug, Clone, Copy)]
struct Face {
    indices: [usize; 3],
    normal: Vec3,
    distance: f32,
}

/// Expanding-polytope penetration query seeded by a colliding GJK result.
///
/// Non-colliding or invalid GJK results yield [`EpaResult::NoCollide`] and
/// [`EpaResult::Invalid`] respectively.
pub fn epa(
    a: &ConvexObject,
    b: &ConvexObject,
    include_margin: bool,
    gjk_result: &GjkResult,
    settings: &EpaSettings,
) -> EpaResult {
    let simplex = match gjk_result {
        GjkResult::Collide { simplex } => simplex,
        GjkResult::NoCollide { .. } => return EpaResult::NoCollide,
        GjkResult::Invalid => return EpaResult::Invalid,
    };
    let seed: Vec<Vertex> = simplex
        .points()
        .iter()
        .map(|p| Vertex { a: p.support_a, b: p.support_b, point: p.point })
        .collect();

    let Some(mut vertices) = initial_tetrahedron(a, b, include_margin, &seed) else {
        return if seed.len() == 1 { EpaResult::NoCollide } else { EpaResult::Invalid };
    };

    let mut faces = Vec::with_capacity(32);
    for (face, opposite) in [([0, 1, 2], 3), ([0, 2, 3], 1), ([0, 3, 1], 2), ([1, 3, 2], 0)] {
        match oriented_face(&vertices, face, &vertices[opposite].point) {
            Some(f) => faces.push(f),
            None => return EpaResult::Invalid,
        }
    }

    let mut upper_bound = f32::MAX;
    let mut iteration = 0;
    loop {
        let Some(best_index) = nearest_face(&faces) else {
            return EpaResult::Invalid;
        };
        let best = faces[best_index];

        if iteration >= settings.max_iteration {
            warn!(max_iteration = settings.max_iteration, "EPA reached its iteration limit");
            return face_result(&vertices, &best);
        }
        iteration += 1;

        let support = Vertex::support(a, b, &best.normal, include_margin);
        upper_bound = upper_bound.min(support.point.dot(&best.normal).abs());
        if upper_bound <= (1.0 + settings.termination_tolerance) * best.distance + EPSILON {
            trace!(iteration, depth = best.distance, "EPA converged");
            return face_result(&vertices, &best);
        }

        let new_index = vertices.len();
        vertices.push(support);

        let visible: Vec<usize> = faces
            .iter()
            .enumerate()
            .filter(|(_, f)| {
                f.normal.dot(&support.point.sub(&vertices[f.indices[0]].point)) > EPSILON
            })
            .map(|(i, _)| i)
            .collect();
        if visible.is_empty() {
            return face_result(&vertices, &best);
        }

        let horizon = horizon_edges(&faces, &visible);
        let mut expanded: Vec<Face> = faces
            .iter()
            .enumerate()
            .filter(|(i, _)| !visible.contains(i))
            .map(|(_, f)| *f)
            .collect();
        for (from, to) in horizon {
            let indices = [from, to, new_index];
            let Some(normal) = face_normal(&vertices, indices) else {
                return face_result(&vertices, &best);
            };
            let distance = normal.dot(&vertices[from].point);
            expanded.push(Face { indices, normal, distance });
        }
        faces = expanded;
    }
}

fn initial_tetrahedron(
    a: &ConvexObject,
    b: &ConvexObject,
    include_margin: bool,
    seed: &[Vertex],
) -> Option<Vec<Vertex>> {
    let candidates: Vec<[Vertex; 4]> = match seed {
        [p0, p1] => {
            let line = p1.point.sub(&p0.point).normalize();
            if line.is_zero() {
                return None;
            }
            let v1 = line.cross(&least_aligned_axis(&line)).normalize();
            let rotation = Quat::from_axis_angle(line, 2.0 * core::f32::consts::PI / 3.0);
            let v2 = rotation.rotate(&v1);
            let v3 = rotation.rotate(&v2);
            let s1 = Vertex::support(a, b, &v1, include_margin);
            let s2 = Vertex::support(a, b, &v2, include_margin);
            let s3 = Vertex::support(a, b, &v3, include_margin);
            vec![
                [*p0, s1, s2, s3],
                [*p1, s1, s2, s3],
                [*p0, *p1, s1, s2],
                [*p0, *p1, s2, s3],
                [*p0, *p1, s3, s1],
            ]
        }
        [p0, p1, p2] => {
            let normal = p1.point.sub(&p0.point).cross(&p2.point.sub(&p0.point)).normalize();
            if normal.is_zero() {
                return None;
            }
            let above = Vertex::support(a, b, &normal, include_margin);
            let below = Vertex::support(a, b, &normal.scale(-1.0), include_margin);
            vec![[*p0, *p1, *p2, above], [*p0, *p1, *p2, below]]
        }
        [p0, p1, p2, p3] => vec![[*p0, *p1, *p2, *p3]],
        _ => return None,
    };

    candidates.into_iter().find(|tetra| contains_origin(tetra)).map(|tetra| tetra.to_vec())
}

fn least_aligned_axis(direction: &Vec3) -> Vec3 {
    let abs = direction.abs();
    if abs.x() <= abs.y() && abs.x() <= abs.z() {
        Vec3::UNIT_X
    } else if abs.y() <= abs.z() {
        Vec3::UNIT_Y
    } else {
        Vec3::UNIT_Z
    }
}

fn contains_origin(tetra: &[Vertex; 4]) -> bool {
    let [p0, p1, p2, p3] = tetra.map(|v| v.point);
    let volume = p1.sub(&p0).dot(&p2.sub(&p0).cross(&p3.sub(&p0)));
    if volume.abs() <= EPSILON * EPSILON {
        return false;
    }
    let tolerance = EPSILON * volume.abs().max(1.0);
    [([p0, p1, p2], p3), ([p0, p2, p3], p1), ([p0, p3, p1], p2), ([p1, p3, p2], p0)]
        .iter()
        .all(|([x, y, z], opposite)| {
            let normal = y.sub(x).cross(&z.sub(x));
            let origin_side = normal.dot(&x.scale(-1.0));
            let opposite_side = normal.dot(&opposite.sub(x));
            origin_side * opposite_side.signum() >= -tolerance
        })
}

fn face_normal(vertices: &[Vertex], [i, j, k]: [usize; 3]) -> Option<Vec3> {
    let p0 = vertices[i].point;
    let normal = vertices[j].point.sub(&p0).cross(&vertices[k].point.sub(&p0)).normalize();
    (!normal.is_zero()).then_some(normal)
}

fn oriented_face(vertices: &[Vertex], [i, j, k]: [usize; 3], opposite: &Vec3) -> Option<Face> {
    let mut indices = [i, j, k];
    let mut normal = face_normal(vertices, indices)?;
    if normal.dot(&opposite.sub(&vertices[i].point)) > 0.0 {
        indices = [i, k, j];
        normal = normal.scale(-1.0);
    }
    Some(Face { indices, normal, distance: normal.dot(&vertices[i].point) })
}

fn nearest_face(faces: &[Face]) -> Option<usize> {
    faces
        .iter()
        .enumerate()
        .min_by(|(_, x), (_, y)| x.distance.total_cmp(&y.distance))
        .map(|(i, _)| i)
}

/// Directed boundary edges of the visible region, wound like the visible faces.
fn horizon_edges(faces: &[Face], visible: &[usize]) -> Vec<(usize, usize)> {
    let edges: Vec<(usize, usize)> = visible
        .iter()
        .flat_map(|&f| {
            let [i, j, k] = faces[f].indices;
            [(i, j), (j, k), (k, i)]
        })
        .collect();
    edges.iter().copied().filter(|(from, to)| !edges.contains(&(*to, *from))).collect()
}

fn face_result(vertices: &[Vertex], face: &Face) -> EpaResult {
    let [i, j, k] = face.indices;
    let (_, weights) =
        closest_on_triangle(&vertices[i].point, &vertices[j].point, &vertices[k].point);
    let combine = |pick: fn(&Vertex) -> Vec3| {
        pick(&vertices[i])
            .scale(weights[0])
            .add(&pick(&vertices[j]).scale(weights[1]))
            .add(&pick(&vertices[k]).scale(weights[2]))
    };
    EpaResult::Collide {
        contact_a: combine(|v| v.a),
        contact_b: combine(|v| v.b),
        normal: face.normal,
        penetration_depth: face.distance.max(0.0),
    }
}
