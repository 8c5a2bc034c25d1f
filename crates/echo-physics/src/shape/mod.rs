// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Collision shapes.
//!
//! [`CollisionShape`] is a closed set of shape kinds. Shapes are immutable once
//! built and shared between bodies as `Arc<CollisionShape>`.
//!
//! Margin accounting:
//! - Every convex shape carries a non-negative *inner margin*. The convex
//!   object handed to GJK/EPA is the nominal geometry shrunk by that margin,
//!   and its *outer margin* (the same value) is added back by the support
//!   function when `include_margin` is set.
//! - AABBs are always computed from the nominal geometry, so
//!   `core + outer margin` never leaves the AABB.

mod concave;
mod convex;

use std::sync::Arc;

pub use concave::{ConcaveShape, HeightfieldShape, TriangleMeshShape};
pub use convex::{ConvexGeometry, ConvexObject};

use crate::config::CollisionShapeConfig;
use crate::error::{PhysicsError, Result};
use crate::math::Vec3;
use crate::types::{aabb::Aabb, transform::PhysicsTransform};

/// Discriminant of [`CollisionShape`], used to key the algorithm dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShapeKind {
    /// [`CollisionShape::Sphere`].
    Sphere,
    /// [`CollisionShape::Box`].
    Box,
    /// [`CollisionShape::Capsule`].
    Capsule,
    /// [`CollisionShape::Cylinder`].
    Cylinder,
    /// [`CollisionShape::Cone`].
    Cone,
    /// [`CollisionShape::ConvexHull`].
    ConvexHull,
    /// [`CollisionShape::Triangle`].
    Triangle,
    /// [`CollisionShape::Compound`].
    Compound,
    /// [`CollisionShape::Heightfield`].
    Heightfield,
    /// [`CollisionShape::TriangleMesh`].
    TriangleMesh,
}

impl ShapeKind {
    /// Every shape kind, in table order.
    pub const ALL: [Self; 10] = [
        Self::Sphere,
        Self::Box,
        Self::Capsule,
        Self::Cylinder,
        Self::Cone,
        Self::ConvexHull,
        Self::Triangle,
        Self::Compound,
        Self::Heightfield,
        Self::TriangleMesh,
    ];

    /// Number of shape kinds.
    pub const COUNT: usize = Self::ALL.len();

    /// Row/column index in the dispatch table.
    pub fn index(self) -> usize {
        self as usize
    }

    /// `true` for kinds that produce a single convex object.
    pub fn is_convex(self) -> bool {
        !matches!(self, Self::Compound | Self::Heightfield | Self::TriangleMesh)
    }

    /// `true` for kinds queried through [`ConcaveShape`].
    pub fn is_concave(self) -> bool {
        matches!(self, Self::Heightfield | Self::TriangleMesh)
    }
}

/// Local axis a capsule, cylinder or cone is aligned with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShapeAxis {
    /// Local X axis.
    X,
    /// Local Y axis.
    #[default]
    Y,
    /// Local Z axis.
    Z,
}

impl ShapeAxis {
    /// Axis index (`0 = x`).
    pub fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }

    /// Unit vector of the axis.
    pub fn unit(self) -> Vec3 {
        match self {
            Self::X => Vec3::UNIT_X,
            Self::Y => Vec3::UNIT_Y,
            Self::Z => Vec3::UNIT_Z,
        }
    }
}

/// Sphere centered on the body origin. The whole radius is margin.
#[derive(Debug, Clone, PartialEq)]
pub struct SphereShape {
    radius: f32,
}

impl SphereShape {
    /// Radius.
    pub fn radius(&self) -> f32 {
        self.radius
    }
}

/// Box centered on the body origin.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxShape {
    half_extents: Vec3,
    inner_margin: f32,
}

impl BoxShape {
    /// Half extents along local axes.
    pub fn half_extents(&self) -> Vec3 {
        self.half_extents
    }
}

/// Capsule: a segment of length `cylinder_height` swept by a sphere.
#[derive(Debug, Clone, PartialEq)]
pub struct CapsuleShape {
    radius: f32,
    cylinder_height: f32,
    axis: ShapeAxis,
}

impl CapsuleShape {
    /// Radius of the end caps.
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Length of the cylindrical section.
    pub fn cylinder_height(&self) -> f32 {
        self.cylinder_height
    }

    /// Alignment axis.
    pub fn axis(&self) -> ShapeAxis {
        self.axis
    }
}

/// Cylinder centered on the body origin.
#[derive(Debug, Clone, PartialEq)]
pub struct CylinderShape {
    radius: f32,
    height: f32,
    axis: ShapeAxis,
    inner_margin: f32,
}

impl CylinderShape {
    /// Radius.
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Full height.
    pub fn height(&self) -> f32 {
        self.height
    }
}

/// Cone centered on the body origin, apex toward the positive axis.
#[derive(Debug, Clone, PartialEq)]
pub struct ConeShape {
    radius: f32,
    height: f32,
    axis: ShapeAxis,
    inner_margin: f32,
}

impl ConeShape {
    /// Base radius.
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Full height (base to apex).
    pub fn height(&self) -> f32 {
        self.height
    }
}

/// Convex hull of a point cloud (no inner margin).
#[derive(Debug, Clone, PartialEq)]
pub struct ConvexHullShape {
    points: Vec<Vec3>,
}

impl ConvexHullShape {
    /// Hull points in local space.
    pub fn points(&self) -> &[Vec3] {
        &self.points
    }
}

/// Single triangle (no inner margin). Produced on demand by concave shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleShape {
    points: [Vec3; 3],
}

impl TriangleShape {
    /// Creates a triangle from three local-space points.
    pub fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self { points: [a, b, c] }
    }

    /// Vertices.
    pub fn points(&self) -> [Vec3; 3] {
        self.points
    }
}

/// A sub-shape placed inside a compound.
#[derive(Debug, Clone)]
pub struct LocalizedShape {
    /// Placement relative to the compound origin.
    pub transform: PhysicsTransform,
    /// Shared sub-shape.
    pub shape: Arc<CollisionShape>,
}

/// Ordered list of localized sub-shapes.
#[derive(Debug, Clone)]
pub struct CompoundShape {
    children: Vec<LocalizedShape>,
}

impl CompoundShape {
    /// Sub-shapes in insertion order.
    pub fn children(&self) -> &[LocalizedShape] {
        &self.children
    }
}

/// Immutable collision geometry.
#[derive(Debug, Clone)]
pub enum CollisionShape {
    /// Sphere.
    Sphere(SphereShape),
    /// Oriented box.
    Box(BoxShape),
    /// Capsule.
    Capsule(CapsuleShape),
    /// Cylinder.
    Cylinder(CylinderShape),
    /// Cone.
    Cone(ConeShape),
    /// Convex hull.
    ConvexHull(ConvexHullShape),
    /// Triangle.
    Triangle(TriangleShape),
    /// Compound of localized sub-shapes.
    Compound(CompoundShape),
    /// Regular-grid heightfield (static bodies only).
    Heightfield(HeightfieldShape),
    /// Arbitrary triangle soup (static bodies only).
    TriangleMesh(TriangleMeshShape),
}

/// Builds margin-carrying shapes from a [`CollisionShapeConfig`].
///
/// The `CollisionShape::*` constructors use `CollisionShapeConfig::default()`.
#[derive(Debug, Clone, Default)]
pub struct ShapeBuilder {
    config: CollisionShapeConfig,
}

impl ShapeBuilder {
    /// Builder using the given margin policy.
    pub fn new(config: &CollisionShapeConfig) -> Self {
        Self { config: config.clone() }
    }

    /// Inner margin capped at `maximum_margin_percentage` of `min_axis`.
    fn safe_margin(&self, min_axis: f32) -> f32 {
        self.config.inner_margin.min(min_axis * self.config.maximum_margin_percentage)
    }

    /// Box with the given half extents.
    ///
    /// # Errors
    /// [`PhysicsError::InvalidShape`] when any half extent is not positive.
    pub fn cuboid(&self, half_extents: Vec3) -> Result<CollisionShape> {
        if !(half_extents.is_finite() && half_extents.min_component() > 0.0) {
            return Err(PhysicsError::InvalidShape(format!(
                "box half extents must be positive, got {half_extents:?}"
            )));
        }
        Ok(CollisionShape::Box(BoxShape {
            half_extents,
            inner_margin: self.safe_margin(half_extents.min_component()),
        }))
    }

    /// Cylinder of `radius` and full `height` along `axis`.
    ///
    /// # Errors
    /// [`PhysicsError::InvalidShape`] on non-positive dimensions.
    pub fn cylinder(&self, radius: f32, height: f32, axis: ShapeAxis) -> Result<CollisionShape> {
        positive_dimension("cylinder radius", radius)?;
        positive_dimension("cylinder height", height)?;
        Ok(CollisionShape::Cylinder(CylinderShape {
            radius,
            height,
            axis,
            inner_margin: self.safe_margin(radius.min(height / 2.0)),
        }))
    }

    /// Cone of base `radius` and full `height`, apex toward `+axis`.
    ///
    /// # Errors
    /// [`PhysicsError::InvalidShape`] on non-positive dimensions.
    pub fn cone(&self, radius: f32, height: f32, axis: ShapeAxis) -> Result<CollisionShape> {
        positive_dimension("cone radius", radius)?;
        positive_dimension("cone height", height)?;
        Ok(CollisionShape::Cone(ConeShape {
            radius,
            height,
            axis,
            inner_margin: self.safe_margin(radius.min(height / 2.0)),
        }))
    }
}

fn positive_dimension(what: &str, value: f32) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(PhysicsError::InvalidShape(format!("{what} must be positive, got {value}")))
    }
}

fn box_inertia(mass: f32, full_sizes: &Vec3) -> Vec3 {
    let (w2, h2, d2) = (
        full_sizes.x() * full_sizes.x(),
        full_sizes.y() * full_sizes.y(),
        full_sizes.z() * full_sizes.z(),
    );
    Vec3::new(
        (1.0 / 12.0) * mass * (h2 + d2),
        (1.0 / 12.0) * mass * (w2 + d2),
        (1.0 / 12.0) * mass * (w2 + h2),
    )
}

fn transformed_local_aabb(local: &Aabb, transform: &PhysicsTransform) -> Aabb {
    Aabb::from_oriented_box(
        transform.transform(&local.center()),
        local.half_extents(),
        &transform.orientation_matrix(),
    )
}

impl CollisionShape {
    /// Sphere of `radius`.
    ///
    /// # Errors
    /// [`PhysicsError::InvalidShape`] when `radius` is not positive.
    pub fn sphere(radius: f32) -> Result<Self> {
        positive_dimension("sphere radius", radius)?;
        Ok(Self::Sphere(SphereShape { radius }))
    }

    /// Box with default margins. See [`ShapeBuilder::cuboid`].
    ///
    /// # Errors
    /// [`PhysicsError::InvalidShape`] when any half extent is not positive.
    pub fn cuboid(half_extents: Vec3) -> Result<Self> {
        ShapeBuilder::default().cuboid(half_extents)
    }

    /// Capsule of cap `radius` and cylinder section `cylinder_height`.
    ///
    /// # Errors
    /// [`PhysicsError::InvalidShape`] on non-positive radius or negative height.
    pub fn capsule(radius: f32, cylinder_height: f32, axis: ShapeAxis) -> Result<Self> {
        positive_dimension("capsule radius", radius)?;
        if !(cylinder_height.is_finite() && cylinder_height >= 0.0) {
            return Err(PhysicsError::InvalidShape(format!(
                "capsule cylinder height must be >= 0, got {cylinder_height}"
            )));
        }
        Ok(Self::Capsule(CapsuleShape { radius, cylinder_height, axis }))
    }

    /// Cylinder with default margins. See [`ShapeBuilder::cylinder`].
    ///
    /// # Errors
    /// [`PhysicsError::InvalidShape`] on non-positive dimensions.
    pub fn cylinder(radius: f32, height: f32, axis: ShapeAxis) -> Result<Self> {
        ShapeBuilder::default().cylinder(radius, height, axis)
    }

    /// Cone with default margins. See [`ShapeBuilder::cone`].
    ///
    /// # Errors
    /// [`PhysicsError::InvalidShape`] on non-positive dimensions.
    pub fn cone(radius: f32, height: f32, axis: ShapeAxis) -> Result<Self> {
        ShapeBuilder::default().cone(radius, height, axis)
    }

    /// Convex hull of `points`.
    ///
    /// # Errors
    /// [`PhysicsError::InvalidShape`] when fewer than four points are given
    /// or a point is not finite.
    pub fn convex_hull(points: Vec<Vec3>) -> Result<Self> {
        if points.len() < 4 || points.iter().any(|p| !p.is_finite()) {
            return Err(PhysicsError::InvalidShape(
                "convex hull needs at least four finite points".into(),
            ));
        }
        Ok(Self::ConvexHull(ConvexHullShape { points }))
    }

    /// Single triangle.
    pub fn triangle(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self::Triangle(TriangleShape::new(a, b, c))
    }

    /// Compound of localized sub-shapes.
    ///
    /// # Errors
    /// [`PhysicsError::InvalidShape`] when `children` is empty or a child is
    /// itself concave.
    pub fn compound(children: Vec<LocalizedShape>) -> Result<Self> {
        if children.is_empty() {
            return Err(PhysicsError::InvalidShape(
                "compound shape needs at least one child".into(),
            ));
        }
        if let Some(child) = children.iter().find(|c| c.shape.kind().is_concave()) {
            return Err(PhysicsError::InvalidShape(format!(
                "compound children must not be concave, got {:?}",
                child.shape.kind()
            )));
        }
        Ok(Self::Compound(CompoundShape { children }))
    }

    /// Heightfield over a regular `x_len × z_len` vertex grid.
    ///
    /// # Errors
    /// See [`HeightfieldShape::new`].
    pub fn heightfield(vertices: Vec<Vec3>, x_len: usize, z_len: usize) -> Result<Self> {
        Ok(Self::Heightfield(HeightfieldShape::new(vertices, x_len, z_len)?))
    }

    /// Triangle mesh from local-space triangles.
    ///
    /// # Errors
    /// See [`TriangleMeshShape::new`].
    pub fn triangle_mesh(triangles: Vec<[Vec3; 3]>) -> Result<Self> {
        Ok(Self::TriangleMesh(TriangleMeshShape::new(triangles)?))
    }

    /// Kind discriminant.
    pub fn kind(&self) -> ShapeKind {
        match self {
            Self::Sphere(_) => ShapeKind::Sphere,
            Self::Box(_) => ShapeKind::Box,
            Self::Capsule(_) => ShapeKind::Capsule,
            Self::Cylinder(_) => ShapeKind::Cylinder,
            Self::Cone(_) => ShapeKind::Cone,
            Self::ConvexHull(_) => ShapeKind::ConvexHull,
            Self::Triangle(_) => ShapeKind::Triangle,
            Self::Compound(_) => ShapeKind::Compound,
            Self::Heightfield(_) => ShapeKind::Heightfield,
            Self::TriangleMesh(_) => ShapeKind::TriangleMesh,
        }
    }

    /// Inner margin of convex shapes; zero for the others.
    pub fn inner_margin(&self) -> f32 {
        match self {
            Self::Sphere(s) => s.radius,
            Self::Box(b) => b.inner_margin,
            Self::Capsule(c) => c.radius,
            Self::Cylinder(c) => c.inner_margin,
            Self::Cone(c) => c.inner_margin,
            Self::ConvexHull(_)
            | Self::Triangle(_)
            | Self::Compound(_)
            | Self::Heightfield(_)
            | Self::TriangleMesh(_) => 0.0,
        }
    }

    /// World AABB of the shape placed at `transform`.
    pub fn aabb(&self, transform: &PhysicsTransform) -> Aabb {
        let position = transform.position();
        match self {
            Self::Sphere(s) => Aabb::from_center_half_extents(position, Vec3::splat(s.radius)),
            Self::Box(b) => {
                Aabb::from_oriented_box(position, b.half_extents, &transform.orientation_matrix())
            }
            Self::Capsule(c) => {
                let half = Vec3::splat(c.radius);
                let half = half.with_component(
                    c.axis.index(),
                    c.radius + c.cylinder_height / 2.0,
                );
                Aabb::from_oriented_box(position, half, &transform.orientation_matrix())
            }
            Self::Cylinder(c) => {
                let half = Vec3::splat(c.radius).with_component(c.axis.index(), c.height / 2.0);
                Aabb::from_oriented_box(position, half, &transform.orientation_matrix())
            }
            Self::Cone(c) => {
                let half = Vec3::splat(c.radius).with_component(c.axis.index(), c.height / 2.0);
                Aabb::from_oriented_box(position, half, &transform.orientation_matrix())
            }
            Self::ConvexHull(h) => points_aabb(h.points.iter(), transform),
            Self::Triangle(t) => points_aabb(t.points.iter(), transform),
            Self::Compound(c) => {
                let mut children = c.children.iter().map(|child| {
                    child.shape.aabb(&transform.multiply(&child.transform))
                });
                let first = children
                    .next()
                    .unwrap_or_else(|| Aabb::from_center_half_extents(position, Vec3::ZERO));
                children.fold(first, |acc, aabb| acc.union(&aabb))
            }
            Self::Heightfield(h) => transformed_local_aabb(&h.local_aabb(), transform),
            Self::TriangleMesh(m) => transformed_local_aabb(&m.local_aabb(), transform),
        }
    }

    /// AABB in the shape's own frame.
    pub fn local_aabb(&self) -> Aabb {
        self.aabb(&PhysicsTransform::identity())
    }

    /// Convex object for GJK/EPA at `transform`.
    ///
    /// # Errors
    /// [`PhysicsError::NotConvex`] for compound and concave shapes.
    pub fn convex_object(&self, transform: &PhysicsTransform) -> Result<ConvexObject> {
        let position = transform.position();
        let object = match self {
            Self::Sphere(s) => ConvexObject::new(ConvexGeometry::Point(position), s.radius),
            Self::Box(b) => ConvexObject::new(
                ConvexGeometry::Box {
                    center: position,
                    axes: transform.orientation_matrix(),
                    half_extents: b.half_extents.sub(&Vec3::splat(b.inner_margin)),
                },
                b.inner_margin,
            ),
            Self::Capsule(c) => {
                let half = transform.rotate(&c.axis.unit()).scale(c.cylinder_height / 2.0);
                ConvexObject::new(
                    ConvexGeometry::Segment(position.sub(&half), position.add(&half)),
                    c.radius,
                )
            }
            Self::Cylinder(c) => ConvexObject::new(
                ConvexGeometry::Cylinder {
                    center: position,
                    axis: transform.rotate(&c.axis.unit()),
                    radius: c.radius - c.inner_margin,
                    half_height: c.height / 2.0 - c.inner_margin,
                },
                c.inner_margin,
            ),
            Self::Cone(c) => ConvexObject::new(
                ConvexGeometry::Cone {
                    center: position,
                    axis: transform.rotate(&c.axis.unit()),
                    radius: c.radius - c.inner_margin,
                    half_height: c.height / 2.0 - c.inner_margin,
                },
                c.inner_margin,
            ),
            Self::ConvexHull(h) => ConvexObject::new(
                ConvexGeometry::Hull(h.points.iter().map(|p| transform.transform(p)).collect()),
                0.0,
            ),
            Self::Triangle(t) => ConvexObject::new(
                ConvexGeometry::Triangle(t.points.map(|p| transform.transform(&p))),
                0.0,
            ),
            Self::Compound(_) | Self::Heightfield(_) | Self::TriangleMesh(_) => {
                return Err(PhysicsError::NotConvex(self.kind()));
            }
        };
        Ok(object)
    }

    /// Diagonal of the local inertia tensor for `mass`.
    ///
    /// Spheres, boxes, cylinders and cones use closed forms; every other kind
    /// uses the box bounding its local AABB.
    pub fn local_inertia(&self, mass: f32) -> Vec3 {
        match self {
            Self::Sphere(s) => Vec3::splat(0.4 * mass * s.radius * s.radius),
            Self::Box(b) => box_inertia(mass, &b.half_extents.scale(2.0)),
            Self::Cylinder(c) => {
                let radius_sq = c.radius * c.radius;
                let lateral = (1.0 / 12.0) * mass * (3.0 * radius_sq + c.height * c.height);
                Vec3::splat(lateral).with_component(c.axis.index(), 0.5 * mass * radius_sq)
            }
            Self::Cone(c) => {
                let lateral =
                    (3.0 * mass / 20.0) * (c.radius * c.radius + 4.0 * c.height * c.height);
                Vec3::splat(lateral)
                    .with_component(c.axis.index(), (3.0 * mass * c.radius * c.radius) / 10.0)
            }
            Self::Capsule(_)
            | Self::ConvexHull(_)
            | Self::Triangle(_)
            | Self::Compound(_)
            | Self::Heightfield(_)
            | Self::TriangleMesh(_) => {
                box_inertia(mass, &self.local_aabb().half_extents().scale(2.0))
            }
        }
    }

    /// Smallest distance from the shape origin to its surface (conservative).
    ///
    /// Drives the CCD motion threshold.
    pub fn min_distance_to_center(&self) -> f32 {
        match self {
            Self::Sphere(s) => s.radius,
            Self::Box(b) => b.half_extents.min_component(),
            Self::Capsule(c) => c.radius,
            Self::Cylinder(c) => c.radius.min(c.height / 2.0),
            Self::Cone(c) => c.radius.min(c.height / 2.0),
            Self::Heightfield(_) | Self::TriangleMesh(_) => 0.0,
            Self::ConvexHull(_) | Self::Triangle(_) | Self::Compound(_) => {
                self.local_aabb().half_extents().min_component()
            }
        }
    }

    /// Largest distance from the shape origin to its surface.
    pub fn max_distance_to_center(&self) -> f32 {
        match self {
            Self::Sphere(s) => s.radius,
            Self::Box(b) => b.half_extents.length(),
            Self::Capsule(c) => c.radius + c.cylinder_height / 2.0,
            Self::Cylinder(c) => Vec3::new(c.radius, c.height / 2.0, 0.0).length(),
            Self::Cone(c) => Vec3::new(c.radius, c.height / 2.0, 0.0).length(),
            _ => {
                let aabb = self.local_aabb();
                aabb.min().abs().max(&aabb.max().abs()).length()
            }
        }
    }

    /// Concave query interface for heightfields and meshes.
    pub fn as_concave(&self) -> Option<&dyn ConcaveShape> {
        match self {
            Self::Heightfield(h) => Some(h),
            Self::TriangleMesh(m) => Some(m),
            _ => None,
        }
    }

    /// Uniformly scaled copy.
    ///
    /// # Errors
    /// [`PhysicsError::InvalidShape`] for a non-positive factor, and
    /// [`PhysicsError::UnsupportedShapeOperation`] for heightfields.
    pub fn scale(&self, factor: f32) -> Result<Self> {
        positive_dimension("scale factor", factor)?;
        let builder = ShapeBuilder::default();
        match self {
            Self::Sphere(s) => Self::sphere(s.radius * factor),
            Self::Box(b) => builder.cuboid(b.half_extents.scale(factor)),
            Self::Capsule(c) => {
                Self::capsule(c.radius * factor, c.cylinder_height * factor, c.axis)
            }
            Self::Cylinder(c) => builder.cylinder(c.radius * factor, c.height * factor, c.axis),
            Self::Cone(c) => builder.cone(c.radius * factor, c.height * factor, c.axis),
            Self::ConvexHull(h) => {
                Self::convex_hull(h.points.iter().map(|p| p.scale(factor)).collect())
            }
            Self::Triangle(t) => {
                let [a, b, c] = t.points.map(|p| p.scale(factor));
                Ok(Self::triangle(a, b, c))
            }
            Self::Compound(c) => {
                let children = c
                    .children
                    .iter()
                    .map(|child| {
                        Ok(LocalizedShape {
                            transform: child
                                .transform
                                .with_position(child.transform.position().scale(factor)),
                            shape: Arc::new(child.shape.scale(factor)?),
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Self::compound(children)
            }
            Self::Heightfield(_) => {
                Err(PhysicsError::UnsupportedShapeOperation(ShapeKind::Heightfield))
            }
            Self::TriangleMesh(m) => Self::triangle_mesh(
                m.triangles().iter().map(|t| t.map(|p| p.scale(factor))).collect(),
            ),
        }
    }
}

fn points_aabb<'a>(points: impl Iterator<Item = &'a Vec3>, transform: &PhysicsTransform) -> Aabb {
    let world: Vec<Vec3> = points.map(|p| transform.transform(p)).collect();
    Aabb::from_points(&world)
        .unwrap_or_else(|| Aabb::from_center_half_extents(transform.position(), Vec3::ZERO))
}
