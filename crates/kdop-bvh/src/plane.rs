//! Plane representation used by plane intersection queries.

use nalgebra::{Point3, Vector3};

/// A plane in 3D space, represented as `normal · point = offset`.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane3D {
    normal: Vector3<f32>,
    offset: f32,
}

impl Plane3D {
    /// Creates a new plane from a normal vector and offset.
    /// The normal will be normalized automatically.
    ///
    /// # Panics
    /// Panics if the normal vector has zero length.
    pub fn new(normal: Vector3<f32>, offset: f32) -> Self {
        let norm = normal.norm();
        assert!(norm > f32::EPSILON, "Plane normal cannot be zero");
        Self {
            normal: normal / norm,
            offset: offset / norm,
        }
    }

    /// Creates a plane from a point on the plane and a normal vector.
    /// The normal will be normalized automatically.
    ///
    /// # Panics
    /// Panics if the normal vector has zero length.
    pub fn from_point_and_normal(point: Point3<f32>, normal: Vector3<f32>) -> Self {
        let norm = normal.norm();
        assert!(norm > f32::EPSILON, "Plane normal cannot be zero");
        let unit_normal = normal / norm;
        let offset = unit_normal.dot(&point.coords);
        Self {
            normal: unit_normal,
            offset,
        }
    }

    /// Creates a plane from the coefficients of `a·x + b·y + c·z + d = 0`.
    ///
    /// # Panics
    /// Panics if `(a, b, c)` has zero length.
    pub fn from_coefficients([a, b, c, d]: [f32; 4]) -> Self {
        Self::new(Vector3::new(a, b, c), -d)
    }

    /// Returns the unit normal vector of the plane.
    #[inline]
    pub fn normal(&self) -> Vector3<f32> {
        self.normal
    }

    /// Returns the signed distance from the origin to the plane along the normal.
    #[inline]
    pub fn offset(&self) -> f32 {
        self.offset
    }

    /// Computes the signed distance from a point to the plane.
    /// - Positive: point is in front (same side as normal)
    /// - Negative: point is behind (opposite side from normal)
    /// - Zero: point is on the plane
    #[inline]
    pub fn signed_distance(&self, point: Point3<f32>) -> f32 {
        self.normal.dot(&point.coords) - self.offset
    }

    /// Returns `true` when the point lies strictly in front of the plane.
    #[inline]
    pub fn is_in_front(&self, point: Point3<f32>) -> bool {
        self.signed_distance(point) > 0.0
    }

    /// Picks the box corners with the smallest and largest signed distance.
    ///
    /// Returns `(near, far)`: `near` is the corner furthest behind the plane,
    /// `far` the corner furthest in front.
    pub fn box_near_far(
        &self,
        min: Point3<f32>,
        max: Point3<f32>,
    ) -> (Point3<f32>, Point3<f32>) {
        let mut near = min;
        let mut far = max;
        for axis in 0..3 {
            if self.normal[axis] < 0.0 {
                near[axis] = max[axis];
                far[axis] = min[axis];
            }
        }
        (near, far)
    }

    /// Whether the plane passes between the nearest and farthest corner of
    /// an axis-aligned box.
    pub fn crosses_box(&self, min: Point3<f32>, max: Point3<f32>) -> bool {
        let (near, far) = self.box_near_far(min, max);
        self.is_in_front(near) != self.is_in_front(far)
    }
}
