//! Read-only queries over a balanced [`BvhTree`](crate::BvhTree).
//!
//! Every query takes `&self`, so any number of them may run concurrently
//! against the same tree. All of them treat an empty or unbalanced tree as
//! containing nothing.

mod nearest;
mod overlap;
mod plane;
mod range;
mod raycast;

pub use nearest::{Nearest, NearestCallback, SearchOrder};
pub use overlap::{BvhOverlap, OverlapCallback, OverlapFlags, OverlapResult};
pub use range::RangeCallback;
pub use raycast::{BvhRay, RAY_CAST_DIST_MAX, RayCastCallback, RayHit};

use nalgebra::Point3;

use crate::kdop::AxisRange;

/// Closest point of a node's axis-aligned box to `co`, and its squared
/// distance.
#[inline]
pub(crate) fn box_nearest_point(bounds: &[AxisRange], co: &Point3<f32>) -> (f32, Point3<f32>) {
    let nearest = Point3::new(
        bounds[0].clamp(co.x),
        bounds[1].clamp(co.y),
        bounds[2].clamp(co.z),
    );
    ((nearest - co).norm_squared(), nearest)
}

/// Squared distance from `co` to a node's axis-aligned box.
#[inline]
pub(crate) fn box_distance_squared(bounds: &[AxisRange], co: &Point3<f32>) -> f32 {
    box_nearest_point(bounds, co).0
}

/// Whether `co` lies strictly inside a node's axis-aligned box.
#[inline]
pub(crate) fn box_contains_point(bounds: &[AxisRange], co: &Point3<f32>) -> bool {
    bounds[..3]
        .iter()
        .zip(co.iter())
        .all(|(range, &value)| value > range.min && value < range.max)
}
