//! k-DOP bounding volume hierarchy for spatial queries over 3D primitives.
//!
//! Build a [`BvhTree`] once from point sets, then run nearest-point, ray
//! cast, overlap, plane and range queries against it from any number of
//! threads. See [`BvhTree`] for an example.

mod bvh;
mod error;
mod kdop;
mod plane;
mod query;
mod settings;

#[cfg(test)]
mod test_util;

pub use bvh::{BvhNode, BvhTree, BvhVisitor, CollectingVisitor, FnVisitor, MAX_ARITY};
pub use error::{BvhError, Result};
pub use kdop::{AxisRange, KDOP_AXES, KDOP_AXIS_COUNT, KDOP_AXIS_LENGTHS, KdopType};
pub use plane::Plane3D;
pub use query::{
    BvhOverlap, BvhRay, Nearest, NearestCallback, OverlapCallback, OverlapFlags, OverlapResult,
    RAY_CAST_DIST_MAX, RangeCallback, RayCastCallback, RayHit, SearchOrder,
};
pub use settings::{BvhSettings, DEFAULT_THREAD_LEAF_THRESHOLD};
