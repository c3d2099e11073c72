//! Ray and capsule casts.

use nalgebra::{Point3, Vector3};

use crate::BvhTree;
use crate::kdop::AxisRange;

/// Default distance limit of a cast.
pub const RAY_CAST_DIST_MAX: f32 = f32::MAX / 2.0;

/// A ray, or a capsule when `radius > 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BvhRay {
    pub origin: Point3<f32>,
    /// Unit direction.
    pub direction: Vector3<f32>,
    pub radius: f32,
}

/// The closest hit found so far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Primitive index of the hit, `None` if nothing was hit.
    pub index: Option<usize>,
    /// Hit position.
    pub co: Point3<f32>,
    /// Surface normal at the hit, filled in by callbacks that know it.
    pub normal: Vector3<f32>,
    /// Distance along the ray.
    pub dist: f32,
}

impl RayHit {
    /// A record accepting hits up to [`RAY_CAST_DIST_MAX`].
    pub fn new() -> Self {
        Self::within(RAY_CAST_DIST_MAX)
    }

    /// A record accepting hits closer than `dist`.
    pub fn within(dist: f32) -> Self {
        Self {
            index: None,
            co: Point3::origin(),
            normal: Vector3::zeros(),
            dist,
        }
    }
}

impl Default for RayHit {
    fn default() -> Self {
        Self::new()
    }
}

/// Leaf test for ray casts: `(primitive index, ray, best hit)`.
pub type RayCastCallback<'a> = dyn FnMut(usize, &BvhRay, &mut RayHit) + 'a;

struct RayCast<'t, 'c, 'f> {
    tree: &'t BvhTree,
    ray: BvhRay,
    ray_dot_axis: [f32; 3],
    idot_axis: [f32; 3],
    /// Per box axis, whether the ray enters through the max bound.
    enters_at_max: [bool; 3],
    callback: Option<&'c mut RayCastCallback<'f>>,
    hit: RayHit,
}

impl<'t, 'c, 'f> RayCast<'t, 'c, 'f> {
    fn new(
        tree: &'t BvhTree,
        ray: BvhRay,
        hit: RayHit,
        callback: Option<&'c mut RayCastCallback<'f>>,
    ) -> Self {
        let mut ray_dot_axis = [0.0; 3];
        let mut idot_axis = [0.0; 3];
        let mut enters_at_max = [false; 3];
        for axis in 0..3 {
            let dot = ray.direction[axis];
            if dot.abs() >= f32::EPSILON {
                ray_dot_axis[axis] = dot;
                idot_axis[axis] = 1.0 / dot;
            } else {
                idot_axis[axis] = f32::MAX;
            }
            enters_at_max[axis] = idot_axis[axis] < 0.0;
        }
        Self {
            tree,
            ray,
            ray_dot_axis,
            idot_axis,
            enters_at_max,
            callback,
            hit,
        }
    }

    /// Slab entry distance of a zero-radius ray, `f32::MAX` on a miss.
    fn fast_nearest_hit(&self, bounds: &[AxisRange]) -> f32 {
        let mut near = [0.0f32; 3];
        let mut far = [0.0f32; 3];
        for axis in 0..3 {
            let range = bounds[axis];
            let (entry, exit) = if self.enters_at_max[axis] {
                (range.max, range.min)
            } else {
                (range.min, range.max)
            };
            let origin = self.ray.origin[axis];
            near[axis] = (entry - origin) * self.idot_axis[axis];
            far[axis] = (exit - origin) * self.idot_axis[axis];
        }
        let [t1x, t1y, t1z] = near;
        let [t2x, t2y, t2z] = far;

        let disjoint = t1x > t2y || t2x < t1y || t1x > t2z || t2x < t1z || t1y > t2z || t2y < t1z;
        let behind = t2x < 0.0 || t2y < 0.0 || t2z < 0.0;
        let beyond = t1x > self.hit.dist || t1y > self.hit.dist || t1z > self.hit.dist;
        if disjoint || behind || beyond {
            return f32::MAX;
        }
        t1x.max(t1y).max(t1z)
    }

    /// Slab entry distance of a capsule, `f32::MAX` on a miss.
    fn nearest_hit(&self, bounds: &[AxisRange]) -> f32 {
        let radius = self.ray.radius;
        let mut low = 0.0f32;
        let mut upper = self.hit.dist;
        for axis in 0..3 {
            let range = bounds[axis];
            let origin = self.ray.origin[axis];
            let dot = self.ray_dot_axis[axis];
            if dot == 0.0 {
                if origin < range.min - radius || origin > range.max + radius {
                    return f32::MAX;
                }
                continue;
            }

            let lower_hit = (range.min - radius - origin) / dot;
            let upper_hit = (range.max + radius - origin) / dot;
            let (enter, exit) = if dot > 0.0 {
                (lower_hit, upper_hit)
            } else {
                (upper_hit, lower_hit)
            };
            low = low.max(enter);
            upper = upper.min(exit);
            if low > upper {
                return f32::MAX;
            }
        }
        low
    }

    fn entry_distance(&self, id: usize) -> f32 {
        let bounds = self.tree.node_bounds(id);
        if self.ray.radius == 0.0 {
            self.fast_nearest_hit(bounds)
        } else {
            self.nearest_hit(bounds)
        }
    }

    fn ascending(&self, id: usize) -> bool {
        self.ray_dot_axis[self.tree.nodes[id].main_axis()] > 0.0
    }

    fn cast(&mut self, id: usize) {
        let dist = self.entry_distance(id);
        if dist >= self.hit.dist {
            return;
        }

        let tree = self.tree;
        if tree.is_leaf(id) {
            let index = tree.nodes[id].index();
            match self.callback.as_deref_mut() {
                Some(callback) => callback(index, &self.ray, &mut self.hit),
                None => {
                    self.hit.index = Some(index);
                    self.hit.dist = dist;
                    self.hit.co = self.ray.origin + self.ray.direction * dist;
                }
            }
            return;
        }

        let children = tree.node_children(id);
        if self.ascending(id) {
            children.iter().for_each(|&child| self.cast(child));
        } else {
            children.iter().rev().for_each(|&child| self.cast(child));
        }
    }

    /// Like [`cast`](Self::cast) but restores the distance limit after every
    /// leaf, so no hit shadows another.
    fn cast_all(&mut self, id: usize, limit: f32) {
        let dist = self.entry_distance(id);
        if dist >= self.hit.dist {
            return;
        }

        let tree = self.tree;
        if tree.is_leaf(id) {
            let index = tree.nodes[id].index();
            if let Some(callback) = self.callback.as_deref_mut() {
                callback(index, &self.ray, &mut self.hit);
            }
            self.hit.index = None;
            self.hit.dist = limit;
            return;
        }

        let ascending = self.ascending(id);
        let children = tree.node_children(id);
        let mut visit = |&child: &usize| self.cast_all(child, limit);
        if ascending {
            children.iter().for_each(&mut visit);
        } else {
            children.iter().rev().for_each(&mut visit);
        }
    }
}

impl BvhTree {
    /// Casts a ray and returns the closest leaf hull it enters.
    ///
    /// `direction` must be unit length. A positive `radius` sweeps a capsule
    /// instead of a ray.
    pub fn raycast(
        &self,
        origin: Point3<f32>,
        direction: Vector3<f32>,
        radius: f32,
    ) -> Option<RayHit> {
        self.raycast_ex(origin, direction, radius, None, None)
    }

    /// Casts a ray with an optional starting hit and leaf callback.
    ///
    /// `seed.dist` limits the cast. The callback performs the exact
    /// primitive test and should overwrite the hit record only when it finds
    /// something closer than `hit.dist`. Without a callback the leaf hull's
    /// entry point is reported.
    pub fn raycast_ex(
        &self,
        origin: Point3<f32>,
        direction: Vector3<f32>,
        radius: f32,
        seed: Option<RayHit>,
        callback: Option<&mut RayCastCallback<'_>>,
    ) -> Option<RayHit> {
        debug_assert!(
            (direction.norm_squared() - 1.0).abs() < 1e-4,
            "ray direction must be unit length"
        );
        let ray = BvhRay {
            origin,
            direction,
            radius,
        };
        let mut cast = RayCast::new(self, ray, seed.unwrap_or_default(), callback);
        if let Some(root) = self.root() {
            cast.cast(root);
        }
        cast.hit.index.map(|_| cast.hit)
    }

    /// Invokes `callback` for every leaf whose hull the ray enters within
    /// `hit_dist`, in front-to-back order along each node's split axis.
    ///
    /// Changes the callback makes to the hit record are discarded after each
    /// leaf.
    pub fn raycast_all(
        &self,
        origin: Point3<f32>,
        direction: Vector3<f32>,
        radius: f32,
        hit_dist: f32,
        callback: &mut RayCastCallback<'_>,
    ) {
        debug_assert!(
            (direction.norm_squared() - 1.0).abs() < 1e-4,
            "ray direction must be unit length"
        );
        let ray = BvhRay {
            origin,
            direction,
            radius,
        };
        let mut cast = RayCast::new(self, ray, RayHit::within(hit_dist), Some(callback));
        if let Some(root) = self.root() {
            cast.cast_all(root, hit_dist);
        }
    }
}
