//! Spherical range query.

use nalgebra::Point3;

use crate::BvhTree;

use super::box_distance_squared;

/// Called for each leaf in range: `(primitive index, center, squared
/// distance to the leaf hull)`.
pub type RangeCallback<'a> = dyn FnMut(usize, &Point3<f32>, f32) + 'a;

struct RangeQuery<'t, 'c, 'f> {
    tree: &'t BvhTree,
    center: Point3<f32>,
    radius_sq: f32,
    callback: Option<&'c mut RangeCallback<'f>>,
    hits: usize,
}

impl RangeQuery<'_, '_, '_> {
    /// Visits `id`, already known to be in range.
    fn visit(&mut self, id: usize, dist_sq: f32) {
        let tree = self.tree;
        if tree.is_leaf(id) {
            self.hits += 1;
            if let Some(callback) = self.callback.as_deref_mut() {
                callback(tree.nodes[id].index(), &self.center, dist_sq);
            }
            return;
        }

        for &child in tree.node_children(id) {
            let dist_sq = box_distance_squared(tree.node_bounds(child), &self.center);
            if dist_sq < self.radius_sq {
                self.visit(child, dist_sq);
            }
        }
    }
}

impl BvhTree {
    /// Reports every leaf whose hull comes closer than `radius` to `center`
    /// and returns how many there were.
    pub fn range_query(
        &self,
        center: Point3<f32>,
        radius: f32,
        callback: Option<&mut RangeCallback<'_>>,
    ) -> usize {
        let Some(root) = self.root() else {
            return 0;
        };
        let mut query = RangeQuery {
            tree: self,
            center,
            radius_sq: radius * radius,
            callback,
            hits: 0,
        };
        let dist_sq = box_distance_squared(self.node_bounds(root), &center);
        if dist_sq < query.radius_sq {
            query.visit(root, dist_sq);
        }
        query.hits
    }
}
