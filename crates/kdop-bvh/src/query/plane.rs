//! Plane intersection query.

use nalgebra::Point3;

use crate::BvhTree;
use crate::plane::Plane3D;

impl BvhTree {
    /// Returns the primitive indices of every leaf whose axis-aligned hull
    /// straddles `plane`, in traversal order.
    ///
    /// Only the box axes of the k-DOP are tested, so for higher-order
    /// k-DOPs a leaf may be reported whose tighter hull lies fully on one
    /// side.
    pub fn intersect_plane(&self, plane: &Plane3D) -> Vec<usize> {
        let mut intersected = Vec::new();
        if let Some(root) = self.root() {
            self.intersect_plane_node(root, plane, &mut intersected);
        }
        intersected
    }

    fn intersect_plane_node(&self, id: usize, plane: &Plane3D, intersected: &mut Vec<usize>) {
        let bounds = self.node_bounds(id);
        let min = Point3::new(bounds[0].min, bounds[1].min, bounds[2].min);
        let max = Point3::new(bounds[0].max, bounds[1].max, bounds[2].max);
        if !plane.crosses_box(min, max) {
            return;
        }

        if self.is_leaf(id) {
            intersected.push(self.nodes[id].index());
        } else {
            for &child in self.node_children(id) {
                self.intersect_plane_node(child, plane, intersected);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::Vector3;

    use super::*;
    use crate::BvhSettings;
    use crate::test_util::{grid, point_tree, point_tree_with, random_points};

    #[test]
    fn empty_tree_intersects_nothing() {
        let tree = point_tree(&[], 2, 6);
        let plane = Plane3D::from_point_and_normal(Point3::origin(), Vector3::x());
        assert!(tree.intersect_plane(&plane).is_empty());
    }

    #[test]
    fn finds_the_sliced_layer() {
        let points = grid(4);
        let tree = point_tree_with(&points, 0.1, 4, 6, BvhSettings::default());
        // z = 0.5 * k; slice through the second layer.
        let plane = Plane3D::from_coefficients([0.0, 0.0, 1.0, -0.52]);

        let mut found = tree.intersect_plane(&plane);
        found.sort_unstable();
        let expected: Vec<usize> = (0..points.len()).filter(|&i| i % 4 == 1).collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn plane_between_layers_finds_nothing() {
        let tree = point_tree_with(&grid(3), 0.1, 2, 6, BvhSettings::default());
        let plane = Plane3D::from_point_and_normal(Point3::new(0.0, 0.75, 0.0), Vector3::y());
        assert!(tree.intersect_plane(&plane).is_empty());
    }

    #[test]
    fn oblique_plane_matches_brute_force() {
        let points = random_points(300, 5.0, 31);
        let epsilon = 0.25;
        let tree = point_tree_with(&points, epsilon, 3, 26, BvhSettings::default());
        let plane = Plane3D::from_point_and_normal(
            Point3::new(0.3, -0.2, 0.1),
            Vector3::new(1.0, 2.0, -0.5),
        );

        let mut found = tree.intersect_plane(&plane);
        found.sort_unstable();
        let expected: Vec<usize> = points
            .iter()
            .enumerate()
            .filter(|(_, p)| {
                let half = Vector3::repeat(epsilon);
                plane.crosses_box(*p - half, *p + half)
            })
            .map(|(i, _)| i)
            .collect();
        assert_eq!(found, expected);
    }
}
