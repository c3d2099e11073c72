//! Structural and query properties checked over random point clouds.

use std::collections::BTreeSet;

use approx::assert_relative_eq;
use kdop_bvh::{BvhSettings, BvhTree, Nearest, OverlapFlags, Plane3D, RayHit, SearchOrder};
use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_points(rng: &mut StdRng, count: usize, extent: f32) -> Vec<Point3<f32>> {
    (0..count)
        .map(|_| {
            Point3::new(
                rng.random_range(-extent..extent),
                rng.random_range(-extent..extent),
                rng.random_range(-extent..extent),
            )
        })
        .collect()
}

fn build(
    points: &[Point3<f32>],
    epsilon: f32,
    arity: usize,
    axis_count: usize,
    settings: BvhSettings,
) -> BvhTree {
    let mut tree = BvhTree::with_settings(points.len(), epsilon, arity, axis_count, settings)
        .unwrap();
    for (index, point) in points.iter().enumerate() {
        tree.insert(index, std::slice::from_ref(point));
    }
    tree.balance();
    tree
}

fn assert_superset(tree: &BvhTree) {
    let Some(root) = tree.root() else {
        return;
    };
    for id in root..root + tree.branch_count() {
        let bounds = tree.node_bounds(id);
        for &child in tree.node_children(id) {
            let child_bounds = tree.node_bounds(child);
            for (parent_range, child_range) in bounds.iter().zip(child_bounds) {
                assert!(
                    parent_range.contains(child_range),
                    "node {id} does not contain child {child}"
                );
            }
        }
    }
}

#[test]
fn node_counts_and_leaf_indices() {
    let mut rng = StdRng::seed_from_u64(1);
    let shapes = [
        (1, 2, 6),
        (7, 3, 8),
        (100, 4, 14),
        (513, 8, 18),
        (1000, 32, 26),
    ];
    for (count, arity, axis_count) in shapes {
        let points = random_points(&mut rng, count, 10.0);
        let tree = build(&points, 0.0, arity, axis_count, BvhSettings::default());

        assert_eq!(tree.len(), count);
        let expected_branches = ((count + arity - 3) / (arity - 1)).max(1);
        assert_eq!(tree.branch_count(), expected_branches);
        assert_eq!(tree.root(), Some(count));
        assert!(tree.node(count + tree.branch_count()).is_none());

        let mut seen = BTreeSet::new();
        for leaf in 0..tree.len() {
            let node = tree.node(leaf).unwrap();
            assert!(node.is_leaf());
            assert!(node.index() < tree.len());
            seen.insert(node.index());
        }
        assert_eq!(seen.len(), count);

        for branch in count..count + tree.branch_count() {
            let children = tree.node_children(branch);
            assert!(!children.is_empty() && children.len() <= arity);
            let linked_forward = |&child: &usize| child > branch || child < count;
            assert!(children.iter().all(linked_forward));
        }
    }
}

#[test]
fn bounds_contain_children_after_balance_and_refit() {
    let mut rng = StdRng::seed_from_u64(2);
    let mut points = random_points(&mut rng, 400, 8.0);
    let mut tree = build(&points, 0.05, 4, 26, BvhSettings::default());
    assert_superset(&tree);

    for _ in 0..3 {
        for (leaf, point) in points.iter_mut().enumerate() {
            let start = *point;
            let (dx, dy) = (rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0));
            *point += Vector3::new(dx, dy, 0.5);
            let moved = std::slice::from_ref(point);
            tree.update_leaf(leaf, &[start], Some(moved)).unwrap();
        }
        tree.refit();
        assert_superset(&tree);
    }
}

#[test]
fn moved_leaves_are_found_after_refit() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut points = random_points(&mut rng, 200, 5.0);
    let mut tree = build(&points, 0.0, 2, 6, BvhSettings::default());

    for (leaf, point) in points.iter_mut().enumerate() {
        *point += Vector3::new(20.0, 0.0, 0.0);
        let moved = std::slice::from_ref(point);
        tree.update_leaf(leaf, moved, None).unwrap();
    }
    tree.refit();

    for (index, point) in points.iter().enumerate() {
        let nearest = tree.find_nearest(*point).unwrap();
        assert_eq!(nearest.index, Some(index));
    }
}

#[test]
fn self_overlap_is_cross_overlap_without_identity() {
    let mut rng = StdRng::seed_from_u64(4);
    let points = random_points(&mut rng, 250, 4.0);
    for flags in [OverlapFlags::empty(), OverlapFlags::USE_THREADING] {
        let tree = build(&points, 0.4, 4, 8, BvhSettings::with_threshold(0));

        let cross: BTreeSet<_> = tree
            .overlap(&tree, flags)
            .into_iter()
            .filter(|pair| pair.index_a != pair.index_b)
            .map(|pair| {
                let (a, b) = (pair.index_a, pair.index_b);
                (a.min(b), a.max(b))
            })
            .collect();
        let self_pairs = tree.overlap(&tree, flags | OverlapFlags::SELF);
        let unordered: BTreeSet<_> = self_pairs
            .iter()
            .map(|pair| {
                let (a, b) = (pair.index_a, pair.index_b);
                (a.min(b), a.max(b))
            })
            .collect();

        assert_eq!(unordered.len(), self_pairs.len());
        assert_eq!(unordered, cross);
    }
}

#[test]
fn raycast_is_independent_of_threading() {
    let mut rng = StdRng::seed_from_u64(5);
    let points = random_points(&mut rng, 3000, 10.0);
    let serial = build(&points, 0.1, 4, 14, BvhSettings::serial());
    let parallel = build(&points, 0.1, 4, 14, BvhSettings::with_threshold(0));

    for _ in 0..100 {
        let (y, z) = (rng.random_range(-5.0..5.0), rng.random_range(-5.0..5.0));
        let origin = Point3::new(-15.0, y, z);
        let (dy, dz) = (rng.random_range(-0.3..0.3), rng.random_range(-0.3..0.3));
        let direction = Vector3::new(1.0, dy, dz).normalize();
        let key = |hit: RayHit| (hit.index, hit.dist);
        let a = serial.raycast(origin, direction, 0.0).map(key);
        let b = parallel.raycast(origin, direction, 0.0).map(key);
        assert_eq!(a, b);
    }
}

#[test]
fn seeded_search_never_finds_anything_closer() {
    let mut rng = StdRng::seed_from_u64(6);
    let points = random_points(&mut rng, 500, 5.0);
    let tree = build(&points, 0.0, 3, 6, BvhSettings::default());

    for query in random_points(&mut rng, 100, 6.0) {
        let unseeded = tree.find_nearest(query).unwrap();
        for radius_sq in [0.01, 0.1, 0.5, 2.0] {
            let seed = Some(Nearest::within(radius_sq));
            let seeded = tree.find_nearest_ex(query, seed, SearchOrder::DepthFirst, None);
            match seeded {
                Some(found) => assert!(found.dist_sq >= unseeded.dist_sq),
                None => assert!(unseeded.dist_sq >= radius_sq),
            }
        }
    }
}

#[test]
fn every_point_finds_itself() {
    let mut rng = StdRng::seed_from_u64(7);
    let points = random_points(&mut rng, 2000, 50.0);
    let tree = build(&points, 0.0, 4, 26, BvhSettings::default());
    for (index, point) in points.iter().enumerate() {
        let nearest = tree.find_nearest(*point).unwrap();
        assert_eq!(nearest.index, Some(index));
        assert_relative_eq!(nearest.dist_sq, 0.0);
    }
}

#[test]
fn search_orders_agree() {
    let mut rng = StdRng::seed_from_u64(8);
    let points = random_points(&mut rng, 800, 5.0);
    let tree = build(&points, 0.0, 5, 18, BvhSettings::default());
    for query in random_points(&mut rng, 100, 7.0) {
        let depth_first = tree
            .find_nearest_ex(query, None, SearchOrder::DepthFirst, None)
            .unwrap();
        let best_first = tree
            .find_nearest_ex(query, None, SearchOrder::BestFirst, None)
            .unwrap();
        assert_eq!(depth_first.index, best_first.index);
        assert_eq!(depth_first.dist_sq, best_first.dist_sq);
    }
}

#[test]
fn empty_tree_answers_not_found() {
    let tree = build(&[], 0.0, 4, 6, BvhSettings::default());
    let origin = Point3::origin();
    assert!(tree.is_empty());
    assert_eq!(tree.bounding_box(), None);
    assert_eq!(tree.find_nearest(origin), None);
    assert_eq!(tree.find_nearest_first(origin, 1.0, None), None);
    assert_eq!(tree.raycast(origin, Vector3::x(), 0.0), None);
    assert!(tree.overlap(&tree, OverlapFlags::empty()).is_empty());
    assert!(tree.overlap(&tree, OverlapFlags::SELF).is_empty());
    let plane = Plane3D::from_point_and_normal(origin, Vector3::z());
    assert!(tree.intersect_plane(&plane).is_empty());
    assert_eq!(tree.range_query(origin, 100.0, None), 0);
}

#[test]
fn range_query_matches_brute_force() {
    let mut rng = StdRng::seed_from_u64(9);
    let points = random_points(&mut rng, 1000, 10.0);
    let tree = build(&points, 0.0, 6, 8, BvhSettings::default());
    for center in random_points(&mut rng, 30, 10.0) {
        let radius: f32 = rng.random_range(0.5..4.0);
        let radius_sq = radius * radius;
        let expected = points
            .iter()
            .filter(|point| (*point - center).norm_squared() < radius_sq)
            .count();
        assert_eq!(tree.range_query(center, radius, None), expected);
    }
}

#[test]
fn plane_query_matches_brute_force() {
    let mut rng = StdRng::seed_from_u64(10);
    let points = random_points(&mut rng, 1000, 10.0);
    let epsilon = 0.3;
    let tree = build(&points, epsilon, 4, 6, BvhSettings::default());
    for _ in 0..10 {
        let normal = Vector3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(0.1..1.0),
        );
        let plane = Plane3D::from_point_and_normal(random_points(&mut rng, 1, 5.0)[0], normal);

        let mut found = tree.intersect_plane(&plane);
        found.sort_unstable();
        let half = Vector3::repeat(epsilon);
        let expected: Vec<usize> = (0..points.len())
            .filter(|&i| plane.crosses_box(points[i] - half, points[i] + half))
            .collect();
        assert_eq!(found, expected);
    }
}

#[test]
fn raycast_all_visits_every_hit_leaf() {
    let mut rng = StdRng::seed_from_u64(11);
    let points = random_points(&mut rng, 2000, 5.0);
    let epsilon = 0.5;
    let tree = build(&points, epsilon, 4, 6, BvhSettings::default());
    let origin = Point3::new(-10.0, 0.2, -0.1);
    let direction = Vector3::x();

    let mut visited = Vec::new();
    let mut collect = |index: usize, _: &kdop_bvh::BvhRay, _: &mut RayHit| visited.push(index);
    let limit = kdop_bvh::RAY_CAST_DIST_MAX;
    tree.raycast_all(origin, direction, 0.0, limit, &mut collect);

    let expected: BTreeSet<usize> = points
        .iter()
        .enumerate()
        .filter(|(_, point)| {
            (point.y - origin.y).abs() < epsilon && (point.z - origin.z).abs() < epsilon
        })
        .map(|(index, _)| index)
        .collect();
    let visited_set: BTreeSet<usize> = visited.iter().copied().collect();
    assert_eq!(visited_set.len(), visited.len());
    assert_eq!(visited_set, expected);

    let closest = tree.raycast(origin, direction, 0.0).unwrap();
    let min_x = expected
        .iter()
        .map(|&index| points[index].x)
        .fold(f32::MAX, f32::min);
    assert_relative_eq!(closest.dist, min_x - epsilon - origin.x, epsilon = 1e-4);
}

#[test]
fn overlap_budget_caps_pairs_exactly() {
    let mut rng = StdRng::seed_from_u64(12);
    let points = random_points(&mut rng, 500, 3.0);
    let tree = build(&points, 0.3, 4, 6, BvhSettings::with_threshold(0));
    let total = tree.overlap_ex(&tree, None, 0, OverlapFlags::empty()).total;
    assert!(total > 100);

    let threaded = OverlapFlags::RETURN_PAIRS | OverlapFlags::USE_THREADING;
    for budget in [1, 17, 100, total] {
        for flags in [OverlapFlags::RETURN_PAIRS, threaded] {
            let result = tree.overlap_ex(&tree, None, budget, flags);
            assert_eq!(result.total, budget);
            assert_eq!(result.pairs.len(), budget);
        }
    }
}
