//! Fixtures shared by the unit tests.

use nalgebra::Point3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{BvhSettings, BvhTree};

/// Builds a tree with one point leaf per input point, leaf `i` indexing
/// primitive `i`.
pub(crate) fn point_tree(points: &[Point3<f32>], arity: usize, axis_count: usize) -> BvhTree {
    point_tree_with(points, 0.0, arity, axis_count, BvhSettings::default())
}

pub(crate) fn point_tree_with(
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

/// An `n`³ lattice with a different spacing on every axis.
pub(crate) fn grid(n: usize) -> Vec<Point3<f32>> {
    let mut points = Vec::with_capacity(n * n * n);
    for x in 0..n {
        for y in 0..n {
            for z in 0..n {
                points.push(Point3::new(x as f32, y as f32 * 1.5, z as f32 * 0.5));
            }
        }
    }
    points
}

/// Reproducible points in the cube `[-extent, extent]³`.
pub(crate) fn random_points(count: usize, extent: f32, seed: u64) -> Vec<Point3<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
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
