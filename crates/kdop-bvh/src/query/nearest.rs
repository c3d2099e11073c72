//! Nearest-point searches.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use nalgebra::{Point3, Vector3};

use crate::BvhTree;

use super::{box_contains_point, box_distance_squared, box_nearest_point};

/// The best candidate found by a nearest search.
///
/// Callbacks receive a mutable reference and improve it in place: a callback
/// that finds its primitive closer than `dist_sq` overwrites every field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nearest {
    /// Primitive index of the best candidate, `None` if nothing was found.
    pub index: Option<usize>,
    /// Closest point on the best candidate.
    pub co: Point3<f32>,
    /// Surface normal at `co`, filled in by callbacks that know it.
    pub normal: Vector3<f32>,
    /// Squared distance from the query point to `co`.
    pub dist_sq: f32,
}

impl Nearest {
    /// A record that accepts candidates at any distance.
    pub fn new() -> Self {
        Self::within(f32::MAX)
    }

    /// A record that only accepts candidates closer than `sqrt(dist_sq)`.
    pub fn within(dist_sq: f32) -> Self {
        Self {
            index: None,
            co: Point3::origin(),
            normal: Vector3::zeros(),
            dist_sq,
        }
    }
}

impl Default for Nearest {
    fn default() -> Self {
        Self::new()
    }
}

/// Leaf test for nearest searches: `(primitive index, query point, best)`.
pub type NearestCallback<'a> = dyn FnMut(usize, &Point3<f32>, &mut Nearest) + 'a;

/// Traversal strategy of [`BvhTree::find_nearest_ex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchOrder {
    /// Depth-first, diving first into the child on the query's side of the
    /// split axis.
    #[default]
    DepthFirst,
    /// Best-first over a min-heap of box distances. Visits nodes in strict
    /// distance order, which pays off when the callback is expensive or may
    /// reject candidates.
    BestFirst,
}

struct NearestSearch<'t, 'c, 'f> {
    tree: &'t BvhTree,
    co: Point3<f32>,
    callback: Option<&'c mut NearestCallback<'f>>,
    nearest: Nearest,
}

impl NearestSearch<'_, '_, '_> {
    fn evaluate_leaf(&mut self, id: usize) {
        let index = self.tree.nodes[id].index();
        match self.callback.as_deref_mut() {
            Some(callback) => callback(index, &self.co, &mut self.nearest),
            None => {
                let (dist_sq, co) = box_nearest_point(self.tree.node_bounds(id), &self.co);
                self.nearest.index = Some(index);
                self.nearest.dist_sq = dist_sq;
                self.nearest.co = co;
            }
        }
    }

    /// Whether the children of `id` should be visited in ascending order.
    fn ascending(&self, id: usize) -> bool {
        let tree = self.tree;
        let axis = tree.nodes[id].main_axis();
        let first = tree.node_children(id)[0];
        self.co[axis] <= tree.node_bounds(first)[axis].max
    }

    fn depth_first(&mut self, root: usize) {
        if box_distance_squared(self.tree.node_bounds(root), &self.co) < self.nearest.dist_sq {
            self.depth_first_node(root);
        }
    }

    fn depth_first_node(&mut self, id: usize) {
        let tree = self.tree;
        if tree.is_leaf(id) {
            self.evaluate_leaf(id);
            return;
        }

        let ascending = self.ascending(id);
        let children = tree.node_children(id);
        let mut visit = |child: &usize| {
            let child = *child;
            if box_distance_squared(tree.node_bounds(child), &self.co) < self.nearest.dist_sq {
                self.depth_first_node(child);
            }
        };
        if ascending {
            children.iter().for_each(&mut visit);
        } else {
            children.iter().rev().for_each(&mut visit);
        }
    }

    fn best_first(&mut self, root: usize) {
        let tree = self.tree;
        if box_distance_squared(tree.node_bounds(root), &self.co) >= self.nearest.dist_sq {
            return;
        }

        let mut heap = BinaryHeap::with_capacity(32);
        self.expand(root, &mut heap);
        while let Some(entry) = heap.peek() {
            if entry.dist_sq >= self.nearest.dist_sq {
                break;
            }
            let id = entry.id;
            heap.pop();
            self.expand(id, &mut heap);
        }
    }

    fn expand(&mut self, id: usize, heap: &mut BinaryHeap<HeapEntry>) {
        let tree = self.tree;
        if tree.is_leaf(id) {
            self.evaluate_leaf(id);
            return;
        }
        for &child in tree.node_children(id) {
            let dist_sq = box_distance_squared(tree.node_bounds(child), &self.co);
            if dist_sq < self.nearest.dist_sq {
                heap.push(HeapEntry { dist_sq, id: child });
            }
        }
    }

    /// Returns `true` once a leaf was accepted.
    fn first_containing(&mut self, id: usize) -> bool {
        let tree = self.tree;
        if tree.is_leaf(id) {
            let index = tree.nodes[id].index();
            return match self.callback.as_deref_mut() {
                Some(callback) => {
                    let dist_sq = self.nearest.dist_sq;
                    callback(index, &self.co, &mut self.nearest);
                    self.nearest.dist_sq < dist_sq
                }
                None => {
                    self.nearest.index = Some(index);
                    true
                }
            };
        }

        let ascending = self.ascending(id);
        let children = tree.node_children(id);
        let mut visit = |child: &usize| {
            let child = *child;
            box_contains_point(tree.node_bounds(child), &self.co) && self.first_containing(child)
        };
        if ascending {
            children.iter().any(&mut visit)
        } else {
            children.iter().rev().any(&mut visit)
        }
    }
}

/// Min-heap entry keyed on box distance.
#[derive(Debug, Clone, Copy)]
struct HeapEntry {
    dist_sq: f32,
    id: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.dist_sq.total_cmp(&self.dist_sq)
    }
}

impl BvhTree {
    /// Finds the leaf whose hull is closest to `co`.
    ///
    /// Without a leaf callback the distance is measured to the leaf's
    /// axis-aligned hull, which for point leaves is the point itself grown by
    /// `epsilon`.
    pub fn find_nearest(&self, co: Point3<f32>) -> Option<Nearest> {
        self.find_nearest_ex(co, None, SearchOrder::DepthFirst, None)
    }

    /// Finds the nearest primitive, with full control over the search.
    ///
    /// `seed` bounds the search: only candidates closer than
    /// `sqrt(seed.dist_sq)` are considered, and a seed that already carries
    /// an index is returned unchanged when nothing closer exists. `callback`
    /// replaces the hull distance with an exact primitive test; it should
    /// update the record only when it finds something closer.
    pub fn find_nearest_ex(
        &self,
        co: Point3<f32>,
        seed: Option<Nearest>,
        order: SearchOrder,
        callback: Option<&mut NearestCallback<'_>>,
    ) -> Option<Nearest> {
        let mut search = NearestSearch {
            tree: self,
            co,
            callback,
            nearest: seed.unwrap_or_default(),
        };
        if let Some(root) = self.root() {
            match order {
                SearchOrder::DepthFirst => search.depth_first(root),
                SearchOrder::BestFirst => search.best_first(root),
            }
        }
        search.nearest.index.map(|_| search.nearest)
    }

    /// Returns the first leaf whose hull strictly contains `co`.
    ///
    /// With a callback, a leaf is accepted only when the callback brings the
    /// record below `max_dist_sq`; the search stops at the first acceptance.
    /// An index written by a callback that rejected its leaf is discarded.
    /// This is a cheap existence or duplicate test, not a nearest search.
    pub fn find_nearest_first(
        &self,
        co: Point3<f32>,
        max_dist_sq: f32,
        callback: Option<&mut NearestCallback<'_>>,
    ) -> Option<usize> {
        let root = self.root()?;
        let mut search = NearestSearch {
            tree: self,
            co,
            callback,
            nearest: Nearest::within(max_dist_sq),
        };
        let accepted =
            box_contains_point(self.node_bounds(root), &co) && search.first_containing(root);
        search.nearest.index.filter(|_| accepted)
    }
}
