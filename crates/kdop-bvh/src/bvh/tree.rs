//! BVH container, construction lifecycle and refit.

use nalgebra::Point3;

use crate::error::{BvhError, Result};
use crate::kdop::{AxisRange, KDOP_AXIS_LENGTHS, KdopType, project};
use crate::settings::BvhSettings;

use super::build::{build_levels, needed_branches};
use super::node::BvhNode;

/// Largest supported number of children per branch.
pub const MAX_ARITY: usize = 32;

/// A k-DOP bounding volume hierarchy over caller-indexed primitives.
///
/// Each primitive is inserted as a point set; its leaf stores the projection
/// extents of those points onto the k-DOP's slab directions, inflated by
/// `epsilon`. [`balance`](Self::balance) then builds a height-balanced tree
/// in one shot. After that, leaves may be moved with
/// [`update_leaf`](Self::update_leaf) and the branches re-unioned with
/// [`refit`](Self::refit), but the topology stays fixed.
///
/// # Example
///
/// ```
/// use kdop_bvh::BvhTree;
/// use nalgebra::Point3;
///
/// let points = [
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
/// ];
/// let mut tree = BvhTree::new(points.len(), 1e-5, 4, 6).unwrap();
/// for (index, point) in points.iter().enumerate() {
///     tree.insert(index, std::slice::from_ref(point));
/// }
/// tree.balance();
///
/// let nearest = tree.find_nearest(Point3::new(0.9, 0.1, 0.0)).unwrap();
/// assert_eq!(nearest.index, Some(1));
/// ```
///
/// # Layout
///
/// Leaves occupy node ids `0..len()` in insertion order, branches follow.
/// Every branch's children have larger ids than the branch itself, so
/// [`refit`](Self::refit) is a single reverse scan.
#[derive(Debug, Clone)]
pub struct BvhTree {
    pub(crate) kdop: KdopType,
    pub(crate) arity: usize,
    pub(crate) epsilon: f32,
    pub(crate) settings: BvhSettings,
    pub(crate) max_leaves: usize,
    pub(crate) leaf_count: usize,
    pub(crate) branch_count: usize,
    pub(crate) balanced: bool,
    pub(crate) nodes: Vec<BvhNode>,
    pub(crate) bounds: Vec<AxisRange>,
    pub(crate) children: Vec<usize>,
}

impl BvhTree {
    /// Creates an empty tree able to hold `max_leaves` primitives.
    ///
    /// `arity` must lie in `2..=MAX_ARITY` and `axis_count` must be one of 6,
    /// 8, 14, 18 or 26.
    pub fn new(max_leaves: usize, epsilon: f32, arity: usize, axis_count: usize) -> Result<Self> {
        let settings = BvhSettings::default();
        Self::with_settings(max_leaves, epsilon, arity, axis_count, settings)
    }

    /// Like [`new`](Self::new), with explicit threading settings.
    pub fn with_settings(
        max_leaves: usize,
        epsilon: f32,
        arity: usize,
        axis_count: usize,
        settings: BvhSettings,
    ) -> Result<Self> {
        if !(2..=MAX_ARITY).contains(&arity) {
            return Err(BvhError::InvalidArity(arity));
        }
        let kdop = KdopType::from_axis_count(axis_count)?;

        let max_branches = needed_branches(arity, max_leaves);
        let node_capacity = max_leaves + max_branches;

        let nodes = eager_vec(node_capacity, BvhNode::default())?;
        let bounds = eager_vec(node_capacity * kdop.axis_len(), AxisRange::EMPTY)?;
        let children = eager_vec(max_branches * arity, 0usize)?;

        log::debug!(
            "created {kdop} tree: {max_leaves} leaves, arity {arity}, epsilon {epsilon}"
        );

        Ok(Self {
            kdop,
            arity,
            epsilon,
            settings,
            max_leaves,
            leaf_count: 0,
            branch_count: 0,
            balanced: false,
            nodes,
            bounds,
            children,
        })
    }

    /// Adds a primitive, hulled from `points`.
    ///
    /// Only valid before [`balance`](Self::balance) and at most `max_leaves`
    /// times. Violations are debug assertions and ignored in release builds.
    pub fn insert(&mut self, index: usize, points: &[Point3<f32>]) {
        debug_assert!(!self.is_balanced(), "insert after balance");
        debug_assert!(
            self.leaf_count < self.max_leaves,
            "insert past tree capacity"
        );
        if self.is_balanced() || self.leaf_count >= self.max_leaves {
            log::warn!("ignoring insert of {index}: tree is balanced or full");
            return;
        }

        let leaf = self.leaf_count;
        self.leaf_count += 1;
        self.nodes[leaf] = BvhNode::leaf(index);
        self.write_leaf_hull(leaf, points, None);
    }

    /// Builds the tree topology over the inserted leaves.
    ///
    /// Must be called exactly once. A tree without leaves stays empty and
    /// answers every query with "not found".
    pub fn balance(&mut self) {
        debug_assert!(!self.is_balanced(), "balance called twice");
        if self.is_balanced() {
            log::warn!("ignoring repeated balance");
            return;
        }
        self.balanced = true;
        if self.leaf_count == 0 {
            log::debug!("balance on an empty tree");
            return;
        }

        let leaf_count = self.leaf_count;
        let branch_count = needed_branches(self.arity, leaf_count);
        let axis_len = self.kdop.axis_len();
        let use_threading = self.settings.use_threading(leaf_count);

        let mut leaf_order: Vec<usize> = (0..leaf_count).collect();
        let (leaf_bounds, branch_bounds) = self.bounds.split_at_mut(leaf_count * axis_len);
        let branch_nodes = &mut self.nodes[leaf_count..leaf_count + branch_count];

        build_levels(
            self.arity,
            axis_len,
            leaf_bounds,
            &mut leaf_order,
            branch_nodes,
            &mut branch_bounds[..branch_count * axis_len],
            &mut self.children[..branch_count * self.arity],
            use_threading,
        );
        self.branch_count = branch_count;

        log::debug!(
            "balanced {} tree: {leaf_count} leaves, {branch_count} branches ({})",
            self.kdop,
            if use_threading { "parallel" } else { "serial" }
        );
    }

    /// Recomputes a leaf's hull from `points`, extended by `moving` when the
    /// primitive sweeps between two positions.
    ///
    /// Branch bounds are not touched; call [`refit`](Self::refit) once all
    /// leaves are updated.
    pub fn update_leaf(
        &mut self,
        leaf: usize,
        points: &[Point3<f32>],
        moving: Option<&[Point3<f32>]>,
    ) -> Result<()> {
        if leaf >= self.leaf_count {
            return Err(BvhError::LeafOutOfRange {
                leaf,
                leaf_count: self.leaf_count,
            });
        }
        self.write_leaf_hull(leaf, points, moving);
        Ok(())
    }

    /// Re-unions every branch from its children, bottom-up.
    pub fn refit(&mut self) {
        let axis_len = self.kdop.axis_len();
        let mut joined = [AxisRange::EMPTY; crate::kdop::KDOP_AXIS_COUNT];

        for branch in (self.leaf_count..self.leaf_count + self.branch_count).rev() {
            let joined = &mut joined[..axis_len];
            joined.fill(AxisRange::EMPTY);
            for &child in self.node_children(branch) {
                for (range, child_range) in joined.iter_mut().zip(self.node_bounds(child)) {
                    range.union(child_range);
                }
            }
            self.bounds[branch * axis_len..(branch + 1) * axis_len].copy_from_slice(joined);
        }
    }

    fn write_leaf_hull(
        &mut self,
        leaf: usize,
        points: &[Point3<f32>],
        moving: Option<&[Point3<f32>]>,
    ) {
        let axes = self.kdop.axes();
        let epsilon = self.epsilon;
        let hull = &mut self.bounds[leaf * axes.len()..(leaf + 1) * axes.len()];

        for (range, &axis) in hull.iter_mut().zip(axes) {
            *range = AxisRange::EMPTY;
            for point in points.iter().chain(moving.into_iter().flatten()) {
                range.extend(project(point, axis));
            }
            range.inflate(epsilon * KDOP_AXIS_LENGTHS[axis]);
        }
    }

    /// Returns the number of inserted leaves.
    #[inline]
    pub fn len(&self) -> usize {
        self.leaf_count
    }

    /// Returns `true` if no leaf was inserted.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }

    /// Returns the leaf capacity declared at creation.
    #[inline]
    pub fn max_leaves(&self) -> usize {
        self.max_leaves
    }

    /// Returns the number of branches (zero before balancing).
    #[inline]
    pub fn branch_count(&self) -> usize {
        self.branch_count
    }

    /// Returns the maximum number of children per branch.
    #[inline]
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Returns the leaf inflation distance.
    #[inline]
    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    /// Returns the bounding volume flavour.
    #[inline]
    pub fn kdop(&self) -> KdopType {
        self.kdop
    }

    /// Returns the threading settings.
    #[inline]
    pub fn settings(&self) -> BvhSettings {
        self.settings
    }

    /// Whether [`balance`](Self::balance) has run.
    #[inline]
    pub fn is_balanced(&self) -> bool {
        self.balanced
    }

    /// Returns the root node id, if the tree is balanced and non-empty.
    #[inline]
    pub fn root(&self) -> Option<usize> {
        (self.branch_count > 0).then_some(self.leaf_count)
    }

    /// Returns the node with the given id.
    #[inline]
    pub fn node(&self, id: usize) -> Option<&BvhNode> {
        let node_count = self.leaf_count + self.branch_count;
        (id < node_count).then(|| &self.nodes[id])
    }

    /// Returns the bounding volume of a node, one range per k-DOP axis.
    ///
    /// # Panics
    /// Panics if `id` is outside the arena.
    #[inline]
    pub fn node_bounds(&self, id: usize) -> &[AxisRange] {
        let axis_len = self.kdop.axis_len();
        &self.bounds[id * axis_len..(id + 1) * axis_len]
    }

    /// Returns the child ids of a node (empty for leaves).
    #[inline]
    pub fn node_children(&self, id: usize) -> &[usize] {
        if id < self.leaf_count {
            return &[];
        }
        let start = (id - self.leaf_count) * self.arity;
        &self.children[start..start + self.nodes[id].child_count()]
    }

    /// Whether `id` refers to a leaf.
    #[inline]
    pub(crate) fn is_leaf(&self, id: usize) -> bool {
        id < self.leaf_count
    }

    /// Returns the axis-aligned box `(min, max)` enclosing every leaf.
    pub fn bounding_box(&self) -> Option<(Point3<f32>, Point3<f32>)> {
        let bounds = self.node_bounds(self.root()?);
        Some((
            Point3::new(bounds[0].min, bounds[1].min, bounds[2].min),
            Point3::new(bounds[0].max, bounds[1].max, bounds[2].max),
        ))
    }

    /// Whether this tree may be overlapped with `other`.
    #[inline]
    pub fn is_compatible(&self, other: &Self) -> bool {
        self.kdop.is_compatible(other.kdop)
    }
}

/// Allocates a vector of `len` copies of `value`, reporting allocation
/// failure instead of aborting.
fn eager_vec<T: Clone>(len: usize, value: T) -> Result<Vec<T>> {
    let mut vec = Vec::new();
    vec.try_reserve_exact(len)?;
    vec.resize(len, value);
    Ok(vec)
}
