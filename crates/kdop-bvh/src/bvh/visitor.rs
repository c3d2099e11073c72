//! Visitor pattern for caller-guided BVH traversal.
//!
//! Visitors decide which subtrees to enter, in which order siblings are
//! visited, and when to stop, without the tree knowing what is being
//! searched for.

use crate::kdop::AxisRange;

use super::tree::BvhTree;

/// Visitor driving [`BvhTree::walk_dfs`].
///
/// Common uses include:
/// - Custom nearest searches with non-Euclidean metrics
/// - Frustum or cone culling
/// - Collecting every leaf inside an arbitrary region
pub trait BvhVisitor {
    /// Called for every node before descending into it. Return `false` to
    /// skip the node's subtree (or the leaf itself).
    fn visit_parent(&mut self, bounds: &[AxisRange]) -> bool;

    /// Called for every leaf that passed [`visit_parent`](Self::visit_parent).
    /// Return `false` to end the walk.
    fn visit_leaf(&mut self, bounds: &[AxisRange], index: usize) -> bool;

    /// Chooses the sibling order of a branch. `true` visits children in
    /// ascending order along `split_axis` (0, 1 or 2).
    fn children_ascending(&mut self, _bounds: &[AxisRange], _split_axis: usize) -> bool {
        true
    }
}

/// A simple visitor that collects the index of every leaf.
#[derive(Debug, Default)]
pub struct CollectingVisitor {
    collected: Vec<usize>,
}

impl CollectingVisitor {
    /// Creates a new empty collecting visitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the collected leaf indices.
    pub fn into_indices(self) -> Vec<usize> {
        self.collected
    }

    /// Returns a reference to the collected leaf indices.
    pub fn indices(&self) -> &[usize] {
        &self.collected
    }
}

impl BvhVisitor for CollectingVisitor {
    fn visit_parent(&mut self, _bounds: &[AxisRange]) -> bool {
        true
    }

    fn visit_leaf(&mut self, _bounds: &[AxisRange], index: usize) -> bool {
        self.collected.push(index);
        true
    }
}

/// A visitor built from a parent filter and a leaf closure.
pub struct FnVisitor<P, L>
where
    P: FnMut(&[AxisRange]) -> bool,
    L: FnMut(&[AxisRange], usize) -> bool,
{
    parent: P,
    leaf: L,
}

impl<P, L> FnVisitor<P, L>
where
    P: FnMut(&[AxisRange]) -> bool,
    L: FnMut(&[AxisRange], usize) -> bool,
{
    /// Creates a new visitor from a parent filter and a leaf callback.
    pub fn new(parent: P, leaf: L) -> Self {
        Self { parent, leaf }
    }
}

impl<P, L> BvhVisitor for FnVisitor<P, L>
where
    P: FnMut(&[AxisRange]) -> bool,
    L: FnMut(&[AxisRange], usize) -> bool,
{
    fn visit_parent(&mut self, bounds: &[AxisRange]) -> bool {
        (self.parent)(bounds)
    }

    fn visit_leaf(&mut self, bounds: &[AxisRange], index: usize) -> bool {
        (self.leaf)(bounds, index)
    }
}

impl BvhTree {
    /// Walks the tree depth-first under the control of `visitor`.
    ///
    /// The root is offered to [`BvhVisitor::visit_parent`] first. A leaf
    /// callback returning `false` ends the walk immediately.
    pub fn walk_dfs<V: BvhVisitor>(&self, visitor: &mut V) {
        if let Some(root) = self.root() {
            if visitor.visit_parent(self.node_bounds(root)) {
                self.walk_dfs_node(root, visitor);
            }
        }
    }

    /// Returns `false` once the visitor asked to stop.
    fn walk_dfs_node<V: BvhVisitor>(&self, id: usize, visitor: &mut V) -> bool {
        let bounds = self.node_bounds(id);
        let node = &self.nodes[id];
        if self.is_leaf(id) {
            return visitor.visit_leaf(bounds, node.index());
        }

        let ascending = visitor.children_ascending(bounds, node.main_axis());
        let mut visit = |&child: &usize| {
            !visitor.visit_parent(self.node_bounds(child))
                || self.walk_dfs_node(child, &mut *visitor)
        };

        let children = self.node_children(id);
        if ascending {
            children.iter().all(&mut visit)
        } else {
            children.iter().rev().all(&mut visit)
        }
    }
}
