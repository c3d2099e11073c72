//! Dual-tree overlap.
//!
//! Two trees are descended together, pruning every pair of nodes whose
//! bounding volumes are disjoint on any shared slab direction. With
//! [`OverlapFlags::USE_THREADING`] each child of the first root is handed to
//! its own rayon task; every task collects into a private vector and the
//! vectors are concatenated in task order, so the result order does not
//! depend on scheduling.

use std::sync::atomic::{AtomicUsize, Ordering};

use bitflags::bitflags;
use rayon::prelude::*;

use crate::BvhTree;

bitflags! {
    /// Options of [`BvhTree::overlap_ex`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OverlapFlags: u32 {
        /// Overlap a tree with itself, reporting each unordered pair of
        /// distinct leaves once.
        const SELF = 1 << 0;
        /// Spread the descent over rayon workers when the tree is large
        /// enough.
        const USE_THREADING = 1 << 1;
        /// Collect the overlapping pairs, not only their count.
        const RETURN_PAIRS = 1 << 2;
    }
}

/// An overlapping pair of primitives, one from each tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BvhOverlap {
    pub index_a: usize,
    pub index_b: usize,
}

/// Outcome of an overlap query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlapResult {
    /// The accepted pairs, empty unless [`OverlapFlags::RETURN_PAIRS`] was set.
    pub pairs: Vec<BvhOverlap>,
    /// Number of accepted pairs.
    pub total: usize,
}

/// Exact overlap test for a candidate pair: `(index_a, index_b, worker)`.
///
/// `worker` is the id of the task reporting the pair, in
/// `0..overlap_thread_num()`. Returning `false` discards the pair.
pub type OverlapCallback<'a> = dyn Fn(usize, usize, usize) -> bool + Sync + 'a;

struct OverlapShared<'a> {
    tree_a: &'a BvhTree,
    tree_b: &'a BvhTree,
    axis_len: usize,
    callback: Option<&'a OverlapCallback<'a>>,
    budget: Option<AtomicUsize>,
    return_pairs: bool,
    self_overlap: bool,
}

impl OverlapShared<'_> {
    #[inline]
    fn nodes_overlap(&self, a: usize, b: usize) -> bool {
        let bounds_a = &self.tree_a.node_bounds(a)[..self.axis_len];
        let bounds_b = &self.tree_b.node_bounds(b)[..self.axis_len];
        bounds_a.iter().zip(bounds_b).all(|(a, b)| a.overlaps(b))
    }
}

/// Per-task state.
struct OverlapWorker<'s, 'a> {
    shared: &'s OverlapShared<'a>,
    worker: usize,
    pairs: Vec<BvhOverlap>,
    total: usize,
}

impl<'s, 'a> OverlapWorker<'s, 'a> {
    fn new(shared: &'s OverlapShared<'a>, worker: usize) -> Self {
        Self {
            shared,
            worker,
            pairs: Vec::new(),
            total: 0,
        }
    }

    /// Runs the whole query on one task.
    fn run(&mut self, root_a: usize, root_b: usize) {
        let shared = self.shared;
        if shared.self_overlap {
            self.traverse_self(root_a);
        } else if let Some(budget) = &shared.budget {
            self.traverse_budgeted(root_a, root_b, budget);
        } else {
            self.traverse(root_a, root_b);
        }
    }

    /// Runs the share of root child `child` of the first tree.
    fn run_root_child(&mut self, root_a: usize, root_b: usize, child: usize) {
        let shared = self.shared;
        let children = shared.tree_a.node_children(root_a);
        let node = children[child];
        if shared.self_overlap {
            self.traverse_self(node);
            for &other in &children[child + 1..] {
                self.traverse(node, other);
            }
        } else if let Some(budget) = &shared.budget {
            self.traverse_budgeted(node, root_b, budget);
        } else {
            self.traverse(node, root_b);
        }
    }

    fn accept(&mut self, a: usize, b: usize) {
        let shared = self.shared;
        let index_a = shared.tree_a.nodes[a].index();
        let index_b = shared.tree_b.nodes[b].index();
        if let Some(callback) = shared.callback {
            if !callback(index_a, index_b, self.worker) {
                return;
            }
        }
        if shared.return_pairs {
            self.pairs.push(BvhOverlap { index_a, index_b });
        }
        self.total += 1;
    }

    fn traverse(&mut self, a: usize, b: usize) {
        let shared = self.shared;
        if !shared.nodes_overlap(a, b) {
            return;
        }

        let (tree_a, tree_b) = (shared.tree_a, shared.tree_b);
        if !tree_a.is_leaf(a) {
            for &child in tree_a.node_children(a) {
                self.traverse(child, b);
            }
        } else if !tree_b.is_leaf(b) {
            for &child in tree_b.node_children(b) {
                self.traverse(a, child);
            }
        } else {
            self.accept(a, b);
        }
    }

    /// Returns `true` once the budget is spent.
    fn traverse_budgeted(&mut self, a: usize, b: usize, budget: &AtomicUsize) -> bool {
        let shared = self.shared;
        if !shared.nodes_overlap(a, b) {
            return false;
        }

        let (tree_a, tree_b) = (shared.tree_a, shared.tree_b);
        if !tree_a.is_leaf(a) {
            tree_a
                .node_children(a)
                .iter()
                .any(|&child| self.traverse_budgeted(child, b, budget))
        } else if !tree_b.is_leaf(b) {
            tree_b
                .node_children(b)
                .iter()
                .any(|&child| self.traverse_budgeted(a, child, budget))
        } else {
            if budget.load(Ordering::Acquire) == 0 {
                return true;
            }
            let index_a = tree_a.nodes[a].index();
            let index_b = tree_b.nodes[b].index();
            if let Some(callback) = shared.callback {
                if !callback(index_a, index_b, self.worker) {
                    return false;
                }
            }
            let take_one = |left: usize| left.checked_sub(1);
            match budget.fetch_update(Ordering::AcqRel, Ordering::Acquire, take_one) {
                Ok(left) => {
                    if shared.return_pairs {
                        self.pairs.push(BvhOverlap { index_a, index_b });
                    }
                    self.total += 1;
                    left == 1
                }
                Err(_) => true,
            }
        }
    }

    /// Overlaps every pair of distinct subtrees below `id`.
    fn traverse_self(&mut self, id: usize) {
        let tree = self.shared.tree_a;
        let children = tree.node_children(id);
        for (i, &child) in children.iter().enumerate() {
            self.traverse_self(child);
            for &other in &children[i + 1..] {
                self.traverse(child, other);
            }
        }
    }
}

impl BvhTree {
    /// Number of tasks a threaded overlap with this tree as the first
    /// operand uses: one per child of the root.
    pub fn overlap_thread_num(&self) -> usize {
        self.root()
            .map_or(0, |root| self.node_children(root).len().min(self.arity))
    }

    /// Returns every pair of leaves whose bounding volumes overlap.
    ///
    /// With [`OverlapFlags::SELF`], `other` must be `self`.
    pub fn overlap(&self, other: &BvhTree, flags: OverlapFlags) -> Vec<BvhOverlap> {
        self.overlap_ex(other, None, 0, flags | OverlapFlags::RETURN_PAIRS)
            .pairs
    }

    /// Overlap query with an exact pair test and an interaction budget.
    ///
    /// Candidate pairs pass through `callback` (if any) before being
    /// counted. A nonzero `max_interactions` caps the number of accepted
    /// pairs across all tasks; it is ignored with [`OverlapFlags::SELF`].
    ///
    /// The trees must have compatible k-DOP types. Overlapping a 14-DOP with
    /// an 18-DOP is a programming error; release builds log it and return an
    /// empty result.
    pub fn overlap_ex(
        &self,
        other: &BvhTree,
        callback: Option<&OverlapCallback<'_>>,
        max_interactions: usize,
        flags: OverlapFlags,
    ) -> OverlapResult {
        let self_overlap = flags.contains(OverlapFlags::SELF);
        debug_assert!(
            !self_overlap || std::ptr::eq(self, other),
            "self overlap needs the same tree on both sides"
        );
        debug_assert!(
            self.is_compatible(other),
            "cannot overlap a {} tree with a {} tree",
            self.kdop,
            other.kdop
        );
        if !self.is_compatible(other) {
            log::warn!(
                "overlap of incompatible {} and {} trees ignored",
                self.kdop,
                other.kdop
            );
            return OverlapResult::default();
        }

        let (Some(root_a), Some(root_b)) = (self.root(), other.root()) else {
            return OverlapResult::default();
        };

        let shared = OverlapShared {
            tree_a: self,
            tree_b: if self_overlap { self } else { other },
            axis_len: self.kdop.shared_axis_len(other.kdop),
            callback,
            budget: (max_interactions > 0 && !self_overlap)
                .then(|| AtomicUsize::new(max_interactions)),
            return_pairs: flags.contains(OverlapFlags::RETURN_PAIRS),
            self_overlap,
        };
        if !shared.nodes_overlap(root_a, root_b) {
            return OverlapResult::default();
        }

        let use_threading = flags.contains(OverlapFlags::USE_THREADING)
            && self.settings.use_threading(self.leaf_count);
        let workers: Vec<OverlapWorker<'_, '_>> = if use_threading {
            let worker_count = self.overlap_thread_num();
            log::trace!("overlap over {worker_count} workers");
            (0..worker_count)
                .into_par_iter()
                .map(|child| {
                    let mut worker = OverlapWorker::new(&shared, child);
                    worker.run_root_child(root_a, root_b, child);
                    worker
                })
                .collect()
        } else {
            let mut worker = OverlapWorker::new(&shared, 0);
            worker.run(root_a, root_b);
            vec![worker]
        };

        let pair_count = workers.iter().map(|worker| worker.pairs.len()).sum();
        let mut result = OverlapResult {
            pairs: Vec::with_capacity(pair_count),
            total: 0,
        };
        for worker in workers {
            result.pairs.extend(worker.pairs);
            result.total += worker.total;
        }
        result
    }
}
