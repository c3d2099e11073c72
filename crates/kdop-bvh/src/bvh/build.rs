//! Implicit, height-balanced tree construction.
//!
//! Branches are numbered from 1 in breadth-first order. Branch `j` owns the
//! children `j * k + (2 - k) + m` for `m` in `0..k`, so a child always has a
//! larger number than its parent. The leaves are never sorted: each branch
//! only partitions its own leaf range so that every child receives the leaves
//! it would receive if the range were fully sorted along the split axis.

use rayon::prelude::*;

use crate::kdop::{AxisRange, largest_box_axis};

use super::node::BvhNode;

/// Depth limit of the per-level tables.
const MAX_DEPTH: usize = 32;

/// Ranges shorter than this are finished by insertion sort.
const PARTITION_CUTOFF: usize = 3;

/// Number of branches an implicit tree over `leaf_count` leaves needs.
pub(crate) fn needed_branches(arity: usize, leaf_count: usize) -> usize {
    if leaf_count + arity < 3 {
        return 1;
    }
    ((leaf_count + arity - 3) / (arity - 1)).max(1)
}

/// Per-depth leaf distribution of an implicit tree.
#[derive(Debug, Clone)]
pub(crate) struct ImplicitLayout {
    leaf_count: usize,
    leafs_per_child: [usize; MAX_DEPTH],
    branches_on_level: [usize; MAX_DEPTH],
    remain_leafs: usize,
}

impl ImplicitLayout {
    pub(crate) fn new(arity: usize, leaf_count: usize) -> Self {
        let mut leafs_per_child = [0; MAX_DEPTH];
        let mut branches_on_level = [0; MAX_DEPTH];

        // Smallest power of the arity that covers every leaf.
        let mut capacity = 1;
        while capacity < leaf_count {
            capacity *= arity;
        }
        leafs_per_child[0] = capacity;
        branches_on_level[0] = 1;

        let mut depth = 1;
        while depth < MAX_DEPTH && leafs_per_child[depth - 1] != 0 {
            branches_on_level[depth] = branches_on_level[depth - 1] * arity;
            leafs_per_child[depth] = leafs_per_child[depth - 1] / arity;
            depth += 1;
        }

        let remain = leaf_count - leafs_per_child[1];
        let extra_nodes = (remain + arity - 2) / (arity - 1);

        Self {
            leaf_count,
            leafs_per_child,
            branches_on_level,
            remain_leafs: remain + extra_nodes,
        }
    }

    /// First leaf (in partition order) reachable from the `child`-th node of
    /// level `depth`.
    pub(crate) fn leafs_index(&self, depth: usize, child: usize) -> usize {
        let min_leaf_index = child * self.leafs_per_child[depth - 1];
        if min_leaf_index <= self.remain_leafs {
            min_leaf_index
        } else if self.leafs_per_child[depth] != 0 {
            let remaining_children = self.branches_on_level[depth - 1] - child;
            self.leaf_count - remaining_children * self.leafs_per_child[depth]
        } else {
            self.remain_leafs
        }
    }
}

/// Read-only state shared by every branch of one level.
struct Level<'a> {
    layout: &'a ImplicitLayout,
    leaf_bounds: &'a [AxisRange],
    axis_len: usize,
    arity: usize,
    leaf_count: usize,
    /// Number of the first branch of this level.
    first: usize,
    /// Number of the first branch of the next level.
    first_of_next_level: usize,
    depth: usize,
}

/// Mutable state owned by one branch while its level is processed.
struct BranchSlot<'a> {
    node: &'a mut BvhNode,
    bounds: &'a mut [AxisRange],
    children: &'a mut [usize],
    /// The branch's leaf range, `leaf_order[begin..end]`.
    leaves: &'a mut [usize],
    leaves_begin: usize,
}

/// Builds the branch levels of a tree whose leaves are already hulled.
///
/// `nodes`, `bounds` and `children` are the branch portions of the arena,
/// branch number `j` stored at slot `j - 1`. `leaf_order` is scratch space
/// holding every leaf id.
pub(crate) fn build_levels(
    arity: usize,
    axis_len: usize,
    leaf_bounds: &[AxisRange],
    leaf_order: &mut [usize],
    nodes: &mut [BvhNode],
    bounds: &mut [AxisRange],
    children: &mut [usize],
    use_threading: bool,
) {
    let leaf_count = leaf_order.len();
    debug_assert!(leaf_count > 0, "cannot build a tree without leaves");

    if leaf_count == 1 {
        let root_bounds = &mut bounds[..axis_len];
        hull_of_leaves(leaf_bounds, axis_len, leaf_order, root_bounds);
        nodes[0].main_axis = largest_box_axis(root_bounds);
        nodes[0].child_count = 1;
        children[0] = leaf_order[0];
        return;
    }

    let layout = ImplicitLayout::new(arity, leaf_count);
    let branch_count = needed_branches(arity, leaf_count);
    let tree_offset = 2 - arity as isize;

    let mut first = 1;
    let mut depth = 1;
    while first <= branch_count {
        let first_of_next_level = (first as isize * arity as isize + tree_offset) as usize;
        let stop = first_of_next_level.min(branch_count + 1);

        let level = Level {
            layout: &layout,
            leaf_bounds,
            axis_len,
            arity,
            leaf_count,
            first,
            first_of_next_level,
            depth,
        };

        let slots = level_slots(
            &level,
            &mut nodes[first - 1..stop - 1],
            &mut bounds[(first - 1) * axis_len..(stop - 1) * axis_len],
            &mut children[(first - 1) * arity..(stop - 1) * arity],
            leaf_order,
        );

        log::trace!(
            "building level {depth}: branches {first}..{stop} ({})",
            if use_threading { "parallel" } else { "serial" }
        );

        if use_threading {
            slots
                .into_par_iter()
                .enumerate()
                .for_each(|(index, slot)| divide_branch(&level, index, slot));
        } else {
            slots
                .into_iter()
                .enumerate()
                .for_each(|(index, slot)| divide_branch(&level, index, slot));
        }

        first = first_of_next_level;
        depth += 1;
    }
}

/// Splits the level's arena portions into one disjoint slot per branch.
fn level_slots<'a>(
    level: &Level<'_>,
    nodes: &'a mut [BvhNode],
    bounds: &'a mut [AxisRange],
    children: &'a mut [usize],
    leaf_order: &'a mut [usize],
) -> Vec<BranchSlot<'a>> {
    let mut slots = Vec::with_capacity(nodes.len());
    let mut rest = leaf_order;
    let mut consumed = 0;

    let bound_chunks = bounds.chunks_mut(level.axis_len);
    let child_chunks = children.chunks_mut(level.arity);
    for ((level_index, node), (bounds, children)) in nodes
        .iter_mut()
        .enumerate()
        .zip(bound_chunks.zip(child_chunks))
    {
        let begin = level.layout.leafs_index(level.depth, level_index);
        let end = level.layout.leafs_index(level.depth, level_index + 1);
        debug_assert_eq!(begin, consumed, "leaf ranges of a level must be contiguous");

        let (leaves, tail) = std::mem::take(&mut rest).split_at_mut(end - begin);
        rest = tail;
        consumed = end;

        slots.push(BranchSlot {
            node,
            bounds,
            children,
            leaves,
            leaves_begin: begin,
        });
    }
    slots
}

/// Hulls one branch, partitions its leaves and links its children.
fn divide_branch(level: &Level<'_>, level_index: usize, slot: BranchSlot<'_>) {
    let BranchSlot {
        node,
        bounds,
        children,
        leaves,
        leaves_begin,
    } = slot;
    let parent_number = level.first + level_index;
    let leaves_end = leaves_begin + leaves.len();

    hull_of_leaves(level.leaf_bounds, level.axis_len, leaves, bounds);
    let split_axis = largest_box_axis(bounds);
    node.main_axis = split_axis;

    let child_number = |k: usize| -> usize {
        (parent_number as isize * level.arity as isize + 2 - level.arity as isize) as usize + k
    };
    let child_range = |k: usize| -> (usize, usize) {
        let child_level_index = child_number(k) - level.first_of_next_level;
        (
            level.layout.leafs_index(level.depth + 1, child_level_index),
            level.layout.leafs_index(level.depth + 1, child_level_index + 1),
        )
    };

    // Partition boundaries, relative to this branch's leaf range.
    let mut nth = [0usize; crate::MAX_ARITY + 1];
    nth[level.arity] = leaves.len();
    for (k, boundary) in nth.iter_mut().enumerate().take(level.arity).skip(1) {
        *boundary = child_range(k).0.clamp(leaves_begin, leaves_end) - leaves_begin;
    }
    split_leaves(
        leaves,
        &nth[..=level.arity],
        |leaf| level.leaf_bounds[leaf * level.axis_len + usize::from(split_axis)].max,
    );

    let mut count = 0;
    for k in 0..level.arity {
        let (begin, end) = child_range(k);
        let child = match end.saturating_sub(begin) {
            0 => break,
            1 => leaves[begin - leaves_begin],
            _ => level.leaf_count + child_number(k) - 1,
        };
        children[k] = child;
        count += 1;
    }
    node.child_count = count as u8;
}

/// Writes the union of the given leaves' bounds into `out`.
fn hull_of_leaves(
    leaf_bounds: &[AxisRange],
    axis_len: usize,
    leaves: &[usize],
    out: &mut [AxisRange],
) {
    out.fill(AxisRange::EMPTY);
    for &leaf in leaves {
        let start = leaf * axis_len;
        for (range, leaf_range) in out.iter_mut().zip(&leaf_bounds[start..start + axis_len]) {
            range.union(leaf_range);
        }
    }
}

/// Partitions `leaves` so each `nth[i]..nth[i + 1]` holds the elements a full
/// sort by `key` would place there.
fn split_leaves<F>(leaves: &mut [usize], nth: &[usize], key: F)
where
    F: Fn(usize) -> f32 + Copy,
{
    let partitions = nth.len() - 1;
    let end = nth[partitions];
    for i in 0..partitions - 1 {
        if nth[i] >= end {
            break;
        }
        partition_nth_element(leaves, nth[i], end, nth[i + 1], key);
    }
}

/// Moves the element of rank `n` within `begin..end` into place, with
/// smaller keys before it and larger keys after it.
fn partition_nth_element<F>(items: &mut [usize], mut begin: usize, mut end: usize, n: usize, key: F)
where
    F: Fn(usize) -> f32 + Copy,
{
    while end - begin > PARTITION_CUTOFF {
        let pivot = median_of_three(items, begin, (begin + end) / 2, end - 1, key);
        let cut = hoare_partition(items, begin, end, pivot, key);
        if cut <= n {
            begin = cut;
        } else {
            end = cut;
        }
    }
    insertion_sort(items, begin, end, key);
}

fn median_of_three<F>(items: &[usize], lo: usize, mid: usize, hi: usize, key: F) -> f32
where
    F: Fn(usize) -> f32,
{
    let (a, b, c) = (key(items[lo]), key(items[mid]), key(items[hi]));
    if b < a {
        if c < b {
            b
        } else if c < a {
            c
        } else {
            a
        }
    } else if c < b {
        if c < a { a } else { c }
    } else {
        b
    }
}

fn hoare_partition<F>(
    items: &mut [usize],
    mut lo: usize,
    mut hi: usize,
    pivot: f32,
    key: F,
) -> usize
where
    F: Fn(usize) -> f32,
{
    loop {
        while key(items[lo]) < pivot {
            lo += 1;
        }
        hi -= 1;
        while pivot < key(items[hi]) {
            hi -= 1;
        }
        if lo >= hi {
            return lo;
        }
        items.swap(lo, hi);
        lo += 1;
    }
}

fn insertion_sort<F>(items: &mut [usize], begin: usize, end: usize, key: F)
where
    F: Fn(usize) -> f32,
{
    for i in begin + 1..end {
        let item = items[i];
        let item_key = key(item);
        let mut j = i;
        while j > begin && item_key < key(items[j - 1]) {
            items[j] = items[j - 1];
            j -= 1;
        }
        items[j] = item;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needed_branches_matches_small_trees() {
        assert_eq!(needed_branches(2, 0), 1);
        assert_eq!(needed_branches(2, 1), 1);
        assert_eq!(needed_branches(2, 2), 1);
        assert_eq!(needed_branches(2, 8), 7);
        assert_eq!(needed_branches(4, 1), 1);
        assert_eq!(needed_branches(4, 8), 3);
        assert_eq!(needed_branches(4, 16), 5);
    }

    #[test]
    fn layout_distributes_eight_leaves_over_arity_four() {
        let layout = ImplicitLayout::new(4, 8);
        // Root covers everything.
        assert_eq!(layout.leafs_index(1, 0), 0);
        assert_eq!(layout.leafs_index(1, 1), 8);
        // Root children: a full branch, a two-leaf branch, then two leaves.
        let bounds: Vec<usize> = (0..=4).map(|k| layout.leafs_index(2, k)).collect();
        assert_eq!(bounds, vec![0, 4, 6, 7, 8]);
    }

    #[test]
    fn layout_ranges_are_monotonic() {
        for arity in 2..=8 {
            for leaf_count in 2..200 {
                let layout = ImplicitLayout::new(arity, leaf_count);
                let mut previous = 0;
                let mut width = 1;
                for depth in 1..6 {
                    for child in 0..=width {
                        let index = layout.leafs_index(depth, child);
                        assert!(index <= leaf_count);
                        if child > 0 {
                            assert!(index >= previous, "arity {arity}, leaves {leaf_count}");
                        }
                        previous = index;
                    }
                    width *= arity;
                }
            }
        }
    }

    #[test]
    fn nth_element_places_rank() {
        let keys = [5.0, 1.0, 9.0, 3.0, 7.0, 2.0, 8.0, 6.0, 4.0, 0.0];
        let key = |i: usize| keys[i];
        for n in 0..keys.len() {
            let mut items: Vec<usize> = (0..keys.len()).collect();
            partition_nth_element(&mut items, 0, keys.len(), n, key);
            let pivot = key(items[n]);
            assert_eq!(pivot, n as f32);
            assert!(items[..n].iter().all(|&i| key(i) <= pivot));
            assert!(items[n..].iter().all(|&i| key(i) >= pivot));
        }
    }

    #[test]
    fn split_leaves_orders_partitions() {
        let keys: Vec<f32> = (0..20).map(|i| ((i * 7) % 20) as f32).collect();
        let key = |i: usize| keys[i];
        let mut items: Vec<usize> = (0..20).collect();
        let nth = [0, 5, 10, 15, 20];
        split_leaves(&mut items, &nth, key);
        for window in nth.windows(2).collect::<Vec<_>>().windows(2) {
            let left_max = items[window[0][0]..window[0][1]]
                .iter()
                .map(|&i| key(i))
                .fold(f32::MIN, f32::max);
            let right_min = items[window[1][0]..window[1][1]]
                .iter()
                .map(|&i| key(i))
                .fold(f32::MAX, f32::min);
            assert!(left_max <= right_min);
        }
    }

    #[test]
    fn insertion_sort_sorts_subrange() {
        let keys = [4.0, 3.0, 2.0, 1.0, 0.0];
        let key = |i: usize| keys[i];
        let mut items = vec![0, 1, 2, 3, 4];
        insertion_sort(&mut items, 1, 4, key);
        assert_eq!(items, vec![0, 3, 2, 1, 4]);
    }
}
