//! BVH node record.

/// A node of the arena.
///
/// Leaves carry the caller's primitive index. Branches carry the number of
/// occupied child slots and the box axis (0, 1 or 2) their children were
/// split along. Bounding volumes and child references live in flat arrays
/// owned by the tree, indexed by node id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BvhNode {
    pub(crate) index: usize,
    pub(crate) child_count: u8,
    pub(crate) main_axis: u8,
}

impl BvhNode {
    pub(crate) fn leaf(index: usize) -> Self {
        Self {
            index,
            child_count: 0,
            main_axis: 0,
        }
    }

    /// The caller's primitive index. Meaningless for branches.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of children; zero for leaves.
    #[inline]
    pub fn child_count(&self) -> usize {
        usize::from(self.child_count)
    }

    /// The box axis the children were partitioned along.
    #[inline]
    pub fn main_axis(&self) -> usize {
        usize::from(self.main_axis)
    }

    /// Checks if this node has no children.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.child_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_has_no_children() {
        let node = BvhNode::leaf(7);
        assert!(node.is_leaf());
        assert_eq!(node.index(), 7);
        assert_eq!(node.child_count(), 0);
    }

    #[test]
    fn branch_reports_children() {
        let node = BvhNode {
            index: 0,
            child_count: 3,
            main_axis: 2,
        };
        assert!(!node.is_leaf());
        assert_eq!(node.child_count(), 3);
        assert_eq!(node.main_axis(), 2);
    }
}
