//! Runtime knobs for construction and overlap threading.

/// Leaf count at or below which work stays on the calling thread.
///
/// Debug builds use `0` so the parallel code paths run in every test.
pub const DEFAULT_THREAD_LEAF_THRESHOLD: usize = if cfg!(debug_assertions) { 0 } else { 1024 };

/// Settings shared by the builder and the overlap engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BvhSettings {
    /// Parallel execution is used only when the tree has more leaves than this.
    pub thread_leaf_threshold: usize,
}

impl BvhSettings {
    /// Settings that never spawn parallel work.
    pub const fn serial() -> Self {
        Self {
            thread_leaf_threshold: usize::MAX,
        }
    }

    /// Settings with a custom threshold.
    pub const fn with_threshold(thread_leaf_threshold: usize) -> Self {
        Self {
            thread_leaf_threshold,
        }
    }

    /// Whether a tree of `leaf_count` leaves should be processed in parallel.
    #[inline]
    pub fn use_threading(&self, leaf_count: usize) -> bool {
        leaf_count > self.thread_leaf_threshold
    }
}

impl Default for BvhSettings {
    fn default() -> Self {
        Self::with_threshold(DEFAULT_THREAD_LEAF_THRESHOLD)
    }
}
