//! Error types for tree construction and leaf updates.

use std::collections::TryReserveError;

use thiserror::Error;

/// Errors reported by [`BvhTree`](crate::BvhTree).
#[derive(Debug, Error)]
pub enum BvhError {
    /// Arity outside `2..=MAX_ARITY`.
    #[error("tree arity must be between 2 and {max}, got {0}", max = crate::MAX_ARITY)]
    InvalidArity(usize),

    /// Axis count that is not one of 6, 8, 14, 18 or 26.
    #[error("unsupported k-DOP axis count {0} (expected 6, 8, 14, 18 or 26)")]
    UnsupportedAxisCount(usize),

    /// The node arena could not be reserved.
    #[error("failed to allocate the node arena: {0}")]
    Allocation(#[from] TryReserveError),

    /// A leaf update addressed a leaf that was never inserted.
    #[error("leaf {leaf} is out of range (tree has {leaf_count} leaves)")]
    LeafOutOfRange {
        /// The requested leaf.
        leaf: usize,
        /// Number of inserted leaves.
        leaf_count: usize,
    },
}

/// Result type for tree operations.
pub type Result<T> = std::result::Result<T, BvhError>;
