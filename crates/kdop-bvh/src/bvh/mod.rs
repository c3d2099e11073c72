//! The k-DOP bounding volume hierarchy.
//!
//! A tree is an arena: leaf nodes first, in insertion order, then branches
//! in breadth-first order. Bounding volumes live in one flat array of
//! [`AxisRange`](crate::AxisRange)s indexed in parallel with the nodes, and
//! child references in another.
//!
//! # Example
//!
//! ```
//! use kdop_bvh::{BvhTree, CollectingVisitor};
//! use nalgebra::Point3;
//!
//! let mut tree = BvhTree::new(2, 0.0, 2, 6).unwrap();
//! tree.insert(0, &[Point3::new(0.0, 0.0, 0.0)]);
//! tree.insert(1, &[Point3::new(1.0, 0.0, 0.0), Point3::new(1.0, 1.0, 0.0)]);
//! tree.balance();
//!
//! let mut visitor = CollectingVisitor::new();
//! tree.walk_dfs(&mut visitor);
//! assert_eq!(visitor.indices().len(), 2);
//! ```
//!
//! # Architecture
//!
//! - [`BvhTree`]: the container, its build lifecycle and refit
//! - [`BvhNode`]: a node record
//! - [`BvhVisitor`]: caller-guided depth-first traversal
//!
//! The balancing algorithm lives in a private `build` module.

mod build;
mod node;
mod tree;
mod visitor;

pub use node::BvhNode;
pub use tree::{BvhTree, MAX_ARITY};
pub use visitor::{BvhVisitor, CollectingVisitor, FnVisitor};
