//! Graph algorithms used by the analysis.
//!
//! - [`closure`] - Multi-root reachability with first-discovery parents, the fixpoint
//!   step of the decision graph
//! - [`reverse_postorder`] - Reverse postorder from an entry node

mod traversal;

pub use traversal::{closure, reverse_postorder};
