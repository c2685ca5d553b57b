//! Trait definitions for graph abstractions.
//!
//! Algorithms in [`crate::utils::graph::algorithms`] are written against these traits
//! so that they run unchanged over the raw [`crate::utils::graph::DirectedGraph`] and
//! over domain wrappers such as the control-flow graph.

use crate::utils::graph::NodeId;

/// Core graph properties: node count and node iteration.
pub trait GraphBase {
    /// Returns the number of nodes in the graph.
    fn node_count(&self) -> usize;

    /// Returns an iterator over all node identifiers, in ascending order.
    fn node_ids(&self) -> impl Iterator<Item = NodeId>;
}

/// Forward edge traversal.
pub trait Successors: GraphBase {
    /// Returns an iterator over the direct successors of `node`.
    ///
    /// Unknown nodes yield an empty iterator.
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// Backward edge traversal.
pub trait Predecessors: GraphBase {
    /// Returns an iterator over the direct predecessors of `node`.
    ///
    /// Unknown nodes yield an empty iterator.
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}
