//! Node identifier for directed graphs.
//!
//! [`NodeId`] is a newtype over the dense index a node receives when it is added to
//! a graph. Keeping it distinct from plain `usize` avoids mixing graph nodes up with
//! instruction indices or allocation-site numbers, which are also `usize` in this crate.

use std::fmt;

/// A strongly-typed identifier for a node within a [`crate::utils::graph::DirectedGraph`].
///
/// Node ids are assigned sequentially from 0 and are only meaningful for the graph
/// that produced them.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Creates a node id from a raw index.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// Returns the raw index of this node.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl From<usize> for NodeId {
    #[inline]
    fn from(index: usize) -> Self {
        NodeId(index)
    }
}
