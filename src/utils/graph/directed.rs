//! Adjacency-list directed graph.
//!
//! [`DirectedGraph`] stores node data in a dense vector and keeps separate outgoing
//! and incoming adjacency lists, so both forward and backward traversal are O(degree).
//! Edges carry user data and are never removed; analyses build a graph once and then
//! only query it.

use crate::{
    utils::graph::{
        node::NodeId,
        traits::{GraphBase, Predecessors, Successors},
    },
    Error, Result,
};

/// Internal storage for edge data and endpoints.
#[derive(Debug, Clone)]
struct EdgeData<E> {
    source: NodeId,
    target: NodeId,
    data: E,
}

/// A directed graph with typed node and edge data.
///
/// # Examples
///
/// ```rust
/// use fusescope::utils::graph::DirectedGraph;
///
/// let mut graph: DirectedGraph<usize, ()> = DirectedGraph::new();
/// let entry = graph.add_node(0);
/// let exit = graph.add_node(1);
/// graph.add_edge(entry, exit, ())?;
///
/// assert_eq!(graph.node_count(), 2);
/// assert_eq!(graph.edge_count(), 1);
/// assert_eq!(graph.predecessors(exit).collect::<Vec<_>>(), vec![entry]);
/// # Ok::<(), fusescope::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct DirectedGraph<N, E> {
    nodes: Vec<N>,
    edges: Vec<EdgeData<E>>,
    /// Outgoing edge indices per node
    outgoing: Vec<Vec<usize>>,
    /// Incoming edge indices per node
    incoming: Vec<Vec<usize>>,
}

impl<N, E> Default for DirectedGraph<N, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N, E> DirectedGraph<N, E> {
    /// Creates a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        DirectedGraph {
            nodes: Vec::new(),
            edges: Vec::new(),
            outgoing: Vec::new(),
            incoming: Vec::new(),
        }
    }

    /// Creates a new empty graph with pre-allocated storage.
    ///
    /// # Arguments
    ///
    /// * `node_capacity` - Expected number of nodes
    /// * `edge_capacity` - Expected number of edges
    #[must_use]
    pub fn with_capacity(node_capacity: usize, edge_capacity: usize) -> Self {
        DirectedGraph {
            nodes: Vec::with_capacity(node_capacity),
            edges: Vec::with_capacity(edge_capacity),
            outgoing: Vec::with_capacity(node_capacity),
            incoming: Vec::with_capacity(node_capacity),
        }
    }

    /// Adds a node and returns its id. Ids are assigned sequentially from 0.
    pub fn add_node(&mut self, data: N) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(data);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        id
    }

    /// Adds a directed edge from `source` to `target`.
    ///
    /// Parallel edges are allowed; callers that need set semantics check
    /// [`DirectedGraph::has_edge`] first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if either endpoint is not a node of this graph.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId, data: E) -> Result<()> {
        if !self.contains_node(source) || !self.contains_node(target) {
            return Err(Error::GraphError(format!(
                "edge {source} -> {target} references a node outside the graph ({} nodes)",
                self.nodes.len()
            )));
        }

        let index = self.edges.len();
        self.edges.push(EdgeData {
            source,
            target,
            data,
        });
        self.outgoing[source.index()].push(index);
        self.incoming[target.index()].push(index);
        Ok(())
    }

    /// Returns the data of `node`, if it exists.
    #[must_use]
    pub fn node(&self, node: NodeId) -> Option<&N> {
        self.nodes.get(node.index())
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns `true` if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns `true` if `node` belongs to this graph.
    #[must_use]
    pub fn contains_node(&self, node: NodeId) -> bool {
        node.index() < self.nodes.len()
    }

    /// Returns `true` if there is at least one edge from `source` to `target`.
    #[must_use]
    pub fn has_edge(&self, source: NodeId, target: NodeId) -> bool {
        self.outgoing
            .get(source.index())
            .is_some_and(|out| out.iter().any(|&e| self.edges[e].target == target))
    }

    /// Iterates over all node ids in ascending order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId::new)
    }

    /// Iterates over the direct successors of `node`.
    pub fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.outgoing
            .get(node.index())
            .into_iter()
            .flatten()
            .map(move |&e| self.edges[e].target)
    }

    /// Iterates over the direct predecessors of `node`.
    pub fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.incoming
            .get(node.index())
            .into_iter()
            .flatten()
            .map(move |&e| self.edges[e].source)
    }

    /// Iterates over the outgoing edges of `node` as `(target, data)` pairs.
    pub fn outgoing_edges(&self, node: NodeId) -> impl Iterator<Item = (NodeId, &E)> + '_ {
        self.outgoing
            .get(node.index())
            .into_iter()
            .flatten()
            .map(move |&e| (self.edges[e].target, &self.edges[e].data))
    }
}

impl<N, E> GraphBase for DirectedGraph<N, E> {
    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId::new)
    }
}

impl<N, E> Successors for DirectedGraph<N, E> {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        DirectedGraph::successors(self, node)
    }
}

impl<N, E> Predecessors for DirectedGraph<N, E> {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        DirectedGraph::predecessors(self, node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_nodes_and_edges() -> Result<()> {
        let mut graph: DirectedGraph<&str, u32> = DirectedGraph::new();
        let a = graph.add_node("a");
        let b = graph.add_node("b");
        let c = graph.add_node("c");

        graph.add_edge(a, b, 1)?;
        graph.add_edge(a, c, 2)?;
        graph.add_edge(b, c, 3)?;

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.node(b), Some(&"b"));
        assert_eq!(graph.successors(a).collect::<Vec<_>>(), vec![b, c]);
        assert_eq!(graph.predecessors(c).collect::<Vec<_>>(), vec![a, b]);
        assert!(graph.has_edge(a, c));
        assert!(!graph.has_edge(c, a));

        let weights: Vec<u32> = graph.outgoing_edges(a).map(|(_, w)| *w).collect();
        assert_eq!(weights, vec![1, 2]);
        Ok(())
    }

    #[test]
    fn test_edge_to_missing_node_is_rejected() {
        let mut graph: DirectedGraph<(), ()> = DirectedGraph::new();
        let a = graph.add_node(());
        let result = graph.add_edge(a, NodeId::new(5), ());
        assert!(matches!(result, Err(Error::GraphError(_))));
    }

    #[test]
    fn test_unknown_node_has_no_neighbours() {
        let graph: DirectedGraph<(), ()> = DirectedGraph::new();
        assert_eq!(graph.successors(NodeId::new(0)).count(), 0);
        assert_eq!(graph.predecessors(NodeId::new(0)).count(), 0);
        assert!(graph.is_empty());
    }
}
