//! Key-indexed graph wrapper.
//!
//! [`IndexedGraph`] lets callers build a graph directly from domain values (for the
//! decision graph: "allocation site 3 denied", "inlining of context 7 denied") while
//! the underlying [`DirectedGraph`] keeps working with dense [`NodeId`]s.

use std::collections::HashMap;
use std::hash::Hash;

use crate::{
    utils::graph::{algorithms, DirectedGraph, NodeId},
    Result,
};

/// A graph whose nodes are identified by keys of type `K`.
///
/// Adding a node twice returns the same [`NodeId`], and [`IndexedGraph::add_edge`]
/// ignores duplicate edges, so the graph behaves like a relation over `K`.
///
/// # Examples
///
/// ```rust
/// use fusescope::utils::graph::IndexedGraph;
///
/// let mut graph: IndexedGraph<&str> = IndexedGraph::new();
/// graph.add_edge("outer", "inner")?;
/// graph.add_edge("inner", "leaf")?;
///
/// let closed = graph.closure(["outer"]);
/// assert!(closed.contains_key("leaf"));
/// # Ok::<(), fusescope::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct IndexedGraph<K>
where
    K: Hash + Eq + Clone,
{
    graph: DirectedGraph<K, ()>,
    key_to_node: HashMap<K, NodeId>,
}

impl<K> Default for IndexedGraph<K>
where
    K: Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> IndexedGraph<K>
where
    K: Hash + Eq + Clone,
{
    /// Creates a new empty indexed graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: DirectedGraph::new(),
            key_to_node: HashMap::new(),
        }
    }

    /// Adds a node for `key`, or returns the existing id if already present.
    pub fn add_node(&mut self, key: K) -> NodeId {
        if let Some(&node) = self.key_to_node.get(&key) {
            return node;
        }

        let node = self.graph.add_node(key.clone());
        self.key_to_node.insert(key, node);
        node
    }

    /// Adds an edge between two keys, creating missing nodes on the way.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` if a new edge was added
    /// * `Ok(false)` if the edge already existed
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying graph rejects the edge.
    pub fn add_edge(&mut self, from: K, to: K) -> Result<bool> {
        let from = self.add_node(from);
        let to = self.add_node(to);
        if self.graph.has_edge(from, to) {
            return Ok(false);
        }
        self.graph.add_edge(from, to, ())?;
        Ok(true)
    }

    /// Returns `true` if the graph has a node for `key`.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.key_to_node.contains_key(key)
    }

    /// Returns the node id for `key`, if present.
    #[must_use]
    pub fn node_id(&self, key: &K) -> Option<NodeId> {
        self.key_to_node.get(key).copied()
    }

    /// Returns the key of `node`, if present.
    #[must_use]
    pub fn key(&self, node: NodeId) -> Option<&K> {
        self.graph.node(node)
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of distinct edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Iterates over the keys that `key` has edges to.
    pub fn successors_of<'a>(&'a self, key: &K) -> impl Iterator<Item = &'a K> + 'a {
        let node = self.node_id(key);
        node.into_iter()
            .flat_map(move |n| self.graph.successors(n))
            .filter_map(move |n| self.graph.node(n))
    }

    /// Returns the underlying graph.
    #[must_use]
    pub fn inner(&self) -> &DirectedGraph<K, ()> {
        &self.graph
    }

    /// Closes `roots` under the edges of this graph.
    ///
    /// The result maps every key reachable from a root (roots included) to the key it
    /// was first reached from; roots map to `None`. Roots that are not nodes of the graph
    /// are still part of the result.
    pub fn closure<I>(&self, roots: I) -> HashMap<K, Option<K>>
    where
        I: IntoIterator<Item = K>,
    {
        let mut result: HashMap<K, Option<K>> = HashMap::new();
        let mut known_roots = Vec::new();
        for root in roots {
            match self.node_id(&root) {
                Some(node) => known_roots.push(node),
                None => {
                    result.insert(root, None);
                }
            }
        }

        for (node, parent) in algorithms::closure(&self.graph, known_roots) {
            if let Some(key) = self.graph.node(node) {
                let parent = parent.and_then(|p| self.graph.node(p)).cloned();
                result.insert(key.clone(), parent);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_node_is_idempotent() {
        let mut graph: IndexedGraph<u32> = IndexedGraph::new();
        let a = graph.add_node(10);
        let b = graph.add_node(10);
        assert_eq!(a, b);
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.key(a), Some(&10));
    }

    #[test]
    fn test_duplicate_edges_are_ignored() -> Result<()> {
        let mut graph: IndexedGraph<&str> = IndexedGraph::new();
        assert!(graph.add_edge("a", "b")?);
        assert!(!graph.add_edge("a", "b")?);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.successors_of(&"a").collect::<Vec<_>>(), vec![&"b"]);
        Ok(())
    }

    #[test]
    fn test_closure_records_parents() -> Result<()> {
        let mut graph: IndexedGraph<&str> = IndexedGraph::new();
        graph.add_edge("a", "b")?;
        graph.add_edge("b", "c")?;
        graph.add_edge("x", "y")?;

        let closed = graph.closure(["a", "lonely"]);
        assert_eq!(closed.len(), 4);
        assert_eq!(closed.get("a"), Some(&None));
        assert_eq!(closed.get("lonely"), Some(&None));
        assert_eq!(closed.get("b"), Some(&Some("a")));
        assert_eq!(closed.get("c"), Some(&Some("b")));
        assert!(!closed.contains_key("y"));
        Ok(())
    }
}
