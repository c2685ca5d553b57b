//! Graph traversal algorithms.

use std::collections::HashMap;

use crate::utils::graph::{NodeId, Successors};

/// Computes every node reachable from `roots`, including the roots themselves.
///
/// Traversal uses an explicit worklist, so arbitrarily deep graphs cannot overflow
/// the stack. Each reached node is mapped to the node it was first discovered from;
/// roots map to `None`.
///
/// The returned *set* of nodes does not depend on the order of `roots` or on the
/// order of successor lists. Only the recorded parents can differ.
///
/// # Arguments
///
/// * `graph` - The graph to traverse
/// * `roots` - Starting nodes
///
/// # Returns
///
/// A map from reached node to discovering parent.
pub fn closure<G, I>(graph: &G, roots: I) -> HashMap<NodeId, Option<NodeId>>
where
    G: Successors,
    I: IntoIterator<Item = NodeId>,
{
    let mut reached: HashMap<NodeId, Option<NodeId>> = HashMap::new();
    let mut worklist = Vec::new();

    for root in roots {
        if reached.insert(root, None).is_none() {
            worklist.push(root);
        }
    }

    while let Some(node) = worklist.pop() {
        for succ in graph.successors(node) {
            if let std::collections::hash_map::Entry::Vacant(entry) = reached.entry(succ) {
                entry.insert(Some(node));
                worklist.push(succ);
            }
        }
    }

    reached
}

/// Computes the reverse postorder of nodes reachable from `start`.
///
/// For a forward dataflow problem this is the order in which nodes are best visited
/// first: every node comes before its successors except along back edges.
pub fn reverse_postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let mut visited = vec![false; graph.node_count()];
    let mut order = Vec::with_capacity(graph.node_count());
    if start.index() >= visited.len() {
        return order;
    }

    // (node, successors already expanded)
    let mut stack: Vec<(NodeId, bool)> = vec![(start, false)];
    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            order.push(node);
            continue;
        }
        if visited[node.index()] {
            continue;
        }
        visited[node.index()] = true;
        stack.push((node, true));

        let succs: Vec<NodeId> = graph.successors(node).collect();
        for succ in succs.into_iter().rev() {
            if succ.index() < visited.len() && !visited[succ.index()] {
                stack.push((succ, false));
            }
        }
    }

    order.reverse();
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::graph::DirectedGraph;
    use crate::Result;

    fn diamond() -> Result<(DirectedGraph<(), ()>, Vec<NodeId>)> {
        let mut graph = DirectedGraph::new();
        let nodes: Vec<NodeId> = (0..4).map(|_| graph.add_node(())).collect();
        graph.add_edge(nodes[0], nodes[1], ())?;
        graph.add_edge(nodes[0], nodes[2], ())?;
        graph.add_edge(nodes[1], nodes[3], ())?;
        graph.add_edge(nodes[2], nodes[3], ())?;
        Ok((graph, nodes))
    }

    #[test]
    fn test_closure_from_single_root() -> Result<()> {
        let (graph, nodes) = diamond()?;
        let reached = closure(&graph, [nodes[1]]);
        assert_eq!(reached.len(), 2);
        assert_eq!(reached[&nodes[1]], None);
        assert_eq!(reached[&nodes[3]], Some(nodes[1]));
        Ok(())
    }

    #[test]
    fn test_closure_is_order_independent() -> Result<()> {
        let (graph, nodes) = diamond()?;
        let a: std::collections::HashSet<_> =
            closure(&graph, [nodes[1], nodes[2]]).into_keys().collect();
        let b: std::collections::HashSet<_> =
            closure(&graph, [nodes[2], nodes[1]]).into_keys().collect();
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn test_reverse_postorder_diamond() -> Result<()> {
        let (graph, nodes) = diamond()?;
        let order = reverse_postorder(&graph, nodes[0]);
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], nodes[0]);
        assert_eq!(order[3], nodes[3]);
        Ok(())
    }
}
