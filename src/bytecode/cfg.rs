//! Instruction-level control-flow graph.
//!
//! One node per instruction, numbered by instruction index. Edges are classified so
//! the frame interpreter can treat exception edges differently from normal flow.

use crate::{
    bytecode::method::MethodBody,
    error::malformed_error,
    utils::graph::{algorithms, DirectedGraph, NodeId},
    Result,
};

/// Kind of a control-flow edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Execution continues with the next instruction
    FallThrough,
    /// Jump or switch target
    Branch,
    /// Transfer to an exception handler
    Exception,
}

/// Control-flow graph of one method body.
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    graph: DirectedGraph<usize, EdgeKind>,
}

impl ControlFlowGraph {
    /// Builds the graph for a method body.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if a branch or handler targets an instruction
    /// outside the body, or control can fall off the end of the code.
    pub fn build(body: &MethodBody) -> Result<Self> {
        let count = body.instructions.len();
        let mut graph = DirectedGraph::with_capacity(count, count + count / 2);
        for index in 0..count {
            graph.add_node(index);
        }

        for (index, insn) in body.instructions.iter().enumerate() {
            let node = NodeId::new(index);
            for target in insn.branch_targets() {
                if target >= count {
                    return Err(malformed_error!(
                        "Instruction {} of {} branches to {} past the end",
                        index,
                        body.name,
                        target
                    ));
                }
                graph.add_edge(node, NodeId::new(target), EdgeKind::Branch)?;
            }

            if !insn.opcode().ends_block() {
                if index + 1 >= count {
                    return Err(malformed_error!("Control falls off the end of {}", body.name));
                }
                graph.add_edge(node, NodeId::new(index + 1), EdgeKind::FallThrough)?;
            }

            for block in body.try_catch.iter().filter(|block| block.covers(index)) {
                if block.handler >= count {
                    return Err(malformed_error!(
                        "Handler {} of {} is past the end",
                        block.handler,
                        body.name
                    ));
                }
                graph.add_edge(node, NodeId::new(block.handler), EdgeKind::Exception)?;
            }
        }

        Ok(ControlFlowGraph { graph })
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns `true` for a body without instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// Successors of an instruction with their edge kinds.
    pub fn successors(&self, index: usize) -> impl Iterator<Item = (usize, EdgeKind)> + '_ {
        self.graph
            .outgoing_edges(NodeId::new(index))
            .map(|(target, kind)| (target.index(), *kind))
    }

    /// Predecessors of an instruction.
    pub fn predecessors(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        self.graph
            .predecessors(NodeId::new(index))
            .map(|node| node.index())
    }

    /// Instruction indices reachable from the entry, in reverse postorder.
    #[must_use]
    pub fn reverse_postorder(&self) -> Vec<usize> {
        if self.is_empty() {
            return Vec::new();
        }
        algorithms::reverse_postorder(&self.graph, NodeId::new(0))
            .into_iter()
            .map(|node| node.index())
            .collect()
    }

    /// The successor an instruction reaches when its branch is *not* taken, if any.
    #[must_use]
    pub fn fall_through(&self, index: usize) -> Option<usize> {
        self.successors(index)
            .find(|(_, kind)| *kind == EdgeKind::FallThrough)
            .map(|(target, _)| target)
    }
}
