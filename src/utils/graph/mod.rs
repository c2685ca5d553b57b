//! Directed graph infrastructure for the analysis.
//!
//! Two consumers drive the shape of this module:
//!
//! - The per-method control-flow graph ([`crate::bytecode::ControlFlowGraph`]), whose
//!   nodes are instruction indices and which is built once and then only queried.
//! - The decision graph ([`crate::analysis::DecisionGraph`]), whose nodes are
//!   domain keys (allocation sites, contexts, banned types) and which is closed under
//!   its edges once all facts have been collected.
//!
//! # Key Components
//!
//! - [`NodeId`] - Strongly-typed node identifier
//! - [`DirectedGraph`] - Adjacency-list graph with per-node data and per-edge data
//! - [`IndexedGraph`] - Wrapper keyed by domain values instead of `NodeId`
//! - [`algorithms`] - Traversals and closure computation
//!
//! # Usage Examples
//!
//! ```rust
//! use fusescope::utils::graph::{DirectedGraph, Successors};
//!
//! let mut graph: DirectedGraph<&str, ()> = DirectedGraph::new();
//! let a = graph.add_node("A");
//! let b = graph.add_node("B");
//! graph.add_edge(a, b, ())?;
//!
//! assert_eq!(graph.successors(a).collect::<Vec<_>>(), vec![b]);
//! # Ok::<(), fusescope::Error>(())
//! ```

pub mod algorithms;
mod directed;
mod indexed;
mod node;
mod traits;

pub use directed::DirectedGraph;
pub use indexed::IndexedGraph;
pub use node::NodeId;
pub use traits::{GraphBase, Predecessors, Successors};
