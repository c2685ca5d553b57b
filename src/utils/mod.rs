//! Shared utilities.
//!
//! Currently only the graph toolkit used by the control-flow graph and the
//! decision graph lives here.

pub mod graph;
