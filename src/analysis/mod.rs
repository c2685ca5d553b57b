//! Interprocedural escape and inlining analysis.
//!
//! This module decides, for one method, which of the objects it (and everything it
//! calls) allocates can be replaced by local variables, and which of its calls can be
//! spliced in place. It builds upon the bytecode model in [`crate::bytecode`] and the
//! graph infrastructure in [`crate::utils::graph`].
//!
//! # Architecture
//!
//! The analysis is organized into layers, each depending only on those above it:
//!
//! - [`domain`] - Abstract value lattices (constants, types, pointers)
//! - [`Heap`] - Abstract heap cells and the escaped set
//! - [`Context`], [`ContextTable`] - Call-string contexts and their recorded frames
//! - [`Frame`] - Per-instruction abstract state and the instruction semantics
//! - [`TypeInterpreter`], [`HeapInterpreter`] - Value transfer functions
//! - [`MethodAnalyzer`] - Branch-sensitive worklist fixpoint over one method
//! - [`AnalysisSession`] - Interprocedural driver, static heap and exit escapes
//! - [`DecisionGraph`] - Closure of denied decisions over their implications
//!
//! The pluggable policies live in [`oracle`]; side-effect summaries for calls that are
//! not analysed in [`PurityTable`]; finite models of chain-walking library methods in
//! [`ModelRegistry`].
//!
//! # Usage
//!
//! ```rust
//! use fusescope::analysis::{oracle::StreamLibraryOracle, AnalysisSession};
//! use fusescope::bytecode::{AccessFlags, ClassPool, MethodAssembler, Opcode};
//!
//! let pool = ClassPool::bootstrap()?;
//! let oracle = StreamLibraryOracle::default();
//! let mut session = AnalysisSession::new(&pool, &oracle);
//!
//! let mut asm = MethodAssembler::new("sum", "(II)I", AccessFlags::STATIC);
//! asm.load(Opcode::Iload, 0)?
//!     .load(Opcode::Iload, 1)?
//!     .insn(Opcode::Iadd)?
//!     .insn(Opcode::Ireturn)?;
//!
//! let outcome = session.analyze("demo/Main", &asm.finalize()?)?;
//! assert!(outcome.decisions().denied_inlines().next().is_none());
//! # Ok::<(), fusescope::Error>(())
//! ```

mod analyzer;
mod config;
mod constant;
mod context;
mod decision;
pub mod domain;
mod frame;
mod heap;
mod interpreter;
mod models;
pub mod oracle;
mod purity;
mod session;

pub use analyzer::MethodAnalyzer;
pub use config::{AnalysisConfig, ContextIdentity, GcPolicy};
pub use context::{CallSite, CallString, Context, ContextId, ContextTable, Frames};
pub use decision::{DecisionGraph, DependencyNode, TransformDecisions};
pub use frame::{Frame, JumpOutcome};
pub use heap::{AbstractObject, FieldKey, Heap};
pub use interpreter::{HeapInterpreter, TypeInterpreter, ValueInterpreter};
pub use models::{
    chain_length, copy_into_with_cancel_model, wrap_sink_model, ModelGenerator, ModelParameter,
    ModelRegistry, ABSTRACT_PIPELINE,
};
pub use purity::PurityTable;
pub use session::{analyze, AnalysisOutcome, AnalysisSession, SessionStats};
