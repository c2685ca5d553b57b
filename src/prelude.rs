//! # fusescope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the fusescope library. Import this module to get quick access to the essential
//! types for building class pools, running sessions and reading their decisions.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all fusescope operations
pub use crate::Error;

/// The result type used throughout fusescope
pub use crate::Result;

// ================================================================================================
// Bytecode Model
// ================================================================================================

/// Types, descriptors and access flags
pub use crate::bytecode::{AccessFlags, JvmType, MethodDescriptor};

/// Instructions and method bodies
pub use crate::bytecode::{
    Constant, FieldRef, Instruction, MethodAssembler, MethodBody, MethodRef, Opcode,
};

/// Class metadata and lookup
pub use crate::bytecode::{ClassHierarchy, ClassMetadata, ClassPool, ClassProvider, FieldMetadata};

// ================================================================================================
// Analysis
// ================================================================================================

/// Session entry points and results
pub use crate::analysis::{
    analyze, AnalysisConfig, AnalysisOutcome, AnalysisSession, SessionStats, TransformDecisions,
};

/// Configuration knobs
pub use crate::analysis::{ContextIdentity, GcPolicy};

/// Contexts and recorded frames
pub use crate::analysis::{ContextId, Frame, Frames};

/// Abstract values
pub use crate::analysis::domain::{AbstractValue, FlatElement, Lattice, Number, PointerElement, TypeElement};

/// Oracles
pub use crate::analysis::oracle::{
    ExhaustiveOracle, FixedTypeOracle, MockTypeOracle, Oracle, StreamLibraryOracle,
};

/// Side-effect summaries and library models
pub use crate::analysis::{FieldKey, ModelRegistry, PurityTable};
