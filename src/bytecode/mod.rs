//! In-memory JVM bytecode model.
//!
//! This is the view of classes and method bodies the analysis works on. It is
//! deliberately independent of any class-file format: a reader (or the
//! [`MethodAssembler`]) produces [`ClassMetadata`] values and hands them to the analysis
//! through a [`ClassProvider`].
//!
//! # Key Components
//!
//! - [`JvmType`] / [`MethodDescriptor`] - Types and descriptor parsing
//! - [`Opcode`] / [`Instruction`] - Symbolic instructions with index-based branch targets
//! - [`MethodBody`] / [`ClassMetadata`] - Methods and classes
//! - [`ClassProvider`] / [`ClassPool`] - Metadata lookup
//! - [`ClassHierarchy`] - Ancestors, field resolution and method lookup
//! - [`ControlFlowGraph`] - Per-instruction successors
//! - [`preprocess()`] - Rewrites applied before a body is analysed

mod access;
mod assembler;
mod cfg;
mod class;
mod hierarchy;
mod instruction;
mod method;
mod opcode;
mod preprocess;
mod provider;
mod types;

pub use access::AccessFlags;
pub use assembler::MethodAssembler;
pub use cfg::{ControlFlowGraph, EdgeKind};
pub use class::{ClassMetadata, FieldMetadata};
pub use hierarchy::{ClassHierarchy, ResolvedField, ResolvedMethod};
pub use instruction::{
    newarray_element, Constant, FieldRef, Instruction, InvokeDynamic, MethodRef, TryCatchBlock,
};
pub use method::MethodBody;
pub use opcode::Opcode;
pub use preprocess::preprocess;
pub use provider::{ClassPool, ClassProvider};
pub use types::{JvmType, MethodDescriptor, OBJECT};
