// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # fusescope
//!
//! The decision engine of a stream-fusing JVM bytecode optimizer.
//!
//! A chained stream pipeline (`list.stream().map(f).filter(p).sum()`) allocates one
//! object per stage and dispatches every element through a chain of virtual calls.
//! An optimizer can remove both, by folding the stage objects into local variables and
//! splicing the calls in place, but only where that is provably safe. `fusescope`
//! answers the two questions such an optimizer asks, for every allocation and every
//! call reachable from a method:
//!
//! - Can this allocation be replaced by local variables?
//! - Can this call be inlined?
//!
//! ## Features
//!
//! - **Context-sensitive** - Every call is analysed in its own call-string context
//! - **Heap-aware** - Points-to facts for every tracked allocation, with escape tracking
//! - **Branch-sensitive** - Statically decided branches exclude the dead code from all decisions
//! - **Bounded** - Finite models for chain-walking library methods, a recursion limit and
//!   abstract garbage collection
//! - **Pluggable** - Oracles decide which calls to analyse and which allocations to track
//!
//! ## Quick Start
//!
//! ```rust
//! use fusescope::prelude::*;
//!
//! let pool = ClassPool::bootstrap()?;
//! let oracle = ExhaustiveOracle;
//!
//! // static Object make() { Object o = new Object(); return o; }
//! let mut asm = MethodAssembler::new("make", "()Ljava/lang/Object;", AccessFlags::STATIC);
//! asm.type_insn(Opcode::New, "java/lang/Object")?
//!     .insn(Opcode::Dup)?
//!     .invoke(Opcode::Invokespecial, "java/lang/Object", "<init>", "()V")?
//!     .insn(Opcode::Areturn)?;
//! let body = asm.finalize()?;
//!
//! let outcome = fusescope::analyze("demo/Main", &body, &pool, &oracle)?;
//! let site = outcome.allocation_site(outcome.root(), 0).unwrap();
//! assert!(outcome.escaped().contains(&site));
//! assert!(!outcome.can_stack_allocate(site));
//! # Ok::<(), fusescope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`bytecode`] - In-memory classes, method bodies, the class hierarchy
//! - [`analysis`] - Domains, heap, contexts, the interpreter, the driver and the
//!   decision graph
//! - [`utils`] - Graph toolkit
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`], with [`Error`] describing what went
//! wrong. A failed session produces no partial result: the caller is expected to leave
//! the analysed method untouched.
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade. Sessions report at `info`, contexts,
//! garbage collection and type bans at `debug`, individual denied decisions at
//! `trace`.

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use fusescope::prelude::*;
///
/// let pool = ClassPool::bootstrap()?;
/// let oracle = StreamLibraryOracle::default();
/// let session = AnalysisSession::new(&pool, &oracle);
/// assert_eq!(session.config().max_depth, 100);
/// # Ok::<(), fusescope::Error>(())
/// ```
pub mod prelude;

/// The JVM bytecode model the analysis consumes.
///
/// Classes and method bodies are supplied through a [`bytecode::ClassProvider`];
/// [`bytecode::ClassPool`] is the in-memory implementation and
/// [`bytecode::MethodAssembler`] builds bodies from symbolic instructions.
///
/// # Examples
///
/// ```rust
/// use fusescope::bytecode::{ClassHierarchy, ClassPool, JvmType};
///
/// let pool = ClassPool::bootstrap()?;
/// let hierarchy = ClassHierarchy::new(&pool);
/// assert!(hierarchy.has_ancestor(
///     &JvmType::object("java/lang/NullPointerException"),
///     &JvmType::object("java/lang/Throwable"),
/// )?);
/// # Ok::<(), fusescope::Error>(())
/// ```
pub mod bytecode;

/// The interprocedural abstract interpreter and the decision graph.
pub mod analysis;

/// Shared utilities.
pub mod utils;

/// `fusescope` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`]. This is used consistently throughout the crate.
///
/// # Examples
///
/// ```rust
/// use fusescope::{Error, Result};
///
/// fn depth_of(depth: usize, limit: usize) -> Result<usize> {
///     if depth > limit {
///         return Err(Error::RecursionLimit(limit));
///     }
///     Ok(depth)
/// }
/// assert!(depth_of(3, 2).is_err());
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `fusescope` Error type
///
/// The main error type for all operations in this crate. See [`Error`] for the
/// categories of failures and which of them abort a session.
pub use error::Error;

/// Analyses one method with the default configuration.
///
/// See [`analysis::AnalysisSession`] for sessions with a custom configuration, purity
/// table or model registry.
pub use analysis::analyze;
