//! Oracles: the pluggable policies the interprocedural driver consults.
//!
//! The driver asks three independent questions, one trait each:
//!
//! - [`CallPolicy`] - Should a call be analysed recursively or summarised?
//! - [`AllocationPolicy`] - Should a fresh allocation get a heap cell?
//! - [`TypeQuery`] - What is the runtime class of an imprecise receiver?
//!
//! An [`Oracle`] is anything that answers all three; there is a blanket implementation,
//! so implementing the three traits on one type is enough. [`CombinedOracle`] glues
//! three separate answerers together.
//!
//! # Implementations
//!
//! - [`ExhaustiveOracle`] - Always analyse, always track, never answer type queries
//! - [`StreamLibraryOracle`] - Analyse and track what belongs to the stream library
//! - [`MockTypeOracle`] - Guesses concrete collection classes for `stream()` receivers
//! - [`FixedTypeOracle`] - Answers type queries from a fixed table
//! - [`CombinedOracle`] - One boxed answerer per question
//!
//! Answers are policy only. Any conforming implementation gives a sound result; a
//! better oracle just gives a larger set of allowed transformations.

mod combined;
mod exhaustive;
mod fixed;
mod library;
mod mock;

pub use combined::CombinedOracle;
pub use exhaustive::ExhaustiveOracle;
pub use fixed::FixedTypeOracle;
pub use library::StreamLibraryOracle;
pub use mock::MockTypeOracle;

use std::{collections::BTreeSet, rc::Rc};

use crate::{
    analysis::{
        context::{Context, ContextTable},
        domain::AbstractValue,
    },
    bytecode::{ClassHierarchy, JvmType, MethodRef},
    Result,
};

/// Everything an oracle may inspect about the context a question is asked in.
pub struct OracleQuery<'q> {
    hierarchy: &'q ClassHierarchy<'q>,
    contexts: &'q ContextTable,
    context: &'q Context,
}

impl<'q> OracleQuery<'q> {
    /// Creates a query view.
    #[must_use]
    pub fn new(
        hierarchy: &'q ClassHierarchy<'q>,
        contexts: &'q ContextTable,
        context: &'q Context,
    ) -> Self {
        OracleQuery {
            hierarchy,
            contexts,
            context,
        }
    }

    /// The context the question is asked from.
    #[must_use]
    pub fn context(&self) -> &'q Context {
        self.context
    }

    /// Class declaring the method being analysed.
    #[must_use]
    pub fn owner(&self) -> &'q str {
        self.context.owner()
    }

    /// The calling context, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&'q Context> {
        self.context.parent().map(|id| self.contexts.get(id))
    }

    /// The class hierarchy.
    #[must_use]
    pub fn hierarchy(&self) -> &'q ClassHierarchy<'q> {
        self.hierarchy
    }

    /// Ancestors of a type, itself included.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ClassNotFound`] if a class on the way is unknown.
    pub fn ancestors(&self, ty: &JvmType) -> Result<Rc<BTreeSet<JvmType>>> {
        self.hierarchy.ancestors(ty)
    }
}

/// Recursion policy.
pub trait CallPolicy {
    /// Returns `true` if `call` should be analysed recursively. Calls that can reach
    /// tracked heap cells are analysed regardless of the answer.
    ///
    /// # Errors
    ///
    /// Implementations propagate hierarchy lookup failures.
    fn should_analyse_call(&self, query: &OracleQuery<'_>, call: &MethodRef) -> Result<bool>;
}

/// Precision policy for allocations.
pub trait AllocationPolicy {
    /// Returns `true` if an allocation of `ty` should get its own heap cell.
    ///
    /// # Errors
    ///
    /// Implementations propagate hierarchy lookup failures.
    fn should_track_allocation(&self, query: &OracleQuery<'_>, ty: &JvmType) -> Result<bool>;
}

/// Receiver-type hints for devirtualization.
pub trait TypeQuery {
    /// Returns the runtime class of `receiver` at `call`, if the implementation knows it.
    ///
    /// # Errors
    ///
    /// Implementations propagate hierarchy lookup failures.
    fn query_type(
        &self,
        query: &OracleQuery<'_>,
        call: &MethodRef,
        receiver: &AbstractValue,
    ) -> Result<Option<JvmType>>;
}

/// A complete oracle.
pub trait Oracle: CallPolicy + AllocationPolicy + TypeQuery {}

impl<T: CallPolicy + AllocationPolicy + TypeQuery + ?Sized> Oracle for T {}
