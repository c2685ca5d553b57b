//! Abstract value domains.
//!
//! Every domain is a join semi-lattice: values only move up as the fixpoint iterates,
//! which is what makes the frame interpreter terminate.
//!
//! - [`FlatElement`] - Flat lattice used for constant propagation
//! - [`TypeElement`] - Declared type plus a precision bit
//! - [`PointerElement`] - Null / untracked / interesting-top / top / heap cell
//! - [`AbstractValue`] - Product of the three, one stack slot, local or field

mod flat;
mod number;
mod pointer;
mod type_element;
mod value;

pub use flat::FlatElement;
pub use number::Number;
pub use pointer::PointerElement;
pub use type_element::TypeElement;
pub use value::AbstractValue;

use std::fmt::Debug;

/// A join semi-lattice.
///
/// `merge` must be:
///
/// - **Idempotent**: `x.merge(x) == x`
/// - **Commutative**: `x.merge(y) == y.merge(x)`
/// - **An upper bound**: `x.leq(&x.merge(y))`
///
/// Violating any of these breaks fixpoint termination in the frame interpreter.
pub trait Lattice: Clone + Debug + PartialEq {
    /// Least upper bound of two elements.
    #[must_use]
    fn merge(&self, other: &Self) -> Self;

    /// Partial order induced by `merge`.
    fn leq(&self, other: &Self) -> bool {
        &self.merge(other) == other
    }
}
