//! Flat lattice.

use std::fmt;

use crate::analysis::domain::Lattice;

/// The classic flat lattice over `T`: bottom, one defined value, or top.
///
/// ```rust
/// use fusescope::analysis::domain::{FlatElement, Lattice};
///
/// let three = FlatElement::Value(3);
/// assert_eq!(three.merge(&FlatElement::Bottom), three);
/// assert_eq!(three.merge(&FlatElement::Value(4)), FlatElement::Top);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum FlatElement<T> {
    /// No value yet
    Bottom,
    /// Exactly this value
    Value(T),
    /// Any value
    #[default]
    Top,
}

impl<T> FlatElement<T> {
    /// Returns `true` if the element holds a single value.
    #[must_use]
    pub fn is_defined(&self) -> bool {
        matches!(self, FlatElement::Value(_))
    }

    /// Returns `true` for top.
    #[must_use]
    pub fn is_top(&self) -> bool {
        matches!(self, FlatElement::Top)
    }

    /// Returns the value if defined.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        match self {
            FlatElement::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Applies `f` to a defined value, keeping bottom and top.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FlatElement<U> {
        match self {
            FlatElement::Bottom => FlatElement::Bottom,
            FlatElement::Value(value) => FlatElement::Value(f(value)),
            FlatElement::Top => FlatElement::Top,
        }
    }
}

impl<T: Clone + fmt::Debug + PartialEq> Lattice for FlatElement<T> {
    fn merge(&self, other: &Self) -> Self {
        match (self, other) {
            (FlatElement::Bottom, x) | (x, FlatElement::Bottom) => x.clone(),
            (FlatElement::Value(a), FlatElement::Value(b)) if a == b => self.clone(),
            _ => FlatElement::Top,
        }
    }
}

impl<T: fmt::Display> fmt::Display for FlatElement<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlatElement::Bottom => write!(f, "⊥"),
            FlatElement::Value(value) => write!(f, "{value}"),
            FlatElement::Top => write!(f, "⊤"),
        }
    }
}
