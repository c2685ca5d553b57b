//! Pointer lattice.

use std::fmt;

use crate::{analysis::domain::Lattice, Error, Result};

/// What a reference value may point to.
///
/// ```text
///              Top
///            /     \
///        UTop       ITop
///          |      /   |   \
///          |  Cell(0) ... Cell(n)
///          |      \   |   /
///           \------ Null
/// ```
///
/// `UTop` is a non-null value that cannot alias any tracked cell (an argument of the
/// analysed method, an untracked allocation). `ITop` may alias tracked cells but it is
/// not known which. Merges follow that picture with one simplification: anything other
/// than `Null` merged with `UTop` goes straight to `Top`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PointerElement {
    /// Definitely null
    Null,
    /// Non-null, never a tracked cell
    UTop,
    /// May be any tracked cell
    ITop,
    /// Anything
    Top,
    /// Exactly this heap cell
    Cell(usize),
}

impl PointerElement {
    /// Returns `true` for a concrete heap cell.
    #[must_use]
    pub fn is_valid(self) -> bool {
        matches!(self, PointerElement::Cell(_))
    }

    /// Returns `true` unless the pointer provably cannot reach tracked state.
    #[must_use]
    pub fn maybe_interesting(self) -> bool {
        !matches!(self, PointerElement::UTop | PointerElement::Null)
    }

    /// The heap cell this pointer designates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPointer`] for every state other than [`PointerElement::Cell`].
    pub fn points_to(self) -> Result<usize> {
        match self {
            PointerElement::Cell(index) => Ok(index),
            other => Err(Error::InvalidPointer(format!(
                "Value in state {other} has no heap cell"
            ))),
        }
    }
}

impl Lattice for PointerElement {
    fn merge(&self, other: &Self) -> Self {
        use PointerElement::{ITop, Null, Top, UTop};

        match (*self, *other) {
            (a, b) if a == b => a,
            (Top, _) | (_, Top) => Top,
            (UTop, Null) | (Null, UTop) => UTop,
            (UTop, _) | (_, UTop) => Top,
            _ => ITop,
        }
    }
}

impl fmt::Display for PointerElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointerElement::Null => write!(f, "N"),
            PointerElement::UTop => write!(f, "U"),
            PointerElement::ITop => write!(f, "⊤ᵢ"),
            PointerElement::Top => write!(f, "⊤"),
            PointerElement::Cell(index) => write!(f, "[{index}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PointerElement::{Cell, ITop, Null, Top, UTop};

    #[test]
    fn test_merge_table() {
        assert_eq!(Null.merge(&Null), Null);
        assert_eq!(Null.merge(&UTop), UTop);
        assert_eq!(UTop.merge(&Null), UTop);
        assert_eq!(Cell(3).merge(&Cell(3)), Cell(3));
        assert_eq!(Cell(3).merge(&Cell(4)), ITop);
        assert_eq!(Cell(3).merge(&Null), ITop);
        assert_eq!(UTop.merge(&Cell(1)), Top);
        assert_eq!(ITop.merge(&UTop), Top);
        for x in [Null, UTop, ITop, Top, Cell(0)] {
            assert_eq!(x.merge(&Top), Top);
        }
    }

    #[test]
    fn test_points_to() {
        assert_eq!(Cell(7).points_to().unwrap(), 7);
        assert!(matches!(ITop.points_to(), Err(Error::InvalidPointer(_))));
        assert!(UTop.leq(&Top));
        assert!(Cell(1).maybe_interesting());
        assert!(!Null.maybe_interesting());
    }
}
