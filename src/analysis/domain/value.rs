//! The abstract value carried in every stack slot, local and field.

use std::fmt;

use crate::{
    analysis::domain::{FlatElement, Lattice, Number, PointerElement, TypeElement},
    bytecode::JvmType,
    Result,
};

/// Product of a type, a pointer and a numeric constant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AbstractValue {
    /// Declared type and precision
    pub ty: TypeElement,
    /// Where the value may point
    pub pointer: PointerElement,
    /// Known numeric value, if any
    pub constant: FlatElement<Number>,
}

impl AbstractValue {
    /// Creates a value from its three components.
    #[must_use]
    pub fn new(ty: TypeElement, pointer: PointerElement, constant: FlatElement<Number>) -> Self {
        AbstractValue {
            ty,
            pointer,
            constant,
        }
    }

    /// An imprecise value of type `ty` about which nothing else is known.
    #[must_use]
    pub fn unknown(ty: JvmType) -> Self {
        Self::new(
            TypeElement::imprecise(ty),
            PointerElement::Top,
            FlatElement::Top,
        )
    }

    /// The completely unknown value.
    #[must_use]
    pub fn top() -> Self {
        Self::unknown(TypeElement::TOP)
    }

    /// A non-null reference that cannot alias tracked state.
    #[must_use]
    pub fn untracked(ty: JvmType, precise: bool) -> Self {
        Self::new(
            TypeElement::new(precise, ty),
            PointerElement::UTop,
            FlatElement::Top,
        )
    }

    /// A precisely typed reference to heap cell `index`.
    #[must_use]
    pub fn cell(ty: JvmType, index: usize) -> Self {
        Self::new(
            TypeElement::precise(ty),
            PointerElement::Cell(index),
            FlatElement::Top,
        )
    }

    /// The `null` constant typed as `ty`.
    #[must_use]
    pub fn null(ty: JvmType) -> Self {
        Self::new(
            TypeElement::imprecise(ty),
            PointerElement::Null,
            FlatElement::Top,
        )
    }

    /// A precise primitive constant.
    #[must_use]
    pub fn constant(value: Number) -> Self {
        Self::new(
            TypeElement::precise(value.value_type()),
            PointerElement::Top,
            FlatElement::Value(value),
        )
    }

    /// Replaces the constant component.
    #[must_use]
    pub fn with_constant(mut self, constant: FlatElement<Number>) -> Self {
        self.constant = constant;
        self
    }

    /// Number of local variable slots the value occupies. Unknown-typed values count as
    /// one, which is what the interpreter needs when it pads over 2-slot locals.
    #[must_use]
    pub fn size(&self) -> usize {
        if self.ty.is_unknown() {
            1
        } else {
            self.ty.ty().size()
        }
    }

    /// The heap cell this value designates.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidPointer`] if the pointer is not a single cell.
    pub fn points_to(&self) -> Result<usize> {
        self.pointer.points_to()
    }

    /// Returns `true` if the value is the `null` reference.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.pointer == PointerElement::Null
    }
}

impl Lattice for AbstractValue {
    fn merge(&self, other: &Self) -> Self {
        if self == other {
            return self.clone();
        }

        // A null carries no type information of its own; the other side's type wins so
        // that `x = cond ? new Foo() : null` stays a Foo.
        let ty = match (self.is_null(), other.is_null()) {
            (true, false) => TypeElement::imprecise(other.ty.ty().clone()),
            (false, true) => TypeElement::imprecise(self.ty.ty().clone()),
            _ => self.ty.merge(&other.ty),
        };

        AbstractValue {
            ty,
            pointer: self.pointer.merge(&other.pointer),
            constant: self.constant.merge(&other.constant),
        }
    }
}

impl fmt::Display for AbstractValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.ty, self.pointer, self.constant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_merge_keeps_type() {
        let foo = AbstractValue::cell(JvmType::object("Foo"), 0);
        let null = AbstractValue::null(JvmType::object("java/lang/Object"));

        let merged = foo.merge(&null);
        assert_eq!(merged, null.merge(&foo));
        assert_eq!(merged.ty, TypeElement::imprecise(JvmType::object("Foo")));
        assert_eq!(merged.pointer, PointerElement::ITop);
    }

    #[test]
    fn test_constant_merge() {
        let one = AbstractValue::constant(Number::Int(1));
        let two = AbstractValue::constant(Number::Int(2));
        assert_eq!(one.merge(&one), one);
        assert_eq!(one.merge(&two).constant, FlatElement::Top);
        assert_eq!(one.merge(&two).ty.ty(), &JvmType::Int);
    }

    #[test]
    fn test_size() {
        assert_eq!(AbstractValue::top().size(), 1);
        assert_eq!(AbstractValue::unknown(JvmType::Long).size(), 2);
        assert_eq!(AbstractValue::untracked(JvmType::object("A"), true).size(), 1);
    }
}
