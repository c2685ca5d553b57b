//! Type lattice.

use std::{
    fmt,
    hash::{Hash, Hasher},
};

use crate::{
    analysis::domain::Lattice,
    bytecode::{JvmType, OBJECT},
};

/// A declared type with a precision bit.
///
/// A *precise* element is the exact runtime class of the value (it came from a `new`,
/// a constant, or a devirtualization decision). An imprecise element is only an upper
/// bound. `void` doubles as the "unknown" type.
///
/// Merging two different elements always yields an imprecise element whose type is:
///
/// - the wider type, if one is a syntactic subtype of the other (`Object` is above
///   every reference, arrays of references are covariant, `int` is above the sub-int
///   primitives)
/// - `java/lang/Object`, if both are unrelated references
/// - unknown otherwise
///
/// Precision is ignored when comparing primitive elements.
#[derive(Debug, Clone, Eq)]
pub struct TypeElement {
    ty: JvmType,
    precise: bool,
}

impl TypeElement {
    /// The "unknown type" sentinel.
    pub const TOP: JvmType = JvmType::Void;

    /// Creates an element.
    #[must_use]
    pub fn new(precise: bool, ty: JvmType) -> Self {
        TypeElement { ty, precise }
    }

    /// Creates a precise element.
    #[must_use]
    pub fn precise(ty: JvmType) -> Self {
        Self::new(true, ty)
    }

    /// Creates an imprecise element.
    #[must_use]
    pub fn imprecise(ty: JvmType) -> Self {
        Self::new(false, ty)
    }

    /// The imprecise unknown type.
    #[must_use]
    pub fn unknown() -> Self {
        Self::imprecise(Self::TOP)
    }

    /// The declared type.
    #[must_use]
    pub fn ty(&self) -> &JvmType {
        &self.ty
    }

    /// Returns `true` if the type is the exact runtime class.
    #[must_use]
    pub fn is_precise(&self) -> bool {
        self.precise
    }

    /// Returns `true` for the unknown type.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.ty == Self::TOP
    }

    /// Returns `true` if a value of this type may be a reference.
    #[must_use]
    pub fn maybe_pointer(&self) -> bool {
        self.ty.is_reference() || self.is_unknown()
    }

    /// The same type with the precision bit set.
    #[must_use]
    pub fn to_precise(&self) -> Self {
        Self::precise(self.ty.clone())
    }
}

/// Syntactic subtyping used by the merge. Deliberately does not consult the class
/// hierarchy, so the lattice stays a pure value type.
fn is_subtype(sub: &JvmType, sup: &JvmType) -> bool {
    if sub.is_reference() && sup.is_reference() {
        match (sub, sup) {
            (JvmType::Array(a), JvmType::Array(b)) if a.is_reference() && b.is_reference() => {
                is_subtype(a, b)
            }
            (_, JvmType::Object(name)) if name == OBJECT => true,
            _ => sub == sup,
        }
    } else if *sup == JvmType::Int {
        sub.is_int_like()
    } else {
        sub == sup
    }
}

impl Lattice for TypeElement {
    fn merge(&self, other: &Self) -> Self {
        if self == other {
            return self.clone();
        }

        let ty = if is_subtype(&self.ty, &other.ty) {
            other.ty.clone()
        } else if is_subtype(&other.ty, &self.ty) {
            self.ty.clone()
        } else if self.ty.is_reference() && other.ty.is_reference() {
            JvmType::object(OBJECT)
        } else {
            Self::TOP
        };
        TypeElement::imprecise(ty)
    }
}

impl PartialEq for TypeElement {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && (self.precise == other.precise || !self.maybe_pointer())
    }
}

impl Hash for TypeElement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ty.hash(state);
        if self.maybe_pointer() {
            self.precise.hash(state);
        }
    }
}

impl fmt::Display for TypeElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.precise {
            write!(f, "!")?;
        }
        write!(f, "{}", self.ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(name: &str) -> JvmType {
        JvmType::object(name)
    }

    #[test]
    fn test_merge_equal_keeps_precision() {
        let s = TypeElement::precise(obj("java/lang/String"));
        assert_eq!(s.merge(&s), s);
        assert!(s.merge(&s).is_precise());
    }

    #[test]
    fn test_merge_subtype_widens() {
        let s = TypeElement::precise(obj("java/lang/String"));
        let o = TypeElement::precise(obj(OBJECT));
        assert_eq!(s.merge(&o), TypeElement::imprecise(obj(OBJECT)));

        let b = TypeElement::imprecise(JvmType::Boolean);
        let i = TypeElement::imprecise(JvmType::Int);
        assert_eq!(b.merge(&i), TypeElement::imprecise(JvmType::Int));
    }

    #[test]
    fn test_merge_unrelated() {
        let s = TypeElement::precise(obj("java/lang/String"));
        let n = TypeElement::precise(obj("java/lang/Integer"));
        assert_eq!(s.merge(&n), TypeElement::imprecise(obj(OBJECT)));

        let i = TypeElement::imprecise(JvmType::Int);
        let l = TypeElement::imprecise(JvmType::Long);
        assert!(i.merge(&l).is_unknown());
        assert!(s.merge(&i).is_unknown());
    }

    #[test]
    fn test_array_covariance() {
        let strings = TypeElement::precise(JvmType::array_of(obj("java/lang/String")));
        let objects = TypeElement::imprecise(JvmType::array_of(obj(OBJECT)));
        assert_eq!(strings.merge(&objects), objects);

        let ints = TypeElement::precise(JvmType::array_of(JvmType::Int));
        let bools = TypeElement::precise(JvmType::array_of(JvmType::Boolean));
        assert_eq!(ints.merge(&bools), TypeElement::imprecise(obj(OBJECT)));
    }

    #[test]
    fn test_primitive_precision_ignored() {
        assert_eq!(
            TypeElement::precise(JvmType::Int),
            TypeElement::imprecise(JvmType::Int)
        );
        assert_ne!(
            TypeElement::precise(obj(OBJECT)),
            TypeElement::imprecise(obj(OBJECT))
        );
        assert!(TypeElement::unknown().maybe_pointer());
    }
}
