//! Numeric constants tracked by constant propagation.

use std::{
    fmt,
    hash::{Hash, Hasher},
};

use crate::bytecode::JvmType;

/// A JVM numeric constant.
///
/// Floating-point values compare and hash by bit pattern, so `NaN` equals itself and
/// `0.0` differs from `-0.0`. That is the identity a constant lattice needs.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    /// `int` (also boolean, byte, char and short)
    Int(i32),
    /// `long`
    Long(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
}

impl Number {
    /// The value narrowed or widened to `int`, with JVM conversion semantics.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_int(self) -> i32 {
        match self {
            Number::Int(v) => v,
            Number::Long(v) => v as i32,
            Number::Float(v) => v as i32,
            Number::Double(v) => v as i32,
        }
    }

    /// The value converted to `long`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_long(self) -> i64 {
        match self {
            Number::Int(v) => i64::from(v),
            Number::Long(v) => v,
            Number::Float(v) => v as i64,
            Number::Double(v) => v as i64,
        }
    }

    /// The value converted to `float`.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn as_float(self) -> f32 {
        match self {
            Number::Int(v) => v as f32,
            Number::Long(v) => v as f32,
            Number::Float(v) => v,
            Number::Double(v) => v as f32,
        }
    }

    /// The value converted to `double`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_double(self) -> f64 {
        match self {
            Number::Int(v) => f64::from(v),
            Number::Long(v) => v as f64,
            Number::Float(v) => f64::from(v),
            Number::Double(v) => v,
        }
    }

    /// Computational type of the constant.
    #[must_use]
    pub fn value_type(self) -> JvmType {
        match self {
            Number::Int(_) => JvmType::Int,
            Number::Long(_) => JvmType::Long,
            Number::Float(_) => JvmType::Float,
            Number::Double(_) => JvmType::Double,
        }
    }

    fn bits(self) -> (u8, u64) {
        match self {
            Number::Int(v) => (0, u64::from(v as u32)),
            Number::Long(v) => (1, v as u64),
            Number::Float(v) => (2, u64::from(v.to_bits())),
            Number::Double(v) => (3, v.to_bits()),
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for Number {}

impl Hash for Number {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(v) => write!(f, "{v}"),
            Number::Long(v) => write!(f, "{v}L"),
            Number::Float(v) => write!(f, "{v}F"),
            Number::Double(v) => write!(f, "{v}D"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitwise_identity() {
        assert_eq!(Number::Double(f64::NAN), Number::Double(f64::NAN));
        assert_ne!(Number::Float(0.0), Number::Float(-0.0));
        assert_ne!(Number::Int(1), Number::Long(1));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(Number::Long(0x1_0000_0002).as_int(), 2);
        assert_eq!(Number::Double(3.9).as_int(), 3);
        assert_eq!(Number::Int(-1).as_long(), -1);
        assert_eq!(Number::Int(7).value_type(), JvmType::Int);
    }
}
