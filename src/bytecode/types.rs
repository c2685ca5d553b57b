//! JVM types and descriptors.
//!
//! [`JvmType`] mirrors the sorts a JVM field or method descriptor can express. Class
//! names are kept in internal form (`java/lang/Object`), descriptors in their compact
//! form (`Ljava/lang/Object;`, `[I`, `(IJ)V`).

use std::fmt;

use crate::{error::malformed_error, Result};

/// Internal name of `java.lang.Object`.
pub const OBJECT: &str = "java/lang/Object";

/// A JVM type as it appears in descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JvmType {
    /// `V`. Also used by the type lattice as the "unknown" sentinel.
    Void,
    /// `Z`
    Boolean,
    /// `C`
    Char,
    /// `B`
    Byte,
    /// `S`
    Short,
    /// `I`
    Int,
    /// `F`
    Float,
    /// `J`
    Long,
    /// `D`
    Double,
    /// `L<internal name>;`
    Object(String),
    /// `[<element>`
    Array(Box<JvmType>),
}

impl JvmType {
    /// Creates an object type from an internal class name.
    #[must_use]
    pub fn object(internal_name: impl Into<String>) -> Self {
        JvmType::Object(internal_name.into())
    }

    /// Creates an array type with the given element type.
    #[must_use]
    pub fn array_of(element: JvmType) -> Self {
        JvmType::Array(Box::new(element))
    }

    /// Parses a type from the "internal name" form used by owner and type operands:
    /// array types are given as descriptors (`[I`), classes by name (`java/util/List`).
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] for an invalid array descriptor.
    pub fn from_internal_name(name: &str) -> Result<Self> {
        if name.starts_with('[') {
            Self::from_descriptor(name)
        } else {
            Ok(JvmType::Object(name.to_string()))
        }
    }

    /// Parses a single field descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the descriptor is empty, truncated or has
    /// trailing characters.
    pub fn from_descriptor(desc: &str) -> Result<Self> {
        let (ty, rest) = parse_one(desc)?;
        if !rest.is_empty() {
            return Err(malformed_error!("Trailing characters in descriptor '{}'", desc));
        }
        Ok(ty)
    }

    /// Returns the descriptor form of this type.
    #[must_use]
    pub fn descriptor(&self) -> String {
        let mut out = String::new();
        self.write_descriptor(&mut out);
        out
    }

    fn write_descriptor(&self, out: &mut String) {
        match self {
            JvmType::Void => out.push('V'),
            JvmType::Boolean => out.push('Z'),
            JvmType::Char => out.push('C'),
            JvmType::Byte => out.push('B'),
            JvmType::Short => out.push('S'),
            JvmType::Int => out.push('I'),
            JvmType::Float => out.push('F'),
            JvmType::Long => out.push('J'),
            JvmType::Double => out.push('D'),
            JvmType::Object(name) => {
                out.push('L');
                out.push_str(name);
                out.push(';');
            }
            JvmType::Array(element) => {
                out.push('[');
                element.write_descriptor(out);
            }
        }
    }

    /// Returns the internal name: the class name for objects, the descriptor otherwise.
    #[must_use]
    pub fn internal_name(&self) -> String {
        match self {
            JvmType::Object(name) => name.clone(),
            other => other.descriptor(),
        }
    }

    /// Returns the class name for object types.
    #[must_use]
    pub fn class_name(&self) -> Option<&str> {
        match self {
            JvmType::Object(name) => Some(name),
            _ => None,
        }
    }

    /// Returns `true` for object and array types.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self, JvmType::Object(_) | JvmType::Array(_))
    }

    /// Returns `true` for `boolean`, `byte`, `char`, `short` and `int`, which share the
    /// JVM's int computational type.
    #[must_use]
    pub fn is_int_like(&self) -> bool {
        matches!(
            self,
            JvmType::Boolean | JvmType::Byte | JvmType::Char | JvmType::Short | JvmType::Int
        )
    }

    /// Number of local-variable or operand-stack slots a value of this type occupies.
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            JvmType::Long | JvmType::Double => 2,
            JvmType::Void => 0,
            _ => 1,
        }
    }

    /// Returns the element type of an array type.
    #[must_use]
    pub fn element_type(&self) -> Option<&JvmType> {
        match self {
            JvmType::Array(element) => Some(element),
            _ => None,
        }
    }

    /// Returns the type a value of this type has on the operand stack: sub-int types
    /// become `int`, everything else is unchanged.
    #[must_use]
    pub fn computational(&self) -> JvmType {
        if self.is_int_like() {
            JvmType::Int
        } else {
            self.clone()
        }
    }
}

impl fmt::Display for JvmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.descriptor())
    }
}

/// A parsed method descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Parameter types, in declaration order
    pub parameters: Vec<JvmType>,
    /// Return type
    pub return_type: JvmType,
}

impl MethodDescriptor {
    /// Parses a method descriptor such as `(ILjava/lang/Object;)V`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the descriptor is not well-formed.
    pub fn parse(desc: &str) -> Result<Self> {
        let mut rest = desc
            .strip_prefix('(')
            .ok_or_else(|| malformed_error!("Method descriptor '{}' does not start with '('", desc))?;

        let mut parameters = Vec::new();
        loop {
            if let Some(after) = rest.strip_prefix(')') {
                rest = after;
                break;
            }
            let (ty, after) = parse_one(rest)?;
            if ty == JvmType::Void {
                return Err(malformed_error!("Void parameter in descriptor '{}'", desc));
            }
            parameters.push(ty);
            rest = after;
        }

        let return_type = JvmType::from_descriptor(rest)?;
        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }

    /// Builds the descriptor string for the given parameter and return types.
    #[must_use]
    pub fn format(parameters: &[JvmType], return_type: &JvmType) -> String {
        let mut out = String::from("(");
        for param in parameters {
            param.write_descriptor(&mut out);
        }
        out.push(')');
        return_type.write_descriptor(&mut out);
        out
    }

    /// Total number of local slots the parameters occupy (excluding `this`).
    #[must_use]
    pub fn parameter_slots(&self) -> usize {
        self.parameters.iter().map(JvmType::size).sum()
    }
}

fn parse_one(desc: &str) -> Result<(JvmType, &str)> {
    let mut chars = desc.chars();
    let first = chars
        .next()
        .ok_or_else(|| malformed_error!("Empty type descriptor"))?;
    let rest = chars.as_str();

    let ty = match first {
        'V' => JvmType::Void,
        'Z' => JvmType::Boolean,
        'C' => JvmType::Char,
        'B' => JvmType::Byte,
        'S' => JvmType::Short,
        'I' => JvmType::Int,
        'F' => JvmType::Float,
        'J' => JvmType::Long,
        'D' => JvmType::Double,
        'L' => {
            let end = rest
                .find(';')
                .ok_or_else(|| malformed_error!("Unterminated class descriptor '{}'", desc))?;
            if end == 0 {
                return Err(malformed_error!("Empty class name in descriptor '{}'", desc));
            }
            return Ok((JvmType::Object(rest[..end].to_string()), &rest[end + 1..]));
        }
        '[' => {
            let (element, after) = parse_one(rest)?;
            if element == JvmType::Void {
                return Err(malformed_error!("Array of void in descriptor '{}'", desc));
            }
            return Ok((JvmType::array_of(element), after));
        }
        other => {
            return Err(malformed_error!(
                "Unknown descriptor character '{}' in '{}'",
                other,
                desc
            ))
        }
    };
    Ok((ty, rest))
}
