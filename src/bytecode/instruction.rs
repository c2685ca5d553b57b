//! Symbolic JVM instructions.
//!
//! Instructions are held in a flat vector per method; branch targets are indices into
//! that vector, which is also how the analysis addresses program points.

use std::fmt;

use crate::{
    bytecode::{opcode::Opcode, types::JvmType},
    error::malformed_error,
    Result,
};

/// Symbolic reference to a method, as carried by invoke instructions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodRef {
    /// Internal name of the owner class (or an array descriptor for `clone`)
    pub owner: String,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub desc: String,
    /// Whether the owner is an interface
    pub interface: bool,
}

impl MethodRef {
    /// Creates a reference to a method declared on a class.
    pub fn new(owner: impl Into<String>, name: impl Into<String>, desc: impl Into<String>) -> Self {
        MethodRef {
            owner: owner.into(),
            name: name.into(),
            desc: desc.into(),
            interface: false,
        }
    }

    /// Creates a reference to a method declared on an interface.
    pub fn interface(
        owner: impl Into<String>,
        name: impl Into<String>,
        desc: impl Into<String>,
    ) -> Self {
        MethodRef {
            interface: true,
            ..Self::new(owner, name, desc)
        }
    }

    /// Returns `true` for instance initializers.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.name)
    }
}

/// Symbolic reference to a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldRef {
    /// Internal name of the class the instruction names
    pub owner: String,
    /// Field name
    pub name: String,
    /// Field descriptor
    pub desc: String,
}

impl FieldRef {
    /// Creates a new field reference.
    pub fn new(owner: impl Into<String>, name: impl Into<String>, desc: impl Into<String>) -> Self {
        FieldRef {
            owner: owner.into(),
            name: name.into(),
            desc: desc.into(),
        }
    }

    /// Parses the field descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the descriptor is invalid.
    pub fn field_type(&self) -> Result<JvmType> {
        JvmType::from_descriptor(&self.desc)
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.name)
    }
}

/// An `ldc` operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// `int` constant
    Int(i32),
    /// `long` constant
    Long(i64),
    /// `float` constant
    Float(f32),
    /// `double` constant
    Double(f64),
    /// String literal
    String(String),
    /// Class literal
    Class(JvmType),
}

impl Constant {
    /// Static type of the value this constant pushes.
    #[must_use]
    pub fn value_type(&self) -> JvmType {
        match self {
            Constant::Int(_) => JvmType::Int,
            Constant::Long(_) => JvmType::Long,
            Constant::Float(_) => JvmType::Float,
            Constant::Double(_) => JvmType::Double,
            Constant::String(_) => JvmType::object("java/lang/String"),
            Constant::Class(_) => JvmType::object("java/lang/Class"),
        }
    }
}

/// An `invokedynamic` call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvokeDynamic {
    /// Call-site name
    pub name: String,
    /// Call-site descriptor
    pub desc: String,
    /// Owner of the bootstrap method
    pub bootstrap_owner: String,
    /// Name of the bootstrap method
    pub bootstrap_name: String,
}

impl InvokeDynamic {
    /// Returns `true` if this is a string concatenation site produced by `javac`.
    #[must_use]
    pub fn is_string_concat(&self) -> bool {
        self.bootstrap_owner == "java/lang/invoke/StringConcatFactory"
            && self.bootstrap_name.starts_with("makeConcat")
    }
}

/// A single instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Instruction without operands
    Insn(Opcode),
    /// `bipush`, `sipush` and `newarray` (whose operand is the array type code)
    Int {
        /// Opcode
        opcode: Opcode,
        /// Immediate operand
        operand: i32,
    },
    /// Local variable loads and stores
    Var {
        /// Opcode
        opcode: Opcode,
        /// Local slot
        var: usize,
    },
    /// `iinc`
    Iinc {
        /// Local slot
        var: usize,
        /// Increment
        increment: i32,
    },
    /// `ldc`
    Ldc(Constant),
    /// Field access
    Field {
        /// Opcode
        opcode: Opcode,
        /// Accessed field
        field: FieldRef,
    },
    /// Method invocation
    Method {
        /// Opcode
        opcode: Opcode,
        /// Invoked method
        method: MethodRef,
    },
    /// `invokedynamic`
    InvokeDynamic(InvokeDynamic),
    /// `new`, `anewarray`, `checkcast` and `instanceof`
    Type {
        /// Opcode
        opcode: Opcode,
        /// Internal name of the operand type
        class: String,
    },
    /// Conditional and unconditional jumps
    Jump {
        /// Opcode
        opcode: Opcode,
        /// Index of the target instruction
        target: usize,
    },
    /// `tableswitch`
    TableSwitch {
        /// Lowest key
        low: i32,
        /// Highest key
        high: i32,
        /// Default target
        default: usize,
        /// Targets for `low..=high`
        targets: Vec<usize>,
    },
    /// `lookupswitch`
    LookupSwitch {
        /// Default target
        default: usize,
        /// Keys
        keys: Vec<i32>,
        /// Target for each key
        targets: Vec<usize>,
    },
    /// `multianewarray`
    MultiANewArray {
        /// Array descriptor
        desc: String,
        /// Number of dimensions to allocate
        dimensions: u8,
    },
}

impl Instruction {
    /// Returns the opcode of this instruction.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Insn(opcode)
            | Instruction::Int { opcode, .. }
            | Instruction::Var { opcode, .. }
            | Instruction::Field { opcode, .. }
            | Instruction::Method { opcode, .. }
            | Instruction::Type { opcode, .. }
            | Instruction::Jump { opcode, .. } => *opcode,
            Instruction::Iinc { .. } => Opcode::Iinc,
            Instruction::Ldc(_) => Opcode::Ldc,
            Instruction::InvokeDynamic(_) => Opcode::Invokedynamic,
            Instruction::TableSwitch { .. } => Opcode::Tableswitch,
            Instruction::LookupSwitch { .. } => Opcode::Lookupswitch,
            Instruction::MultiANewArray { .. } => Opcode::Multianewarray,
        }
    }

    /// Returns the invoked method for invoke instructions.
    #[must_use]
    pub fn method(&self) -> Option<&MethodRef> {
        match self {
            Instruction::Method { method, .. } => Some(method),
            _ => None,
        }
    }

    /// Returns the accessed field for field instructions.
    #[must_use]
    pub fn field(&self) -> Option<&FieldRef> {
        match self {
            Instruction::Field { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Returns `true` for `invokevirtual`, `invokespecial`, `invokestatic` and
    /// `invokeinterface`.
    #[must_use]
    pub fn is_call(&self) -> bool {
        matches!(self, Instruction::Method { .. })
    }

    /// Explicit branch targets of this instruction, not including fall-through.
    #[must_use]
    pub fn branch_targets(&self) -> Vec<usize> {
        match self {
            Instruction::Jump { target, .. } => vec![*target],
            Instruction::TableSwitch {
                default, targets, ..
            }
            | Instruction::LookupSwitch {
                default, targets, ..
            } => {
                let mut all = Vec::with_capacity(targets.len() + 1);
                all.push(*default);
                all.extend(targets.iter().copied());
                all
            }
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Insn(opcode) => write!(f, "{opcode}"),
            Instruction::Int { opcode, operand } => write!(f, "{opcode} {operand}"),
            Instruction::Var { opcode, var } => write!(f, "{opcode} {var}"),
            Instruction::Iinc { var, increment } => write!(f, "iinc {var} {increment}"),
            Instruction::Ldc(constant) => write!(f, "ldc {constant:?}"),
            Instruction::Field { opcode, field } => {
                write!(f, "{opcode} {field} : {}", field.desc)
            }
            Instruction::Method { opcode, method } => {
                write!(f, "{opcode} {method}{}", method.desc)
            }
            Instruction::InvokeDynamic(indy) => write!(f, "invokedynamic {}{}", indy.name, indy.desc),
            Instruction::Type { opcode, class } => write!(f, "{opcode} {class}"),
            Instruction::Jump { opcode, target } => write!(f, "{opcode} @{target}"),
            Instruction::TableSwitch { low, high, .. } => write!(f, "tableswitch {low}..{high}"),
            Instruction::LookupSwitch { keys, .. } => write!(f, "lookupswitch {keys:?}"),
            Instruction::MultiANewArray { desc, dimensions } => {
                write!(f, "multianewarray {desc} {dimensions}")
            }
        }
    }
}

/// Maps a `newarray` type code to the array's element type.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] for unknown type codes.
pub fn newarray_element(atype: i32) -> Result<JvmType> {
    Ok(match atype {
        4 => JvmType::Boolean,
        5 => JvmType::Char,
        6 => JvmType::Float,
        7 => JvmType::Double,
        8 => JvmType::Byte,
        9 => JvmType::Short,
        10 => JvmType::Int,
        11 => JvmType::Long,
        other => return Err(malformed_error!("Invalid newarray type code {}", other)),
    })
}

/// An exception handler covering `start..end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryCatchBlock {
    /// First covered instruction
    pub start: usize,
    /// One past the last covered instruction
    pub end: usize,
    /// Handler entry
    pub handler: usize,
    /// Caught type, `None` for `finally`
    pub catch_type: Option<String>,
}

impl TryCatchBlock {
    /// Returns `true` if the handler covers the instruction at `index`.
    #[must_use]
    pub fn covers(&self, index: usize) -> bool {
        (self.start..self.end).contains(&index)
    }
}
