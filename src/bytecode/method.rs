//! Method bodies.

use std::fmt;

use crate::{
    bytecode::{
        access::AccessFlags,
        instruction::{Instruction, TryCatchBlock},
        types::{JvmType, MethodDescriptor},
    },
    Result,
};

/// A method declaration together with its (possibly empty) code.
///
/// Abstract and native methods carry no instructions. Bodies are immutable once built;
/// rewrites such as [`crate::bytecode::preprocess()`] produce a new body.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodBody {
    /// Method name (`<init>` for constructors, `<clinit>` for static initializers)
    pub name: String,
    /// Method descriptor
    pub desc: String,
    /// Access flags
    pub access: AccessFlags,
    /// Number of local variable slots, including parameters
    pub max_locals: usize,
    /// Instruction stream
    pub instructions: Vec<Instruction>,
    /// Exception handlers
    pub try_catch: Vec<TryCatchBlock>,
}

impl MethodBody {
    /// Creates a body without code, as declared by abstract and native methods.
    pub fn declaration(name: impl Into<String>, desc: impl Into<String>, access: AccessFlags) -> Self {
        MethodBody {
            name: name.into(),
            desc: desc.into(),
            access,
            max_locals: 0,
            instructions: Vec::new(),
            try_catch: Vec::new(),
        }
    }

    /// Returns `true` if the method has no receiver.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access.is_static()
    }

    /// Returns `true` if the method is implemented natively.
    #[must_use]
    pub fn is_native(&self) -> bool {
        self.access.is_native()
    }

    /// Returns `true` if the method has no implementation.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.access.is_abstract()
    }

    /// Returns `true` if the method cannot be overridden.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.access.is_final()
    }

    /// Returns `true` if the body has code to interpret.
    #[must_use]
    pub fn has_code(&self) -> bool {
        !self.instructions.is_empty()
    }

    /// Parses the method descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the descriptor is invalid.
    pub fn descriptor(&self) -> Result<MethodDescriptor> {
        MethodDescriptor::parse(&self.desc)
    }

    /// Types of the values bound to the leading locals on entry: the receiver (typed as
    /// `owner`) for instance methods followed by the declared parameters.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the descriptor is invalid.
    pub fn argument_types(&self, owner: &str) -> Result<Vec<JvmType>> {
        let descriptor = self.descriptor()?;
        let mut types = Vec::with_capacity(descriptor.parameters.len() + 1);
        if !self.is_static() {
            types.push(JvmType::object(owner));
        }
        types.extend(descriptor.parameters);
        Ok(types)
    }

    /// Indices of all return instructions.
    pub fn return_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.instructions
            .iter()
            .enumerate()
            .filter(|(_, insn)| insn.opcode().is_return())
            .map(|(index, _)| index)
    }
}

impl fmt::Display for MethodBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}{} [locals={}]", self.name, self.desc, self.max_locals)?;
        for (index, insn) in self.instructions.iter().enumerate() {
            writeln!(f, "  {index:4}: {insn}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::opcode::Opcode;

    #[test]
    fn test_argument_types() {
        let body = MethodBody::declaration("put", "(IJLjava/lang/Object;)V", AccessFlags::PUBLIC);
        let args = body.argument_types("Foo").unwrap();
        assert_eq!(
            args,
            vec![
                JvmType::object("Foo"),
                JvmType::Int,
                JvmType::Long,
                JvmType::object("java/lang/Object")
            ]
        );

        let stat = MethodBody::declaration("run", "()V", AccessFlags::STATIC);
        assert!(stat.argument_types("Foo").unwrap().is_empty());
    }

    #[test]
    fn test_return_indices() {
        let mut body = MethodBody::declaration("f", "()I", AccessFlags::STATIC);
        body.instructions = vec![
            Instruction::Insn(Opcode::Iconst1),
            Instruction::Insn(Opcode::Ireturn),
            Instruction::Insn(Opcode::Iconst0),
            Instruction::Insn(Opcode::Ireturn),
        ];
        assert_eq!(body.return_indices().collect::<Vec<_>>(), vec![1, 3]);
        assert!(body.has_code());
    }
}
