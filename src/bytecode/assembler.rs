//! Symbolic method assembler.
//!
//! [`MethodAssembler`] builds [`MethodBody`] values instruction by instruction with named
//! labels for branch targets. Label references are recorded as fixups and resolved when
//! the body is finalized, so forward and backward branches are written the same way.
//!
//! # Examples
//!
//! ```rust
//! use fusescope::bytecode::{AccessFlags, MethodAssembler, Opcode};
//!
//! // static int abs(int x) { return x < 0 ? -x : x; }
//! let mut asm = MethodAssembler::new("abs", "(I)I", AccessFlags::STATIC);
//! asm.load(Opcode::Iload, 0)?
//!     .jump(Opcode::Ifge, "positive")?
//!     .load(Opcode::Iload, 0)?
//!     .insn(Opcode::Ineg)?
//!     .insn(Opcode::Ireturn)?
//!     .label("positive")?
//!     .load(Opcode::Iload, 0)?
//!     .insn(Opcode::Ireturn)?;
//! let body = asm.finalize()?;
//! assert_eq!(body.instructions.len(), 7);
//! assert_eq!(body.max_locals, 1);
//! # Ok::<(), fusescope::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    bytecode::{
        access::AccessFlags,
        instruction::{Constant, FieldRef, Instruction, InvokeDynamic, MethodRef, TryCatchBlock},
        method::MethodBody,
        opcode::Opcode,
        types::MethodDescriptor,
    },
    error::malformed_error,
    Result,
};

/// Which operand of an instruction a pending label fills in.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Target,
    Default,
    Case(usize),
}

/// Unresolved label reference.
#[derive(Debug, Clone)]
struct LabelFixup {
    instruction: usize,
    slot: Slot,
    label: String,
}

/// Unresolved exception handler.
#[derive(Debug, Clone)]
struct HandlerFixup {
    start: String,
    end: String,
    handler: String,
    catch_type: Option<String>,
}

/// Builder for [`MethodBody`] values.
///
/// Every emitting method returns `Result<&mut Self>` so sequences can be chained with `?`.
/// `max_locals` is computed from the descriptor and the highest local slot touched.
pub struct MethodAssembler {
    name: String,
    desc: String,
    access: AccessFlags,
    instructions: Vec<Instruction>,
    labels: HashMap<String, usize>,
    fixups: Vec<LabelFixup>,
    handlers: Vec<HandlerFixup>,
    max_local: usize,
}

impl MethodAssembler {
    /// Creates an assembler for a method with the given signature.
    #[must_use]
    pub fn new(name: impl Into<String>, desc: impl Into<String>, access: AccessFlags) -> Self {
        MethodAssembler {
            name: name.into(),
            desc: desc.into(),
            access,
            instructions: Vec::new(),
            labels: HashMap::new(),
            fixups: Vec::new(),
            handlers: Vec::new(),
            max_local: 0,
        }
    }

    /// Index the next emitted instruction will have.
    #[must_use]
    pub fn position(&self) -> usize {
        self.instructions.len()
    }

    /// Appends an already-built instruction. Branch targets are taken as-is.
    ///
    /// # Errors
    ///
    /// This method does not currently fail; it returns `Result` for chaining.
    pub fn emit(&mut self, instruction: Instruction) -> Result<&mut Self> {
        match &instruction {
            Instruction::Var { opcode, var } => self.touch_local(*opcode, *var),
            Instruction::Iinc { var, .. } => self.touch_local(Opcode::Iload, *var),
            _ => {}
        }
        self.instructions.push(instruction);
        Ok(self)
    }

    /// Emits an instruction without operands.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the opcode requires an operand.
    pub fn insn(&mut self, opcode: Opcode) -> Result<&mut Self> {
        if opcode.is_invoke()
            || opcode.is_conditional_jump()
            || matches!(
                opcode,
                Opcode::Bipush
                    | Opcode::Sipush
                    | Opcode::Newarray
                    | Opcode::Ldc
                    | Opcode::Iload
                    | Opcode::Lload
                    | Opcode::Fload
                    | Opcode::Dload
                    | Opcode::Aload
                    | Opcode::Istore
                    | Opcode::Lstore
                    | Opcode::Fstore
                    | Opcode::Dstore
                    | Opcode::Astore
                    | Opcode::Iinc
                    | Opcode::Getstatic
                    | Opcode::Putstatic
                    | Opcode::Getfield
                    | Opcode::Putfield
                    | Opcode::Invokedynamic
                    | Opcode::New
                    | Opcode::Anewarray
                    | Opcode::Checkcast
                    | Opcode::Instanceof
                    | Opcode::Goto
                    | Opcode::Tableswitch
                    | Opcode::Lookupswitch
                    | Opcode::Multianewarray
            )
        {
            return Err(malformed_error!("Opcode {} requires an operand", opcode));
        }
        self.emit(Instruction::Insn(opcode))
    }

    /// Pushes an `int` constant using the shortest encoding.
    ///
    /// # Errors
    ///
    /// This method does not currently fail; it returns `Result` for chaining.
    pub fn iconst(&mut self, value: i32) -> Result<&mut Self> {
        let instruction = match value {
            -1 => Instruction::Insn(Opcode::IconstM1),
            0 => Instruction::Insn(Opcode::Iconst0),
            1 => Instruction::Insn(Opcode::Iconst1),
            2 => Instruction::Insn(Opcode::Iconst2),
            3 => Instruction::Insn(Opcode::Iconst3),
            4 => Instruction::Insn(Opcode::Iconst4),
            5 => Instruction::Insn(Opcode::Iconst5),
            v if i8::try_from(v).is_ok() => Instruction::Int {
                opcode: Opcode::Bipush,
                operand: v,
            },
            v if i16::try_from(v).is_ok() => Instruction::Int {
                opcode: Opcode::Sipush,
                operand: v,
            },
            v => Instruction::Ldc(Constant::Int(v)),
        };
        self.emit(instruction)
    }

    /// Emits `bipush`, `sipush` or `newarray`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] for other opcodes.
    pub fn int(&mut self, opcode: Opcode, operand: i32) -> Result<&mut Self> {
        if !matches!(opcode, Opcode::Bipush | Opcode::Sipush | Opcode::Newarray) {
            return Err(malformed_error!("Opcode {} takes no immediate", opcode));
        }
        self.emit(Instruction::Int { opcode, operand })
    }

    /// Emits a local variable load.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if `opcode` is not a load.
    pub fn load(&mut self, opcode: Opcode, var: usize) -> Result<&mut Self> {
        if !matches!(
            opcode,
            Opcode::Iload | Opcode::Lload | Opcode::Fload | Opcode::Dload | Opcode::Aload
        ) {
            return Err(malformed_error!("Opcode {} is not a local load", opcode));
        }
        self.emit(Instruction::Var { opcode, var })
    }

    /// Emits a local variable store.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if `opcode` is not a store.
    pub fn store(&mut self, opcode: Opcode, var: usize) -> Result<&mut Self> {
        if !matches!(
            opcode,
            Opcode::Istore | Opcode::Lstore | Opcode::Fstore | Opcode::Dstore | Opcode::Astore
        ) {
            return Err(malformed_error!("Opcode {} is not a local store", opcode));
        }
        self.emit(Instruction::Var { opcode, var })
    }

    /// Emits `iinc`.
    ///
    /// # Errors
    ///
    /// This method does not currently fail; it returns `Result` for chaining.
    pub fn iinc(&mut self, var: usize, increment: i32) -> Result<&mut Self> {
        self.emit(Instruction::Iinc { var, increment })
    }

    /// Emits `ldc`.
    ///
    /// # Errors
    ///
    /// This method does not currently fail; it returns `Result` for chaining.
    pub fn ldc(&mut self, constant: Constant) -> Result<&mut Self> {
        self.emit(Instruction::Ldc(constant))
    }

    /// Emits a field access.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if `opcode` is not a field instruction.
    pub fn field(
        &mut self,
        opcode: Opcode,
        owner: &str,
        name: &str,
        desc: &str,
    ) -> Result<&mut Self> {
        if !matches!(
            opcode,
            Opcode::Getfield | Opcode::Putfield | Opcode::Getstatic | Opcode::Putstatic
        ) {
            return Err(malformed_error!("Opcode {} is not a field access", opcode));
        }
        self.emit(Instruction::Field {
            opcode,
            field: FieldRef::new(owner, name, desc),
        })
    }

    /// Emits a method invocation. `invokeinterface` marks the reference as an interface
    /// method.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if `opcode` is not an invoke instruction.
    pub fn invoke(
        &mut self,
        opcode: Opcode,
        owner: &str,
        name: &str,
        desc: &str,
    ) -> Result<&mut Self> {
        if !opcode.is_invoke() {
            return Err(malformed_error!("Opcode {} is not an invocation", opcode));
        }
        let method = if opcode == Opcode::Invokeinterface {
            MethodRef::interface(owner, name, desc)
        } else {
            MethodRef::new(owner, name, desc)
        };
        self.emit(Instruction::Method { opcode, method })
    }

    /// Emits `invokedynamic`.
    ///
    /// # Errors
    ///
    /// This method does not currently fail; it returns `Result` for chaining.
    pub fn invoke_dynamic(&mut self, site: InvokeDynamic) -> Result<&mut Self> {
        self.emit(Instruction::InvokeDynamic(site))
    }

    /// Emits `new`, `anewarray`, `checkcast` or `instanceof`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] for other opcodes.
    pub fn type_insn(&mut self, opcode: Opcode, class: &str) -> Result<&mut Self> {
        if !matches!(
            opcode,
            Opcode::New | Opcode::Anewarray | Opcode::Checkcast | Opcode::Instanceof
        ) {
            return Err(malformed_error!("Opcode {} takes no type operand", opcode));
        }
        self.emit(Instruction::Type {
            opcode,
            class: class.to_string(),
        })
    }

    /// Emits a jump to a (possibly not yet defined) label.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if `opcode` is not a jump.
    pub fn jump(&mut self, opcode: Opcode, label: &str) -> Result<&mut Self> {
        if opcode != Opcode::Goto && !opcode.is_conditional_jump() {
            return Err(malformed_error!("Opcode {} is not a jump", opcode));
        }
        self.fixups.push(LabelFixup {
            instruction: self.instructions.len(),
            slot: Slot::Target,
            label: label.to_string(),
        });
        self.emit(Instruction::Jump { opcode, target: 0 })
    }

    /// Emits `tableswitch` over `low..=low + labels.len() - 1`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the key range overflows.
    pub fn table_switch(&mut self, low: i32, default: &str, labels: &[&str]) -> Result<&mut Self> {
        let span = i32::try_from(labels.len())
            .map_err(|_| malformed_error!("Too many tableswitch cases"))?;
        let high = low
            .checked_add(span - 1)
            .ok_or_else(|| malformed_error!("tableswitch range overflows"))?;
        self.push_switch_fixups(default, labels);
        self.emit(Instruction::TableSwitch {
            low,
            high,
            default: 0,
            targets: vec![0; labels.len()],
        })
    }

    /// Emits `lookupswitch`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if keys and labels differ in length.
    pub fn lookup_switch(
        &mut self,
        default: &str,
        keys: &[i32],
        labels: &[&str],
    ) -> Result<&mut Self> {
        if keys.len() != labels.len() {
            return Err(malformed_error!(
                "lookupswitch has {} keys but {} labels",
                keys.len(),
                labels.len()
            ));
        }
        self.push_switch_fixups(default, labels);
        self.emit(Instruction::LookupSwitch {
            default: 0,
            keys: keys.to_vec(),
            targets: vec![0; labels.len()],
        })
    }

    /// Binds a label to the next instruction.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the label is already bound.
    pub fn label(&mut self, name: &str) -> Result<&mut Self> {
        if self.labels.contains_key(name) {
            return Err(malformed_error!("Duplicate label '{}'", name));
        }
        self.labels.insert(name.to_string(), self.instructions.len());
        Ok(self)
    }

    /// Registers an exception handler over `start..end`.
    ///
    /// # Errors
    ///
    /// This method does not currently fail; labels are checked by [`Self::finalize`].
    pub fn try_catch(
        &mut self,
        start: &str,
        end: &str,
        handler: &str,
        catch_type: Option<&str>,
    ) -> Result<&mut Self> {
        self.handlers.push(HandlerFixup {
            start: start.to_string(),
            end: end.to_string(),
            handler: handler.to_string(),
            catch_type: catch_type.map(str::to_string),
        });
        Ok(self)
    }

    /// Resolves labels and produces the method body.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if a referenced label was never bound or the
    /// descriptor is invalid.
    pub fn finalize(mut self) -> Result<MethodBody> {
        let fixups = std::mem::take(&mut self.fixups);
        for fixup in &fixups {
            let target = self.resolve(&fixup.label)?;
            match (&mut self.instructions[fixup.instruction], fixup.slot) {
                (Instruction::Jump { target: slot, .. }, Slot::Target)
                | (Instruction::TableSwitch { default: slot, .. }, Slot::Default)
                | (Instruction::LookupSwitch { default: slot, .. }, Slot::Default) => {
                    *slot = target;
                }
                (Instruction::TableSwitch { targets, .. }, Slot::Case(i))
                | (Instruction::LookupSwitch { targets, .. }, Slot::Case(i)) => {
                    targets[i] = target;
                }
                (other, _) => {
                    return Err(malformed_error!("Label fixup on non-branch '{}'", other));
                }
            }
        }

        let mut try_catch = Vec::with_capacity(self.handlers.len());
        for handler in &self.handlers {
            try_catch.push(TryCatchBlock {
                start: self.resolve(&handler.start)?,
                end: self.resolve(&handler.end)?,
                handler: self.resolve(&handler.handler)?,
                catch_type: handler.catch_type.clone(),
            });
        }

        let descriptor = MethodDescriptor::parse(&self.desc)?;
        let receiver = usize::from(!self.access.is_static());
        let max_locals = self
            .max_local
            .max(receiver + descriptor.parameter_slots());

        Ok(MethodBody {
            name: self.name,
            desc: self.desc,
            access: self.access,
            max_locals,
            instructions: self.instructions,
            try_catch,
        })
    }

    fn resolve(&self, label: &str) -> Result<usize> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| malformed_error!("Undefined label '{}'", label))
    }

    fn push_switch_fixups(&mut self, default: &str, labels: &[&str]) {
        let instruction = self.instructions.len();
        self.fixups.push(LabelFixup {
            instruction,
            slot: Slot::Default,
            label: default.to_string(),
        });
        for (i, label) in labels.iter().enumerate() {
            self.fixups.push(LabelFixup {
                instruction,
                slot: Slot::Case(i),
                label: (*label).to_string(),
            });
        }
    }

    fn touch_local(&mut self, opcode: Opcode, var: usize) {
        let width = match opcode {
            Opcode::Lload | Opcode::Dload | Opcode::Lstore | Opcode::Dstore => 2,
            _ => 1,
        };
        self.max_local = self.max_local.max(var + width);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_and_backward_labels() {
        let mut asm = MethodAssembler::new("loop", "(I)V", AccessFlags::STATIC);
        asm.label("head")
            .unwrap()
            .load(Opcode::Iload, 0)
            .unwrap()
            .jump(Opcode::Ifeq, "exit")
            .unwrap()
            .iinc(0, -1)
            .unwrap()
            .jump(Opcode::Goto, "head")
            .unwrap()
            .label("exit")
            .unwrap()
            .insn(Opcode::Return)
            .unwrap();
        let body = asm.finalize().unwrap();

        assert_eq!(
            body.instructions[1],
            Instruction::Jump {
                opcode: Opcode::Ifeq,
                target: 4
            }
        );
        assert_eq!(
            body.instructions[3],
            Instruction::Jump {
                opcode: Opcode::Goto,
                target: 0
            }
        );
    }

    #[test]
    fn test_undefined_label_fails() {
        let mut asm = MethodAssembler::new("f", "()V", AccessFlags::STATIC);
        asm.jump(Opcode::Goto, "nowhere").unwrap();
        assert!(asm.finalize().is_err());
    }

    #[test]
    fn test_duplicate_label_fails() {
        let mut asm = MethodAssembler::new("f", "()V", AccessFlags::STATIC);
        asm.label("a").unwrap();
        assert!(asm.label("a").is_err());
    }

    #[test]
    fn test_operand_validation() {
        let mut asm = MethodAssembler::new("f", "()V", AccessFlags::STATIC);
        assert!(asm.insn(Opcode::Getfield).is_err());
        assert!(asm.load(Opcode::Istore, 0).is_err());
        assert!(asm.invoke(Opcode::Getfield, "A", "b", "()V").is_err());
    }

    #[test]
    fn test_max_locals_and_switch() {
        let mut asm = MethodAssembler::new("pick", "(J)I", AccessFlags::STATIC);
        asm.iconst(1)
            .unwrap()
            .table_switch(0, "other", &["zero", "one"])
            .unwrap()
            .label("zero")
            .unwrap()
            .label("one")
            .unwrap()
            .label("other")
            .unwrap()
            .iconst(1000)
            .unwrap()
            .store(Opcode::Dstore, 3)
            .unwrap()
            .iconst(0)
            .unwrap()
            .insn(Opcode::Ireturn)
            .unwrap();
        let body = asm.finalize().unwrap();

        assert_eq!(body.max_locals, 5);
        assert_eq!(
            body.instructions[2],
            Instruction::Int {
                opcode: Opcode::Sipush,
                operand: 1000
            }
        );
        match &body.instructions[1] {
            Instruction::TableSwitch {
                low,
                high,
                default,
                targets,
            } => {
                assert_eq!((*low, *high, *default), (0, 1, 2));
                assert_eq!(targets, &vec![2, 2]);
            }
            other => panic!("unexpected {other}"),
        }
    }
}
