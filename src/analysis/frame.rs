//! Abstract frames: locals, operand stack and heap at one program point.
//!
//! [`Frame::execute`] implements the stack discipline of every JVM instruction and
//! delegates the value computation to a [`ValueInterpreter`]. A frame can be *dead*:
//! it was reached only along an edge that branch folding proved infeasible. Dead frames
//! still carry well-formed types so the code behind them stays analysable, but they
//! never contribute to a live merge.

use std::fmt;

use crate::{
    analysis::{
        constant,
        domain::{AbstractValue, Lattice, PointerElement},
        heap::Heap,
        interpreter::ValueInterpreter,
    },
    bytecode::{Instruction, MethodBody, MethodDescriptor, Opcode},
    error::malformed_error,
    Result,
};

/// Statically known outcome of a branch instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JumpOutcome {
    /// The branch is always taken
    Taken,
    /// The branch always falls through
    NotTaken,
    /// Both successors are feasible
    Unknown,
}

impl JumpOutcome {
    fn from_condition(taken: Option<bool>) -> Self {
        match taken {
            Some(true) => JumpOutcome::Taken,
            Some(false) => JumpOutcome::NotTaken,
            None => JumpOutcome::Unknown,
        }
    }
}

/// The abstract state before one instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    locals: Vec<AbstractValue>,
    stack: Vec<AbstractValue>,
    heap: Heap,
    dead: bool,
}

impl Frame {
    /// Creates a frame with `max_locals` unknown locals and an empty stack.
    #[must_use]
    pub fn new(max_locals: usize, heap: Heap) -> Self {
        Frame {
            locals: vec![AbstractValue::top(); max_locals],
            stack: Vec::new(),
            heap,
            dead: false,
        }
    }

    /// The frame at the entry of `method`, with `arguments` (receiver first) bound to the
    /// leading locals. Two-slot arguments occupy two locals.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the arguments do not fit the locals.
    pub fn entry(method: &MethodBody, arguments: &[AbstractValue], heap: Heap) -> Result<Self> {
        let mut frame = Frame::new(method.max_locals, heap);
        let mut slot = 0;
        for argument in arguments {
            frame.set_local(slot, argument.clone())?;
            slot += argument.size();
        }
        Ok(frame)
    }

    /// Local variables.
    #[must_use]
    pub fn locals(&self) -> &[AbstractValue] {
        &self.locals
    }

    /// A local variable.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if `var` is out of range.
    pub fn local(&self, var: usize) -> Result<&AbstractValue> {
        self.locals
            .get(var)
            .ok_or_else(|| malformed_error!("Local {} out of range ({} locals)", var, self.locals.len()))
    }

    /// Stores a local. A two-slot value also claims the following slot, and a two-slot
    /// value overlapping `var` from below is invalidated.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if `var` (or `var + 1`) is out of range.
    pub fn set_local(&mut self, var: usize, value: AbstractValue) -> Result<()> {
        let size = value.size();
        if var + size > self.locals.len() {
            return Err(malformed_error!(
                "Store to local {} out of range ({} locals)",
                var,
                self.locals.len()
            ));
        }

        if var > 0 && self.locals[var - 1].size() == 2 {
            self.locals[var - 1] = AbstractValue::top();
        }
        self.locals[var] = value;
        if size == 2 {
            self.locals[var + 1] = AbstractValue::top();
        }
        Ok(())
    }

    /// Operand stack, bottom first.
    #[must_use]
    pub fn stack(&self) -> &[AbstractValue] {
        &self.stack
    }

    /// Number of values on the operand stack.
    #[must_use]
    pub fn stack_size(&self) -> usize {
        self.stack.len()
    }

    /// The value `depth` slots below the top of the stack; `peek(0)` is the top.
    #[must_use]
    pub fn peek(&self, depth: usize) -> Option<&AbstractValue> {
        self.stack
            .len()
            .checked_sub(depth + 1)
            .and_then(|index| self.stack.get(index))
    }

    /// Pushes a value.
    pub fn push(&mut self, value: AbstractValue) {
        self.stack.push(value);
    }

    /// Pops a value.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] on stack underflow.
    pub fn pop(&mut self) -> Result<AbstractValue> {
        self.stack
            .pop()
            .ok_or_else(|| malformed_error!("Operand stack underflow"))
    }

    /// Empties the operand stack.
    pub fn clear_stack(&mut self) {
        self.stack.clear();
    }

    /// The heap.
    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// The heap, mutably.
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Returns `true` if the frame was reached only along infeasible edges.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.dead
    }

    /// Marks the frame dead or live.
    pub fn set_dead(&mut self, dead: bool) {
        self.dead = dead;
    }

    /// Consumes the frame, returning it marked dead.
    #[must_use]
    pub fn into_dead(mut self) -> Self {
        self.dead = true;
        self
    }

    /// Decides the branch of `insn` from the values it is about to compare. Only
    /// meaningful for live frames.
    #[must_use]
    pub fn jump_outcome(&self, insn: &Instruction) -> JumpOutcome {
        let opcode = insn.opcode();
        match opcode {
            Opcode::Goto => JumpOutcome::Taken,
            Opcode::Ifnull | Opcode::Ifnonnull => {
                let Some(top) = self.peek(0) else {
                    return JumpOutcome::Unknown;
                };
                let is_null = match top.pointer {
                    PointerElement::Null => Some(true),
                    PointerElement::Cell(_) => Some(false),
                    _ => None,
                };
                JumpOutcome::from_condition(is_null.map(|null| null == (opcode == Opcode::Ifnull)))
            }
            Opcode::IfAcmpeq | Opcode::IfAcmpne => {
                let (Some(right), Some(left)) = (self.peek(0), self.peek(1)) else {
                    return JumpOutcome::Unknown;
                };
                let exact = |p: PointerElement| matches!(p, PointerElement::Null | PointerElement::Cell(_));
                if !exact(left.pointer) || !exact(right.pointer) {
                    return JumpOutcome::Unknown;
                }
                let equal = left.pointer == right.pointer;
                JumpOutcome::from_condition(Some(equal == (opcode == Opcode::IfAcmpeq)))
            }
            _ if opcode.is_conditional_jump() => {
                let operands = opcode.branch_operands();
                if self.stack.len() < operands {
                    return JumpOutcome::Unknown;
                }
                let args: Vec<_> = self.stack[self.stack.len() - operands..]
                    .iter()
                    .map(|value| value.constant.clone())
                    .collect();
                JumpOutcome::from_condition(constant::branch_operation(opcode, &args))
            }
            _ => JumpOutcome::Unknown,
        }
    }

    /// Merges `other` into this frame at a control-flow join.
    ///
    /// A dead incoming frame changes nothing. A dead frame is replaced by a live
    /// incoming one. Otherwise locals, stack and heap are merged pointwise.
    ///
    /// Returns `true` if this frame changed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the stack heights or local counts differ.
    pub fn merge(&mut self, other: &Frame) -> Result<bool> {
        if other.dead {
            return Ok(false);
        }
        if self.dead {
            *self = other.clone();
            return Ok(true);
        }
        if self.stack.len() != other.stack.len() {
            return Err(malformed_error!(
                "Incompatible stack heights {} and {}",
                self.stack.len(),
                other.stack.len()
            ));
        }
        if self.locals.len() != other.locals.len() {
            return Err(malformed_error!(
                "Incompatible local counts {} and {}",
                self.locals.len(),
                other.locals.len()
            ));
        }

        let mut changed = false;
        for (mine, theirs) in self
            .locals
            .iter_mut()
            .chain(self.stack.iter_mut())
            .zip(other.locals.iter().chain(other.stack.iter()))
        {
            let merged = mine.merge(theirs);
            if merged != *mine {
                *mine = merged;
                changed = true;
            }
        }
        changed |= self.heap.merge(&other.heap);
        Ok(changed)
    }

    /// Executes `insn` on this frame, turning it into the frame after the instruction.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] for stack or local errors, and whatever the
    /// interpreter reports.
    pub fn execute<I>(&mut self, insn: &Instruction, index: usize, interp: &mut I) -> Result<()>
    where
        I: ValueInterpreter + ?Sized,
    {
        match insn {
            Instruction::Insn(opcode) => self.execute_simple(*opcode, insn, index, interp)?,
            Instruction::Int { opcode, .. } => {
                if *opcode == Opcode::Newarray {
                    let count = self.pop()?;
                    let value = interp.unary_operation(insn, index, count, &mut self.heap)?;
                    self.push_result(insn, value)?;
                } else {
                    let value = interp.new_operation(insn, index, &mut self.heap)?;
                    self.push(value);
                }
            }
            Instruction::Var { opcode, var } => match opcode {
                Opcode::Iload | Opcode::Lload | Opcode::Fload | Opcode::Dload | Opcode::Aload => {
                    let value = self.local(*var)?.clone();
                    self.push(value);
                }
                _ => {
                    let value = self.pop()?;
                    self.set_local(*var, value)?;
                }
            },
            Instruction::Iinc { var, .. } => {
                let current = self.local(*var)?.clone();
                let value = interp.unary_operation(insn, index, current, &mut self.heap)?;
                let value = value.ok_or_else(|| malformed_error!("'{}' produced no value", insn))?;
                self.set_local(*var, value)?;
            }
            Instruction::Ldc(_) => {
                let value = interp.new_operation(insn, index, &mut self.heap)?;
                self.push(value);
            }
            Instruction::Field { opcode, .. } => match opcode {
                Opcode::Getstatic => {
                    let value = interp.new_operation(insn, index, &mut self.heap)?;
                    self.push(value);
                }
                Opcode::Putstatic => {
                    let value = self.pop()?;
                    interp.unary_operation(insn, index, value, &mut self.heap)?;
                }
                Opcode::Getfield => {
                    let object = self.pop()?;
                    let value = interp.unary_operation(insn, index, object, &mut self.heap)?;
                    self.push_result(insn, value)?;
                }
                _ => {
                    let value = self.pop()?;
                    let object = self.pop()?;
                    interp.binary_operation(insn, index, object, value, &mut self.heap)?;
                }
            },
            Instruction::Method { opcode, method } => {
                let descriptor = MethodDescriptor::parse(&method.desc)?;
                let receiver = usize::from(*opcode != Opcode::Invokestatic);
                let values = self.pop_n(descriptor.parameters.len() + receiver)?;
                let value = interp.nary_operation(insn, index, values, &mut self.heap)?;
                if descriptor.return_type.size() > 0 {
                    self.push_result(insn, value)?;
                }
            }
            Instruction::InvokeDynamic(site) => {
                let descriptor = MethodDescriptor::parse(&site.desc)?;
                let values = self.pop_n(descriptor.parameters.len())?;
                let value = interp.nary_operation(insn, index, values, &mut self.heap)?;
                if descriptor.return_type.size() > 0 {
                    self.push_result(insn, value)?;
                }
            }
            Instruction::Type { opcode, .. } => {
                if *opcode == Opcode::New {
                    let value = interp.new_operation(insn, index, &mut self.heap)?;
                    self.push(value);
                } else {
                    let operand = self.pop()?;
                    let value = interp.unary_operation(insn, index, operand, &mut self.heap)?;
                    self.push_result(insn, value)?;
                }
            }
            Instruction::Jump { opcode, .. } => match opcode.branch_operands() {
                0 => {}
                1 => {
                    let value = self.pop()?;
                    interp.unary_operation(insn, index, value, &mut self.heap)?;
                }
                _ => {
                    let value2 = self.pop()?;
                    let value1 = self.pop()?;
                    interp.binary_operation(insn, index, value1, value2, &mut self.heap)?;
                }
            },
            Instruction::TableSwitch { .. } | Instruction::LookupSwitch { .. } => {
                let key = self.pop()?;
                interp.unary_operation(insn, index, key, &mut self.heap)?;
            }
            Instruction::MultiANewArray { dimensions, .. } => {
                let values = self.pop_n(usize::from(*dimensions))?;
                let value = interp.nary_operation(insn, index, values, &mut self.heap)?;
                self.push_result(insn, value)?;
            }
        }
        Ok(())
    }

    fn execute_simple<I>(
        &mut self,
        opcode: Opcode,
        insn: &Instruction,
        index: usize,
        interp: &mut I,
    ) -> Result<()>
    where
        I: ValueInterpreter + ?Sized,
    {
        match opcode {
            Opcode::Nop | Opcode::Return => {}
            Opcode::AconstNull
            | Opcode::IconstM1
            | Opcode::Iconst0
            | Opcode::Iconst1
            | Opcode::Iconst2
            | Opcode::Iconst3
            | Opcode::Iconst4
            | Opcode::Iconst5
            | Opcode::Lconst0
            | Opcode::Lconst1
            | Opcode::Fconst0
            | Opcode::Fconst1
            | Opcode::Fconst2
            | Opcode::Dconst0
            | Opcode::Dconst1 => {
                let value = interp.new_operation(insn, index, &mut self.heap)?;
                self.push(value);
            }
            Opcode::Iastore
            | Opcode::Lastore
            | Opcode::Fastore
            | Opcode::Dastore
            | Opcode::Aastore
            | Opcode::Bastore
            | Opcode::Castore
            | Opcode::Sastore => {
                let value3 = self.pop()?;
                let value2 = self.pop()?;
                let value1 = self.pop()?;
                interp.ternary_operation(insn, index, [value1, value2, value3], &mut self.heap)?;
            }
            Opcode::Pop => {
                self.pop()?;
            }
            Opcode::Pop2 => {
                if self.pop()?.size() == 1 {
                    self.pop()?;
                }
            }
            Opcode::Dup => {
                let value = self.pop()?;
                self.push(value.clone());
                self.push(value);
            }
            Opcode::DupX1 => {
                let value1 = self.pop()?;
                let value2 = self.pop()?;
                self.push_all([value1.clone(), value2, value1]);
            }
            Opcode::DupX2 => {
                let value1 = self.pop()?;
                let value2 = self.pop()?;
                if value2.size() == 1 {
                    let value3 = self.pop()?;
                    self.push_all([value1.clone(), value3, value2, value1]);
                } else {
                    self.push_all([value1.clone(), value2, value1]);
                }
            }
            Opcode::Dup2 => {
                let value1 = self.pop()?;
                if value1.size() == 1 {
                    let value2 = self.pop()?;
                    self.push_all([value2.clone(), value1.clone(), value2, value1]);
                } else {
                    self.push_all([value1.clone(), value1]);
                }
            }
            Opcode::Dup2X1 => {
                let value1 = self.pop()?;
                let value2 = self.pop()?;
                if value1.size() == 1 {
                    let value3 = self.pop()?;
                    self.push_all([value2.clone(), value1.clone(), value3, value2, value1]);
                } else {
                    self.push_all([value1.clone(), value2, value1]);
                }
            }
            Opcode::Dup2X2 => {
                let value1 = self.pop()?;
                let value2 = self.pop()?;
                if value1.size() == 1 {
                    let value3 = self.pop()?;
                    if value3.size() == 1 {
                        let value4 = self.pop()?;
                        self.push_all([value2.clone(), value1.clone(), value4, value3, value2, value1]);
                    } else {
                        self.push_all([value2.clone(), value1.clone(), value3, value2, value1]);
                    }
                } else if value2.size() == 1 {
                    let value3 = self.pop()?;
                    self.push_all([value1.clone(), value3, value2, value1]);
                } else {
                    self.push_all([value1.clone(), value2, value1]);
                }
            }
            Opcode::Swap => {
                let value1 = self.pop()?;
                let value2 = self.pop()?;
                self.push_all([value1, value2]);
            }
            Opcode::Ireturn
            | Opcode::Lreturn
            | Opcode::Freturn
            | Opcode::Dreturn
            | Opcode::Areturn
            | Opcode::Athrow
            | Opcode::Monitorenter
            | Opcode::Monitorexit => {
                let value = self.pop()?;
                interp.unary_operation(insn, index, value, &mut self.heap)?;
            }
            Opcode::Ineg
            | Opcode::Lneg
            | Opcode::Fneg
            | Opcode::Dneg
            | Opcode::I2l
            | Opcode::I2f
            | Opcode::I2d
            | Opcode::L2i
            | Opcode::L2f
            | Opcode::L2d
            | Opcode::F2i
            | Opcode::F2l
            | Opcode::F2d
            | Opcode::D2i
            | Opcode::D2l
            | Opcode::D2f
            | Opcode::I2b
            | Opcode::I2c
            | Opcode::I2s
            | Opcode::Arraylength => {
                let value = self.pop()?;
                let result = interp.unary_operation(insn, index, value, &mut self.heap)?;
                self.push_result(insn, result)?;
            }
            _ => {
                let value2 = self.pop()?;
                let value1 = self.pop()?;
                let result = interp.binary_operation(insn, index, value1, value2, &mut self.heap)?;
                self.push_result(insn, result)?;
            }
        }
        Ok(())
    }

    fn push_all<const N: usize>(&mut self, values: [AbstractValue; N]) {
        self.stack.extend(values);
    }

    fn push_result(&mut self, insn: &Instruction, value: Option<AbstractValue>) -> Result<()> {
        let value = value.ok_or_else(|| malformed_error!("'{}' produced no value", insn))?;
        self.push(value);
        Ok(())
    }

    fn pop_n(&mut self, count: usize) -> Result<Vec<AbstractValue>> {
        if count > self.stack.len() {
            return Err(malformed_error!(
                "Operand stack underflow: need {} values, have {}",
                count,
                self.stack.len()
            ));
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dead {
            write!(f, "dead ")?;
        }
        write!(f, "locals [")?;
        for (i, local) in self.locals.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{local}")?;
        }
        write!(f, "] stack [")?;
        for (i, value) in self.stack.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{
            domain::{FlatElement, Number},
            interpreter::TypeInterpreter,
        },
        bytecode::{AccessFlags, JvmType},
    };

    fn int(value: i32) -> AbstractValue {
        AbstractValue::constant(Number::Int(value))
    }

    #[test]
    fn test_entry_pads_wide_arguments() -> Result<()> {
        let method = MethodBody {
            max_locals: 4,
            ..MethodBody::declaration("f", "(JI)V", AccessFlags::STATIC)
        };
        let frame = Frame::entry(
            &method,
            &[AbstractValue::unknown(JvmType::Long), int(7)],
            Heap::new(),
        )?;
        assert_eq!(*frame.local(0)?.ty.ty(), JvmType::Long);
        assert_eq!(*frame.local(1)?, AbstractValue::top());
        assert_eq!(*frame.local(2)?, int(7));
        Ok(())
    }

    #[test]
    fn test_store_over_wide_local() -> Result<()> {
        let mut frame = Frame::new(3, Heap::new());
        frame.set_local(0, AbstractValue::unknown(JvmType::Double))?;
        frame.set_local(1, int(1))?;
        assert_eq!(*frame.local(0)?, AbstractValue::top());
        assert!(frame.set_local(2, AbstractValue::unknown(JvmType::Long)).is_err());
        Ok(())
    }

    #[test]
    fn test_stack_shuffles() -> Result<()> {
        let mut frame = Frame::new(0, Heap::new());
        let mut interp = TypeInterpreter;
        frame.push(int(1));
        frame.push(int(2));
        frame.execute(&Instruction::Insn(Opcode::DupX1), 0, &mut interp)?;
        assert_eq!(frame.stack(), &[int(2), int(1), int(2)]);

        frame.execute(&Instruction::Insn(Opcode::Swap), 1, &mut interp)?;
        assert_eq!(frame.stack(), &[int(2), int(2), int(1)]);

        frame.execute(&Instruction::Insn(Opcode::Pop2), 2, &mut interp)?;
        assert_eq!(frame.stack(), &[int(2)]);

        frame.push(AbstractValue::unknown(JvmType::Long));
        frame.execute(&Instruction::Insn(Opcode::Dup2), 3, &mut interp)?;
        assert_eq!(frame.stack_size(), 3);
        frame.execute(&Instruction::Insn(Opcode::Pop2), 4, &mut interp)?;
        frame.execute(&Instruction::Insn(Opcode::Pop2), 5, &mut interp)?;
        assert_eq!(frame.stack(), &[int(2)]);
        frame.execute(&Instruction::Insn(Opcode::Pop), 6, &mut interp)?;
        assert!(frame.execute(&Instruction::Insn(Opcode::Pop), 7, &mut interp).is_err());
        Ok(())
    }

    #[test]
    fn test_iinc_folds() -> Result<()> {
        let mut frame = Frame::new(1, Heap::new());
        frame.set_local(0, int(40))?;
        frame.execute(&Instruction::Iinc { var: 0, increment: 2 }, 0, &mut TypeInterpreter)?;
        assert_eq!(frame.local(0)?.constant, FlatElement::Value(Number::Int(42)));
        Ok(())
    }

    #[test]
    fn test_jump_outcomes() {
        let mut frame = Frame::new(0, Heap::new());
        let jump = |opcode| Instruction::Jump { opcode, target: 0 };

        frame.push(AbstractValue::null(JvmType::object("demo/A")));
        assert_eq!(frame.jump_outcome(&jump(Opcode::Ifnull)), JumpOutcome::Taken);
        assert_eq!(frame.jump_outcome(&jump(Opcode::Ifnonnull)), JumpOutcome::NotTaken);

        frame.push(AbstractValue::cell(JvmType::object("demo/A"), 3));
        assert_eq!(frame.jump_outcome(&jump(Opcode::Ifnull)), JumpOutcome::NotTaken);
        assert_eq!(frame.jump_outcome(&jump(Opcode::IfAcmpeq)), JumpOutcome::NotTaken);
        assert_eq!(frame.jump_outcome(&jump(Opcode::IfAcmpne)), JumpOutcome::Taken);

        frame.clear_stack();
        frame.push(AbstractValue::untracked(JvmType::object("demo/A"), false));
        assert_eq!(frame.jump_outcome(&jump(Opcode::Ifnull)), JumpOutcome::Unknown);

        frame.clear_stack();
        frame.push(int(3));
        frame.push(int(3));
        assert_eq!(frame.jump_outcome(&jump(Opcode::IfIcmpeq)), JumpOutcome::Taken);
        assert_eq!(frame.jump_outcome(&jump(Opcode::Goto)), JumpOutcome::Taken);
    }

    #[test]
    fn test_merge_rules() -> Result<()> {
        let mut live = Frame::new(1, Heap::new());
        live.set_local(0, int(1))?;
        let mut other = Frame::new(1, Heap::new());
        other.set_local(0, int(2))?;

        let dead = other.clone().into_dead();
        assert!(!live.merge(&dead)?);
        assert_eq!(*live.local(0)?, int(1));

        assert!(live.merge(&other)?);
        assert!(live.local(0)?.constant.is_top());
        assert!(!live.merge(&other)?);

        let mut revived = Frame::new(1, Heap::new()).into_dead();
        assert!(revived.merge(&other)?);
        assert!(!revived.is_dead());

        let mut taller = Frame::new(1, Heap::new());
        taller.push(int(0));
        assert!(live.merge(&taller).is_err());
        Ok(())
    }
}
