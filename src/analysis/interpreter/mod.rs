//! Value-level transfer functions.
//!
//! [`crate::analysis::Frame::execute`] does the operand-stack and local-variable
//! bookkeeping of every instruction and hands the values an instruction consumes to a
//! [`ValueInterpreter`], grouped by how many operands it pops. The interpreter computes
//! the produced value and may update the frame's heap, which it receives explicitly.
//!
//! - [`TypeInterpreter`] - Types and constants only, never touches the heap
//! - [`HeapInterpreter`] - Full pointer, heap and call semantics for one context

mod heap;
mod types;

pub(crate) use heap::default_value;
pub use heap::HeapInterpreter;
pub use types::TypeInterpreter;

use crate::{
    analysis::{domain::AbstractValue, frame::Frame, heap::Heap},
    bytecode::Instruction,
    Result,
};

/// Transfer functions for abstract values.
///
/// Operations that produce no stack value (conditional jumps, returns, stores) return
/// `Ok(None)`; [`Frame::execute`] checks the arity.
pub trait ValueInterpreter {
    /// Instructions that push a value without popping any.
    ///
    /// # Errors
    ///
    /// Returns an error if the instruction cannot be interpreted.
    fn new_operation(
        &mut self,
        insn: &Instruction,
        index: usize,
        heap: &mut Heap,
    ) -> Result<AbstractValue>;

    /// Instructions that pop one value.
    ///
    /// # Errors
    ///
    /// Returns an error if the instruction cannot be interpreted.
    fn unary_operation(
        &mut self,
        insn: &Instruction,
        index: usize,
        value: AbstractValue,
        heap: &mut Heap,
    ) -> Result<Option<AbstractValue>>;

    /// Instructions that pop two values. `value1` was below `value2` on the stack.
    ///
    /// # Errors
    ///
    /// Returns an error if the instruction cannot be interpreted.
    fn binary_operation(
        &mut self,
        insn: &Instruction,
        index: usize,
        value1: AbstractValue,
        value2: AbstractValue,
        heap: &mut Heap,
    ) -> Result<Option<AbstractValue>>;

    /// Array stores.
    ///
    /// # Errors
    ///
    /// Returns an error if the instruction cannot be interpreted.
    fn ternary_operation(
        &mut self,
        insn: &Instruction,
        index: usize,
        values: [AbstractValue; 3],
        heap: &mut Heap,
    ) -> Result<()>;

    /// Invocations and `multianewarray`. `values` is in stack order, receiver first.
    ///
    /// # Errors
    ///
    /// Returns an error if the instruction cannot be interpreted.
    fn nary_operation(
        &mut self,
        insn: &Instruction,
        index: usize,
        values: Vec<AbstractValue>,
        heap: &mut Heap,
    ) -> Result<Option<AbstractValue>>;

    /// Runs after a live frame executed `insn`, with the resulting frame.
    ///
    /// # Errors
    ///
    /// Returns an error if post-processing fails.
    fn after_execute(&mut self, _insn: &Instruction, _index: usize, _frame: &mut Frame) -> Result<()> {
        Ok(())
    }
}
