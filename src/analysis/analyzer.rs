//! Worklist fixpoint over the instructions of one method.
//!
//! [`MethodAnalyzer`] computes the frame before every instruction of a method body,
//! starting from an entry frame and iterating until no frame changes. It owns the
//! branch sensitivity of the analysis:
//!
//! 1. Before a live frame executes a conditional branch, [`Frame::jump_outcome`]
//!    decides whether the branch is statically taken or not taken
//! 2. The successor along the infeasible edge receives a *dead* copy of the frame
//! 3. Dead frames never change a live frame when merged and are replaced by the first
//!    live frame that reaches the same instruction
//! 4. Dead frames execute with [`TypeInterpreter`], so they never touch the heap or
//!    record calls
//!
//! Exception handlers are entered with the frame from before the throwing
//! instruction, its stack replaced by the caught exception.
//!
//! # Complexity
//!
//! Each instruction is revisited only when its input frame grows. The lattices have
//! finite height once call strings are bounded, so the loop terminates.

use std::collections::VecDeque;

use crate::{
    analysis::{
        context::Frames,
        domain::AbstractValue,
        frame::{Frame, JumpOutcome},
        interpreter::{TypeInterpreter, ValueInterpreter},
    },
    bytecode::{ControlFlowGraph, EdgeKind, JvmType, MethodBody},
    error::malformed_error,
    Result,
};

const THROWABLE: &str = "java/lang/Throwable";

/// Computes the frames of one method body.
pub struct MethodAnalyzer<'b> {
    /// The analysed body.
    body: &'b MethodBody,
    /// Instruction-level control flow.
    cfg: ControlFlowGraph,
    /// Frame before each instruction, `None` until first reached.
    frames: Frames,
    /// Instructions whose input frame changed.
    worklist: VecDeque<usize>,
    /// Whether each instruction is currently in the worklist.
    in_worklist: Vec<bool>,
    /// Number of instructions interpreted.
    iterations: usize,
}

impl<'b> MethodAnalyzer<'b> {
    /// Prepares the analysis of `body`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the body has no code or its control flow
    /// leaves the instruction range.
    pub fn new(body: &'b MethodBody) -> Result<Self> {
        if !body.has_code() {
            return Err(malformed_error!("{}{} has no code to analyse", body.name, body.desc));
        }
        let cfg = ControlFlowGraph::build(body)?;
        let count = body.instructions.len();
        Ok(MethodAnalyzer {
            body,
            cfg,
            frames: vec![None; count],
            worklist: VecDeque::new(),
            in_worklist: vec![false; count],
            iterations: 0,
        })
    }

    /// Runs the fixpoint from `entry`, interpreting live frames with `interp`.
    ///
    /// # Errors
    ///
    /// Propagates interpreter failures and reports incompatible frames at joins as
    /// [`crate::Error::Malformed`].
    pub fn analyze<I>(&mut self, entry: Frame, interp: &mut I) -> Result<()>
    where
        I: ValueInterpreter + ?Sized,
    {
        self.merge_into(0, entry)?;

        while let Some(index) = self.worklist.pop_front() {
            self.in_worklist[index] = false;
            self.iterations += 1;

            let insn = &self.body.instructions[index];
            let before = self.frames[index]
                .clone()
                .ok_or_else(|| malformed_error!("Instruction {} queued without a frame", index))?;

            let mut after = before.clone();
            let outcome = if before.is_dead() {
                after.execute(insn, index, &mut TypeInterpreter)?;
                JumpOutcome::Unknown
            } else {
                let outcome = before.jump_outcome(insn);
                after.execute(insn, index, interp)?;
                interp.after_execute(insn, index, &mut after)?;
                outcome
            };

            let successors: Vec<(usize, EdgeKind)> = self.cfg.successors(index).collect();
            for (target, kind) in successors {
                let incoming = match (kind, outcome) {
                    (EdgeKind::FallThrough, JumpOutcome::Taken)
                    | (EdgeKind::Branch, JumpOutcome::NotTaken) => after.clone().into_dead(),
                    (EdgeKind::FallThrough | EdgeKind::Branch, _) => after.clone(),
                    (EdgeKind::Exception, _) => self.handler_frame(&before, index, target)?,
                };
                self.merge_into(target, incoming)?;
            }
        }

        Ok(())
    }

    /// The frame an exception handler is entered with from instruction `index`.
    fn handler_frame(&self, before: &Frame, index: usize, handler: usize) -> Result<Frame> {
        let caught = self
            .body
            .try_catch
            .iter()
            .find(|block| block.handler == handler && block.covers(index))
            .and_then(|block| block.catch_type.as_deref())
            .unwrap_or(THROWABLE);

        let mut frame = before.clone();
        frame.clear_stack();
        frame.push(AbstractValue::untracked(JvmType::from_internal_name(caught)?, false));
        Ok(frame)
    }

    fn merge_into(&mut self, target: usize, incoming: Frame) -> Result<()> {
        let changed = match &mut self.frames[target] {
            Some(existing) => existing.merge(&incoming)?,
            slot @ None => {
                *slot = Some(incoming);
                true
            }
        };
        if changed && !self.in_worklist[target] {
            self.in_worklist[target] = true;
            self.worklist.push_back(target);
        }
        Ok(())
    }

    /// Number of instructions interpreted so far.
    #[must_use]
    pub const fn iterations(&self) -> usize {
        self.iterations
    }

    /// Frames computed so far.
    #[must_use]
    pub fn frames(&self) -> &Frames {
        &self.frames
    }

    /// Consumes the analyzer, returning the frames.
    #[must_use]
    pub fn into_frames(self) -> Frames {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{domain::PointerElement, heap::Heap},
        bytecode::{AccessFlags, MethodAssembler, Opcode},
    };

    fn analyze(body: &MethodBody, arguments: &[AbstractValue]) -> Result<Frames> {
        let entry = Frame::entry(body, arguments, Heap::new())?;
        let mut analyzer = MethodAnalyzer::new(body)?;
        analyzer.analyze(entry, &mut TypeInterpreter)?;
        Ok(analyzer.into_frames())
    }

    #[test]
    fn test_constant_branch_kills_edge() -> Result<()> {
        // if (1 == 0) x = 5 else x = 7; return x
        let mut asm = MethodAssembler::new("pick", "()I", AccessFlags::STATIC);
        asm.iconst(1)?
            .jump(Opcode::Ifne, "seven")?
            .iconst(5)?
            .store(Opcode::Istore, 0)?
            .jump(Opcode::Goto, "done")?
            .label("seven")?
            .iconst(7)?
            .store(Opcode::Istore, 0)?
            .label("done")?
            .load(Opcode::Iload, 0)?
            .insn(Opcode::Ireturn)?;
        let body = asm.finalize()?;

        let frames = analyze(&body, &[])?;
        assert!(frames[2].as_ref().unwrap().is_dead());
        assert!(!frames[5].as_ref().unwrap().is_dead());

        let at_load = frames[8].as_ref().unwrap();
        assert!(!at_load.is_dead());
        assert_eq!(
            at_load.local(0)?.constant.value().map(|n| n.as_int()),
            Some(7)
        );
        Ok(())
    }

    #[test]
    fn test_loop_reaches_fixpoint() -> Result<()> {
        let mut asm = MethodAssembler::new("count", "(I)I", AccessFlags::STATIC);
        asm.iconst(0)?
            .store(Opcode::Istore, 1)?
            .label("head")?
            .load(Opcode::Iload, 1)?
            .load(Opcode::Iload, 0)?
            .jump(Opcode::IfIcmpge, "exit")?
            .iinc(1, 1)?
            .jump(Opcode::Goto, "head")?
            .label("exit")?
            .load(Opcode::Iload, 1)?
            .insn(Opcode::Ireturn)?;
        let body = asm.finalize()?;

        let frames = analyze(&body, &[AbstractValue::unknown(JvmType::Int)])?;
        let at_exit = frames[7].as_ref().unwrap();
        assert!(at_exit.local(1)?.constant.is_top());
        Ok(())
    }

    #[test]
    fn test_handler_frame() -> Result<()> {
        let mut asm = MethodAssembler::new("guard", "(Ljava/lang/Object;)V", AccessFlags::STATIC);
        asm.label("start")?
            .load(Opcode::Aload, 0)?
            .insn(Opcode::Pop)?
            .label("end")?
            .insn(Opcode::Return)?
            .label("handler")?
            .insn(Opcode::Pop)?
            .insn(Opcode::Return)?;
        asm.try_catch("start", "end", "handler", Some("java/lang/RuntimeException"))?;
        let body = asm.finalize()?;

        let frames = analyze(&body, &[AbstractValue::untracked(JvmType::object("java/lang/Object"), false)])?;
        let handler = frames[3].as_ref().unwrap();
        assert_eq!(handler.stack_size(), 1);
        let caught = handler.peek(0).unwrap();
        assert_eq!(*caught.ty.ty(), JvmType::object("java/lang/RuntimeException"));
        assert_eq!(caught.pointer, PointerElement::UTop);
        Ok(())
    }

    #[test]
    fn test_rejects_empty_body() {
        let body = MethodBody::declaration("run", "()V", AccessFlags::ABSTRACT);
        assert!(MethodAnalyzer::new(&body).is_err());
    }
}
