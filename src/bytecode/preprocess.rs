//! Body rewrites applied before analysis.
//!
//! Two idioms confuse the interpreter for no good reason:
//!
//! - `getstatic X.$assertionsDisabled` guards assertion code that would otherwise be
//!   analysed as live. Assertions are assumed disabled and the read becomes `iconst_1`.
//! - `obj.getClass(); pop` is how `javac` emits implicit null checks. `getClass` is
//!   native, so the call would be summarised and `obj` would escape. It is replaced by
//!   `Objects.requireNonNull(obj)`, which has the same stack effect and a plain body.

use std::borrow::Cow;

use crate::bytecode::{
    instruction::{Instruction, MethodRef},
    method::MethodBody,
    opcode::Opcode,
    types::OBJECT,
};

/// Returns the rewritten body, or the original if nothing matched.
#[must_use]
pub fn preprocess(body: &MethodBody) -> Cow<'_, MethodBody> {
    let rewrites: Vec<(usize, Instruction)> = body
        .instructions
        .iter()
        .enumerate()
        .filter_map(|(index, insn)| rewrite(insn, body.instructions.get(index + 1)).map(|new| (index, new)))
        .collect();

    if rewrites.is_empty() {
        return Cow::Borrowed(body);
    }

    let mut rewritten = body.clone();
    for (index, insn) in rewrites {
        rewritten.instructions[index] = insn;
    }
    Cow::Owned(rewritten)
}

fn rewrite(insn: &Instruction, next: Option<&Instruction>) -> Option<Instruction> {
    match insn {
        Instruction::Field {
            opcode: Opcode::Getstatic,
            field,
        } if field.name.ends_with("$assertionsDisabled") => Some(Instruction::Insn(Opcode::Iconst1)),
        Instruction::Method {
            opcode: Opcode::Invokevirtual,
            method,
        } if method.owner == OBJECT
            && method.name == "getClass"
            && method.desc == "()Ljava/lang/Class;"
            && next.map(Instruction::opcode) == Some(Opcode::Pop) =>
        {
            Some(Instruction::Method {
                opcode: Opcode::Invokestatic,
                method: MethodRef::new(
                    "java/util/Objects",
                    "requireNonNull",
                    "(Ljava/lang/Object;)Ljava/lang/Object;",
                ),
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{access::AccessFlags, assembler::MethodAssembler};

    #[test]
    fn test_assertions_disabled() {
        let mut asm = MethodAssembler::new("check", "()Z", AccessFlags::STATIC);
        asm.field(Opcode::Getstatic, "demo/A", "$assertionsDisabled", "Z")
            .unwrap()
            .insn(Opcode::Ireturn)
            .unwrap();
        let body = asm.finalize().unwrap();

        let processed = preprocess(&body);
        assert!(matches!(processed, Cow::Owned(_)));
        assert_eq!(processed.instructions[0], Instruction::Insn(Opcode::Iconst1));
    }

    #[test]
    fn test_get_class_null_check() {
        let mut asm = MethodAssembler::new("f", "(Ljava/lang/Object;)V", AccessFlags::STATIC);
        asm.load(Opcode::Aload, 0)
            .unwrap()
            .invoke(Opcode::Invokevirtual, OBJECT, "getClass", "()Ljava/lang/Class;")
            .unwrap()
            .insn(Opcode::Pop)
            .unwrap()
            .insn(Opcode::Return)
            .unwrap();
        let body = asm.finalize().unwrap();

        let processed = preprocess(&body);
        let call = processed.instructions[1].method().unwrap();
        assert_eq!(call.owner, "java/util/Objects");
        assert_eq!(processed.instructions[1].opcode(), Opcode::Invokestatic);
    }

    #[test]
    fn test_get_class_used_is_kept() {
        let mut asm = MethodAssembler::new("f", "(Ljava/lang/Object;)Ljava/lang/Class;", AccessFlags::STATIC);
        asm.load(Opcode::Aload, 0)
            .unwrap()
            .invoke(Opcode::Invokevirtual, OBJECT, "getClass", "()Ljava/lang/Class;")
            .unwrap()
            .insn(Opcode::Areturn)
            .unwrap();
        let body = asm.finalize().unwrap();
        assert!(matches!(preprocess(&body), Cow::Borrowed(_)));
    }
}
