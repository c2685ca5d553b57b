//! JVM opcodes modelled by the interpreter.
//!
//! `jsr`/`ret` are deliberately absent; the class-file reader is expected to have
//! inlined subroutines before handing bodies to the analysis.

use strum::{AsRefStr, Display, EnumCount, EnumIter, IntoStaticStr};

/// A JVM opcode. The `Display` form is the standard mnemonic (`iconst_0`, `if_icmpeq`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, IntoStaticStr, EnumIter, EnumCount,
)]
#[strum(serialize_all = "snake_case")]
#[allow(missing_docs)]
pub enum Opcode {
    Nop,
    AconstNull,
    #[strum(serialize = "iconst_m1")]
    IconstM1,
    #[strum(serialize = "iconst_0")]
    Iconst0,
    #[strum(serialize = "iconst_1")]
    Iconst1,
    #[strum(serialize = "iconst_2")]
    Iconst2,
    #[strum(serialize = "iconst_3")]
    Iconst3,
    #[strum(serialize = "iconst_4")]
    Iconst4,
    #[strum(serialize = "iconst_5")]
    Iconst5,
    #[strum(serialize = "lconst_0")]
    Lconst0,
    #[strum(serialize = "lconst_1")]
    Lconst1,
    #[strum(serialize = "fconst_0")]
    Fconst0,
    #[strum(serialize = "fconst_1")]
    Fconst1,
    #[strum(serialize = "fconst_2")]
    Fconst2,
    #[strum(serialize = "dconst_0")]
    Dconst0,
    #[strum(serialize = "dconst_1")]
    Dconst1,
    Bipush,
    Sipush,
    Ldc,
    Iload,
    Lload,
    Fload,
    Dload,
    Aload,
    Iaload,
    Laload,
    Faload,
    Daload,
    Aaload,
    Baload,
    Caload,
    Saload,
    Istore,
    Lstore,
    Fstore,
    Dstore,
    Astore,
    Iastore,
    Lastore,
    Fastore,
    Dastore,
    Aastore,
    Bastore,
    Castore,
    Sastore,
    Pop,
    #[strum(serialize = "pop2")]
    Pop2,
    Dup,
    #[strum(serialize = "dup_x1")]
    DupX1,
    #[strum(serialize = "dup_x2")]
    DupX2,
    #[strum(serialize = "dup2")]
    Dup2,
    #[strum(serialize = "dup2_x1")]
    Dup2X1,
    #[strum(serialize = "dup2_x2")]
    Dup2X2,
    Swap,
    Iadd,
    Ladd,
    Fadd,
    Dadd,
    Isub,
    Lsub,
    Fsub,
    Dsub,
    Imul,
    Lmul,
    Fmul,
    Dmul,
    Idiv,
    Ldiv,
    Fdiv,
    Ddiv,
    Irem,
    Lrem,
    Frem,
    Drem,
    Ineg,
    Lneg,
    Fneg,
    Dneg,
    Ishl,
    Lshl,
    Ishr,
    Lshr,
    Iushr,
    Lushr,
    Iand,
    Land,
    Ior,
    Lor,
    Ixor,
    Lxor,
    Iinc,
    #[strum(serialize = "i2l")]
    I2l,
    #[strum(serialize = "i2f")]
    I2f,
    #[strum(serialize = "i2d")]
    I2d,
    #[strum(serialize = "l2i")]
    L2i,
    #[strum(serialize = "l2f")]
    L2f,
    #[strum(serialize = "l2d")]
    L2d,
    #[strum(serialize = "f2i")]
    F2i,
    #[strum(serialize = "f2l")]
    F2l,
    #[strum(serialize = "f2d")]
    F2d,
    #[strum(serialize = "d2i")]
    D2i,
    #[strum(serialize = "d2l")]
    D2l,
    #[strum(serialize = "d2f")]
    D2f,
    #[strum(serialize = "i2b")]
    I2b,
    #[strum(serialize = "i2c")]
    I2c,
    #[strum(serialize = "i2s")]
    I2s,
    Lcmp,
    Fcmpl,
    Fcmpg,
    Dcmpl,
    Dcmpg,
    Ifeq,
    Ifne,
    Iflt,
    Ifge,
    Ifgt,
    Ifle,
    IfIcmpeq,
    IfIcmpne,
    IfIcmplt,
    IfIcmpge,
    IfIcmpgt,
    IfIcmple,
    IfAcmpeq,
    IfAcmpne,
    Goto,
    Tableswitch,
    Lookupswitch,
    Ireturn,
    Lreturn,
    Freturn,
    Dreturn,
    Areturn,
    Return,
    Getstatic,
    Putstatic,
    Getfield,
    Putfield,
    Invokevirtual,
    Invokespecial,
    Invokestatic,
    Invokeinterface,
    Invokedynamic,
    New,
    Newarray,
    Anewarray,
    Arraylength,
    Athrow,
    Checkcast,
    Instanceof,
    Monitorenter,
    Monitorexit,
    Multianewarray,
    Ifnull,
    Ifnonnull,
}

impl Opcode {
    /// Returns `true` for the value-returning and void return instructions.
    #[must_use]
    pub fn is_return(self) -> bool {
        matches!(
            self,
            Opcode::Ireturn
                | Opcode::Lreturn
                | Opcode::Freturn
                | Opcode::Dreturn
                | Opcode::Areturn
                | Opcode::Return
        )
    }

    /// Returns `true` for conditional branches (everything that jumps except `goto`).
    #[must_use]
    pub fn is_conditional_jump(self) -> bool {
        matches!(
            self,
            Opcode::Ifeq
                | Opcode::Ifne
                | Opcode::Iflt
                | Opcode::Ifge
                | Opcode::Ifgt
                | Opcode::Ifle
                | Opcode::IfIcmpeq
                | Opcode::IfIcmpne
                | Opcode::IfIcmplt
                | Opcode::IfIcmpge
                | Opcode::IfIcmpgt
                | Opcode::IfIcmple
                | Opcode::IfAcmpeq
                | Opcode::IfAcmpne
                | Opcode::Ifnull
                | Opcode::Ifnonnull
        )
    }

    /// Returns `true` for the method invocation instructions (not `invokedynamic`).
    #[must_use]
    pub fn is_invoke(self) -> bool {
        matches!(
            self,
            Opcode::Invokevirtual
                | Opcode::Invokespecial
                | Opcode::Invokestatic
                | Opcode::Invokeinterface
        )
    }

    /// Returns `true` if control never falls through to the next instruction.
    #[must_use]
    pub fn ends_block(self) -> bool {
        self.is_return()
            || matches!(
                self,
                Opcode::Goto | Opcode::Athrow | Opcode::Tableswitch | Opcode::Lookupswitch
            )
    }

    /// Number of operand-stack values a conditional branch compares.
    #[must_use]
    pub fn branch_operands(self) -> usize {
        match self {
            Opcode::IfIcmpeq
            | Opcode::IfIcmpne
            | Opcode::IfIcmplt
            | Opcode::IfIcmpge
            | Opcode::IfIcmpgt
            | Opcode::IfIcmple
            | Opcode::IfAcmpeq
            | Opcode::IfAcmpne => 2,
            op if op.is_conditional_jump() => 1,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_mnemonics() {
        assert_eq!(Opcode::Iconst0.to_string(), "iconst_0");
        assert_eq!(Opcode::IfIcmpeq.to_string(), "if_icmpeq");
        assert_eq!(Opcode::AconstNull.to_string(), "aconst_null");
        assert_eq!(Opcode::Dup2X1.to_string(), "dup2_x1");
        assert_eq!(Opcode::I2l.as_ref(), "i2l");
    }

    #[test]
    fn test_classification() {
        assert!(Opcode::Areturn.is_return());
        assert!(Opcode::Ifnull.is_conditional_jump());
        assert!(!Opcode::Goto.is_conditional_jump());
        assert!(Opcode::Goto.ends_block());
        assert_eq!(Opcode::IfAcmpne.branch_operands(), 2);
        assert_eq!(Opcode::Ifeq.branch_operands(), 1);
        assert_eq!(Opcode::Iadd.branch_operands(), 0);
    }

    #[test]
    fn test_every_return_ends_a_block() {
        for op in Opcode::iter().filter(|op| op.is_return()) {
            assert!(op.ends_block(), "{op} should end a block");
        }
        assert_eq!(Opcode::iter().filter(|op| op.is_invoke()).count(), 4);
    }
}
