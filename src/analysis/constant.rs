//! Constant folding over [`FlatElement<Number>`].
//!
//! Only what stream pipelines actually compute on is folded: integer and long
//! arithmetic, conversions and integer comparisons. Floating-point arithmetic stays
//! top. Division by a constant zero folds to top instead of trapping.

use crate::{
    analysis::domain::{FlatElement, Number},
    bytecode::{Constant, Instruction, Opcode},
};

/// Constant pushed by an instruction without operands on the stack.
#[must_use]
pub fn new_operation(insn: &Instruction) -> FlatElement<Number> {
    let number = match insn {
        Instruction::Insn(opcode) => match opcode {
            Opcode::IconstM1 => Number::Int(-1),
            Opcode::Iconst0 => Number::Int(0),
            Opcode::Iconst1 => Number::Int(1),
            Opcode::Iconst2 => Number::Int(2),
            Opcode::Iconst3 => Number::Int(3),
            Opcode::Iconst4 => Number::Int(4),
            Opcode::Iconst5 => Number::Int(5),
            Opcode::Lconst0 => Number::Long(0),
            Opcode::Lconst1 => Number::Long(1),
            Opcode::Fconst0 => Number::Float(0.0),
            Opcode::Fconst1 => Number::Float(1.0),
            Opcode::Fconst2 => Number::Float(2.0),
            Opcode::Dconst0 => Number::Double(0.0),
            Opcode::Dconst1 => Number::Double(1.0),
            _ => return FlatElement::Top,
        },
        Instruction::Int {
            opcode: Opcode::Bipush | Opcode::Sipush,
            operand,
        } => Number::Int(*operand),
        Instruction::Ldc(constant) => match constant {
            Constant::Int(v) => Number::Int(*v),
            Constant::Long(v) => Number::Long(*v),
            Constant::Float(v) => Number::Float(*v),
            Constant::Double(v) => Number::Double(*v),
            Constant::String(_) | Constant::Class(_) => return FlatElement::Top,
        },
        _ => return FlatElement::Top,
    };
    FlatElement::Value(number)
}

/// Folds a one-operand instruction. `iinc` is folded with its actual increment.
#[must_use]
pub fn unary_operation(insn: &Instruction, value: &FlatElement<Number>) -> FlatElement<Number> {
    let FlatElement::Value(v) = value else {
        return FlatElement::Top;
    };

    let number = match insn {
        Instruction::Iinc { increment, .. } => Number::Int(v.as_int().wrapping_add(*increment)),
        Instruction::Insn(opcode) => match opcode {
            Opcode::Ineg => Number::Int(v.as_int().wrapping_neg()),
            Opcode::Lneg => Number::Long(v.as_long().wrapping_neg()),
            Opcode::L2i | Opcode::F2i | Opcode::D2i => Number::Int(v.as_int()),
            Opcode::I2l | Opcode::F2l | Opcode::D2l => Number::Long(v.as_long()),
            Opcode::I2f | Opcode::L2f | Opcode::D2f => Number::Float(v.as_float()),
            Opcode::I2d | Opcode::L2d | Opcode::F2d => Number::Double(v.as_double()),
            _ => return FlatElement::Top,
        },
        _ => return FlatElement::Top,
    };
    FlatElement::Value(number)
}

/// Folds a two-operand arithmetic instruction.
#[must_use]
#[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
pub fn binary_operation(
    opcode: Opcode,
    left: &FlatElement<Number>,
    right: &FlatElement<Number>,
) -> FlatElement<Number> {
    let (FlatElement::Value(l), FlatElement::Value(r)) = (left, right) else {
        return FlatElement::Top;
    };

    let (li, ri) = (l.as_int(), r.as_int());
    let (ll, rl) = (l.as_long(), r.as_long());
    // JVM shifts only look at the low 5 (int) or 6 (long) bits of the distance.
    let int_shift = (ri & 0x1f) as u32;
    let long_shift = (ri & 0x3f) as u32;

    let number = match opcode {
        Opcode::Iadd => Number::Int(li.wrapping_add(ri)),
        Opcode::Isub => Number::Int(li.wrapping_sub(ri)),
        Opcode::Imul => Number::Int(li.wrapping_mul(ri)),
        Opcode::Idiv if ri != 0 => Number::Int(li.wrapping_div(ri)),
        Opcode::Irem if ri != 0 => Number::Int(li.wrapping_rem(ri)),
        Opcode::Iand => Number::Int(li & ri),
        Opcode::Ior => Number::Int(li | ri),
        Opcode::Ixor => Number::Int(li ^ ri),
        Opcode::Ishl => Number::Int(li.wrapping_shl(int_shift)),
        Opcode::Ishr => Number::Int(li.wrapping_shr(int_shift)),
        Opcode::Iushr => Number::Int(((li as u32) >> int_shift) as i32),

        Opcode::Ladd => Number::Long(ll.wrapping_add(rl)),
        Opcode::Lsub => Number::Long(ll.wrapping_sub(rl)),
        Opcode::Lmul => Number::Long(ll.wrapping_mul(rl)),
        Opcode::Ldiv if rl != 0 => Number::Long(ll.wrapping_div(rl)),
        Opcode::Lrem if rl != 0 => Number::Long(ll.wrapping_rem(rl)),
        Opcode::Land => Number::Long(ll & rl),
        Opcode::Lor => Number::Long(ll | rl),
        Opcode::Lxor => Number::Long(ll ^ rl),
        Opcode::Lshl => Number::Long(ll.wrapping_shl(long_shift)),
        Opcode::Lshr => Number::Long(ll.wrapping_shr(long_shift)),
        Opcode::Lushr => Number::Long(((ll as u64) >> long_shift) as i64),
        Opcode::Lcmp => Number::Int(match ll.cmp(&rl) {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        }),
        _ => return FlatElement::Top,
    };
    FlatElement::Value(number)
}

/// Decides an `if<cond>` or `if_icmp<cond>` branch from its operands, bottom of the
/// stack first. Returns `None` when the outcome is not statically known.
#[must_use]
pub fn branch_operation(opcode: Opcode, args: &[FlatElement<Number>]) -> Option<bool> {
    let int_arg = |i: usize| match args.get(i) {
        Some(FlatElement::Value(n)) => Some(n.as_int()),
        _ => None,
    };

    match opcode {
        Opcode::Ifeq | Opcode::Ifne | Opcode::Iflt | Opcode::Ifle | Opcode::Ifgt | Opcode::Ifge => {
            let v = int_arg(0)?;
            Some(match opcode {
                Opcode::Ifeq => v == 0,
                Opcode::Ifne => v != 0,
                Opcode::Iflt => v < 0,
                Opcode::Ifle => v <= 0,
                Opcode::Ifgt => v > 0,
                _ => v >= 0,
            })
        }
        Opcode::IfIcmpeq
        | Opcode::IfIcmpne
        | Opcode::IfIcmplt
        | Opcode::IfIcmple
        | Opcode::IfIcmpgt
        | Opcode::IfIcmpge => {
            let (a, b) = (int_arg(0)?, int_arg(1)?);
            Some(match opcode {
                Opcode::IfIcmpeq => a == b,
                Opcode::IfIcmpne => a != b,
                Opcode::IfIcmplt => a < b,
                Opcode::IfIcmple => a <= b,
                Opcode::IfIcmpgt => a > b,
                _ => a >= b,
            })
        }
        _ => None,
    }
}
