//! Type and constant semantics.

use crate::{
    analysis::{
        constant,
        domain::{AbstractValue, FlatElement, Number, TypeElement},
        heap::Heap,
        interpreter::ValueInterpreter,
    },
    bytecode::{newarray_element, Constant, Instruction, JvmType, MethodDescriptor, Opcode, OBJECT},
    error::malformed_error,
    Result,
};

/// Interprets instructions over types and folded constants only.
///
/// References it creates are untracked or unknown; the heap argument is never touched.
/// The frame interpreter runs dead frames through this interpreter so that code behind
/// a statically decided branch still gets well-formed frames without affecting the heap
/// or any recorded call.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeInterpreter;

/// A primitive result: the folded constant if there is one, otherwise unknown of `ty`.
pub(crate) fn primitive(ty: JvmType, folded: FlatElement<Number>) -> AbstractValue {
    match folded {
        FlatElement::Value(number) => AbstractValue::constant(number),
        _ => AbstractValue::unknown(ty),
    }
}

/// Result type of a one-operand arithmetic or conversion instruction.
fn unary_result_type(opcode: Opcode) -> Option<JvmType> {
    Some(match opcode {
        Opcode::Ineg
        | Opcode::L2i
        | Opcode::F2i
        | Opcode::D2i
        | Opcode::I2b
        | Opcode::I2c
        | Opcode::I2s
        | Opcode::Arraylength => JvmType::Int,
        Opcode::Lneg | Opcode::I2l | Opcode::F2l | Opcode::D2l => JvmType::Long,
        Opcode::Fneg | Opcode::I2f | Opcode::L2f | Opcode::D2f => JvmType::Float,
        Opcode::Dneg | Opcode::I2d | Opcode::L2d | Opcode::F2d => JvmType::Double,
        _ => return None,
    })
}

/// Result type of a two-operand arithmetic, comparison or primitive array load.
fn binary_result_type(opcode: Opcode) -> Option<JvmType> {
    Some(match opcode {
        Opcode::Iadd
        | Opcode::Isub
        | Opcode::Imul
        | Opcode::Idiv
        | Opcode::Irem
        | Opcode::Ishl
        | Opcode::Ishr
        | Opcode::Iushr
        | Opcode::Iand
        | Opcode::Ior
        | Opcode::Ixor
        | Opcode::Lcmp
        | Opcode::Fcmpl
        | Opcode::Fcmpg
        | Opcode::Dcmpl
        | Opcode::Dcmpg
        | Opcode::Iaload
        | Opcode::Baload
        | Opcode::Caload
        | Opcode::Saload => JvmType::Int,
        Opcode::Ladd
        | Opcode::Lsub
        | Opcode::Lmul
        | Opcode::Ldiv
        | Opcode::Lrem
        | Opcode::Lshl
        | Opcode::Lshr
        | Opcode::Lushr
        | Opcode::Land
        | Opcode::Lor
        | Opcode::Lxor
        | Opcode::Laload => JvmType::Long,
        Opcode::Fadd
        | Opcode::Fsub
        | Opcode::Fmul
        | Opcode::Fdiv
        | Opcode::Frem
        | Opcode::Faload => JvmType::Float,
        Opcode::Dadd
        | Opcode::Dsub
        | Opcode::Dmul
        | Opcode::Ddiv
        | Opcode::Drem
        | Opcode::Daload => JvmType::Double,
        _ => return None,
    })
}

/// Parses the operand of `new`, `anewarray`, `checkcast` and `instanceof`.
pub(crate) fn operand_type(class: &str) -> Result<JvmType> {
    JvmType::from_internal_name(class)
}

/// Declared return type of a call or `invokedynamic` site.
pub(crate) fn return_type(insn: &Instruction) -> Result<JvmType> {
    let desc = match insn {
        Instruction::Method { method, .. } => &method.desc,
        Instruction::InvokeDynamic(site) => &site.desc,
        other => return Err(malformed_error!("'{}' is not a call", other)),
    };
    Ok(MethodDescriptor::parse(desc)?.return_type)
}

/// The value a call returns when nothing is known about it, `None` for `void`.
fn unknown_result(insn: &Instruction) -> Result<Option<AbstractValue>> {
    let ty = return_type(insn)?;
    Ok((ty != JvmType::Void).then(|| AbstractValue::unknown(ty)))
}

impl ValueInterpreter for TypeInterpreter {
    fn new_operation(
        &mut self,
        insn: &Instruction,
        _index: usize,
        _heap: &mut Heap,
    ) -> Result<AbstractValue> {
        match insn {
            Instruction::Insn(Opcode::AconstNull) => Ok(AbstractValue::null(JvmType::object(OBJECT))),
            Instruction::Ldc(constant @ (Constant::String(_) | Constant::Class(_))) => {
                Ok(AbstractValue::untracked(constant.value_type(), true))
            }
            Instruction::Insn(_) | Instruction::Int { .. } | Instruction::Ldc(_) => {
                match constant::new_operation(insn) {
                    FlatElement::Value(number) => Ok(AbstractValue::constant(number)),
                    _ => Err(malformed_error!("'{}' pushes no constant", insn)),
                }
            }
            Instruction::Field {
                opcode: Opcode::Getstatic,
                field,
            } => Ok(AbstractValue::unknown(field.field_type()?)),
            Instruction::Type {
                opcode: Opcode::New,
                class,
            } => Ok(AbstractValue::untracked(operand_type(class)?, true)),
            other => Err(malformed_error!("'{}' is not a push", other)),
        }
    }

    fn unary_operation(
        &mut self,
        insn: &Instruction,
        _index: usize,
        value: AbstractValue,
        _heap: &mut Heap,
    ) -> Result<Option<AbstractValue>> {
        let result = match insn {
            Instruction::Iinc { .. } => {
                primitive(JvmType::Int, constant::unary_operation(insn, &value.constant))
            }
            Instruction::Insn(opcode) => match unary_result_type(*opcode) {
                Some(ty) => primitive(ty, constant::unary_operation(insn, &value.constant)),
                None => return Ok(None),
            },
            Instruction::Int {
                opcode: Opcode::Newarray,
                operand,
            } => AbstractValue::untracked(JvmType::array_of(newarray_element(*operand)?), true),
            Instruction::Field {
                opcode: Opcode::Getfield,
                field,
            } => AbstractValue::unknown(field.field_type()?),
            Instruction::Type { opcode, class } => match opcode {
                Opcode::Anewarray => {
                    AbstractValue::untracked(JvmType::array_of(operand_type(class)?), true)
                }
                Opcode::Checkcast if value.is_null() => AbstractValue::null(operand_type(class)?),
                Opcode::Checkcast => AbstractValue::new(
                    TypeElement::imprecise(operand_type(class)?),
                    value.pointer,
                    value.constant,
                ),
                Opcode::Instanceof => AbstractValue::unknown(JvmType::Int),
                _ => return Err(malformed_error!("'{}' is not unary", insn)),
            },
            _ => return Ok(None),
        };
        Ok(Some(result))
    }

    fn binary_operation(
        &mut self,
        insn: &Instruction,
        _index: usize,
        value1: AbstractValue,
        value2: AbstractValue,
        _heap: &mut Heap,
    ) -> Result<Option<AbstractValue>> {
        let opcode = insn.opcode();
        if opcode == Opcode::Aaload {
            let element = value1
                .ty
                .ty()
                .element_type()
                .cloned()
                .unwrap_or_else(|| JvmType::object(OBJECT));
            return Ok(Some(AbstractValue::untracked(element, false)));
        }

        Ok(binary_result_type(opcode).map(|ty| {
            primitive(
                ty,
                constant::binary_operation(opcode, &value1.constant, &value2.constant),
            )
        }))
    }

    fn ternary_operation(
        &mut self,
        _insn: &Instruction,
        _index: usize,
        _values: [AbstractValue; 3],
        _heap: &mut Heap,
    ) -> Result<()> {
        Ok(())
    }

    fn nary_operation(
        &mut self,
        insn: &Instruction,
        _index: usize,
        _values: Vec<AbstractValue>,
        _heap: &mut Heap,
    ) -> Result<Option<AbstractValue>> {
        match insn {
            Instruction::MultiANewArray { desc, .. } => Ok(Some(AbstractValue::untracked(
                JvmType::from_descriptor(desc)?,
                true,
            ))),
            _ => unknown_result(insn),
        }
    }
}
