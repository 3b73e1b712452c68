//! Structural well-formedness checks run before execution

use crate::error::VerifyError;
use crate::module::{BytecodeModule, Constant, FunctionEntry, Storage};
use crate::opcode::{Opcode, OperandKind};

/// Check the whole module. Unknown opcode bytes are not rejected here; the
/// VM traps on them when reached.
pub fn verify(module: &BytecodeModule) -> Result<(), VerifyError> {
    if module.spans.len() != module.code.len() {
        return Err(VerifyError::SpanTableMismatch { spans: module.spans.len(), code: module.code.len() });
    }

    let entry = module.function(module.entry).ok_or(VerifyError::EntryOutOfRange(module.entry))?;
    if entry.arity != 0 {
        return Err(VerifyError::EntryTakesArguments { name: entry.name.clone(), arity: entry.arity });
    }

    let max_fields = module
        .constants
        .iter()
        .filter_map(|c| match c {
            Constant::Type(desc) => Some(desc.fields.len()),
            _ => None,
        })
        .max()
        .unwrap_or(0);
    for function in &module.functions {
        verify_function(module, function, max_fields)?;
    }
    Ok(())
}

/// Field operands are bounded by the widest type in the module; the object's
/// actual type is only known at run time.
fn verify_function(module: &BytecodeModule, function: &FunctionEntry, max_fields: usize) -> Result<(), VerifyError> {
    let name = || function.name.clone();
    let end = function.code_offset as usize + function.code_len as usize;
    if end > module.code.len() {
        return Err(VerifyError::CodeOutOfRange { function: name() });
    }
    if function.local_slots < function.arity {
        return Err(VerifyError::SlotsBelowArity {
            function: name(),
            arity: function.arity,
            local_slots: function.local_slots,
        });
    }

    let code = module.code_of(function);
    let Some(last) = code.last() else {
        return Err(VerifyError::EmptyFunction { function: name() });
    };
    if !last.opcode().map_or(false, Opcode::is_terminator) {
        return Err(VerifyError::MissingTerminator { function: name() });
    }

    for (offset, ins) in code.iter().enumerate() {
        let Some(op) = ins.opcode() else { continue };
        let offset = offset as u32;
        let out_of_range = || VerifyError::OperandOutOfRange {
            function: name(),
            offset,
            mnemonic: op.mnemonic(),
            operand: ins.a,
        };
        let wrong_kind = |expected| VerifyError::WrongConstantKind {
            function: name(),
            offset,
            mnemonic: op.mnemonic(),
            expected,
            operand: ins.a,
        };

        match op.operand() {
            OperandKind::None => {}
            OperandKind::Field => {
                if ins.a as usize >= max_fields {
                    return Err(out_of_range());
                }
            }
            OperandKind::Const => match module.constant(ins.a) {
                None => return Err(out_of_range()),
                Some(Constant::Type(_)) => return Err(wrong_kind("literal")),
                Some(_) => {}
            },
            OperandKind::Slot => {
                if ins.a >= function.local_slots as u32 {
                    return Err(out_of_range());
                }
            }
            OperandKind::Type => {
                let expected = if op == Opcode::Alloc { Storage::Heap } else { Storage::Inline };
                match module.constant(ins.a) {
                    None => return Err(out_of_range()),
                    Some(Constant::Type(desc)) if desc.storage == expected => {}
                    Some(_) if expected == Storage::Heap => return Err(wrong_kind("heap type")),
                    Some(_) => return Err(wrong_kind("inline type")),
                }
            }
            OperandKind::Target => {
                if ins.a >= function.code_len {
                    return Err(out_of_range());
                }
            }
            OperandKind::Function => {
                let callee = module.function(ins.a).ok_or_else(out_of_range)?;
                if callee.arity != ins.b {
                    return Err(VerifyError::CallArity {
                        function: name(),
                        offset,
                        callee: callee.name.clone(),
                        expected: callee.arity,
                        found: ins.b,
                    });
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction;
    use tarn_ast::Span;

    fn module_with(functions: Vec<(&str, u16, u16, Vec<Instruction>)>, constants: Vec<Constant>) -> BytecodeModule {
        let mut module = BytecodeModule { constants, ..Default::default() };
        for (name, arity, local_slots, code) in functions {
            module.functions.push(FunctionEntry {
                name: name.to_string(),
                arity,
                local_slots,
                code_offset: module.code.len() as u32,
                code_len: code.len() as u32,
            });
            module.spans.extend(code.iter().map(|_| Span::default()));
            module.code.extend(code);
        }
        module
    }

    fn ret() -> Instruction {
        Instruction::simple(Opcode::Return)
    }

    #[test]
    fn test_minimal_module_verifies() {
        let module = module_with(
            vec![("main", 0, 0, vec![Instruction::new(Opcode::PushConst, 0), ret()])],
            vec![Constant::Int(1)],
        );
        assert_eq!(verify(&module), Ok(()));
    }

    #[test]
    fn test_entry_with_params_rejected() {
        let module = module_with(vec![("main", 1, 1, vec![ret()])], vec![]);
        assert!(matches!(verify(&module), Err(VerifyError::EntryTakesArguments { .. })));
    }

    #[test]
    fn test_missing_terminator() {
        let module = module_with(vec![("main", 0, 0, vec![Instruction::simple(Opcode::PushUnit)])], vec![]);
        assert!(matches!(verify(&module), Err(VerifyError::MissingTerminator { .. })));
    }

    #[test]
    fn test_slot_out_of_range() {
        let module = module_with(vec![("main", 0, 1, vec![Instruction::new(Opcode::LoadLocal, 1), ret()])], vec![]);
        assert!(matches!(verify(&module), Err(VerifyError::OperandOutOfRange { operand: 1, .. })));
    }

    #[test]
    fn test_jump_outside_function() {
        let module = module_with(
            vec![
                ("main", 0, 0, vec![Instruction::new(Opcode::Jump, 2), ret()]),
                ("other", 0, 0, vec![ret()]),
            ],
            vec![],
        );
        assert!(matches!(verify(&module), Err(VerifyError::OperandOutOfRange { .. })));
    }

    #[test]
    fn test_call_arity_checked() {
        let module = module_with(
            vec![
                ("main", 0, 0, vec![Instruction::call(1, 1), ret()]),
                ("f", 2, 2, vec![ret()]),
            ],
            vec![],
        );
        assert!(matches!(verify(&module), Err(VerifyError::CallArity { expected: 2, found: 1, .. })));
    }

    #[test]
    fn test_push_const_of_type_descriptor_rejected() {
        let desc = crate::module::TypeDescriptor { name: "S".into(), storage: Storage::Heap, fields: vec![] };
        let module = module_with(
            vec![("main", 0, 0, vec![Instruction::new(Opcode::PushConst, 0), ret()])],
            vec![Constant::Type(desc)],
        );
        assert!(matches!(verify(&module), Err(VerifyError::WrongConstantKind { .. })));
    }

    #[test]
    fn test_field_index_bounded_by_widest_type() {
        let field = |name: &str| crate::module::FieldDesc { name: name.into(), owned: false };
        let desc = crate::module::TypeDescriptor {
            name: "Pair".into(),
            storage: Storage::Heap,
            fields: vec![field("a"), field("b")],
        };
        let load = |index| {
            module_with(
                vec![("main", 0, 1, vec![Instruction::new(Opcode::LoadLocal, 0), Instruction::new(Opcode::LoadField, index), ret()])],
                vec![Constant::Type(desc.clone())],
            )
        };
        assert_eq!(verify(&load(1)), Ok(()));
        assert!(matches!(verify(&load(2)), Err(VerifyError::OperandOutOfRange { operand: 2, .. })));

        let no_types = module_with(vec![("main", 0, 0, vec![Instruction::new(Opcode::StoreField, 0), ret()])], vec![]);
        assert!(matches!(verify(&no_types), Err(VerifyError::OperandOutOfRange { operand: 0, .. })));
    }

    #[test]
    fn test_unknown_opcode_left_to_vm() {
        let module = module_with(vec![("main", 0, 0, vec![Instruction { op: 0xEE, b: 0, a: 0 }, ret()])], vec![]);
        assert_eq!(verify(&module), Ok(()));
    }
}
