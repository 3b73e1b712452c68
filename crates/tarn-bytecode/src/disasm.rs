//! Human-readable listing of a module

use std::fmt::Write;

use crate::instruction::Instruction;
use crate::module::{BytecodeModule, Constant, Storage};
use crate::opcode::OperandKind;

pub fn disassemble(module: &BytecodeModule) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "module ({} functions, {} constants, entry {})",
        module.functions.len(),
        module.constants.len(),
        module.entry
    );

    out.push_str("constants:\n");
    for (i, constant) in module.constants.iter().enumerate() {
        let _ = writeln!(out, "  {:4}: {}", i, describe_constant(constant));
    }

    for (index, function) in module.functions.iter().enumerate() {
        let _ = writeln!(
            out,
            "\nfn #{} {} (arity {}, slots {}):",
            index, function.name, function.arity, function.local_slots
        );
        for (offset, ins) in module.code_of(function).iter().enumerate() {
            let _ = writeln!(out, "  {:4}: {}", offset, disassemble_instruction(module, ins));
        }
    }
    out
}

/// One instruction, with constants and call targets resolved
pub fn disassemble_instruction(module: &BytecodeModule, ins: &Instruction) -> String {
    let Some(op) = ins.opcode() else {
        return format!("<invalid 0x{:02x}>", ins.op);
    };
    let mnemonic = op.mnemonic();
    match op.operand() {
        OperandKind::None => mnemonic.to_string(),
        OperandKind::Const => match module.constant(ins.a) {
            Some(constant) => format!("{} {} ; {}", mnemonic, ins.a, describe_constant(constant)),
            None => format!("{} {} ; ?", mnemonic, ins.a),
        },
        OperandKind::Type => match module.type_descriptor(ins.a) {
            Some(desc) => format!("{} {} ; {}", mnemonic, ins.a, desc.name),
            None => format!("{} {} ; ?", mnemonic, ins.a),
        },
        OperandKind::Function => {
            let callee = module.function(ins.a).map_or("?", |f| f.name.as_str());
            format!("{} {} ; {} argc={}", mnemonic, ins.a, callee, ins.b)
        }
        OperandKind::Target => format!("{} -> {}", mnemonic, ins.a),
        OperandKind::Slot | OperandKind::Field => format!("{} {}", mnemonic, ins.a),
    }
}

fn describe_constant(constant: &Constant) -> String {
    match constant {
        Constant::Int(v) => format!("int {}", v),
        Constant::Float(v) => format!("float {:?}", v),
        Constant::Str(s) => format!("str {:?}", s),
        Constant::Type(desc) => {
            let storage = match desc.storage {
                Storage::Heap => "heap",
                Storage::Inline => "inline",
            };
            let fields: Vec<String> = desc
                .fields
                .iter()
                .map(|f| if f.owned { format!("{} (owned)", f.name) } else { f.name.clone() })
                .collect();
            format!("type {} {} {{ {} }}", storage, desc.name, fields.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::FunctionEntry;
    use crate::opcode::Opcode;
    use pretty_assertions::assert_eq;
    use tarn_ast::Span;

    #[test]
    fn test_listing() {
        let module = BytecodeModule {
            constants: vec![Constant::Int(14)],
            functions: vec![FunctionEntry {
                name: "app::main::main".into(),
                arity: 0,
                local_slots: 0,
                code_offset: 0,
                code_len: 3,
            }],
            code: vec![
                Instruction::new(Opcode::PushConst, 0),
                Instruction::new(Opcode::Jump, 2),
                Instruction::simple(Opcode::Return),
            ],
            spans: vec![Span::default(); 3],
            entry: 0,
        };
        let expected = "\
module (1 functions, 1 constants, entry 0)
constants:
     0: int 14

fn #0 app::main::main (arity 0, slots 0):
     0: push.const 0 ; int 14
     1: jump -> 2
     2: ret
";
        assert_eq!(disassemble(&module), expected);
    }
}
