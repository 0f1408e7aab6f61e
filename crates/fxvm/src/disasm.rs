//! Human-readable listings of instruction streams.
//!
//! One line per instruction: `pc: mnemonic operands`, with registers written `r#`,
//! pointer registers `%#` and jump targets as instruction indices.

use core::fmt::Write as _;

use fxvm_bundle::ExternDesc;

use crate::opcode::Opcode;
use crate::program::Instruction;

/// `I32SetConst` operand `c` value marking the constant as a float.
pub const SET_CONST_FLOAT_HINT: u32 = 1;

fn reg(r: u32) -> String {
    format!("r{r}")
}

fn ptr(r: u32) -> String {
    format!("%{r}")
}

fn operands(op: Opcode, inst: &Instruction) -> Vec<String> {
    let Instruction { a, b, c, d, .. } = *inst;
    match op {
        Opcode::I32SetConst => {
            let value = if c == SET_CONST_FLOAT_HINT {
                format!("{:?}", f32::from_bits(b))
            } else {
                (b as i32).to_string()
            };
            vec![reg(a), value]
        }
        Opcode::I32LoadRegister => vec![reg(a), reg(b)],
        Opcode::I32LoadInput => vec![a.to_string(), reg(b), c.to_string()],
        Opcode::I32StoreInput => vec![a.to_string(), b.to_string(), reg(c)],
        Opcode::I32LoadRegistersPointer => vec![reg(a), ptr(b), c.to_string()],
        Opcode::I32StoreRegisterPointer => vec![ptr(a), reg(b), c.to_string()],
        Opcode::I32LoadInputPointer => vec![a.to_string(), reg(b), ptr(c), d.to_string()],
        Opcode::I32StoreInputPointer => vec![a.to_string(), ptr(b), reg(c), d.to_string()],
        Opcode::I32TextureLoad => vec![reg(a), b.to_string(), reg(c)],
        Opcode::I32ExternCall => vec![a.to_string(), reg(b)],
        Opcode::Jump => vec![format!("{a:04x}")],
        _ => [a, b, c, d]
            .into_iter()
            .take(op.operand_count())
            .map(reg)
            .collect(),
    }
}

/// Formats one instruction.
pub fn format_instruction(pc: usize, inst: &Instruction, externs: &[ExternDesc]) -> String {
    let Some(op) = inst.opcode() else {
        return format!(
            "{pc:04x}: .word {} {} {} {} {}",
            inst.op, inst.a, inst.b, inst.c, inst.d
        );
    };

    let mut line = format!("{pc:04x}: {}", op.mnemonic());
    for operand in operands(op, inst) {
        line.push(' ');
        line.push_str(&operand);
    }
    match op {
        Opcode::I32ExternCall => {
            if let Some(desc) = externs.get(inst.a as usize) {
                let _ = write!(line, "  ; {}", desc.signature());
            }
        }
        Opcode::JumpIf => {
            let _ = write!(line, "  ; skip next if r{} != 0", inst.a);
        }
        _ => {}
    }
    line
}

/// Formats a whole program.
pub fn disassemble(code: &[Instruction], externs: &[ExternDesc]) -> String {
    let mut out = String::new();
    for (pc, inst) in code.iter().enumerate() {
        out.push_str(&format_instruction(pc, inst, externs));
        out.push('\n');
    }
    out
}
