use fxvm_bundle::{BundleError, INSTRUCTION_WORDS};

use crate::opcode::Opcode;

/// One decoded `{op, a, b, c, d}` instruction.
///
/// The opcode is kept raw: unknown opcodes only fault when executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Instruction {
    pub op: u32,
    pub a: u32,
    pub b: u32,
    pub c: u32,
    pub d: u32,
}

impl Instruction {
    pub fn new(op: Opcode, a: u32, b: u32, c: u32, d: u32) -> Self {
        Self {
            op: op as u32,
            a,
            b,
            c,
            d,
        }
    }

    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::from_raw(self.op)
    }

    pub fn to_words(self) -> [u32; INSTRUCTION_WORDS] {
        [self.op, self.a, self.b, self.c, self.d]
    }
}

/// Splits flat code words into instructions. `words.len()` is a multiple of five
/// (checked by the bundle decoder).
pub(crate) fn decode_program(words: &[u32]) -> Vec<Instruction> {
    words
        .chunks_exact(INSTRUCTION_WORDS)
        .map(|w| Instruction {
            op: w[0],
            a: w[1],
            b: w[2],
            c: w[3],
            d: w[4],
        })
        .collect()
}

/// Load-time checks on the instruction stream.
///
/// - every `JumpIf` is immediately followed by a `Jump` (the branch target lives in
///   that `Jump`);
/// - every `Jump` targets an existing instruction;
/// - every `ExternCall` names a reflected extern.
pub(crate) fn verify_program(code: &[Instruction], extern_count: usize) -> Result<(), BundleError> {
    for (pc, inst) in code.iter().enumerate() {
        match inst.opcode() {
            Some(Opcode::JumpIf) => {
                let next = code.get(pc + 1).and_then(Instruction::opcode);
                if next != Some(Opcode::Jump) {
                    return Err(BundleError::invalid(
                        "CODE chunk",
                        format!("jump_if at pc {pc} is not followed by a jump"),
                    ));
                }
            }
            Some(Opcode::Jump) => {
                if inst.a as usize >= code.len() {
                    return Err(BundleError::invalid(
                        "CODE chunk",
                        format!(
                            "jump at pc {pc} targets {} outside the {}-instruction program",
                            inst.a,
                            code.len()
                        ),
                    ));
                }
            }
            Some(Opcode::I32ExternCall) => {
                if inst.a as usize >= extern_count {
                    return Err(BundleError::invalid(
                        "CODE chunk",
                        format!(
                            "extern call at pc {pc} references extern {} but only {extern_count} are declared",
                            inst.a
                        ),
                    ));
                }
            }
            _ => {}
        }
    }
    Ok(())
}
