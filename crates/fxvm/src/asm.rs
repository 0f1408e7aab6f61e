//! Building instruction streams by hand, for tools and tests.

use fxvm_bundle::{BundleWriter, INSTRUCTION_WORDS};
use thiserror::Error;

use crate::disasm::SET_CONST_FLOAT_HINT;
use crate::opcode::Opcode;
use crate::program::Instruction;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AsmError {
    #[error("line {line}: unknown mnemonic {mnemonic:?}")]
    UnknownMnemonic { line: usize, mnemonic: String },
    #[error("line {line}: invalid operand {operand:?}")]
    InvalidOperand { line: usize, operand: String },
    #[error("line {line}: {mnemonic} takes {expected} operands, got {got}")]
    OperandCount {
        line: usize,
        mnemonic: &'static str,
        expected: usize,
        got: usize,
    },
}

/// Emits instructions in order.
#[derive(Debug, Clone, Default)]
pub struct Assembler {
    code: Vec<Instruction>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the next instruction.
    pub fn pc(&self) -> u32 {
        self.code.len() as u32
    }

    /// Emits `op` with up to four operands (missing ones are zero). Returns its pc.
    pub fn emit(&mut self, op: Opcode, operands: &[u32]) -> u32 {
        let mut w = [0u32; INSTRUCTION_WORDS - 1];
        for (slot, v) in w.iter_mut().zip(operands) {
            *slot = *v;
        }
        let pc = self.pc();
        self.code.push(Instruction::new(op, w[0], w[1], w[2], w[3]));
        pc
    }

    pub fn set_i32(&mut self, r: u32, value: i32) -> u32 {
        self.emit(Opcode::I32SetConst, &[r, value as u32])
    }

    pub fn set_u32(&mut self, r: u32, value: u32) -> u32 {
        self.emit(Opcode::I32SetConst, &[r, value])
    }

    pub fn set_f32(&mut self, r: u32, value: f32) -> u32 {
        self.emit(Opcode::I32SetConst, &[r, value.to_bits(), SET_CONST_FLOAT_HINT])
    }

    /// Unconditional jump; returns its pc for [`Assembler::patch_jump`].
    pub fn jump(&mut self, target: u32) -> u32 {
        self.emit(Opcode::Jump, &[target])
    }

    /// Emits the `JumpIf cond; Jump target` pair: branches to `target` when
    /// `iregs[cond] == 0` and falls through otherwise. Returns the pc of the `Jump`.
    pub fn branch_if_zero(&mut self, cond: u32, target: u32) -> u32 {
        self.emit(Opcode::JumpIf, &[cond]);
        self.jump(target)
    }

    /// Retargets the `Jump` at `at`.
    pub fn patch_jump(&mut self, at: u32, target: u32) {
        if let Some(inst) = self.code.get_mut(at as usize) {
            if inst.opcode() == Some(Opcode::Jump) {
                inst.a = target;
            }
        }
    }

    pub fn extern_call(&mut self, id: u32, ret_register: u32) -> u32 {
        self.emit(Opcode::I32ExternCall, &[id, ret_register])
    }

    pub fn ret(&mut self) -> u32 {
        self.emit(Opcode::Ret, &[])
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.code
    }

    /// Flat code words for a `CODE` chunk.
    pub fn words(&self) -> Vec<u32> {
        self.code.iter().flat_map(|i| i.to_words()).collect()
    }

    /// A writer pre-loaded with this program.
    pub fn to_writer(&self) -> BundleWriter {
        BundleWriter::new().code(&self.words())
    }

    /// Parses a textual listing.
    ///
    /// Accepts the disassembler's output: an optional `pc:` prefix, a mnemonic, and
    /// operands written as plain integers, `r#`, `%#`, hex jump targets, or floats
    /// (for `i32_set`). Text after `;` or `#` is ignored.
    pub fn parse(text: &str) -> Result<Self, AsmError> {
        let mut asm = Self::new();
        for (i, raw) in text.lines().enumerate() {
            let line = i + 1;
            let body = raw.split([';', '#']).next().unwrap_or("").trim();
            let body = match body.split_once(':') {
                Some((pc, rest)) if u32::from_str_radix(pc.trim(), 16).is_ok() => rest.trim(),
                _ => body,
            };
            let mut parts = body.split_whitespace();
            let Some(mnemonic) = parts.next() else {
                continue;
            };
            let op = Opcode::from_mnemonic(mnemonic).ok_or_else(|| AsmError::UnknownMnemonic {
                line,
                mnemonic: mnemonic.to_owned(),
            })?;
            let tokens: Vec<&str> = parts.collect();
            if tokens.len() != op.operand_count() {
                return Err(AsmError::OperandCount {
                    line,
                    mnemonic: op.mnemonic(),
                    expected: op.operand_count(),
                    got: tokens.len(),
                });
            }
            let mut operands = Vec::with_capacity(INSTRUCTION_WORDS - 1);
            for (k, tok) in tokens.iter().enumerate() {
                let invalid = || AsmError::InvalidOperand {
                    line,
                    operand: (*tok).to_owned(),
                };
                let value = match (op, k) {
                    (Opcode::Jump, 0) => u32::from_str_radix(tok, 16).map_err(|_| invalid())?,
                    (Opcode::I32SetConst, 1) if looks_like_float(tok) => {
                        let f: f32 = tok.parse().map_err(|_| invalid())?;
                        operands.push(f.to_bits());
                        operands.push(SET_CONST_FLOAT_HINT);
                        continue;
                    }
                    _ => parse_int(tok).ok_or_else(invalid)?,
                };
                operands.push(value);
            }
            asm.emit(op, &operands);
        }
        Ok(asm)
    }
}

fn looks_like_float(tok: &str) -> bool {
    !tok.starts_with("0x") && (tok.contains(['.', 'e', 'E']) || tok.ends_with("inf") || tok == "NaN")
}

fn parse_int(tok: &str) -> Option<u32> {
    let digits = tok.trim_start_matches(['r', '%']);
    if let Some(hex) = digits.strip_prefix("0x") {
        return u32::from_str_radix(hex, 16).ok();
    }
    digits
        .parse::<u32>()
        .ok()
        .or_else(|| digits.parse::<i32>().ok().map(|v| v as u32))
}
