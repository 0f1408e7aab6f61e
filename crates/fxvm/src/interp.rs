use fxvm_bundle::ExternDesc;

use crate::error::{Space, VmError};
use crate::memory::MemoryView;
use crate::native::ExternTable;
use crate::opcode::Opcode;
use crate::program::Instruction;
use crate::registers::RegisterFile;
use crate::resources::INPUT_SLOT_COUNT;
use crate::stats::VmStats;
use crate::texture::load_texel;

/// Everything one invocation needs besides the register file.
pub(crate) struct Machine<'a> {
    pub code: &'a [Instruction],
    pub inputs: &'a [Option<MemoryView>; INPUT_SLOT_COUNT],
    pub constants: &'a MemoryView,
    pub externs: &'a [ExternDesc],
    pub table: &'a mut ExternTable,
    pub stats: &'a VmStats,
}

#[inline]
fn input<'m>(inputs: &'m [Option<MemoryView>], slot: u32) -> Result<&'m MemoryView, VmError> {
    match inputs.get(slot as usize) {
        Some(Some(view)) => Ok(view),
        Some(None) => Err(VmError::UnboundInput { slot }),
        None => Err(VmError::InvalidSlot {
            slot: slot as usize,
        }),
    }
}

#[inline]
fn input_index(view: &MemoryView, slot: u32, index: i64) -> Result<usize, VmError> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i < view.len())
        .ok_or_else(|| VmError::IndexOutOfRange {
            space: Space::Input(slot),
            index,
            len: view.len(),
        })
}

#[inline]
fn read_input(inputs: &[Option<MemoryView>], slot: u32, index: i64) -> Result<u32, VmError> {
    let view = input(inputs, slot)?;
    let i = input_index(view, slot, index)?;
    view.read_u32(i).map_err(|e| e.into_vm(Space::Input(slot)))
}

#[inline]
fn write_input(
    inputs: &[Option<MemoryView>],
    slot: u32,
    index: i64,
    value: u32,
) -> Result<(), VmError> {
    let view = input(inputs, slot)?;
    let i = input_index(view, slot, index)?;
    view.write_u32(i, value)
        .map_err(|e| e.into_vm(Space::Input(slot)))
}

#[inline]
fn int_op(
    regs: &mut RegisterFile,
    (a, b, c): (u32, u32, u32),
    f: impl Fn(i32, i32) -> i32,
) -> Result<(), VmError> {
    let r = f(regs.i32(b)?, regs.i32(c)?);
    regs.set_i32(a, r)
}

#[inline]
fn uint_cmp(
    regs: &mut RegisterFile,
    (a, b, c): (u32, u32, u32),
    f: impl Fn(u32, u32) -> bool,
) -> Result<(), VmError> {
    let r = f(regs.u32(b)?, regs.u32(c)?);
    regs.set_i32(a, i32::from(r))
}

#[inline]
fn float_op(
    regs: &mut RegisterFile,
    (a, b, c): (u32, u32, u32),
    f: impl Fn(f32, f32) -> f32,
) -> Result<(), VmError> {
    let r = f(regs.f32(b)?, regs.f32(c)?);
    regs.set_f32(a, r)
}

#[inline]
fn float_unary(regs: &mut RegisterFile, a: u32, b: u32, f: impl Fn(f32) -> f32) -> Result<(), VmError> {
    let r = f(regs.f32(b)?);
    regs.set_f32(a, r)
}

#[inline]
fn truth(v: bool) -> i32 {
    i32::from(v)
}

/// Runs the program from instruction 0 until `Ret`.
///
/// Returns `iregs[0]` at `Ret`. Any fault aborts the invocation; register and
/// memory writes made before the fault remain visible.
pub(crate) fn run(m: &mut Machine<'_>, regs: &mut RegisterFile) -> Result<i32, VmError> {
    let code = m.code;
    let inputs = &m.inputs[..];
    let mut pc = 0usize;

    loop {
        let Some(&Instruction { op, a, b, c, d }) = code.get(pc) else {
            return Err(VmError::ProgramCounterOutOfRange {
                pc,
                len: code.len(),
            });
        };
        let Some(opcode) = Opcode::from_raw(op) else {
            return Err(VmError::IllegalInstruction { pc, opcode: op });
        };

        match opcode {
            Opcode::I32SetConst => regs.set_u32(a, b)?,
            Opcode::I32LoadRegister => {
                let v = regs.u32(b)?;
                regs.set_u32(a, v)?;
            }
            Opcode::I32LoadInput => {
                let v = read_input(inputs, a, i64::from(c))?;
                regs.set_u32(b, v)?;
            }
            Opcode::I32StoreInput => {
                let v = regs.u32(c)?;
                write_input(inputs, a, i64::from(b), v)?;
            }
            Opcode::I32LoadRegistersPointer => {
                let ptr = i64::from(regs.i32(b)?) + i64::from(c);
                let v = regs.at(ptr)?;
                regs.set_u32(a, v)?;
            }
            Opcode::I32StoreRegisterPointer => {
                let ptr = i64::from(regs.i32(a)?) + i64::from(c);
                let v = regs.u32(b)?;
                regs.set_at(ptr, v)?;
            }
            Opcode::I32LoadInputPointer => {
                let index = i64::from(regs.i32(c)?) + i64::from(d);
                let v = read_input(inputs, a, index)?;
                regs.set_u32(b, v)?;
            }
            Opcode::I32StoreInputPointer => {
                let index = i64::from(regs.i32(b)?) + i64::from(d);
                let v = regs.u32(c)?;
                write_input(inputs, a, index, v)?;
            }
            Opcode::I32TextureLoad => {
                let tex = input(inputs, b)?;
                let u = regs.i32(c)?;
                let v = regs.at(i64::from(c) + 1)? as i32;
                let rgba = load_texel(tex, b, u, v)?;
                for (i, channel) in rgba.into_iter().enumerate() {
                    regs.set_at(i64::from(a) + i as i64, channel.to_bits())?;
                }
            }
            Opcode::I32ExternCall => {
                let desc = m
                    .externs
                    .get(a as usize)
                    .ok_or_else(|| VmError::UnknownExtern(format!("#{a}")))?;
                if m.table.call(desc, b, regs, m.constants)? {
                    m.stats.inc_extern_calls();
                } else {
                    m.stats.inc_unbound_extern_calls();
                }
            }

            Opcode::I32Add => int_op(regs, (a, b, c), i32::wrapping_add)?,
            Opcode::I32Sub => int_op(regs, (a, b, c), i32::wrapping_sub)?,
            Opcode::I32Mul => int_op(regs, (a, b, c), i32::wrapping_mul)?,
            Opcode::I32Div => {
                let y = regs.i32(c)?;
                if y == 0 {
                    return Err(VmError::DivideByZero { pc });
                }
                let x = regs.i32(b)?;
                regs.set_i32(a, x.wrapping_div(y))?;
            }
            Opcode::I32Mod => int_op(regs, (a, b, c), |x, y| {
                if y == 0 {
                    0
                } else {
                    x.wrapping_rem(y)
                }
            })?,
            Opcode::I32Mad => {
                let r = regs
                    .i32(b)?
                    .wrapping_add(regs.i32(c)?.wrapping_mul(regs.i32(d)?));
                regs.set_i32(a, r)?;
            }
            Opcode::I32Min => int_op(regs, (a, b, c), i32::min)?,
            Opcode::I32Max => int_op(regs, (a, b, c), i32::max)?,

            Opcode::F32Add => float_op(regs, (a, b, c), |x, y| x + y)?,
            Opcode::F32Sub => float_op(regs, (a, b, c), |x, y| x - y)?,
            Opcode::F32Mul => float_op(regs, (a, b, c), |x, y| x * y)?,
            Opcode::F32Div => float_op(regs, (a, b, c), |x, y| x / y)?,
            Opcode::F32Mod => float_op(regs, (a, b, c), |x, y| x % y)?,

            Opcode::U32LessThan => uint_cmp(regs, (a, b, c), |x, y| x < y)?,
            Opcode::U32GreaterThanEqual => uint_cmp(regs, (a, b, c), |x, y| x >= y)?,
            Opcode::I32LessThan => int_op(regs, (a, b, c), |x, y| truth(x < y))?,
            Opcode::I32GreaterThanEqual => int_op(regs, (a, b, c), |x, y| truth(x >= y))?,
            Opcode::I32Equal => int_op(regs, (a, b, c), |x, y| truth(x == y))?,
            Opcode::I32NotEqual => int_op(regs, (a, b, c), |x, y| truth(x != y))?,
            Opcode::I32Not => {
                let v = regs.i32(b)?;
                regs.set_i32(a, truth(v == 0))?;
            }
            Opcode::F32LessThan => float_op(regs, (a, b, c), |x, y| f32::from(u8::from(x < y)))?,
            Opcode::F32GreaterThanEqual => {
                float_op(regs, (a, b, c), |x, y| f32::from(u8::from(x >= y)))?
            }
            Opcode::I32LogicalOr => int_op(regs, (a, b, c), |x, y| truth(x != 0 || y != 0))?,
            Opcode::I32LogicalAnd => int_op(regs, (a, b, c), |x, y| truth(x != 0 && y != 0))?,

            Opcode::F32Frac => float_unary(regs, a, b, |x| x - x.floor())?,
            Opcode::F32Floor => float_unary(regs, a, b, f32::floor)?,
            Opcode::F32Ceil => float_unary(regs, a, b, f32::ceil)?,
            Opcode::F32Sin => float_unary(regs, a, b, f32::sin)?,
            Opcode::F32Cos => float_unary(regs, a, b, f32::cos)?,
            Opcode::F32Abs => float_unary(regs, a, b, f32::abs)?,
            Opcode::F32Sqrt => float_unary(regs, a, b, f32::sqrt)?,
            Opcode::F32Pow => float_op(regs, (a, b, c), f32::powf)?,
            // Plain comparisons: a NaN operand selects `c` for min and `b` for max.
            Opcode::F32Min => float_op(regs, (a, b, c), |x, y| if x < y { x } else { y })?,
            Opcode::F32Max => float_op(regs, (a, b, c), |x, y| if x < y { y } else { x })?,

            Opcode::U32ToF32 => {
                let v = regs.u32(b)?;
                regs.set_f32(a, v as f32)?;
            }
            Opcode::I32ToF32 => {
                let v = regs.i32(b)?;
                regs.set_f32(a, v as f32)?;
            }
            Opcode::F32ToU32 => {
                let v = regs.f32(b)?;
                regs.set_u32(a, v as u32)?;
            }
            Opcode::F32ToI32 => {
                let v = regs.f32(b)?;
                regs.set_i32(a, v as i32)?;
            }

            Opcode::Jump => {
                pc = a as usize;
                continue;
            }
            Opcode::JumpIf => {
                if regs.i32(a)? != 0 {
                    // Skip the paired jump.
                    pc += 1;
                }
            }
            Opcode::Ret => return regs.i32(0),
        }
        pc += 1;
    }
}
