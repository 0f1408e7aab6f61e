//! The instruction set.
//!
//! Every instruction is five little-endian words `{op, a, b, c, d}`. Operand meaning
//! depends on the opcode; `iregs`/`uregs`/`fregs` below are the three lanes of the
//! register file and `inputs[s]` is the memory bound to input slot `s`.

macro_rules! opcodes {
    ($($(#[$doc:meta])* $name:ident = $value:literal, $mnemonic:literal, $operands:literal;)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum Opcode {
            $($(#[$doc])* $name = $value,)*
        }

        impl Opcode {
            /// Every opcode, in numeric order.
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name,)*];

            pub fn from_raw(raw: u32) -> Option<Self> {
                match raw {
                    $($value => Some(Opcode::$name),)*
                    _ => None,
                }
            }

            /// Assembly mnemonic used by the disassembler.
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$name => $mnemonic,)*
                }
            }

            /// Number of leading operands (`a`, `b`, `c`, `d`) the opcode reads.
            pub fn operand_count(self) -> usize {
                match self {
                    $(Opcode::$name => $operands,)*
                }
            }
        }
    };
}

opcodes! {
    /// `iregs[a] = b` (raw bit pattern).
    I32SetConst = 0, "i32_set", 2;
    /// `iregs[a] = iregs[b]`.
    I32LoadRegister = 1, "i32_load", 2;
    /// `iregs[b] = inputs[a][c]`.
    I32LoadInput = 2, "i32_load_input", 3;
    /// `inputs[a][b] = iregs[c]`.
    I32StoreInput = 3, "i32_store_input", 3;
    /// `iregs[a] = iregs[iregs[b] + c]`.
    I32LoadRegistersPointer = 4, "i32_load*", 3;
    /// `iregs[iregs[a] + c] = iregs[b]`.
    I32StoreRegisterPointer = 5, "i32_store*", 3;
    /// `iregs[b] = inputs[a][iregs[c] + d]`.
    I32LoadInputPointer = 6, "i32_load_input*", 4;
    /// `inputs[a][iregs[b] + d] = iregs[c]`.
    I32StoreInputPointer = 7, "i32_store_input*", 4;
    /// `fregs[a..a+4] = rgba8(inputs[b], u = iregs[c], v = iregs[c+1])`.
    I32TextureLoad = 8, "i32_texture_load", 3;
    /// Calls extern `a`; return value at register `b`, arguments packed after it.
    I32ExternCall = 9, "i32_extern_call", 2;
    I32Add = 10, "i32_add", 3;
    I32Sub = 11, "i32_sub", 3;
    I32Mul = 12, "i32_mul", 3;
    I32Div = 13, "i32_div", 3;
    /// Remainder; `x % 0 == 0`.
    I32Mod = 14, "i32_mod", 3;
    /// `iregs[a] = iregs[b] + iregs[c] * iregs[d]`.
    I32Mad = 15, "i32_mad", 4;
    I32Min = 16, "i32_min", 3;
    I32Max = 17, "i32_max", 3;
    F32Add = 18, "f32_add", 3;
    F32Sub = 19, "f32_sub", 3;
    F32Mul = 20, "f32_mul", 3;
    F32Div = 21, "f32_div", 3;
    /// `fmod`.
    F32Mod = 22, "f32_mod", 3;
    U32LessThan = 23, "u32_lt", 3;
    U32GreaterThanEqual = 24, "u32_ge", 3;
    I32LessThan = 25, "i32_lt", 3;
    I32GreaterThanEqual = 26, "i32_ge", 3;
    I32Equal = 27, "i32_equal", 3;
    I32NotEqual = 28, "i32_not_equal", 3;
    I32Not = 29, "i32_not", 2;
    /// Stores `0.0`/`1.0` into the float lane.
    F32LessThan = 30, "f32_lt", 3;
    /// Stores `0.0`/`1.0` into the float lane.
    F32GreaterThanEqual = 31, "f32_ge", 3;
    I32LogicalOr = 32, "i32_logical_or", 3;
    I32LogicalAnd = 33, "i32_logical_and", 3;
    /// `x - floor(x)`.
    F32Frac = 34, "f32_frac", 2;
    F32Floor = 35, "f32_floor", 2;
    F32Ceil = 36, "f32_ceil", 2;
    F32Sin = 37, "f32_sin", 2;
    F32Cos = 38, "f32_cos", 2;
    F32Abs = 39, "f32_abs", 2;
    F32Sqrt = 40, "f32_sqrt", 2;
    F32Pow = 41, "f32_pow", 3;
    F32Min = 42, "f32_min", 3;
    F32Max = 43, "f32_max", 3;
    U32ToF32 = 44, "u32_to_f32", 2;
    I32ToF32 = 45, "i32_to_f32", 2;
    F32ToU32 = 46, "f32_to_u32", 2;
    F32ToI32 = 47, "f32_to_i32", 2;
    /// `pc = a`.
    Jump = 48, "jump", 1;
    /// Skips the next instruction (always a `Jump`) when `iregs[a] != 0`.
    JumpIf = 49, "jump_if", 1;
    /// Halts and returns `iregs[0]`.
    Ret = 50, "ret", 0;
}

impl Opcode {
    pub fn from_mnemonic(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.mnemonic() == s)
    }
}
