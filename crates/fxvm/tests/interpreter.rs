use fxvm::asm::Assembler;
use fxvm::format::{BundleWriter, ConstantPool};
use fxvm::texture::pack_rgba8;
use fxvm::{
    create_texture_memory, create_texture_view, Bundle, Opcode, RegisterFile, Space, VmError,
};
use pretty_assertions::assert_eq;

fn load(asm: &Assembler) -> Bundle {
    Bundle::load("test", &asm.to_writer().finish()).expect("program should load")
}

fn play(asm: &Assembler) -> (Result<i32, VmError>, RegisterFile) {
    let mut bundle = load(asm);
    let mut regs = RegisterFile::new(64);
    let res = bundle.play(&mut regs);
    (res, regs)
}

#[test]
fn set_const_keeps_raw_bits() {
    let mut asm = Assembler::new();
    // Smallest positive denormal; must survive without flushing.
    asm.set_u32(1, 0x0000_0001);
    asm.set_f32(2, f32::from_bits(0x0000_0001));
    asm.set_u32(3, 0x7fc0_1234);
    asm.emit(Opcode::I32LoadRegister, &[0, 1]);
    asm.ret();

    let (res, regs) = play(&asm);
    assert_eq!(res.unwrap(), 1);
    assert_eq!(regs.u32(2).unwrap(), 1);
    assert_eq!(regs.u32(3).unwrap(), 0x7fc0_1234);
}

#[test]
fn jump_if_pair_returns_either_way() {
    let mut asm = Assembler::new();
    asm.emit(Opcode::JumpIf, &[0]);
    asm.jump(2);
    asm.ret();

    for r0 in [0, 5] {
        let mut bundle = load(&asm);
        let mut regs = RegisterFile::new(16);
        regs.set_i32(0, r0).unwrap();
        assert_eq!(bundle.play(&mut regs).unwrap(), r0);
    }
}

#[test]
fn jump_if_skips_the_paired_jump() {
    let mut asm = Assembler::new();
    let exit = asm.branch_if_zero(0, 0);
    asm.set_i32(0, 100);
    asm.ret();
    let zero_path = asm.set_i32(0, 200);
    asm.ret();
    asm.patch_jump(exit, zero_path);

    let mut bundle = load(&asm);
    let mut regs = RegisterFile::new(16);
    regs.set_i32(0, 5).unwrap();
    assert_eq!(bundle.play(&mut regs).unwrap(), 100);

    regs.set_i32(0, 0).unwrap();
    assert_eq!(bundle.play(&mut regs).unwrap(), 200);
}

#[test]
fn counting_loop() {
    let mut asm = Assembler::new();
    asm.set_i32(0, 0);
    asm.set_i32(1, 0);
    asm.set_i32(2, 10);
    asm.set_i32(3, 1);
    let top = asm.emit(Opcode::I32Add, &[1, 1, 3]);
    asm.emit(Opcode::I32Add, &[0, 0, 1]);
    asm.emit(Opcode::I32LessThan, &[4, 1, 2]);
    let exit = asm.branch_if_zero(4, 0);
    asm.jump(top);
    let end = asm.ret();
    asm.patch_jump(exit, end);

    let (res, _) = play(&asm);
    assert_eq!(res.unwrap(), 55);
}

#[test]
fn integer_arithmetic_wraps() {
    let mut asm = Assembler::new();
    asm.set_i32(1, i32::MAX);
    asm.set_i32(2, 1);
    asm.emit(Opcode::I32Add, &[0, 1, 2]);
    asm.set_i32(3, -7);
    asm.set_i32(4, 2);
    asm.emit(Opcode::I32Div, &[5, 3, 4]);
    asm.emit(Opcode::I32Mod, &[6, 3, 4]);
    asm.emit(Opcode::I32Mad, &[7, 2, 3, 4]);
    asm.set_i32(8, i32::MIN);
    asm.set_i32(9, -1);
    asm.emit(Opcode::I32Div, &[10, 8, 9]);
    asm.ret();

    let (res, regs) = play(&asm);
    assert_eq!(res.unwrap(), i32::MIN);
    assert_eq!(regs.i32(5).unwrap(), -3);
    assert_eq!(regs.i32(6).unwrap(), -1);
    assert_eq!(regs.i32(7).unwrap(), -13);
    assert_eq!(regs.i32(10).unwrap(), i32::MIN);
}

#[test]
fn divide_by_zero_faults_but_mod_is_zero() {
    let mut asm = Assembler::new();
    asm.set_i32(1, 7);
    asm.set_i32(2, 0);
    asm.emit(Opcode::I32Mod, &[3, 1, 2]);
    asm.emit(Opcode::I32Div, &[0, 1, 2]);
    asm.ret();

    let (res, regs) = play(&asm);
    assert_eq!(res.unwrap_err(), VmError::DivideByZero { pc: 3 });
    assert_eq!(regs.i32(3).unwrap(), 0);
}

#[test]
fn float_ops_and_conversions() {
    let mut asm = Assembler::new();
    asm.set_f32(1, 1.5);
    asm.set_f32(2, 2.0);
    asm.emit(Opcode::F32Mul, &[3, 1, 2]);
    asm.emit(Opcode::F32ToI32, &[0, 3]);
    asm.emit(Opcode::F32LessThan, &[4, 1, 2]);
    asm.emit(Opcode::F32GreaterThanEqual, &[5, 1, 2]);
    asm.set_f32(6, 2.75);
    asm.emit(Opcode::F32Frac, &[7, 6]);
    asm.emit(Opcode::F32Pow, &[8, 2, 2]);
    asm.set_i32(9, -3);
    asm.emit(Opcode::I32ToF32, &[10, 9]);
    asm.ret();

    let (res, regs) = play(&asm);
    assert_eq!(res.unwrap(), 3);
    assert_eq!(regs.f32(4).unwrap(), 1.0);
    assert_eq!(regs.f32(5).unwrap(), 0.0);
    assert_eq!(regs.f32(7).unwrap(), 0.75);
    assert_eq!(regs.f32(8).unwrap(), 4.0);
    assert_eq!(regs.f32(10).unwrap(), -3.0);
}

/// Runs `op r3, r1, r2` with raw register bits and returns `r3`.
fn eval(op: Opcode, b: u32, c: u32) -> u32 {
    let mut asm = Assembler::new();
    asm.set_u32(1, b);
    asm.set_u32(2, c);
    asm.emit(op, &[3, 1, 2]);
    asm.ret();
    let (res, regs) = play(&asm);
    res.unwrap();
    regs.u32(3).unwrap()
}

fn f(v: f32) -> u32 {
    v.to_bits()
}

fn i(v: i32) -> u32 {
    v as u32
}

#[test]
fn lane_ops_table() {
    let nan = f32::NAN;
    #[rustfmt::skip]
    let cases: &[(Opcode, u32, u32, u32)] = &[
        (Opcode::F32Sub, f(5.5), f(2.0), f(3.5)),
        (Opcode::F32Div, f(7.0), f(2.0), f(3.5)),
        (Opcode::F32Div, f(1.0), f(0.0), f(f32::INFINITY)),
        (Opcode::F32Mod, f(9.0), f(-2.25), f(0.0)),
        (Opcode::F32Mod, f(-7.5), f(2.0), f(-1.5)),
        (Opcode::U32GreaterThanEqual, i(-1), 1, 1),
        (Opcode::U32GreaterThanEqual, 1, i(-1), 0),
        (Opcode::I32GreaterThanEqual, i(-1), 1, 0),
        (Opcode::I32GreaterThanEqual, 3, 3, 1),
        (Opcode::I32Equal, 3, 3, 1),
        (Opcode::I32Equal, 3, 4, 0),
        (Opcode::F32Floor, f(-2.25), 0, f(-3.0)),
        (Opcode::F32Ceil, f(-2.25), 0, f(-2.0)),
        (Opcode::F32Sin, f(0.0), 0, f(0.0)),
        (Opcode::F32Cos, f(0.0), 0, f(1.0)),
        (Opcode::F32Abs, f(-2.25), 0, f(2.25)),
        (Opcode::F32Sqrt, f(9.0), 0, f(3.0)),
        (Opcode::F32Min, f(-2.25), f(9.0), f(-2.25)),
        (Opcode::F32Max, f(-2.25), f(9.0), f(9.0)),
        // NaN operands: min picks `c`, max picks `b`.
        (Opcode::F32Min, f(1.0), f(nan), f(nan)),
        (Opcode::F32Max, f(1.0), f(nan), f(1.0)),
        (Opcode::F32Max, f(nan), f(1.0), f(nan)),
        (Opcode::I32Min, i(-1), 9, i(-1)),
        (Opcode::I32Max, i(-1), 9, 9),
        (Opcode::U32ToF32, u32::MAX, 0, f(4_294_967_296.0)),
        (Opcode::F32ToU32, f(-2.25), 0, 0),
        (Opcode::F32ToU32, f(1e10), 0, u32::MAX),
        (Opcode::F32ToU32, f(nan), 0, 0),
        (Opcode::F32ToI32, f(-2.75), 0, i(-2)),
        (Opcode::F32ToI32, f(1e10), 0, i(i32::MAX)),
    ];

    for &(op, b, c, expected) in cases {
        let got = eval(op, b, c);
        assert_eq!(
            got,
            expected,
            "{}({b:#x}, {c:#x}) = {got:#x} ({}), expected {expected:#x} ({})",
            op.mnemonic(),
            f32::from_bits(got),
            f32::from_bits(expected)
        );
    }
}

#[test]
fn comparisons_produce_zero_or_one() {
    let mut asm = Assembler::new();
    asm.set_i32(1, -1);
    asm.set_i32(2, 1);
    asm.emit(Opcode::I32LessThan, &[3, 1, 2]);
    // 0xffffffff is the larger unsigned value.
    asm.emit(Opcode::U32LessThan, &[4, 1, 2]);
    asm.emit(Opcode::I32Not, &[5, 2]);
    asm.emit(Opcode::I32LogicalAnd, &[6, 1, 2]);
    asm.emit(Opcode::I32LogicalOr, &[7, 5, 5]);
    asm.emit(Opcode::I32NotEqual, &[0, 1, 2]);
    asm.ret();

    let (res, regs) = play(&asm);
    assert_eq!(res.unwrap(), 1);
    assert_eq!(regs.i32(3).unwrap(), 1);
    assert_eq!(regs.i32(4).unwrap(), 0);
    assert_eq!(regs.i32(5).unwrap(), 0);
    assert_eq!(regs.i32(6).unwrap(), 1);
    assert_eq!(regs.i32(7).unwrap(), 0);
}

#[test]
fn register_pointers() {
    let mut asm = Assembler::new();
    asm.set_i32(1, 8);
    asm.set_i32(2, 1234);
    asm.emit(Opcode::I32StoreRegisterPointer, &[1, 2, 2]);
    asm.emit(Opcode::I32LoadRegistersPointer, &[0, 1, 2]);
    asm.ret();

    let (res, regs) = play(&asm);
    assert_eq!(res.unwrap(), 1234);
    assert_eq!(regs.i32(10).unwrap(), 1234);
}

#[test]
fn register_pointer_out_of_range_faults() {
    let mut asm = Assembler::new();
    asm.set_i32(1, 100);
    asm.emit(Opcode::I32LoadRegistersPointer, &[0, 1, 0]);
    asm.ret();

    let mut bundle = load(&asm);
    let mut regs = RegisterFile::new(16);
    assert_eq!(
        bundle.play(&mut regs).unwrap_err(),
        VmError::IndexOutOfRange {
            space: Space::Register,
            index: 100,
            len: 16
        }
    );

    // Negative pointers never wrap around.
    let mut asm = Assembler::new();
    asm.set_i32(1, -1);
    asm.emit(Opcode::I32StoreRegisterPointer, &[1, 0, 0]);
    asm.ret();
    let err = load(&asm).play(&mut regs).unwrap_err();
    assert!(matches!(err, VmError::IndexOutOfRange { index: -1, .. }), "{err}");
}

#[test]
fn unbound_input_faults() {
    let mut asm = Assembler::new();
    asm.emit(Opcode::I32LoadInput, &[5, 0, 0]);
    asm.ret();

    let (res, _) = play(&asm);
    assert_eq!(res.unwrap_err(), VmError::UnboundInput { slot: 5 });
}

#[test]
fn input_memory_round_trip() {
    let mut asm = Assembler::new();
    asm.set_i32(1, 2);
    asm.set_i32(2, 77);
    asm.emit(Opcode::I32StoreInputPointer, &[5, 1, 2, 1]);
    asm.emit(Opcode::I32LoadInputPointer, &[5, 0, 1, 0]);
    asm.emit(Opcode::I32StoreInput, &[5, 0, 0]);
    asm.ret();

    let mut bundle = load(&asm);
    let memory = fxvm::MemoryView::from_words(&[0, 10, 20, 0]);
    bundle.set_input(5, memory.clone()).unwrap();
    let mut regs = RegisterFile::new(16);
    assert_eq!(bundle.play(&mut regs).unwrap(), 20);
    assert_eq!(memory.to_words(), vec![20, 10, 20, 77]);

    memory.write_u32(2, 30).unwrap();
    assert_eq!(bundle.play(&mut regs).unwrap(), 30);
}

#[test]
fn input_index_out_of_range_faults() {
    let mut asm = Assembler::new();
    asm.emit(Opcode::I32LoadInput, &[5, 0, 4]);
    asm.ret();

    let mut bundle = load(&asm);
    bundle.set_input(5, fxvm::MemoryView::zeroed(4)).unwrap();
    let err = bundle.play(&mut RegisterFile::new(16)).unwrap_err();
    assert_eq!(
        err,
        VmError::IndexOutOfRange {
            space: Space::Input(5),
            index: 4,
            len: 4
        }
    );
    assert_eq!(err.to_string(), "input slot 5 index 4 out of range (length 4)");
}

#[test]
fn unknown_opcode_faults_at_execution() {
    let bytes = BundleWriter::new()
        .code(&[99, 0, 0, 0, 0, Opcode::Ret as u32, 0, 0, 0, 0])
        .finish();
    let mut bundle = Bundle::load("bad-op", &bytes).expect("unknown opcodes load");

    let err = bundle.play(&mut RegisterFile::new(16)).unwrap_err();
    assert_eq!(err, VmError::IllegalInstruction { pc: 0, opcode: 99 });
    assert_eq!(bundle.stats().faults, 1);
}

#[test]
fn running_off_the_end_faults() {
    let mut asm = Assembler::new();
    asm.set_i32(0, 1);

    let (res, _) = play(&asm);
    assert_eq!(
        res.unwrap_err(),
        VmError::ProgramCounterOutOfRange { pc: 1, len: 1 }
    );
}

#[test]
fn reads_named_constants() {
    let mut pool = ConstantPool::new();
    pool.float("scale", 0.5);
    let foo = pool.int("foo", 41);

    let mut asm = Assembler::new();
    asm.emit(Opcode::I32LoadInput, &[0, 0, foo / 4]);
    asm.ret();
    let bytes = pool.apply(asm.to_writer()).finish();

    let mut bundle = Bundle::load("constants", &bytes).unwrap();
    let mut regs = RegisterFile::new(16);
    assert_eq!(bundle.play(&mut regs).unwrap(), 41);

    assert!(bundle.set_constant("foo", &42i32.to_le_bytes()));
    assert_eq!(bundle.play(&mut regs).unwrap(), 42);
    assert_eq!(bundle.constant("foo").unwrap(), 42i32.to_le_bytes());
    assert_eq!(bundle.constant("scale").unwrap(), 0.5f32.to_le_bytes());
}

fn texture_program() -> Assembler {
    let tex = create_texture_view("albedo", 0).unwrap();
    let mut asm = Assembler::new();
    asm.emit(Opcode::I32TextureLoad, &[4, tex.index, 8]);
    asm.ret();
    asm
}

#[test]
fn texture_load_unpacks_rgba8() {
    let asm = texture_program();
    let mut bundle = load(&asm);
    let view = create_texture_view("albedo", 0).unwrap();
    let texels = [
        0,
        0,
        0,
        pack_rgba8([0.0, 1.0, 0.0, 1.0]),
    ];
    bundle
        .bind_resource(&view, create_texture_memory(2, 2, &texels))
        .unwrap();

    let mut regs = RegisterFile::new(16);
    regs.set_i32(8, 1).unwrap();
    regs.set_i32(9, 1).unwrap();
    bundle.play(&mut regs).unwrap();
    let rgba: Vec<f32> = (4..8).map(|r| regs.f32(r).unwrap()).collect();
    assert_eq!(rgba, vec![0.0, 1.0, 0.0, 1.0]);

    regs.set_i32(8, 2).unwrap();
    let err = bundle.play(&mut regs).unwrap_err();
    assert!(
        matches!(err, VmError::IndexOutOfRange { space: Space::Input(33), .. }),
        "{err}"
    );
}
