#![cfg(not(target_arch = "wasm32"))]

use std::fs;

use fxvm::asm::Assembler;
use fxvm::format::ConstantPool;
use fxvm::{Opcode, SV_DISPATCH_THREAD_ID, UAV0_REGISTER};
use predicates::prelude::*;
use tempfile::tempdir;

const LISTING: &str = "\
0000: i32_set r1 20
0001: i32_set r2 22
0002: i32_add r0 r1 r2
0003: ret
";

#[test]
fn assemble_disassemble_and_play() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("add.s");
    let out = dir.path().join("add.fxb");
    fs::write(&src, LISTING).unwrap();

    assert_cmd::cargo::cargo_bin_cmd!("fxvm")
        .args(["asm", src.to_str().unwrap(), "-o", out.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote 4 instructions"));

    assert_cmd::cargo::cargo_bin_cmd!("fxvm")
        .args(["disasm", out.to_str().unwrap()])
        .assert()
        .success()
        .stdout(LISTING);

    assert_cmd::cargo::cargo_bin_cmd!("fxvm")
        .args(["run", out.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("returned 42"));
}

#[test]
fn asm_rejects_unknown_mnemonics() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("bad.s");
    fs::write(&src, "i32_frobnicate r0\n").unwrap();

    assert_cmd::cargo::cargo_bin_cmd!("fxvm")
        .args([
            "asm",
            src.to_str().unwrap(),
            "-o",
            dir.path().join("bad.fxb").to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown mnemonic"));
}

#[test]
fn run_dispatch_with_uav_and_constants() {
    let mut pool = ConstantPool::new();
    let scale = pool.int("scale", 1);

    // out[DTid.x] = DTid.x * scale
    let mut asm = Assembler::new();
    asm.emit(Opcode::I32LoadInput, &[SV_DISPATCH_THREAD_ID, 1, 0]);
    asm.emit(Opcode::I32LoadInput, &[0, 2, scale / 4]);
    asm.emit(Opcode::I32Mul, &[3, 1, 2]);
    asm.emit(Opcode::I32StoreInputPointer, &[UAV0_REGISTER, 1, 3, 1]);
    asm.ret();
    let bytes = pool.apply(asm.to_writer()).finish();

    let dir = tempdir().unwrap();
    let path = dir.path().join("scale.fxb");
    fs::write(&path, bytes).unwrap();

    assert_cmd::cargo::cargo_bin_cmd!("fxvm")
        .args(["info", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("scale").and(predicate::str::contains("instructions: 5")));

    assert_cmd::cargo::cargo_bin_cmd!("fxvm")
        .args([
            "run",
            path.to_str().unwrap(),
            "--uav",
            "out:4:4:0",
            "--set",
            "scale=int:3",
            "--groups",
            "1",
            "--threads",
            "4",
            "--dump",
        ])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("dispatched 4 invocations")
                .and(predicate::str::contains("uav out: counter 0"))
                .and(predicate::str::contains(
                    "00 00 00 00 03 00 00 00 06 00 00 00 09 00 00 00 ...",
                )),
        );

    assert_cmd::cargo::cargo_bin_cmd!("fxvm")
        .args(["run", path.to_str().unwrap(), "--set", "missing=int:1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no constant named"));
}
