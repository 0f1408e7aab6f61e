use fxvm::asm::Assembler;
use fxvm::{
    create_uav, Bundle, Dim3, Opcode, RegisterFile, VmError, SV_DISPATCH_THREAD_ID,
    SV_GROUP_ID, SV_GROUP_INDEX, SV_GROUP_THREAD_ID,
};
use pretty_assertions::assert_eq;

/// `out[DTid.x] = inputs[sv_slot][component]`.
fn store_system_value(out_slot: u32, sv_slot: u32, component: u32) -> Bundle {
    let mut asm = Assembler::new();
    asm.emit(Opcode::I32LoadInput, &[SV_DISPATCH_THREAD_ID, 1, 0]);
    asm.emit(Opcode::I32LoadInput, &[sv_slot, 2, component]);
    // Element i lives at word i + 1; word 0 is the counter.
    asm.emit(Opcode::I32StoreInputPointer, &[out_slot, 1, 2, 1]);
    asm.set_i32(0, 0);
    asm.ret();
    Bundle::load("sv", &asm.to_writer().finish()).unwrap()
}

#[test]
fn every_thread_runs_once() {
    let out = create_uav("out", 4, 8, 0).unwrap();
    let mut bundle = store_system_value(out.index, SV_DISPATCH_THREAD_ID, 0);
    bundle.bind_uav(&out).unwrap();

    let mut regs = RegisterFile::new(16);
    let invocations = bundle
        .dispatch(&mut regs, Dim3::new(2, 1, 1), Dim3::new(4, 1, 1))
        .unwrap();
    assert_eq!(invocations, 8);
    assert_eq!(out.data.to_words(), (0..8).collect::<Vec<u32>>());

    let stats = bundle.stats();
    assert_eq!(stats.dispatches, 1);
    assert_eq!(stats.plays, 8);
    assert_eq!(stats.faults, 0);
}

#[test]
fn group_values_follow_iteration_order() {
    let group_ids = create_uav("gid", 4, 8, 0).unwrap();
    let thread_ids = create_uav("tid", 4, 8, 1).unwrap();
    let indices = create_uav("gi", 4, 8, 2).unwrap();

    for (uav, sv) in [
        (&group_ids, SV_GROUP_ID),
        (&thread_ids, SV_GROUP_THREAD_ID),
        (&indices, SV_GROUP_INDEX),
    ] {
        let mut bundle = store_system_value(uav.index, sv, 0);
        bundle.bind_uav(uav).unwrap();
        bundle
            .dispatch(&mut RegisterFile::new(16), Dim3::new(2, 1, 1), Dim3::new(4, 1, 1))
            .unwrap();
    }

    assert_eq!(group_ids.data.to_words(), vec![0, 0, 0, 0, 1, 1, 1, 1]);
    assert_eq!(thread_ids.data.to_words(), vec![0, 1, 2, 3, 0, 1, 2, 3]);
    assert_eq!(indices.data.to_words(), vec![0, 1, 2, 3, 0, 1, 2, 3]);
}

#[test]
fn multi_dimensional_dispatch_ids() {
    // One group of 2x2x2 threads.
    let mut asm = Assembler::new();
    asm.emit(Opcode::I32LoadInput, &[SV_GROUP_INDEX, 1, 0]);
    asm.emit(Opcode::I32LoadInput, &[SV_DISPATCH_THREAD_ID, 2, 2]);
    asm.emit(Opcode::I32LoadInput, &[SV_DISPATCH_THREAD_ID, 3, 1]);
    asm.set_i32(4, 2);
    asm.emit(Opcode::I32Mad, &[5, 3, 2, 4]);
    let out = create_uav("out", 4, 8, 0).unwrap();
    asm.emit(Opcode::I32StoreInputPointer, &[out.index, 1, 5, 1]);
    asm.ret();

    let mut bundle = Bundle::load("zyx", &asm.to_writer().finish()).unwrap();
    bundle.bind_uav(&out).unwrap();
    let n = bundle
        .dispatch(&mut RegisterFile::new(16), Dim3::new(1, 1, 1), Dim3::new(2, 2, 2))
        .unwrap();
    assert_eq!(n, 8);
    // y + 2 * z, written at tz * 4 + ty * 2 + tx.
    assert_eq!(out.data.to_words(), vec![0, 0, 1, 1, 2, 2, 3, 3]);
}

#[test]
fn dispatch_thread_id_spans_groups() {
    let groups = [2u32, 2, 2];
    let threads = [2u32, 1, 3];
    let per_group = threads.iter().product::<u32>();
    let total = (groups.iter().product::<u32>() * per_group) as usize;

    // Slot = flattened group id * threads per group + group index, so the
    // store position does not depend on DTid itself.
    let mut asm = Assembler::new();
    asm.emit(Opcode::I32LoadInput, &[SV_GROUP_ID, 1, 0]);
    asm.emit(Opcode::I32LoadInput, &[SV_GROUP_ID, 2, 1]);
    asm.emit(Opcode::I32LoadInput, &[SV_GROUP_ID, 3, 2]);
    asm.emit(Opcode::I32LoadInput, &[SV_GROUP_INDEX, 4, 0]);
    asm.set_i32(5, 2);
    asm.emit(Opcode::I32Mad, &[6, 2, 3, 5]);
    asm.emit(Opcode::I32Mad, &[7, 1, 6, 5]);
    asm.set_u32(8, per_group);
    asm.emit(Opcode::I32Mad, &[9, 4, 7, 8]);
    let outs: Vec<_> = (0..3)
        .map(|slot| create_uav("dtid", 4, total as u32, slot).unwrap())
        .collect();
    for (component, out) in outs.iter().enumerate() {
        asm.emit(Opcode::I32LoadInput, &[SV_DISPATCH_THREAD_ID, 10, component as u32]);
        asm.emit(Opcode::I32StoreInputPointer, &[out.index, 9, 10, 1]);
    }
    asm.set_i32(0, 0);
    asm.ret();

    let mut bundle = Bundle::load("dtid", &asm.to_writer().finish()).unwrap();
    for out in &outs {
        bundle.bind_uav(out).unwrap();
    }
    let n = bundle
        .dispatch(
            &mut RegisterFile::new(16),
            Dim3::new(groups[0], groups[1], groups[2]),
            Dim3::new(threads[0], threads[1], threads[2]),
        )
        .unwrap();
    assert_eq!(n, total as u64);

    let mut expected = vec![vec![0u32; total]; 3];
    for gz in 0..groups[2] {
        for gy in 0..groups[1] {
            for gx in 0..groups[0] {
                for tz in 0..threads[2] {
                    for ty in 0..threads[1] {
                        for tx in 0..threads[0] {
                            let group = (gz * groups[1] + gy) * groups[0] + gx;
                            let index = (tz * threads[1] + ty) * threads[0] + tx;
                            let slot = (group * per_group + index) as usize;
                            let (g, t) = ([gx, gy, gz], [tx, ty, tz]);
                            for k in 0..3 {
                                expected[k][slot] = g[k] * threads[k] + t[k];
                            }
                        }
                    }
                }
            }
        }
    }
    for (component, out) in outs.iter().enumerate() {
        assert_eq!(out.data.to_words(), expected[component], "DTid component {component}");
    }
}

#[test]
fn fault_reports_coordinates() {
    let mut asm = Assembler::new();
    asm.emit(Opcode::I32LoadInput, &[SV_DISPATCH_THREAD_ID, 1, 0]);
    asm.set_i32(2, 5);
    asm.emit(Opcode::I32Sub, &[3, 1, 2]);
    asm.set_i32(4, 10);
    asm.emit(Opcode::I32Div, &[0, 4, 3]);
    asm.ret();

    let mut bundle = Bundle::load("fault", &asm.to_writer().finish()).unwrap();
    let err = bundle
        .dispatch(&mut RegisterFile::new(16), Dim3::new(2, 1, 1), Dim3::new(4, 1, 1))
        .unwrap_err();
    assert_eq!(
        err,
        VmError::Dispatch {
            group: [1, 0, 0],
            thread: [1, 0, 0],
            source: Box::new(VmError::DivideByZero { pc: 4 }),
        }
    );
    assert_eq!(err.root(), &VmError::DivideByZero { pc: 4 });
    assert_eq!(
        err.to_string(),
        "fault in group [1, 0, 0] thread [1, 0, 0]: integer division by zero at pc 4"
    );

    let stats = bundle.stats();
    assert_eq!(stats.plays, 6);
    assert_eq!(stats.faults, 1);
}

#[test]
fn empty_grid_runs_nothing() {
    let mut asm = Assembler::new();
    asm.set_i32(0, 0);
    asm.ret();
    let mut bundle = Bundle::load("empty", &asm.to_writer().finish()).unwrap();
    let n = bundle
        .dispatch(&mut RegisterFile::new(16), Dim3::new(0, 4, 4), Dim3::new(8, 1, 1))
        .unwrap();
    assert_eq!(n, 0);
    assert_eq!(bundle.stats().plays, 0);
}
