#![no_main]

use libfuzzer_sys::fuzz_target;
use lunatrace_bytecode::disasm::disasm_instruction;
use lunatrace_bytecode::{Constant, Instruction, Proto};
use lunatrace_vm::names::{find_set_reg, get_func_name, get_obj_name};

fuzz_target!(|data: &[u8]| {
    // Name resolution over arbitrary bytecode must never panic; "unknown" is fine.
    let Some((&shape, body)) = data.split_first() else {
        return;
    };
    let mut p = Proto::with_source("=fuzz");
    p.max_stack_size = 255;
    for i in 0..(shape & 0x7) {
        p.add_constant(Constant::String(format!("k{i}").into()));
    }
    p.add_constant(Constant::Integer(i64::from(shape)));
    p.add_upvalue(Some("_ENV"), true, 0);
    if shape & 0x8 != 0 {
        p.add_upvalue(None, false, 1);
    }
    for word in body.chunks_exact(4) {
        let raw = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
        p.emit(Instruction(raw), 1);
    }
    let len = p.code.len() as u32;
    p.add_local("v", 0, len / 2);
    p.add_local("w", u32::from(shape >> 4), len);

    for pc in 0..=p.code.len() {
        let _ = get_func_name(&p, pc);
        let _ = disasm_instruction(&p, pc);
        for reg in [0, 1, 2, u32::from(shape), 255] {
            let _ = get_obj_name(&p, pc, reg);
            let _ = find_set_reg(&p, pc, reg);
        }
    }
});
