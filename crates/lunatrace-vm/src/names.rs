//! Symbolic name resolution over bytecode.
//!
//! Recovers a human-readable name for the value a register holds at a given
//! instruction by scanning backwards for the instruction that last wrote it.
//! Nothing is executed, and malformed bytecode yields no name rather than a
//! panic.

use crate::metamethod::TagMethod;
use lunatrace_bytecode::opcode::{index_k, is_k};
use lunatrace_bytecode::{Instruction, OpCode, Proto};
use std::fmt;

/// Name of the upvalue table that holds globals.
pub const ENV_NAME: &str = "_ENV";

/// Nesting bound for register-to-register and key resolution.
const MAX_RESOLVE_DEPTH: u32 = 200;

/// How a resolved name was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NameKind {
    Global,
    Local,
    Method,
    Field,
    Upvalue,
    Constant,
    Metamethod,
    ForIterator,
}

impl NameKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NameKind::Global => "global",
            NameKind::Local => "local",
            NameKind::Method => "method",
            NameKind::Field => "field",
            NameKind::Upvalue => "upvalue",
            NameKind::Constant => "constant",
            NameKind::Metamethod => "metamethod",
            NameKind::ForIterator => "for iterator",
        }
    }
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved (name, kind) pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameWhat {
    pub name: String,
    pub kind: NameKind,
}

impl NameWhat {
    fn new(name: impl Into<String>, kind: NameKind) -> Self {
        NameWhat {
            name: name.into(),
            kind,
        }
    }
}

/// Name of the function called by the instruction at `pc`.
pub fn get_func_name(proto: &Proto, pc: usize) -> Option<NameWhat> {
    let inst = *proto.code.get(pc)?;
    match inst.try_opcode()? {
        OpCode::Call | OpCode::TailCall => get_obj_name(proto, pc, inst.a()),
        OpCode::TForCall => Some(NameWhat::new("for iterator", NameKind::ForIterator)),
        op => TagMethod::for_opcode(op).map(|tm| NameWhat::new(tm.name(), NameKind::Metamethod)),
    }
}

/// Name of the value held by register `reg` (0-based) at instruction `last_pc`.
pub fn get_obj_name(proto: &Proto, last_pc: usize, reg: u32) -> Option<NameWhat> {
    obj_name(proto, last_pc, reg, 0)
}

fn obj_name(proto: &Proto, last_pc: usize, reg: u32, depth: u32) -> Option<NameWhat> {
    if let Some(name) = proto.local_name(reg as usize + 1, last_pc) {
        return Some(NameWhat::new(&**name, NameKind::Local));
    }
    if depth >= MAX_RESOLVE_DEPTH {
        return None;
    }

    let pc = find_set_reg(proto, last_pc, reg)?;
    let inst = proto.code[pc];
    match inst.try_opcode()? {
        OpCode::Move => {
            let (a, b) = (inst.a(), inst.b());
            // Only follow moves from a lower register, which cannot loop.
            if b < a {
                obj_name(proto, pc, b, depth + 1)
            } else {
                None
            }
        }
        op @ (OpCode::GetTabUp | OpCode::GetTable) => {
            let t = inst.b();
            let table_name = if op == OpCode::GetTable {
                proto.local_name(t as usize + 1, pc).map(|s| &**s)
            } else {
                match proto.upvalues.get(t as usize) {
                    Some(up) => up.name.as_deref(),
                    None => Some("?"),
                }
            };
            let key = key_name(proto, pc, inst.c(), depth + 1);
            let kind = if table_name == Some(ENV_NAME) {
                NameKind::Global
            } else {
                NameKind::Field
            };
            Some(NameWhat::new(key, kind))
        }
        OpCode::GetUpval => {
            let name = proto
                .upvalues
                .get(inst.b() as usize)
                .and_then(|up| up.name.as_deref())
                .unwrap_or("?");
            Some(NameWhat::new(name, NameKind::Upvalue))
        }
        op @ (OpCode::LoadK | OpCode::LoadKX) => {
            let k = if op == OpCode::LoadK {
                inst.bx() as usize
            } else {
                proto.code.get(pc + 1)?.ax_field() as usize
            };
            let s = proto.constants.get(k)?.as_str()?;
            Some(NameWhat::new(s, NameKind::Constant))
        }
        OpCode::Self_ => {
            let key = key_name(proto, pc, inst.c(), depth + 1);
            Some(NameWhat::new(key, NameKind::Method))
        }
        _ => None,
    }
}

/// Name of an RK key operand: a string constant names itself; a register
/// is named only if it was loaded from a string constant.
fn key_name(proto: &Proto, pc: usize, c: u32, depth: u32) -> String {
    if is_k(c) {
        if let Some(s) = proto.constants.get(index_k(c)).and_then(|k| k.as_str()) {
            return s.to_string();
        }
    } else if let Some(nw) = obj_name(proto, pc, c, depth) {
        if nw.kind == NameKind::Constant {
            return nw.name;
        }
    }
    "?".to_string()
}

/// Index of the last instruction before `last_pc` that may have written
/// register `reg`.
pub fn find_set_reg(proto: &Proto, last_pc: usize, reg: u32) -> Option<usize> {
    let last_pc = last_pc.min(proto.code.len());
    let mut set_reg = None;
    let mut pc = 0usize;
    while pc < last_pc {
        let inst: Instruction = proto.code[pc];
        let a = inst.a();
        match inst.try_opcode() {
            Some(OpCode::LoadNil) => {
                if a <= reg && reg <= a + inst.b() {
                    set_reg = Some(pc);
                }
            }
            Some(OpCode::TForCall) => {
                if reg >= a + 2 {
                    set_reg = Some(pc);
                }
            }
            Some(OpCode::Call | OpCode::TailCall) => {
                if reg >= a {
                    set_reg = Some(pc);
                }
            }
            Some(OpCode::Jmp) => {
                let dest = pc as i64 + 1 + i64::from(inst.sbx());
                // Take forward jumps that do not skip past the query point.
                if (pc as i64) < dest && dest <= last_pc as i64 {
                    pc = dest as usize - 1;
                }
            }
            Some(OpCode::Test) => {
                if reg == a {
                    set_reg = Some(pc);
                }
            }
            Some(OpCode::SetList) => {
                // C == 0: the real count sits in the next slot
                if inst.c() == 0 {
                    pc += 1;
                }
            }
            Some(op) => {
                if op.test_a_mode() && reg == a {
                    set_reg = Some(pc);
                }
            }
            None => {}
        }
        pc += 1;
    }
    set_reg
}
