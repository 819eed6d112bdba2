//! One-line `luac -l` style rendering of an instruction, used by trace mode.

use crate::opcode::{index_k, is_k, Instruction, InstructionFormat, OpCode};
use crate::proto::Proto;
use std::fmt;

/// Disassemble the instruction at `pc` of `proto`.
pub fn disasm_instruction(proto: &Proto, pc: usize) -> String {
    match proto.code.get(pc) {
        Some(inst) => InstructionListing { inst, proto }.to_string(),
        None => format!("<pc {pc} out of range>"),
    }
}

struct InstructionListing<'a> {
    inst: &'a Instruction,
    proto: &'a Proto,
}

impl InstructionListing<'_> {
    fn rk(&self, f: &mut fmt::Formatter<'_>, x: u32) -> fmt::Result {
        if is_k(x) {
            match self.proto.constants.get(index_k(x)) {
                Some(k) => write!(f, " {k}"),
                None => write!(f, " K?"),
            }
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for InstructionListing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inst = self.inst;
        let Some(op) = inst.try_opcode() else {
            return write!(f, "{inst:?}");
        };
        write!(f, "{:<12}", op.name())?;

        match op.format() {
            InstructionFormat::IABC => {
                write!(f, "{} {} {}", inst.a(), inst.b(), inst.c())?;
                match op {
                    OpCode::GetTabUp => {
                        let up = self.proto.upvalue_name(inst.b() as usize);
                        write!(f, "\t; {}", up.map(|s| &**s).unwrap_or("-"))?;
                        self.rk(f, inst.c())?;
                    }
                    OpCode::SetTabUp => {
                        let up = self.proto.upvalue_name(inst.a() as usize);
                        write!(f, "\t; {}", up.map(|s| &**s).unwrap_or("-"))?;
                        self.rk(f, inst.b())?;
                        self.rk(f, inst.c())?;
                    }
                    OpCode::GetUpval | OpCode::SetUpval => {
                        let up = self.proto.upvalue_name(inst.b() as usize);
                        write!(f, "\t; {}", up.map(|s| &**s).unwrap_or("-"))?;
                    }
                    OpCode::GetTable | OpCode::Self_ => {
                        if is_k(inst.c()) {
                            write!(f, "\t;")?;
                            self.rk(f, inst.c())?;
                        }
                    }
                    _ => {}
                }
            }
            InstructionFormat::IABx => {
                write!(f, "{} {}", inst.a(), inst.bx())?;
                match op {
                    OpCode::LoadK => {
                        if let Some(k) = self.proto.constants.get(inst.bx() as usize) {
                            write!(f, "\t; {k}")?;
                        }
                    }
                    OpCode::Closure => write!(f, "\t; function [{}]", inst.bx())?,
                    _ => {}
                }
            }
            InstructionFormat::IAsBx => {
                write!(f, "{} {}", inst.a(), inst.sbx())?;
                if op == OpCode::Jmp {
                    write!(f, "\t; to +{}", inst.sbx() as i64 + 1)?;
                }
            }
            InstructionFormat::IAx => write!(f, "{}", inst.ax_field())?,
        }
        Ok(())
    }
}
