//! lunatrace bytecode: instruction encoding, function prototypes, and disassembly.

pub mod disasm;
pub mod opcode;
pub mod proto;

pub use opcode::{Instruction, OpCode};
pub use proto::{Constant, LocalVar, Proto, UpvalDesc};
