//! lunatrace virtual machine state: call-stack shadowing, execution hooks,
//! symbolic name resolution and the typed reflection API.
//!
//! The instruction dispatch loop lives outside this crate. An interpreter
//! reports its activity through [`Vm::on_call_script`],
//! [`Vm::on_instruction`] and [`Vm::on_return`], and executes script
//! closures for the VM through the [`Interpreter`] trait.

pub mod callinfo;
pub mod config;
pub mod error;
pub mod hook;
pub mod info;
pub mod metamethod;
pub mod names;
pub mod reflect;
pub mod thread;
pub mod vm;

pub use callinfo::{CallFrame, CallStack};
pub use config::DebugConfig;
pub use error::{ConfigError, LuaError, LuaResult};
pub use hook::{HookEvent, HookInfo, HookMask};
pub use info::{DebugInfo, FunctionKind, InfoFlags};
pub use names::{NameKind, NameWhat};
pub use reflect::FrameTarget;
pub use thread::{LuaThread, ThreadRef};
pub use vm::{Interpreter, TypeMetatables, Vm};
