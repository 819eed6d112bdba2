//! lunatrace standard library: the `debug` library table.

pub mod debug_lib;

use lunatrace_core::{GcIdx, Table};
use lunatrace_vm::Vm;
use std::sync::Arc;

/// Register every library this crate provides into the VM's globals.
pub fn register_all(vm: &Arc<Vm>) -> GcIdx<Table> {
    debug_lib::register(vm)
}
