//! Script threads and their debug state.

use crate::callinfo::CallStack;
use crate::hook::HookState;
use lunatrace_core::ThreadId;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// Mutable debug state of one thread, guarded by the thread's lock.
#[derive(Debug, Default)]
pub struct ThreadState {
    /// Created on the thread's first call.
    callstack: Option<CallStack>,
    pub hook: HookState,
}

impl ThreadState {
    /// The call stack, if the thread has made any call yet.
    pub fn callstack(&self) -> Option<&CallStack> {
        self.callstack.as_ref()
    }

    /// The call stack, creating it on first use.
    pub fn callstack_mut(&mut self) -> &mut CallStack {
        self.callstack.get_or_insert_with(CallStack::new)
    }

    pub fn depth(&self) -> usize {
        self.callstack.as_ref().map_or(0, CallStack::depth)
    }
}

/// A script thread as seen by the debug subsystem.
#[derive(Debug)]
pub struct LuaThread {
    id: ThreadId,
    state: Mutex<ThreadState>,
}

pub type ThreadRef = Arc<LuaThread>;

impl LuaThread {
    pub fn new(id: ThreadId) -> Self {
        LuaThread {
            id,
            state: Mutex::new(ThreadState::default()),
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Lock the thread's debug state. Never hold the guard across a call
    /// into script or hook code.
    pub fn lock(&self) -> MutexGuard<'_, ThreadState> {
        self.state.lock()
    }
}
