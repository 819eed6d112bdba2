//! Runtime state shared between the interpreter and the debug subsystem.
//!
//! The interpreter reports every call, instruction and return through the
//! `on_*` methods. Each notification updates the thread's call stack under
//! the thread lock, releases the lock, and only then runs any hook that the
//! event triggered.

use crate::config::DebugConfig;
use crate::error::{LuaError, LuaResult};
use crate::hook::{HookGuard, PendingHooks};
use crate::info::format_source_name;
use crate::thread::{LuaThread, ThreadRef, ThreadState};
use lunatrace_bytecode::disasm::disasm_instruction;
use lunatrace_core::{
    Function, GcHeap, GcIdx, LuaClosure, NativeContext, RegisterWindow, Table, ThreadId, Value,
    ValueKind, Varargs,
};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Registry slot holding the main thread.
pub const RIDX_MAINTHREAD: i64 = 1;
/// Registry slot holding the global environment.
pub const RIDX_GLOBALS: i64 = 2;

/// Executes script closures on behalf of the [`Vm`].
///
/// Implementations must report the calls they make through
/// [`Vm::on_call_script`], [`Vm::on_instruction`] and [`Vm::on_return`].
pub trait Interpreter: Send + Sync {
    fn call_closure(
        &self,
        vm: &Vm,
        thread: &ThreadRef,
        closure: &Arc<LuaClosure>,
        args: &[Value],
    ) -> LuaResult<Vec<Value>>;
}

/// Process-wide metatables for kinds whose values carry no metatable of
/// their own.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TypeMetatables {
    nil: Option<GcIdx<Table>>,
    boolean: Option<GcIdx<Table>>,
    number: Option<GcIdx<Table>>,
    string: Option<GcIdx<Table>>,
    function: Option<GcIdx<Table>>,
    thread: Option<GcIdx<Table>>,
    light_userdata: Option<GcIdx<Table>>,
}

impl TypeMetatables {
    fn slot(&mut self, kind: ValueKind) -> Option<&mut Option<GcIdx<Table>>> {
        match kind {
            ValueKind::Nil => Some(&mut self.nil),
            ValueKind::Boolean => Some(&mut self.boolean),
            ValueKind::Number => Some(&mut self.number),
            ValueKind::String => Some(&mut self.string),
            ValueKind::Function => Some(&mut self.function),
            ValueKind::Thread => Some(&mut self.thread),
            ValueKind::LightUserdata => Some(&mut self.light_userdata),
            ValueKind::Table | ValueKind::Userdata => None,
        }
    }

    pub fn get(&self, kind: ValueKind) -> Option<GcIdx<Table>> {
        match kind {
            ValueKind::Nil => self.nil,
            ValueKind::Boolean => self.boolean,
            ValueKind::Number => self.number,
            ValueKind::String => self.string,
            ValueKind::Function => self.function,
            ValueKind::Thread => self.thread,
            ValueKind::LightUserdata => self.light_userdata,
            ValueKind::Table | ValueKind::Userdata => None,
        }
    }

    /// Set the shared slot for `kind`. Returns false for kinds that carry
    /// their own metatable.
    pub fn set(&mut self, kind: ValueKind, mt: Option<GcIdx<Table>>) -> bool {
        match self.slot(kind) {
            Some(slot) => {
                *slot = mt;
                true
            }
            None => false,
        }
    }
}

/// Shared runtime state: heap, registry, threads and the debug configuration.
pub struct Vm {
    heap: RwLock<GcHeap>,
    registry: GcIdx<Table>,
    globals: GcIdx<Table>,
    metatables: RwLock<TypeMetatables>,
    threads: RwLock<Vec<ThreadRef>>,
    interpreter: RwLock<Option<Arc<dyn Interpreter>>>,
    config: DebugConfig,
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(DebugConfig::default())
    }

    pub fn with_config(config: DebugConfig) -> Self {
        let mut heap = GcHeap::new();
        let registry = heap.alloc_table();
        let globals = heap.alloc_table();
        if let Some(reg) = heap.get_table_mut(registry) {
            reg.raw_seti(RIDX_MAINTHREAD, Value::Thread(ThreadId(0)));
            reg.raw_seti(RIDX_GLOBALS, Value::Table(globals));
        }
        Vm {
            heap: RwLock::new(heap),
            registry,
            globals,
            metatables: RwLock::new(TypeMetatables::default()),
            threads: RwLock::new(vec![Arc::new(LuaThread::new(ThreadId(0)))]),
            interpreter: RwLock::new(None),
            config,
        }
    }

    pub fn config(&self) -> &DebugConfig {
        &self.config
    }

    pub fn heap(&self) -> RwLockReadGuard<'_, GcHeap> {
        self.heap.read()
    }

    pub fn heap_mut(&self) -> RwLockWriteGuard<'_, GcHeap> {
        self.heap.write()
    }

    pub fn registry(&self) -> GcIdx<Table> {
        self.registry
    }

    /// The global environment table.
    pub fn globals(&self) -> GcIdx<Table> {
        self.globals
    }

    // ---- threads ----

    pub fn main_thread(&self) -> ThreadRef {
        // Slot 0 is filled in `with_config` and never removed.
        self.threads.read()[0].clone()
    }

    pub fn new_thread(&self) -> ThreadRef {
        let mut threads = self.threads.write();
        let thread = Arc::new(LuaThread::new(ThreadId(threads.len() as u32)));
        threads.push(thread.clone());
        thread
    }

    pub fn thread(&self, id: ThreadId) -> Option<ThreadRef> {
        self.threads.read().get(id.0 as usize).cloned()
    }

    // ---- per-kind metatables ----

    pub fn type_metatable(&self, kind: ValueKind) -> Option<GcIdx<Table>> {
        self.metatables.read().get(kind)
    }

    pub fn set_type_metatable(&self, kind: ValueKind, mt: Option<GcIdx<Table>>) -> bool {
        self.metatables.write().set(kind, mt)
    }

    /// Clear every per-kind metatable slot.
    pub fn reset_type_metatables(&self) {
        *self.metatables.write() = TypeMetatables::default();
    }

    // ---- calls ----

    pub fn set_interpreter(&self, interpreter: Arc<dyn Interpreter>) {
        *self.interpreter.write() = Some(interpreter);
    }

    /// Call `func` on `thread`.
    ///
    /// Native calls are shadowed on the call stack here. Script calls are
    /// handed to the attached interpreter, which reports its own frames; if
    /// it fails, the frames it left behind are unwound.
    pub fn call(&self, thread: &ThreadRef, func: &Function, args: &[Value]) -> LuaResult<Vec<Value>> {
        match func {
            Function::Native(native) => {
                let depth = thread.lock().depth();
                if let Err(e) = self.on_call(thread, func.clone()) {
                    self.unwind_to(thread, depth);
                    return Err(e);
                }
                let mut ctx = NativeContext::new(args, thread.id());
                let result = native.call(&mut ctx).map_err(LuaError::from);
                let returned = self.on_return(thread);
                let values = result?;
                returned?;
                Ok(values)
            }
            Function::Script(closure) => {
                let interpreter = self
                    .interpreter
                    .read()
                    .clone()
                    .ok_or(LuaError::NoInterpreter)?;
                let depth = thread.lock().depth();
                let result = interpreter.call_closure(self, thread, closure, args);
                if result.is_err() {
                    self.unwind_to(thread, depth);
                }
                result
            }
        }
    }

    // ---- interpreter notifications ----

    /// A function without a register window (native) was entered.
    pub fn on_call(&self, thread: &ThreadRef, func: Function) -> LuaResult<()> {
        let pending = {
            let mut state = thread.lock();
            if state.hook.in_hook {
                return Ok(());
            }
            state.callstack_mut().on_call(func);
            state.hook.call_events()
        };
        self.run_hooks(thread, pending)
    }

    /// A script closure was entered; `registers` is the window it will run
    /// against.
    pub fn on_call_script(
        &self,
        thread: &ThreadRef,
        closure: &Arc<LuaClosure>,
        varargs: Varargs,
        registers: RegisterWindow,
    ) -> LuaResult<()> {
        let pending = {
            let mut state = thread.lock();
            if state.hook.in_hook {
                return Ok(());
            }
            state
                .callstack_mut()
                .on_call_script(Function::Script(closure.clone()), varargs, registers);
            state.hook.call_events()
        };
        self.run_hooks(thread, pending)
    }

    /// The innermost script call is about to execute instruction `pc`.
    pub fn on_instruction(
        &self,
        thread: &ThreadRef,
        pc: usize,
        varargs: Varargs,
        top: usize,
    ) -> LuaResult<()> {
        let pending = {
            let mut state = thread.lock();
            if state.hook.in_hook {
                return Ok(());
            }
            let callstack = state.callstack_mut();
            callstack.on_instruction(pc, varargs, top);
            let line = callstack.current_line();
            if self.config.trace {
                self.trace_state(thread.id(), &state);
            }
            state.hook.instruction_events(line)
        };
        self.run_hooks(thread, pending)
    }

    /// The innermost call returned.
    pub fn on_return(&self, thread: &ThreadRef) -> LuaResult<()> {
        let pending = {
            let mut state = thread.lock();
            if state.hook.in_hook {
                return Ok(());
            }
            state.callstack_mut().on_return();
            state.hook.return_events()
        };
        self.run_hooks(thread, pending)
    }

    /// Drop frames above `depth` after an error. No return hooks fire.
    pub fn unwind_to(&self, thread: &LuaThread, depth: usize) {
        let mut state = thread.lock();
        if state.depth() > depth {
            debug!(target: "lunatrace::callstack", from = state.depth(), to = depth, "unwinding");
            state.callstack_mut().unwind_to(depth);
        }
    }

    /// Run hooks decided under the lock. The re-entrancy flag is held for
    /// the whole dispatch and cleared on every exit path.
    fn run_hooks(&self, thread: &ThreadRef, pending: Option<PendingHooks>) -> LuaResult<()> {
        let Some(pending) = pending else {
            return Ok(());
        };
        let Some(_guard) = HookGuard::enter(thread) else {
            return Ok(());
        };
        for event in pending.events {
            debug!(target: "lunatrace::hook", thread = thread.id().0, event = event.name(), "dispatching hook");
            if let Err(e) = self.call(thread, &pending.func, &event.args()) {
                warn!(target: "lunatrace::hook", thread = thread.id().0, event = event.name(), error = %e, "hook failed");
                return Err(e);
            }
        }
        Ok(())
    }

    fn trace_state(&self, thread: ThreadId, state: &ThreadState) {
        let Some(frame) = state.callstack().and_then(|cs| cs.get_call_frame(1)) else {
            return;
        };
        let Some(proto) = frame.proto() else {
            return;
        };
        let source = format_source_name(proto.source_name(), self.config.source_id_size);
        let mut registers = frame
            .registers
            .as_ref()
            .map(RegisterWindow::snapshot)
            .unwrap_or_default();
        registers.truncate(frame.top);
        trace!(
            target: "lunatrace::trace",
            thread = thread.0,
            source = %source,
            line = frame.current_line(),
            pc = frame.pc,
            instruction = %disasm_instruction(proto, frame.pc),
            registers = %RegisterDump(&registers),
            "exec"
        );
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("registry", &self.registry)
            .field("globals", &self.globals)
            .field("threads", &self.threads.read().len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// `[v0, v1, ...]` using each value's display form.
struct RegisterDump<'a>(&'a [Value]);

impl fmt::Display for RegisterDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{v}")?;
        }
        f.write_str("]")
    }
}
