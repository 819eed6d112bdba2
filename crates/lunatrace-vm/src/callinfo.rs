//! Shadow call stack: one frame per active call, maintained from the
//! interpreter's call/instruction/return notifications.

use lunatrace_bytecode::Proto;
use lunatrace_core::{Function, LuaClosure, RegisterWindow, Value, Varargs};
use std::sync::Arc;
use tracing::trace;

/// Name reported for a live register with no local-variable entry.
pub const TEMPORARY_NAME: &str = "(*temporary)";
/// Name reported for a vararg addressed by a negative local index.
pub const VARARG_NAME: &str = "(*vararg)";

/// Smallest number of frame slots allocated at once.
const MIN_FRAMES: usize = 4;

/// One active call.
///
/// `registers` is the interpreter's own window, not a copy: reads and writes
/// through the frame are the ones the running bytecode sees.
#[derive(Clone, Debug, Default)]
pub struct CallFrame {
    /// The callee; `None` for an unused slot.
    pub func: Option<Function>,
    /// Program counter of the instruction being executed.
    pub pc: usize,
    /// Registers below `top` are live. Starts at the window size and then
    /// follows the interpreter's reports.
    pub top: usize,
    pub varargs: Varargs,
    pub registers: Option<RegisterWindow>,
}

impl CallFrame {
    fn set(&mut self, func: Function, varargs: Varargs, registers: Option<RegisterWindow>) {
        self.func = Some(func);
        self.pc = 0;
        self.top = registers.as_ref().map_or(0, RegisterWindow::len);
        self.varargs = varargs;
        self.registers = registers;
    }

    fn reset(&mut self) {
        self.func = None;
        self.pc = 0;
        self.top = 0;
        self.varargs = Varargs::none();
        self.registers = None;
    }

    fn instr(&mut self, pc: usize, varargs: Varargs, top: usize) {
        self.pc = pc;
        self.varargs = varargs;
        self.top = top;
    }

    /// The script closure being executed, if this is a script frame.
    pub fn closure(&self) -> Option<&Arc<LuaClosure>> {
        self.func.as_ref().and_then(Function::as_script)
    }

    pub fn proto(&self) -> Option<&Proto> {
        self.closure().map(|c| &*c.proto)
    }

    pub fn is_native(&self) -> bool {
        self.func.as_ref().is_some_and(Function::is_native)
    }

    /// Source line of the current instruction; `None` for native frames or
    /// when the prototype carries no line for `pc`.
    pub fn current_line(&self) -> Option<u32> {
        self.proto().and_then(|p| p.get_line(self.pc))
    }

    /// Name of local `n` (1-based) active at the current pc.
    pub fn local_name(&self, n: usize) -> Option<Arc<str>> {
        self.proto().and_then(|p| p.local_name(n, self.pc)).cloned()
    }

    /// Name and value of local `n`. Negative `n` addresses varargs.
    pub fn get_local(&self, n: i64) -> Option<(Arc<str>, Value)> {
        if n < 0 {
            let value = self.varargs.get(n.unsigned_abs() as usize)?;
            return Some((Arc::from(VARARG_NAME), value.clone()));
        }
        let slot = self.register_slot(n)?;
        let registers = self.registers.as_ref()?;
        let name = self
            .local_name(n as usize)
            .unwrap_or_else(|| Arc::from(TEMPORARY_NAME));
        Some((name, registers.get(slot)))
    }

    /// Write local `n` in place. Varargs are read-only.
    pub fn set_local(&self, n: i64, value: Value) -> Option<Arc<str>> {
        let slot = self.register_slot(n)?;
        let registers = self.registers.as_ref()?;
        if !registers.set(slot, value) {
            return None;
        }
        Some(
            self.local_name(n as usize)
                .unwrap_or_else(|| Arc::from(TEMPORARY_NAME)),
        )
    }

    /// Locals in scope are always addressable; temporaries only below `top`.
    fn register_slot(&self, n: i64) -> Option<usize> {
        let window = self.registers.as_ref()?.len();
        let in_scope = self.proto().map_or(0, |p| p.active_locals(self.pc));
        let live = self.top.max(in_scope).min(window);
        (n >= 1 && n as usize <= live).then(|| n as usize - 1)
    }
}

/// Per-thread stack of active calls.
///
/// Frame slots past the current depth are kept for reuse; the slot array
/// grows by half (at least [`MIN_FRAMES`] slots) and never shrinks.
#[derive(Debug, Default)]
pub struct CallStack {
    frames: Vec<CallFrame>,
    calls: usize,
}

impl CallStack {
    pub fn new() -> Self {
        CallStack::default()
    }

    fn push(&mut self) -> &mut CallFrame {
        if self.calls >= self.frames.len() {
            let n = MIN_FRAMES.max(self.frames.len() * 3 / 2);
            self.frames.resize_with(n, CallFrame::default);
            trace!(capacity = self.capacity(), "frame pool grown");
        }
        self.calls += 1;
        &mut self.frames[self.calls - 1]
    }

    /// Enter a function with no register window (native calls).
    pub fn on_call(&mut self, func: Function) {
        self.push().set(func, Varargs::none(), None);
        trace!(depth = self.calls, "frame pushed");
    }

    /// Enter a script function executing against `registers`.
    pub fn on_call_script(&mut self, func: Function, varargs: Varargs, registers: RegisterWindow) {
        self.push().set(func, varargs, Some(registers));
        trace!(depth = self.calls, "frame pushed");
    }

    /// Leave the innermost call. No-op on an empty stack.
    pub fn on_return(&mut self) {
        if self.calls > 0 {
            self.calls -= 1;
            self.frames[self.calls].reset();
            trace!(depth = self.calls, "frame popped");
        }
    }

    /// Record the instruction the innermost call is about to execute.
    pub fn on_instruction(&mut self, pc: usize, varargs: Varargs, top: usize) {
        if let Some(frame) = self.top_frame_mut() {
            frame.instr(pc, varargs, top);
        }
    }

    /// Pop frames until `depth` remain.
    pub fn unwind_to(&mut self, depth: usize) {
        while self.calls > depth {
            self.on_return();
        }
    }

    /// Number of active calls.
    pub fn depth(&self) -> usize {
        self.calls
    }

    /// Number of allocated frame slots.
    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    /// Line of the innermost call, if known.
    pub fn current_line(&self) -> Option<u32> {
        self.get_call_frame(1).and_then(CallFrame::current_line)
    }

    /// Frame at `level` (1 = innermost).
    pub fn get_call_frame(&self, level: i64) -> Option<&CallFrame> {
        if level < 1 || level as u64 > self.calls as u64 {
            return None;
        }
        self.frames.get(self.calls - level as usize)
    }

    /// The frame directly below `level` (its caller).
    pub fn caller_of(&self, level: usize) -> Option<&CallFrame> {
        self.get_call_frame(level as i64 + 1)
    }

    /// Innermost frame executing `func`, with its level.
    pub fn find_call_frame(&self, func: &Function) -> Option<(usize, &CallFrame)> {
        self.levels()
            .find(|(_, frame)| frame.func.as_ref().is_some_and(|f| f.ptr_eq(func)))
    }

    /// Active frames, innermost first, paired with their level.
    pub fn levels(&self) -> impl Iterator<Item = (usize, &CallFrame)> {
        self.frames[..self.calls]
            .iter()
            .rev()
            .enumerate()
            .map(|(i, frame)| (i + 1, frame))
    }

    fn top_frame_mut(&mut self) -> Option<&mut CallFrame> {
        if self.calls == 0 {
            return None;
        }
        self.frames.get_mut(self.calls - 1)
    }
}
