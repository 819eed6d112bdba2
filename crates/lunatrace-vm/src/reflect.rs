//! Typed reflection API: the operations behind the script `debug` library.
//!
//! Misses (absent level, no such local or upvalue) are `None`; only misuse
//! that the script surface reports as a bad argument is an error.

use crate::error::{LuaError, LuaResult};
use crate::hook::{HookInfo, HookMask};
use crate::info::{aux_getinfo, traceback, DebugInfo, InfoFlags};
use crate::thread::ThreadRef;
use crate::vm::Vm;
use lunatrace_core::{Function, GcIdx, LuaClosure, Table, UpVal, Value};
use std::sync::Arc;
use tracing::debug;

/// Name reported for an upvalue without debug information.
pub const NO_NAME: &str = "(*no name)";

/// What `getinfo` describes: the frame at a level, or a function value.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameTarget {
    Level(i64),
    Function(Function),
}

impl Vm {
    /// Describe a stack level or a function. `None` if the level is not on
    /// the stack.
    pub fn getinfo(&self, thread: &ThreadRef, target: FrameTarget, what: &str) -> Option<DebugInfo> {
        let flags = InfoFlags::parse(what);
        let size = self.config().source_id_size;
        let state = thread.lock();
        let callstack = state.callstack();
        match target {
            FrameTarget::Level(level) => {
                let cs = callstack?;
                let frame = cs.get_call_frame(level)?;
                let func = frame.func.clone()?;
                Some(aux_getinfo(Some(cs), flags, &func, Some((level as usize, frame)), size))
            }
            FrameTarget::Function(func) => {
                let frame = callstack.and_then(|cs| cs.find_call_frame(&func));
                Some(aux_getinfo(callstack, flags, &func, frame, size))
            }
        }
    }

    /// Name and live value of local `n` at `level`. Negative `n` reads varargs.
    pub fn getlocal(&self, thread: &ThreadRef, level: i64, n: i64) -> Option<(Arc<str>, Value)> {
        let state = thread.lock();
        state.callstack()?.get_call_frame(level)?.get_local(n)
    }

    /// Name of parameter `n` of a script function.
    pub fn getlocal_name(&self, func: &Function, n: i64) -> Option<Arc<str>> {
        let closure = func.as_script()?;
        let n = usize::try_from(n).ok()?;
        closure.proto.local_name(n, 0).cloned()
    }

    /// Write local `n` at `level`, returning its name.
    pub fn setlocal(&self, thread: &ThreadRef, level: i64, n: i64, value: Value) -> Option<Arc<str>> {
        let state = thread.lock();
        state.callstack()?.get_call_frame(level)?.set_local(n, value)
    }

    /// Name and value of upvalue `n` (1-based).
    pub fn getupvalue(&self, func: &Function, n: i64) -> Option<(Arc<str>, Value)> {
        let (closure, idx, cell) = upvalue_cell(func, n)?;
        let value = self.heap().get_upval(cell)?.get();
        Some((upvalue_name(closure, idx), value))
    }

    /// Assign upvalue `n` (1-based), returning its name.
    pub fn setupvalue(&self, func: &Function, n: i64, value: Value) -> Option<Arc<str>> {
        let (closure, idx, cell) = upvalue_cell(func, n)?;
        self.heap_mut().get_upval_mut(cell)?.set(value);
        Some(upvalue_name(closure, idx))
    }

    /// Identity of the cell behind upvalue `n`.
    pub fn upvalueid(&self, func: &Function, n: i64) -> Option<GcIdx<UpVal>> {
        upvalue_cell(func, n).map(|(_, _, cell)| cell)
    }

    /// Make upvalue `n1` of `f1` share the cell of upvalue `n2` of `f2`.
    pub fn upvaluejoin(&self, f1: &Function, n1: i64, f2: &Function, n2: i64) -> LuaResult<()> {
        const NAME: &str = "upvaluejoin";
        let c1 = f1
            .as_script()
            .ok_or_else(|| LuaError::bad_argument(1, NAME, "script function expected"))?;
        let c2 = f2
            .as_script()
            .ok_or_else(|| LuaError::bad_argument(3, NAME, "script function expected"))?;
        let idx1 = checked_upvalue_index(c1, n1)
            .ok_or_else(|| LuaError::bad_argument(2, NAME, format!("invalid upvalue index {n1}")))?;
        let idx2 = checked_upvalue_index(c2, n2)
            .ok_or_else(|| LuaError::bad_argument(4, NAME, format!("invalid upvalue index {n2}")))?;
        let cell = c2
            .upvalue(idx2)
            .ok_or_else(|| LuaError::bad_argument(4, NAME, format!("invalid upvalue index {n2}")))?;
        c1.set_upvalue(idx1, cell);
        Ok(())
    }

    pub fn gethook(&self, thread: &ThreadRef) -> HookInfo {
        thread.lock().hook.info()
    }

    /// Replace the thread's hook. A missing function turns hooks off.
    pub fn sethook(&self, thread: &ThreadRef, func: Option<Function>, mask: &str, count: u32) {
        let (mask, count) = match func {
            Some(_) => (HookMask::parse(mask), count),
            None => (HookMask::default(), 0),
        };
        match &func {
            Some(_) => debug!(target: "lunatrace::hook", thread = thread.id().0, %mask, count, "hook installed"),
            None => debug!(target: "lunatrace::hook", thread = thread.id().0, "hook removed"),
        }
        thread.lock().hook.install(func, mask, count);
    }

    /// Raw metatable of any value.
    pub fn getmetatable(&self, value: &Value) -> Option<GcIdx<Table>> {
        match value {
            Value::Table(t) => self.heap().get_table(*t)?.metatable,
            Value::Userdata(u) => self.heap().get_userdata(*u)?.metatable,
            other => self.type_metatable(other.kind()),
        }
    }

    /// Set the raw metatable of any value. Kinds without their own metatable
    /// share one slot per kind.
    pub fn setmetatable(&self, value: &Value, mt: Option<GcIdx<Table>>) -> LuaResult<()> {
        match value {
            Value::Table(t) => {
                let mut heap = self.heap_mut();
                let table = heap
                    .get_table_mut(*t)
                    .ok_or_else(|| LuaError::Runtime(format!("invalid table {t:?}")))?;
                table.metatable = mt;
            }
            Value::Userdata(u) => {
                let mut heap = self.heap_mut();
                let udata = heap
                    .get_userdata_mut(*u)
                    .ok_or_else(|| LuaError::Runtime(format!("invalid userdata {u:?}")))?;
                udata.metatable = mt;
            }
            other => {
                self.set_type_metatable(other.kind(), mt);
            }
        }
        Ok(())
    }

    /// User value of a full userdata; nil for anything else.
    pub fn getuservalue(&self, value: &Value) -> Value {
        match value {
            Value::Userdata(u) => self
                .heap()
                .get_userdata(*u)
                .map(|ud| ud.user_value.clone())
                .unwrap_or_default(),
            _ => Value::Nil,
        }
    }

    /// Associate `user_value` (a table or nil) with a full userdata.
    pub fn setuservalue(&self, udata: &Value, user_value: Value) -> LuaResult<()> {
        const NAME: &str = "setuservalue";
        let Value::Userdata(u) = udata else {
            return Err(LuaError::bad_argument(
                1,
                NAME,
                format!("userdata expected, got {}", type_or_no_value(udata)),
            ));
        };
        if !matches!(user_value, Value::Nil | Value::Table(_)) {
            return Err(LuaError::bad_argument(
                2,
                NAME,
                format!("table expected, got {}", user_value.type_name()),
            ));
        }
        let mut heap = self.heap_mut();
        let ud = heap
            .get_userdata_mut(*u)
            .ok_or_else(|| LuaError::Runtime(format!("invalid userdata {u:?}")))?;
        ud.user_value = user_value;
        Ok(())
    }

    /// Stack dump of `thread` from `level` outward.
    pub fn traceback(&self, thread: &ThreadRef, message: Option<&str>, level: i64) -> String {
        let state = thread.lock();
        traceback(state.callstack(), message, level, self.config().source_id_size)
    }
}

fn checked_upvalue_index(closure: &LuaClosure, n: i64) -> Option<usize> {
    let idx = usize::try_from(n).ok()?.checked_sub(1)?;
    (idx < closure.num_upvalues()).then_some(idx)
}

fn upvalue_cell(func: &Function, n: i64) -> Option<(&Arc<LuaClosure>, usize, GcIdx<UpVal>)> {
    let closure = func.as_script()?;
    let idx = checked_upvalue_index(closure, n)?;
    Some((closure, idx, closure.upvalue(idx)?))
}

fn upvalue_name(closure: &LuaClosure, idx: usize) -> Arc<str> {
    closure
        .proto
        .upvalue_name(idx)
        .cloned()
        .unwrap_or_else(|| Arc::from(NO_NAME))
}

fn type_or_no_value(v: &Value) -> &'static str {
    if v.is_nil() {
        "no value"
    } else {
        v.type_name()
    }
}
