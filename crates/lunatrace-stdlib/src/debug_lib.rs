//! The `debug` library.
//!
//! Every function is a thin adapter over the typed reflection API on
//! [`Vm`]: it decodes script arguments, maps script levels to call-stack
//! levels and packs the result back into script values.
//!
//! Level numbering: when a debug function is called through [`Vm::call`]
//! outside a hook, its own native frame is level 1 of the typed stack, so
//! script level `n` is typed level `n + 1` (level 0 is the debug function
//! itself). Inside a hook and for other threads the debug function is not
//! on the inspected stack and levels pass through unchanged.

use lunatrace_core::{Function, GcIdx, NativeError, NativeFunction, Table, Value};
use lunatrace_vm::info::DEFAULT_INFO_FLAGS;
use lunatrace_vm::{DebugInfo, FrameTarget, ThreadRef, Vm};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Names of the functions in the `debug` table.
pub const DEBUG_FUNCTIONS: [&str; 15] = [
    "gethook",
    "getinfo",
    "getlocal",
    "getmetatable",
    "getregistry",
    "getupvalue",
    "getuservalue",
    "sethook",
    "setlocal",
    "setmetatable",
    "setupvalue",
    "setuservalue",
    "traceback",
    "upvalueid",
    "upvaluejoin",
];

type DebugFn = fn(&Vm, &ThreadRef, &[Value]) -> Result<Vec<Value>, NativeError>;

/// Create the `debug` table, store it as the global `debug` and, if
/// `package.loaded` exists, as `package.loaded.debug`.
pub fn register(vm: &Arc<Vm>) -> GcIdx<Table> {
    let debug_table = vm.heap_mut().alloc_table();

    register_fn(vm, debug_table, "gethook", debug_gethook);
    register_fn(vm, debug_table, "getinfo", debug_getinfo);
    register_fn(vm, debug_table, "getlocal", debug_getlocal);
    register_fn(vm, debug_table, "getmetatable", debug_getmetatable);
    register_fn(vm, debug_table, "getregistry", debug_getregistry);
    register_fn(vm, debug_table, "getupvalue", debug_getupvalue);
    register_fn(vm, debug_table, "getuservalue", debug_getuservalue);
    register_fn(vm, debug_table, "sethook", debug_sethook);
    register_fn(vm, debug_table, "setlocal", debug_setlocal);
    register_fn(vm, debug_table, "setmetatable", debug_setmetatable);
    register_fn(vm, debug_table, "setupvalue", debug_setupvalue);
    register_fn(vm, debug_table, "setuservalue", debug_setuservalue);
    register_fn(vm, debug_table, "traceback", debug_traceback);
    register_fn(vm, debug_table, "upvalueid", debug_upvalueid);
    register_fn(vm, debug_table, "upvaluejoin", debug_upvaluejoin);

    let mut heap = vm.heap_mut();
    if let Some(globals) = heap.get_table_mut(vm.globals()) {
        globals.raw_set_str("debug", Value::Table(debug_table));
    }
    let loaded = heap
        .get_table(vm.globals())
        .and_then(|g| g.raw_get_str("package").as_table_idx())
        .and_then(|p| heap.get_table(p))
        .and_then(|p| p.raw_get_str("loaded").as_table_idx());
    if let Some(loaded) = loaded.and_then(|idx| heap.get_table_mut(idx)) {
        loaded.raw_set_str("debug", Value::Table(debug_table));
    }
    drop(heap);

    debug!(target: "lunatrace::stdlib", functions = DEBUG_FUNCTIONS.len(), "debug library registered");
    debug_table
}

fn register_fn(vm: &Arc<Vm>, table: GcIdx<Table>, name: &'static str, func: DebugFn) {
    let weak: Weak<Vm> = Arc::downgrade(vm);
    let native = NativeFunction::new(name, move |ctx| {
        let vm = weak
            .upgrade()
            .ok_or_else(|| NativeError::from(format!("'{name}' called after its VM was dropped")))?;
        let thread = vm
            .thread(ctx.thread)
            .ok_or_else(|| NativeError::from(format!("'{name}' called on an unknown thread")))?;
        func(&vm, &thread, ctx.args)
    });
    if let Some(t) = vm.heap_mut().get_table_mut(table) {
        t.raw_set_str(name, Value::Function(Function::Native(native)));
    }
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

/// Arguments after an optional leading thread.
struct Args<'a> {
    thread: ThreadRef,
    /// Offset added to argument positions in error messages.
    shift: usize,
    rest: &'a [Value],
}

impl<'a> Args<'a> {
    fn parse(
        vm: &Vm,
        current: &ThreadRef,
        args: &'a [Value],
        fname: &str,
    ) -> Result<Self, NativeError> {
        match args.first() {
            Some(Value::Thread(id)) => {
                let thread = vm
                    .thread(*id)
                    .ok_or_else(|| NativeError::bad_argument(1, fname, "invalid thread"))?;
                Ok(Args {
                    thread,
                    shift: 1,
                    rest: &args[1..],
                })
            }
            _ => Ok(Args {
                thread: current.clone(),
                shift: 0,
                rest: args,
            }),
        }
    }

    fn get(&self, n: usize) -> Value {
        self.rest.get(n).cloned().unwrap_or_default()
    }

    /// 1-based script position of argument `n`.
    fn position(&self, n: usize) -> usize {
        self.shift + n + 1
    }
}

fn check_integer(args: &[Value], n: usize, fname: &str) -> Result<i64, NativeError> {
    let v = args.get(n).cloned().unwrap_or_default();
    v.as_integer()
        .ok_or_else(|| NativeError::type_mismatch(n + 1, fname, "number", &v))
}

fn opt_integer(args: &[Value], n: usize, fname: &str, default: i64) -> Result<i64, NativeError> {
    match args.get(n) {
        None | Some(Value::Nil) => Ok(default),
        Some(_) => check_integer(args, n, fname),
    }
}

fn check_function(args: &[Value], n: usize, fname: &str) -> Result<Function, NativeError> {
    let v = args.get(n).cloned().unwrap_or_default();
    match v {
        Value::Function(f) => Ok(f),
        other => Err(NativeError::type_mismatch(n + 1, fname, "function", &other)),
    }
}

/// Offset between script levels and typed levels on `target`.
fn level_shift(current: &ThreadRef, target: &ThreadRef) -> i64 {
    if !Arc::ptr_eq(current, target) {
        return 0;
    }
    let state = target.lock();
    if state.hook.in_hook {
        return 0;
    }
    let innermost_native = state
        .callstack()
        .and_then(|cs| cs.get_call_frame(1))
        .is_some_and(|frame| frame.is_native());
    i64::from(innermost_native)
}

/// `a` for a number, `f` for a function, as the level-or-function argument
/// of `getinfo` and `getlocal`.
fn frame_target(
    args: &Args<'_>,
    n: usize,
    current: &ThreadRef,
    fname: &str,
) -> Result<FrameTarget, NativeError> {
    match args.get(n) {
        Value::Function(f) => Ok(FrameTarget::Function(f)),
        other => match other.as_integer() {
            Some(level) => Ok(FrameTarget::Level(
                level.saturating_add(level_shift(current, &args.thread)),
            )),
            None => Err(NativeError::bad_argument(
                args.position(n),
                fname,
                "function or level expected",
            )),
        },
    }
}

fn new_table(vm: &Vm) -> GcIdx<Table> {
    vm.heap_mut().alloc_table()
}

fn set_field(vm: &Vm, table: GcIdx<Table>, key: &str, value: impl Into<Value>) {
    if let Some(t) = vm.heap_mut().get_table_mut(table) {
        t.raw_set_str(key, value.into());
    }
}

// ---------------------------------------------------------------------------
// debug.getinfo([thread,] f, [what])
// Returns a table describing a function or a stack level, or nothing when
// the level is not on the stack.
// ---------------------------------------------------------------------------

fn debug_getinfo(vm: &Vm, current: &ThreadRef, args: &[Value]) -> Result<Vec<Value>, NativeError> {
    const NAME: &str = "getinfo";
    let args = Args::parse(vm, current, args, NAME)?;
    let target = frame_target(&args, 0, current, NAME)?;
    let what = match args.get(1) {
        Value::Nil => DEFAULT_INFO_FLAGS.to_string(),
        Value::String(s) => s.to_string(),
        other => {
            return Err(NativeError::type_mismatch(args.position(1), NAME, "string", &other));
        }
    };
    match vm.getinfo(&args.thread, target, &what) {
        Some(info) => Ok(vec![Value::Table(info_table(vm, info))]),
        None => Ok(vec![]),
    }
}

fn info_table(vm: &Vm, info: DebugInfo) -> GcIdx<Table> {
    let t = new_table(vm);
    if let Some(src) = info.source {
        set_field(vm, t, "what", src.kind.as_str());
        set_field(vm, t, "source", src.source);
        set_field(vm, t, "short_src", src.short_src);
        set_field(vm, t, "linedefined", src.line_defined);
        set_field(vm, t, "lastlinedefined", src.last_line_defined);
    }
    if let Some(line) = info.current_line {
        set_field(vm, t, "currentline", line);
    }
    if let Some(up) = info.upvalues {
        set_field(vm, t, "nups", up.nups as i64);
        set_field(vm, t, "nparams", up.nparams as i64);
        set_field(vm, t, "isvararg", up.is_vararg);
    }
    if let Some(name) = info.name {
        set_field(vm, t, "name", name.name.unwrap_or_else(|| "?".to_string()));
        set_field(vm, t, "namewhat", name.namewhat);
    }
    if let Some(tail) = info.is_tail_call {
        set_field(vm, t, "istailcall", tail);
    }
    if let Some(lines) = info.active_lines {
        let list = new_table(vm);
        if let Some(l) = vm.heap_mut().get_table_mut(list) {
            for (i, line) in lines.into_iter().enumerate() {
                l.raw_seti(i as i64 + 1, Value::Integer(line));
            }
        }
        set_field(vm, t, "activelines", list);
    }
    if let Some(func) = info.func {
        set_field(vm, t, "func", func);
    }
    t
}

// ---------------------------------------------------------------------------
// debug.getlocal([thread,] f, local)
// With a level: name and value of a live local (negative indices read
// varargs). With a function: the parameter name only.
// ---------------------------------------------------------------------------

fn debug_getlocal(vm: &Vm, current: &ThreadRef, args: &[Value]) -> Result<Vec<Value>, NativeError> {
    const NAME: &str = "getlocal";
    let args = Args::parse(vm, current, args, NAME)?;
    let target = frame_target(&args, 0, current, NAME)?;
    let n = check_integer(args.rest, 1, NAME)
        .map_err(|_| NativeError::type_mismatch(args.position(1), NAME, "number", &args.get(1)))?;
    match target {
        FrameTarget::Function(f) => Ok(vec![vm
            .getlocal_name(&f, n)
            .map_or(Value::Nil, Value::from)]),
        FrameTarget::Level(level) => match vm.getlocal(&args.thread, level, n) {
            Some((name, value)) => Ok(vec![Value::from(name), value]),
            None => Ok(vec![Value::Nil]),
        },
    }
}

// ---------------------------------------------------------------------------
// debug.setlocal([thread,] level, local, value)
// Assigns a live local. Returns its name, or nil if there is no such local.
// ---------------------------------------------------------------------------

fn debug_setlocal(vm: &Vm, current: &ThreadRef, args: &[Value]) -> Result<Vec<Value>, NativeError> {
    const NAME: &str = "setlocal";
    let args = Args::parse(vm, current, args, NAME)?;
    let level = args
        .get(0)
        .as_integer()
        .ok_or_else(|| NativeError::type_mismatch(args.position(0), NAME, "number", &args.get(0)))?;
    let n = args
        .get(1)
        .as_integer()
        .ok_or_else(|| NativeError::type_mismatch(args.position(1), NAME, "number", &args.get(1)))?;
    let level = level.saturating_add(level_shift(current, &args.thread));
    let name = vm.setlocal(&args.thread, level, n, args.get(2));
    Ok(vec![name.map_or(Value::Nil, Value::from)])
}

// ---------------------------------------------------------------------------
// debug.getupvalue(f, up)
// Name and value of upvalue `up` of `f`, or nil if there is none.
// ---------------------------------------------------------------------------

fn debug_getupvalue(vm: &Vm, _: &ThreadRef, args: &[Value]) -> Result<Vec<Value>, NativeError> {
    const NAME: &str = "getupvalue";
    let f = check_function(args, 0, NAME)?;
    let n = check_integer(args, 1, NAME)?;
    match vm.getupvalue(&f, n) {
        Some((name, value)) => Ok(vec![Value::from(name), value]),
        None => Ok(vec![Value::Nil]),
    }
}

// ---------------------------------------------------------------------------
// debug.setupvalue(f, up, value)
// Assigns upvalue `up` of `f`. Returns its name, or nil if there is none.
// ---------------------------------------------------------------------------

fn debug_setupvalue(vm: &Vm, _: &ThreadRef, args: &[Value]) -> Result<Vec<Value>, NativeError> {
    const NAME: &str = "setupvalue";
    let f = check_function(args, 0, NAME)?;
    let n = check_integer(args, 1, NAME)?;
    let value = args.get(2).cloned().unwrap_or_default();
    Ok(vec![vm.setupvalue(&f, n, value).map_or(Value::Nil, Value::from)])
}

// ---------------------------------------------------------------------------
// debug.upvalueid(f, n)
// Identity of the cell behind upvalue `n`, as a light userdata.
// ---------------------------------------------------------------------------

fn debug_upvalueid(vm: &Vm, _: &ThreadRef, args: &[Value]) -> Result<Vec<Value>, NativeError> {
    const NAME: &str = "upvalueid";
    let f = check_function(args, 0, NAME)?;
    let n = check_integer(args, 1, NAME)?;
    let id = vm
        .upvalueid(&f, n)
        .map_or(Value::Nil, |cell| Value::LightUserdata(cell.index() as usize));
    Ok(vec![id])
}

// ---------------------------------------------------------------------------
// debug.upvaluejoin(f1, n1, f2, n2)
// Make upvalue n1 of f1 refer to the cell of upvalue n2 of f2.
// ---------------------------------------------------------------------------

fn debug_upvaluejoin(vm: &Vm, _: &ThreadRef, args: &[Value]) -> Result<Vec<Value>, NativeError> {
    const NAME: &str = "upvaluejoin";
    let f1 = check_function(args, 0, NAME)?;
    let n1 = check_integer(args, 1, NAME)?;
    let f2 = check_function(args, 2, NAME)?;
    let n2 = check_integer(args, 3, NAME)?;
    vm.upvaluejoin(&f1, n1, &f2, n2)?;
    Ok(vec![])
}

// ---------------------------------------------------------------------------
// debug.gethook([thread])
// Returns the hook function (or nil), its mask and its count.
// ---------------------------------------------------------------------------

fn debug_gethook(vm: &Vm, current: &ThreadRef, args: &[Value]) -> Result<Vec<Value>, NativeError> {
    let args = Args::parse(vm, current, args, "gethook")?;
    let info = vm.gethook(&args.thread);
    Ok(vec![
        info.func.map_or(Value::Nil, Value::from),
        Value::from(info.mask),
        Value::Integer(i64::from(info.count)),
    ])
}

// ---------------------------------------------------------------------------
// debug.sethook([thread,] hook, mask [, count])
// Installs `hook` for the events in `mask`; with no hook, turns hooks off.
// ---------------------------------------------------------------------------

fn debug_sethook(vm: &Vm, current: &ThreadRef, args: &[Value]) -> Result<Vec<Value>, NativeError> {
    const NAME: &str = "sethook";
    let args = Args::parse(vm, current, args, NAME)?;
    let func = match args.get(0) {
        Value::Nil => None,
        Value::Function(f) => Some(f),
        other => {
            return Err(NativeError::type_mismatch(args.position(0), NAME, "function", &other));
        }
    };
    let Some(func) = func else {
        vm.sethook(&args.thread, None, "", 0);
        return Ok(vec![]);
    };
    let mask = match args.get(1) {
        Value::String(s) => s,
        other => {
            return Err(NativeError::type_mismatch(args.position(1), NAME, "string", &other));
        }
    };
    let count = opt_integer(args.rest, 2, NAME, 0)
        .map_err(|_| NativeError::type_mismatch(args.position(2), NAME, "number", &args.get(2)))?;
    let count = u32::try_from(count.max(0)).unwrap_or(u32::MAX);
    vm.sethook(&args.thread, Some(func), &mask, count);
    Ok(vec![])
}

// ---------------------------------------------------------------------------
// debug.getmetatable(value)
// Returns the metatable of any value, bypassing __metatable.
// ---------------------------------------------------------------------------

fn debug_getmetatable(vm: &Vm, _: &ThreadRef, args: &[Value]) -> Result<Vec<Value>, NativeError> {
    let value = args.first().cloned().unwrap_or_default();
    Ok(vec![vm.getmetatable(&value).map_or(Value::Nil, Value::Table)])
}

// ---------------------------------------------------------------------------
// debug.setmetatable(value, table)
// Sets the metatable of any value, bypassing __metatable. Returns the value.
// ---------------------------------------------------------------------------

fn debug_setmetatable(vm: &Vm, _: &ThreadRef, args: &[Value]) -> Result<Vec<Value>, NativeError> {
    const NAME: &str = "setmetatable";
    let value = args.first().cloned().unwrap_or_default();
    let mt = match args.get(1) {
        None | Some(Value::Nil) => None,
        Some(Value::Table(t)) => Some(*t),
        Some(other) => return Err(NativeError::type_mismatch(2, NAME, "nil or table", other)),
    };
    vm.setmetatable(&value, mt)?;
    Ok(vec![value])
}

// ---------------------------------------------------------------------------
// debug.getregistry()
// ---------------------------------------------------------------------------

fn debug_getregistry(vm: &Vm, _: &ThreadRef, _: &[Value]) -> Result<Vec<Value>, NativeError> {
    Ok(vec![Value::Table(vm.registry())])
}

// ---------------------------------------------------------------------------
// debug.getuservalue(u)
// ---------------------------------------------------------------------------

fn debug_getuservalue(vm: &Vm, _: &ThreadRef, args: &[Value]) -> Result<Vec<Value>, NativeError> {
    let value = args.first().cloned().unwrap_or_default();
    Ok(vec![vm.getuservalue(&value)])
}

// ---------------------------------------------------------------------------
// debug.setuservalue(udata, value)
// `value` must be a table or nil. Returns `udata`.
// ---------------------------------------------------------------------------

fn debug_setuservalue(vm: &Vm, _: &ThreadRef, args: &[Value]) -> Result<Vec<Value>, NativeError> {
    let udata = args.first().cloned().unwrap_or_default();
    let value = args.get(1).cloned().unwrap_or_default();
    vm.setuservalue(&udata, value)?;
    Ok(vec![udata])
}

// ---------------------------------------------------------------------------
// debug.traceback([thread,] [message [, level]])
// A non-string message is returned untouched. Level defaults to 1 for the
// calling thread and 0 for any other.
// ---------------------------------------------------------------------------

fn debug_traceback(vm: &Vm, current: &ThreadRef, args: &[Value]) -> Result<Vec<Value>, NativeError> {
    const NAME: &str = "traceback";
    let args = Args::parse(vm, current, args, NAME)?;
    let message = match args.get(0) {
        Value::Nil => None,
        Value::String(s) => Some(s),
        other if other.is_number() => Some(other.to_string().into()),
        other => return Ok(vec![other]),
    };
    let default_level = if Arc::ptr_eq(current, &args.thread) { 1 } else { 0 };
    let level = opt_integer(args.rest, 1, NAME, default_level)
        .map_err(|_| NativeError::type_mismatch(args.position(1), NAME, "number", &args.get(1)))?;
    let level = level.saturating_add(level_shift(current, &args.thread));
    Ok(vec![Value::from(vm.traceback(&args.thread, message.as_deref(), level))])
}
