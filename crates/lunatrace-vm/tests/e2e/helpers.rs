//! Shared fixtures: a small interpreter for a subset of the instruction set
//! and helpers for assembling prototypes by hand.

use lunatrace_bytecode::opcode::{index_k, is_k, rk_ask};
use lunatrace_bytecode::{Constant, Instruction, OpCode, Proto};
use lunatrace_core::{
    Function, GcIdx, LuaClosure, NativeContext, NativeError, NativeFunction, RegisterWindow, UpVal,
    UpValLocation, Value, Varargs,
};
use lunatrace_vm::{Interpreter, LuaError, LuaResult, ThreadRef, Vm};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Executes MOVE, LOADK, LOADBOOL, LOADNIL, GETUPVAL, SETUPVAL, GETTABUP,
/// SETTABUP, GETTABLE, SELF, ADD, SUB, JMP, EQ, TEST, CALL, TAILCALL,
/// RETURN, CLOSURE and VARARG with fixed argument and result counts.
pub struct MiniInterpreter;

impl Interpreter for MiniInterpreter {
    fn call_closure(
        &self,
        vm: &Vm,
        thread: &ThreadRef,
        closure: &Arc<LuaClosure>,
        args: &[Value],
    ) -> LuaResult<Vec<Value>> {
        let p = &closure.proto;
        let nparams = usize::from(p.num_params);
        let window = RegisterWindow::new(usize::from(p.max_stack_size));
        for (i, arg) in args.iter().take(nparams).enumerate() {
            window.set(i, arg.clone());
        }
        let varargs = if p.is_vararg && args.len() > nparams {
            Varargs::new(args[nparams..].to_vec())
        } else {
            Varargs::none()
        };

        vm.on_call_script(thread, closure, varargs.clone(), window.clone())?;
        let mut open = Vec::new();
        let result = execute(vm, thread, closure, &window, &varargs, &mut open);
        for cell in open {
            if let Some(uv) = vm.heap_mut().get_upval_mut(cell) {
                uv.close();
            }
        }
        let values = result?;
        vm.on_return(thread)?;
        Ok(values)
    }
}

fn constant(p: &Proto, idx: usize) -> LuaResult<Value> {
    Ok(match p.constants.get(idx) {
        Some(Constant::Nil) => Value::Nil,
        Some(Constant::Boolean(b)) => Value::Boolean(*b),
        Some(Constant::Integer(i)) => Value::Integer(*i),
        Some(Constant::Float(f)) => Value::Float(*f),
        Some(Constant::String(s)) => Value::String(s.clone()),
        None => return Err(LuaError::Runtime(format!("bad constant index {idx}"))),
    })
}

fn upvalue(vm: &Vm, closure: &LuaClosure, idx: u32) -> LuaResult<GcIdx<UpVal>> {
    closure
        .upvalue(idx as usize)
        .filter(|cell| vm.heap().get_upval(*cell).is_some())
        .ok_or_else(|| LuaError::Runtime(format!("bad upvalue index {idx}")))
}

fn index(vm: &Vm, table: &Value, key: &Value) -> LuaResult<Value> {
    let t = table
        .as_table_idx()
        .ok_or_else(|| LuaError::Runtime(format!("attempt to index a {} value", table.type_name())))?;
    Ok(vm
        .heap()
        .get_table(t)
        .map(|t| t.raw_get(key))
        .unwrap_or_default())
}

fn execute(
    vm: &Vm,
    thread: &ThreadRef,
    closure: &Arc<LuaClosure>,
    window: &RegisterWindow,
    varargs: &Varargs,
    open: &mut Vec<GcIdx<UpVal>>,
) -> LuaResult<Vec<Value>> {
    let p = &closure.proto;
    let rk = |x: u32| -> LuaResult<Value> {
        if is_k(x) {
            constant(p, index_k(x))
        } else {
            Ok(window.get(x as usize))
        }
    };
    let mut open_slots: Vec<(usize, GcIdx<UpVal>)> = Vec::new();
    let mut pc = 0usize;
    loop {
        let Some(&inst) = p.code.get(pc) else {
            break Ok(vec![]);
        };
        vm.on_instruction(thread, pc, varargs.clone(), window.len())?;
        pc += 1;
        let a = inst.a() as usize;
        let (b, c) = (inst.b(), inst.c());
        match inst.opcode() {
            OpCode::Move => {
                window.set(a, window.get(b as usize));
            }
            OpCode::LoadK => {
                window.set(a, constant(p, inst.bx() as usize)?);
            }
            OpCode::LoadBool => {
                window.set(a, Value::Boolean(b != 0));
                if c != 0 {
                    pc += 1;
                }
            }
            OpCode::LoadNil => {
                for r in a..=a + b as usize {
                    window.set(r, Value::Nil);
                }
            }
            OpCode::GetUpval => {
                let cell = upvalue(vm, closure, b)?;
                let v = vm.heap().get_upval(cell).map(UpVal::get).unwrap_or_default();
                window.set(a, v);
            }
            OpCode::SetUpval => {
                let cell = upvalue(vm, closure, b)?;
                if let Some(uv) = vm.heap_mut().get_upval_mut(cell) {
                    uv.set(window.get(a));
                }
            }
            OpCode::GetTabUp => {
                let cell = upvalue(vm, closure, b)?;
                let t = vm.heap().get_upval(cell).map(UpVal::get).unwrap_or_default();
                window.set(a, index(vm, &t, &rk(c)?)?);
            }
            OpCode::SetTabUp => {
                let cell = upvalue(vm, closure, a as u32)?;
                let t = vm.heap().get_upval(cell).map(UpVal::get).unwrap_or_default();
                let idx = t
                    .as_table_idx()
                    .ok_or_else(|| LuaError::Runtime("attempt to index a non-table".into()))?;
                let (key, value) = (rk(b)?, rk(c)?);
                if let Some(table) = vm.heap_mut().get_table_mut(idx) {
                    table.raw_set(key, value).map_err(|e| LuaError::Runtime(e.into()))?;
                }
            }
            OpCode::GetTable => {
                let t = window.get(b as usize);
                window.set(a, index(vm, &t, &rk(c)?)?);
            }
            OpCode::Self_ => {
                let obj = window.get(b as usize);
                window.set(a + 1, obj.clone());
                window.set(a, index(vm, &obj, &rk(c)?)?);
            }
            op @ (OpCode::Add | OpCode::Sub) => {
                let (x, y) = (rk(b)?, rk(c)?);
                let (Some(x), Some(y)) = (x.as_integer(), y.as_integer()) else {
                    break Err(LuaError::Runtime(
                        "attempt to perform arithmetic on a non-integer value".into(),
                    ));
                };
                let v = if op == OpCode::Add { x + y } else { x - y };
                window.set(a, Value::Integer(v));
            }
            OpCode::Jmp => {
                pc = (pc as i64 + i64::from(inst.sbx())) as usize;
            }
            OpCode::Eq => {
                if (rk(b)? == rk(c)?) != (a != 0) {
                    pc += 1;
                }
            }
            OpCode::Test => {
                if window.get(a).is_truthy() != (c != 0) {
                    pc += 1;
                }
            }
            op @ (OpCode::Call | OpCode::TailCall) => {
                if b == 0 {
                    break Err(LuaError::Runtime("open argument lists are not supported".into()));
                }
                let callee = window.get(a);
                let Some(func) = callee.as_function().cloned() else {
                    break Err(LuaError::Runtime(format!(
                        "attempt to call a {} value",
                        callee.type_name()
                    )));
                };
                let args: Vec<Value> = (a + 1..a + b as usize).map(|r| window.get(r)).collect();
                let results = vm.call(thread, &func, &args)?;
                if op == OpCode::TailCall {
                    break Ok(results);
                }
                for i in 0..(c as usize).saturating_sub(1) {
                    window.set(a + i, results.get(i).cloned().unwrap_or_default());
                }
            }
            OpCode::Return => {
                if b == 0 {
                    break Err(LuaError::Runtime("open result lists are not supported".into()));
                }
                break Ok((a..a + b as usize - 1).map(|r| window.get(r)).collect());
            }
            OpCode::Closure => {
                let Some(child) = p.protos.get(inst.bx() as usize).cloned() else {
                    break Err(LuaError::Runtime("bad prototype index".into()));
                };
                let mut cells = Vec::with_capacity(child.upvalues.len());
                for desc in &child.upvalues {
                    let slot = usize::from(desc.index);
                    let cell = if desc.in_stack {
                        match open_slots.iter().find(|(s, _)| *s == slot) {
                            Some((_, cell)) => *cell,
                            None => {
                                let cell = vm.heap_mut().alloc_upval(UpValLocation::Open {
                                    window: window.clone(),
                                    slot,
                                });
                                open_slots.push((slot, cell));
                                open.push(cell);
                                cell
                            }
                        }
                    } else {
                        upvalue(vm, closure, u32::from(desc.index))?
                    };
                    cells.push(cell);
                }
                window.set(a, Value::Function(Function::Script(LuaClosure::new(child, cells))));
            }
            OpCode::VarArg => {
                for i in 0..(b as usize).saturating_sub(1) {
                    window.set(a + i, varargs.get(i + 1).cloned().unwrap_or_default());
                }
            }
            op => break Err(LuaError::Runtime(format!("unsupported opcode {}", op.name()))),
        }
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn abc(op: OpCode, a: u8, b: u32, c: u32) -> Instruction {
    Instruction::abc(op, a, b as u16, c as u16)
}

pub fn abx(op: OpCode, a: u8, bx: u32) -> Instruction {
    Instruction::abx(op, a, bx)
}

pub fn asbx(op: OpCode, a: u8, sbx: i32) -> Instruction {
    Instruction::asbx(op, a, sbx)
}

/// A VM with the mini interpreter attached.
pub fn new_vm() -> Arc<Vm> {
    let vm = Arc::new(Vm::new());
    vm.set_interpreter(Arc::new(MiniInterpreter));
    vm
}

/// A main chunk prototype: `_ENV` as its only upvalue.
pub fn main_proto(source: &str) -> Proto {
    let mut p = Proto::with_source(source);
    p.add_upvalue(Some("_ENV"), true, 0);
    p.is_vararg = true;
    p.max_stack_size = 8;
    p
}

/// A nested function prototype reaching `_ENV` through upvalue 0.
pub fn function_proto(source: &str, line_defined: u32, last_line_defined: u32) -> Proto {
    let mut p = Proto::with_source(source);
    p.add_upvalue(Some("_ENV"), false, 0);
    p.line_defined = line_defined;
    p.last_line_defined = last_line_defined;
    p.max_stack_size = 8;
    p
}

/// `function <name>(n) if n == 0 then probe() return end <name>(n - 1) end`,
/// defined on lines 1-6 of `source`. The base case calls the global `probe`
/// on line 3; the recursive call sits on line 5.
pub fn countdown_proto(source: &str, name: &str) -> Proto {
    let mut p = function_proto(source, 1, 6);
    p.num_params = 1;
    let zero = p.add_constant(Constant::Integer(0)) as u32;
    let one = p.add_constant(Constant::Integer(1)) as u32;
    let probe = p.add_string("probe") as u32;
    let this = p.add_string(name) as u32;
    p.emit(abc(OpCode::Eq, 0, 0, rk_ask(zero)), 2);
    p.emit(asbx(OpCode::Jmp, 0, 3), 2);
    p.emit(abc(OpCode::GetTabUp, 1, 0, rk_ask(probe)), 3);
    p.emit(abc(OpCode::Call, 1, 1, 1), 3);
    p.emit(abc(OpCode::Return, 0, 1, 0), 3);
    p.emit(abc(OpCode::GetTabUp, 1, 0, rk_ask(this)), 5);
    p.emit(abc(OpCode::Sub, 2, 0, rk_ask(one)), 5);
    p.emit(abc(OpCode::Call, 1, 2, 1), 5);
    p.emit(abc(OpCode::Return, 0, 1, 0), 6);
    p.add_local("n", 0, 9);
    p
}

/// Close a prototype over the global table.
pub fn load(vm: &Vm, proto: Proto) -> Function {
    let env = vm.heap_mut().alloc_closed_upval(Value::Table(vm.globals()));
    Function::Script(LuaClosure::new(Arc::new(proto), vec![env]))
}

/// Run a main chunk on the main thread.
pub fn run(vm: &Vm, proto: Proto) -> LuaResult<Vec<Value>> {
    let main = load(vm, proto);
    vm.call(&vm.main_thread(), &main, &[])
}

pub fn set_global(vm: &Vm, name: &str, value: impl Into<Value>) {
    let globals = vm.globals();
    if let Some(t) = vm.heap_mut().get_table_mut(globals) {
        t.raw_set_str(name, value.into());
    }
}

pub fn get_global(vm: &Vm, name: &str) -> Value {
    vm.heap()
        .get_table(vm.globals())
        .map(|t| t.raw_get_str(name))
        .unwrap_or_default()
}

/// A native function that receives the VM.
pub fn native_with_vm<F>(vm: &Arc<Vm>, name: &str, f: F) -> Function
where
    F: Fn(&Vm, &ThreadRef, &[Value]) -> Result<Vec<Value>, NativeError> + Send + Sync + 'static,
{
    let weak: Weak<Vm> = Arc::downgrade(vm);
    Function::Native(NativeFunction::new(name, move |ctx: &mut NativeContext<'_>| {
        let vm = weak.upgrade().ok_or_else(|| NativeError::from("vm dropped"))?;
        let thread = vm
            .thread(ctx.thread)
            .ok_or_else(|| NativeError::from("unknown thread"))?;
        f(&vm, &thread, ctx.args)
    }))
}

/// A native that appends the display form of its arguments to a log.
pub fn recorder(name: &str) -> (Function, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    let f = NativeFunction::new(name, move |ctx| {
        let entry = ctx
            .args
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        sink.lock().push(entry);
        Ok(vec![])
    });
    (Function::Native(f), log)
}

/// Check that results[idx] is an integer with the expected value.
pub fn assert_int(results: &[Value], idx: usize, expected: i64) {
    let val = &results[idx];
    let got = val
        .as_integer()
        .unwrap_or_else(|| panic!("result[{idx}] = {val:?}, expected integer {expected}"));
    assert_eq!(got, expected, "result[{idx}] = {got}, expected {expected}");
}

/// Check that results[idx] is a string with the expected value.
pub fn assert_str(results: &[Value], idx: usize, expected: &str) {
    let val = &results[idx];
    let got = val
        .as_str()
        .unwrap_or_else(|| panic!("result[{idx}] = {val:?}, expected string {expected:?}"));
    assert_eq!(got, expected, "result[{idx}]");
}
