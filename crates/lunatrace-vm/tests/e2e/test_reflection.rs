use super::helpers::*;
use lunatrace_bytecode::opcode::rk_ask;
use lunatrace_bytecode::{Constant, OpCode, Proto};
use lunatrace_core::{Function, LuaClosure, Value};
use lunatrace_vm::{DebugConfig, FrameTarget, Vm};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;

#[test]
fn test_setlocal_is_seen_by_running_code() {
    let vm = new_vm();
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    let poke = native_with_vm(&vm, "poke", move |vm, thread, _| {
        let before = vm.getlocal(thread, 2, 1);
        let name = vm.setlocal(thread, 2, 1, Value::Integer(99));
        // Native frames have no locals.
        let native = vm.getlocal(thread, 1, 1);
        *sink.lock() = Some((before, name, native));
        Ok(vec![])
    });
    set_global(&vm, "poke", poke);

    // local x = 1; poke(); return x
    let mut main = main_proto("@locals.lua");
    let one = main.add_constant(Constant::Integer(1)) as u32;
    let name = main.add_string("poke") as u32;
    main.emit(abx(OpCode::LoadK, 0, one), 1);
    main.emit(abc(OpCode::GetTabUp, 1, 0, rk_ask(name)), 2);
    main.emit(abc(OpCode::Call, 1, 1, 1), 2);
    main.emit(abc(OpCode::Return, 0, 2, 0), 3);
    main.add_local("x", 1, 4);

    let results = run(&vm, main).unwrap();
    assert_int(&results, 0, 99);
    let (before, name, native) = seen.lock().take().unwrap();
    assert_eq!(before, Some((Arc::from("x"), Value::Integer(1))));
    assert_eq!(name, Some(Arc::from("x")));
    assert_eq!(native, None);
}

#[test]
fn test_temporaries_and_varargs() {
    let vm = new_vm();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let probe = native_with_vm(&vm, "probe", move |vm, thread, _| {
        let mut out = sink.lock();
        for n in [1, 2, 9, -1, -2, -3] {
            let entry = match vm.getlocal(thread, 2, n) {
                Some((name, value)) => format!("{n} {name} {}", value.type_name()),
                None => format!("{n} none"),
            };
            out.push(entry);
        }
        Ok(vec![])
    });
    set_global(&vm, "probe", probe);

    let mut main = main_proto("@va.lua");
    let name = main.add_string("probe") as u32;
    main.emit(abc(OpCode::VarArg, 0, 2, 0), 1);
    main.emit(abc(OpCode::GetTabUp, 1, 0, rk_ask(name)), 2);
    main.emit(abc(OpCode::Call, 1, 1, 1), 2);
    main.emit(abc(OpCode::Return, 0, 1, 0), 3);
    main.add_local("first", 1, 4);

    let chunk = load(&vm, main);
    vm.call(&vm.main_thread(), &chunk, &[Value::from("a"), Value::Integer(2)])
        .unwrap();
    assert_eq!(
        *seen.lock(),
        vec![
            "1 first string",
            "2 (*temporary) function",
            "9 none",
            "-1 (*vararg) string",
            "-2 (*vararg) number",
            "-3 none",
        ]
    );
}

/// ```text
/// local counter = 0
/// local function inc() counter = counter + 1 return counter end
/// local function get() return counter end
/// return inc, get
/// ```
fn counter_program() -> Proto {
    let mut inc = Proto::with_source("@counter.lua");
    inc.line_defined = 2;
    inc.last_line_defined = 2;
    inc.max_stack_size = 2;
    inc.add_upvalue(Some("counter"), true, 0);
    let one = inc.add_constant(Constant::Integer(1)) as u32;
    inc.emit(abc(OpCode::GetUpval, 0, 0, 0), 2);
    inc.emit(abc(OpCode::Add, 0, 0, rk_ask(one)), 2);
    inc.emit(abc(OpCode::SetUpval, 0, 0, 0), 2);
    inc.emit(abc(OpCode::Return, 0, 2, 0), 2);

    let mut get = Proto::with_source("@counter.lua");
    get.line_defined = 3;
    get.last_line_defined = 3;
    get.max_stack_size = 2;
    get.add_upvalue(Some("counter"), true, 0);
    get.emit(abc(OpCode::GetUpval, 0, 0, 0), 3);
    get.emit(abc(OpCode::Return, 0, 2, 0), 3);

    let mut main = main_proto("@counter.lua");
    let zero = main.add_constant(Constant::Integer(0)) as u32;
    main.protos.push(Arc::new(inc));
    main.protos.push(Arc::new(get));
    main.emit(abx(OpCode::LoadK, 0, zero), 1);
    main.emit(abx(OpCode::Closure, 1, 0), 2);
    main.emit(abx(OpCode::Closure, 2, 1), 3);
    main.emit(abc(OpCode::Return, 1, 3, 0), 4);
    main.add_local("counter", 1, 4);
    main.add_local("inc", 2, 4);
    main.add_local("get", 3, 4);
    main
}

#[test]
fn test_shared_upvalues() {
    let vm = new_vm();
    let results = run(&vm, counter_program()).unwrap();
    let inc = results[0].as_function().cloned().unwrap();
    let get = results[1].as_function().cloned().unwrap();
    let thread = vm.main_thread();

    assert!(vm.upvalueid(&inc, 1).is_some());
    assert_eq!(vm.upvalueid(&inc, 1), vm.upvalueid(&get, 1));
    assert_eq!(vm.upvalueid(&inc, 2), None);

    vm.call(&thread, &inc, &[]).unwrap();
    assert_eq!(
        vm.getupvalue(&get, 1),
        Some((Arc::from("counter"), Value::Integer(1)))
    );

    assert_eq!(vm.setupvalue(&inc, 1, Value::Integer(5)), Some(Arc::from("counter")));
    assert_int(&vm.call(&thread, &get, &[]).unwrap(), 0, 5);
    assert_int(&vm.call(&thread, &inc, &[]).unwrap(), 0, 6);

    // Rebind get's upvalue to a cell of its own.
    let cell = vm.heap_mut().alloc_closed_upval(Value::Integer(100));
    let mut holder = Proto::with_source("@holder.lua");
    holder.line_defined = 1;
    holder.add_upvalue(Some("boxed"), false, 0);
    let holder = Function::Script(LuaClosure::new(Arc::new(holder), vec![cell]));

    vm.upvaluejoin(&get, 1, &holder, 1).unwrap();
    assert_eq!(vm.upvalueid(&get, 1), Some(cell));
    assert_ne!(vm.upvalueid(&get, 1), vm.upvalueid(&inc, 1));
    assert_int(&vm.call(&thread, &get, &[]).unwrap(), 0, 100);
    assert_int(&vm.call(&thread, &inc, &[]).unwrap(), 0, 7);
    // The name stays with the function's own prototype.
    assert_eq!(vm.getupvalue(&get, 1).map(|(n, _)| n), Some(Arc::from("counter")));
}

#[test]
fn test_method_and_field_names() {
    let vm = new_vm();
    let names = Arc::new(Mutex::new(Vec::new()));
    let sink = names.clone();
    let probe = native_with_vm(&vm, "probe", move |vm, thread, _| {
        let info = vm.getinfo(thread, FrameTarget::Level(1), "n").unwrap();
        let name = info.name.unwrap();
        sink.lock().push(format!(
            "{}:{}",
            name.name.unwrap_or_default(),
            name.namewhat
        ));
        Ok(vec![])
    });
    let obj = vm.heap_mut().alloc_table();
    if let Some(t) = vm.heap_mut().get_table_mut(obj) {
        t.raw_set_str("m", Value::from(probe.clone()));
        t.raw_set_str("f", Value::from(probe));
    }
    set_global(&vm, "obj", obj);

    // local obj = obj; obj:m(); obj.f()
    let mut main = main_proto("@names.lua");
    let global = main.add_string("obj") as u32;
    let m = main.add_string("m") as u32;
    let f = main.add_string("f") as u32;
    main.emit(abc(OpCode::GetTabUp, 0, 0, rk_ask(global)), 1);
    main.emit(abc(OpCode::Self_, 1, 0, rk_ask(m)), 2);
    main.emit(abc(OpCode::Call, 1, 2, 1), 2);
    main.emit(abc(OpCode::GetTable, 1, 0, rk_ask(f)), 3);
    main.emit(abc(OpCode::Call, 1, 1, 1), 3);
    main.emit(abc(OpCode::Return, 0, 1, 0), 4);
    main.add_local("obj", 1, 6);

    run(&vm, main).unwrap();
    assert_eq!(*names.lock(), vec!["m:method", "f:field"]);
}

#[test]
fn test_active_lines_of_recursive_function() {
    let vm = new_vm();
    let rec = load(&vm, countdown_proto("@rec.lua", "rec"));
    set_global(&vm, "rec", rec.clone());

    let captured = Arc::new(Mutex::new(None));
    let sink = captured.clone();
    let target = rec.clone();
    let probe = native_with_vm(&vm, "probe", move |vm, thread, _| {
        *sink.lock() = vm.getinfo(thread, FrameTarget::Function(target.clone()), "SLl");
        Ok(vec![])
    });
    set_global(&vm, "probe", probe);

    vm.call(&vm.main_thread(), &rec, &[Value::Integer(2)]).unwrap();
    let info = captured.lock().take().unwrap();
    assert_eq!(info.active_lines, Some(vec![3, 5, 5]));
    // The innermost running instance supplies the current line.
    assert_eq!(info.current_line, Some(3));
    let source = info.source.unwrap();
    assert_eq!(source.line_defined, 1);
    assert_eq!(source.last_line_defined, 6);
    assert_eq!(source.short_src, "rec.lua");

    // Not running any more.
    let idle = vm
        .getinfo(&vm.main_thread(), FrameTarget::Function(rec), "lL")
        .unwrap();
    assert_eq!(idle.current_line, Some(-1));
    assert_eq!(idle.active_lines, Some(vec![]));
}

#[test]
fn test_absent_levels() {
    let vm = new_vm();
    let checked = Arc::new(Mutex::new(false));
    let sink = checked.clone();
    let probe = native_with_vm(&vm, "probe", move |vm, thread, _| {
        assert!(vm.getinfo(thread, FrameTarget::Level(0), "l").is_none());
        assert!(vm.getinfo(thread, FrameTarget::Level(4), "l").is_none());
        assert!(vm.getinfo(thread, FrameTarget::Level(-1), "l").is_none());
        assert!(vm.getlocal(thread, 9, 1).is_none());
        assert!(vm.setlocal(thread, 9, 1, Value::Nil).is_none());
        *sink.lock() = true;
        Ok(vec![])
    });
    set_global(&vm, "probe", probe);
    let f = load(&vm, countdown_proto("@zero.lua", "unused"));
    vm.call(&vm.main_thread(), &f, &[Value::Integer(0)]).unwrap();
    assert!(*checked.lock());
}

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_trace_mode_logs_each_instruction() {
    let vm = Arc::new(Vm::with_config(DebugConfig::default().with_trace(true)));
    vm.set_interpreter(Arc::new(MiniInterpreter));

    let mut main = main_proto("@traced.lua");
    let k = main.add_constant(Constant::Integer(42)) as u32;
    main.emit(abx(OpCode::LoadK, 0, k), 1);
    main.emit(abc(OpCode::Return, 0, 2, 0), 2);

    let capture = Capture::default();
    let writer = capture.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let results = tracing::subscriber::with_default(subscriber, || run(&vm, main)).unwrap();
    assert_int(&results, 0, 42);

    let out = String::from_utf8_lossy(&capture.0.lock()).into_owned();
    let exec: Vec<&str> = out.lines().filter(|l| l.contains("exec")).collect();
    assert_eq!(exec.len(), 2, "{out}");
    assert!(exec[0].contains("LOADK"), "{out}");
    assert!(exec[0].contains("traced.lua"), "{out}");
    assert!(exec[1].contains("RETURN"), "{out}");
    // Registers are dumped before the instruction runs.
    assert!(exec[1].contains("42"), "{out}");
}
