use super::helpers::*;
use lunatrace_core::{Function, NativeError, NativeFunction, Value, Varargs};
use parking_lot::Mutex;
use std::sync::Arc;

#[test]
fn test_sethook_and_gethook() {
    let vm = setup();
    let (hook, log) = recorder();
    call(&vm, "sethook", &[hook.clone().into(), Value::from("rlxc"), Value::Integer(3)]).unwrap();

    let info = call(&vm, "gethook", &[]).unwrap();
    assert_eq!(
        info,
        vec![hook.into(), Value::from("clr"), Value::Integer(3)]
    );
    // sethook's own return is already hooked, as is the gethook call.
    assert_eq!(*log.lock(), vec!["return nil", "call nil", "return nil"]);

    call(&vm, "sethook", &[]).unwrap();
    assert_eq!(
        call(&vm, "gethook", &[]).unwrap(),
        vec![Value::Nil, Value::from(""), Value::Integer(0)]
    );
}

#[test]
fn test_line_hook_through_notifications() {
    let vm = setup();
    let thread = vm.main_thread();
    let (hook, log) = recorder();
    call(&vm, "sethook", &[hook.into(), Value::from("l")]).unwrap();

    let main = closure(&vm, chunk_proto("@t.lua", 0, 4));
    enter(&vm, &thread, &main, &[], 0);
    for pc in 1..4 {
        vm.on_instruction(&thread, pc, Varargs::none(), 0).unwrap();
    }
    leave(&vm, &thread);
    assert_eq!(*log.lock(), vec!["line 1", "line 2", "line 3", "line 4"]);
}

#[test]
fn test_hooks_on_another_thread() {
    let vm = setup();
    let other = vm.new_thread();
    let co = Value::Thread(other.id());
    let (hook, log) = recorder();
    call(&vm, "sethook", &[co.clone(), hook.into(), Value::from("c")]).unwrap();

    assert_eq!(call(&vm, "gethook", &[co]).unwrap()[1], Value::from("c"));
    assert_eq!(call(&vm, "gethook", &[]).unwrap()[0], Value::Nil);

    let g = closure(&vm, chunk_proto("@co.lua", 1, 2));
    enter(&vm, &other, &g, &[], 0);
    assert_eq!(*log.lock(), vec!["call nil"]);
}

#[test]
fn test_levels_inside_a_hook() {
    let vm = setup();
    let thread = vm.main_thread();
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = lines.clone();
    let weak = Arc::downgrade(&vm);
    let hook = NativeFunction::new("hook", move |ctx| {
        let vm = weak.upgrade().ok_or_else(|| NativeError::from("vm dropped"))?;
        let thread = vm.main_thread();
        // Neither the hook nor getinfo is on the stack: level 1 is the
        // interrupted function.
        let getinfo = debug_fn(&vm, "getinfo");
        let info = vm.call(&thread, &getinfo, &[Value::Integer(1), Value::from("l")])?;
        sink.lock().push((ctx.arg(1), field(&vm, &info[0], "currentline")));
        Ok(vec![])
    });
    call(&vm, "sethook", &[Function::Native(hook).into(), Value::from("l")]).unwrap();

    let main = closure(&vm, chunk_proto("@t.lua", 0, 4));
    enter(&vm, &thread, &main, &[], 2);
    assert_eq!(*lines.lock(), vec![(Value::Integer(3), Value::Integer(3))]);
    assert_eq!(thread.lock().depth(), 1);
}

#[test]
fn test_sethook_argument_errors() {
    let vm = setup();
    let (hook, _) = recorder();
    assert_eq!(
        call_err(&vm, "sethook", &[Value::Integer(5)]),
        "bad argument #1 to 'sethook' (function expected, got number)"
    );
    assert_eq!(
        call_err(&vm, "sethook", &[hook.clone().into()]),
        "bad argument #2 to 'sethook' (string expected, got no value)"
    );
    assert_eq!(
        call_err(&vm, "sethook", &[hook.into(), Value::from("c"), Value::from("x")]),
        "bad argument #3 to 'sethook' (number expected, got string)"
    );
}
