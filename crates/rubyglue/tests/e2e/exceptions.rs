//! Exception translation tests

use super::harness::*;
use rubyglue_sandbox::Arity;
use rubyglue::{
    protected_call, trap, translate_current_error, ExceptionRecord, ProtectState, Runtime, FRAME_PREFIX,
};

#[test]
fn test_record_type_is_class_path() {
    let (_vm, bridge) = setup();
    let bar = bridge.construct("Bar", &[]).unwrap();

    let (_, record) = expect_invocation(bar.call("run", &[]));
    assert_eq!(record.type_name(), "RuntimeError");
    assert_eq!(record.message(), "bad arg");
}

#[test]
fn test_record_type_is_namespaced_class_path() {
    let (_vm, bridge) = setup();
    let client = bridge.construct("Net::Client", &[]).unwrap();

    let (target, record) = expect_invocation(client.call("fetch", &[]));
    assert_eq!(target, "Net::Client#fetch");
    assert_eq!(record.type_name(), "Net::HTTPError");
    assert_eq!(record.message(), "503 Service Unavailable");
    assert_eq!(record.to_string(), "Net::HTTPError: 503 Service Unavailable");
}

#[test]
fn test_raising_undefined_class_is_name_error() {
    let (vm, bridge) = setup();
    vm.define_global_function("lost_fn", Arity::Exact(0), |vm, _, _| {
        vm.raise_error("Net::Missing", "never raised")
    })
    .unwrap();

    let (_, record) = expect_invocation(bridge.call(bridge.nil(), "lost_fn", &[]));
    assert_eq!(record.type_name(), "NameError");
    assert_eq!(record.message(), "uninitialized constant Net::Missing");
}

#[test]
fn test_one_frame_line_per_backtrace_entry() {
    let (_vm, bridge) = setup();
    let outer = bridge.construct("Outer", &[]).unwrap();

    let (target, record) = expect_invocation(outer.call("fail_through", &[]));
    assert_eq!(target, "Outer#fail_through");
    assert_eq!(record.type_name(), "RuntimeError");

    let lines: Vec<&str> = record.backtrace().lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|line| line.starts_with(FRAME_PREFIX)));
    assert_eq!(
        record.frames().collect::<Vec<_>>(),
        vec!["rubyglue:0:in `run'", "rubyglue:0:in `fail_through'"]
    );
}

#[test]
fn test_backtrace_innermost_first() {
    let (vm, bridge) = setup();
    vm.define_program("Outer.new.fail_through", |vm, ctx| {
        vm.at_line(ctx.line + 4);
        let outer = vm.class_new_instance(vm.path_to_class("Outer"), &[]);
        let fail_through = vm.intern("fail_through");
        vm.funcall(outer, fail_through, &[])
    });

    let err = bridge
        .eval("Outer.new.fail_through", Some("app.rb"), 10, bridge.nil())
        .unwrap_err();
    let record = err.record().unwrap();

    assert_eq!(record.type_name(), "RuntimeError");
    assert_eq!(record.message(), "bad arg");
    assert_eq!(
        record.frames().collect::<Vec<_>>(),
        vec![
            "app.rb:14:in `run'",
            "app.rb:14:in `fail_through'",
            "app.rb:14:in `<main>'",
            "rubyglue:0:in `eval'",
        ]
    );
}

#[test]
fn test_pending_exception_consumed() {
    let (vm, bridge) = setup();
    let bar = bridge.construct("Bar", &[]).unwrap();

    let _ = bar.call("run", &[]);
    bridge.with_lock(|rt| assert!(rt.is_nil(rt.current_exception())));

    // Nothing keeps the translated exception alive
    let live = vm.live_objects();
    assert!(vm.gc() > 0);
    assert!(vm.live_objects() < live);
}

#[test]
fn test_trap_default_message_keeps_type_and_backtrace() {
    let (_vm, bridge) = setup();
    let record = bridge
        .with_lock(|rt| {
            trap(rt, Some("custom failure"), |rt| {
                let missing = rt.intern("missing");
                rt.funcall(rt.nil(), missing, &[])
            })
        })
        .unwrap_err();

    assert_eq!(record.type_name(), "NoMethodError");
    assert_eq!(record.message(), "custom failure");
    assert!(record.frames().count() >= 1);
}

#[test]
fn test_translate_without_pending_exception() {
    let (_vm, bridge) = setup();
    let record = bridge.with_lock(|rt| translate_current_error(rt, Some("nothing raised")));

    assert_eq!(record, ExceptionRecord::new("nothing raised"));
    assert_eq!(record.backtrace(), "");
}

#[test]
fn test_protected_call_reports_raise_state() {
    let (_vm, bridge) = setup();
    let state = bridge
        .with_lock(|rt| {
            protected_call(rt, |rt| {
                let runtime_error = rt.path_to_class("RuntimeError");
                rt.raise(runtime_error, "trapped")
            })
        })
        .unwrap_err();
    assert_eq!(state, ProtectState::RAISE);

    let record = bridge.with_lock(|rt| translate_current_error(rt, None));
    assert_eq!(record.to_string(), "RuntimeError: trapped");
}

#[test]
fn test_failing_to_s_falls_back_to_type() {
    let (vm, bridge) = setup();
    let grumpy = vm.define_class("Grumpy", Some("StandardError")).unwrap();
    vm.define_method(grumpy, "to_s", Arity::Exact(0), |vm, _, _| {
        vm.raise_error("RuntimeError", "to_s exploded")
    })
    .unwrap();

    let record = bridge
        .with_lock(|rt| trap(rt, None, |rt| rt.raise(rt.path_to_class("Grumpy"), "hidden")))
        .unwrap_err();

    assert_eq!(record.type_name(), "Grumpy");
    assert_eq!(record.message(), "Grumpy");
    bridge.with_lock(|rt| assert!(rt.is_nil(rt.current_exception())));
}

#[test]
fn test_stackdump_and_json() {
    let (_vm, bridge) = setup();
    let bar = bridge.construct("Bar", &[]).unwrap();
    let (_, record) = expect_invocation(bar.call("run", &[]));

    let dump = record.stackdump();
    assert!(dump.starts_with("Type    : RuntimeError\nMessage : bad arg\nFrom    : "));

    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["type"], "RuntimeError");
    assert_eq!(json["message"], "bad arg");
    let decoded: ExceptionRecord = serde_json::from_value(json).unwrap();
    assert_eq!(decoded, record);
}
