//! Dynamic invocation tests

use super::harness::*;
use rubyglue::{call, invoke, require_class, trap, BridgeError, ProtectState, Runtime};
use rubyglue::invoke::call_function_with_output;
use rubyglue_sandbox::Arity;

// ============================================================================
// Method calls
// ============================================================================

#[test]
fn test_zero_arity_call() {
    let (_vm, bridge) = setup();
    let bar = bridge.construct("Bar", &[]).unwrap();

    let reply = bar.call("ping", &[]).unwrap();
    assert_eq!(bridge.string_value(reply).as_deref(), Some("pong"));
}

#[test]
fn test_arguments_passed_in_order() {
    let (_vm, bridge) = setup();
    let bar = bridge.construct("Bar", &[]).unwrap();
    let first = bridge.string("first").unwrap();
    let second = bridge.integer(2).unwrap();

    let pair = bar.call("pair", &[first, second]).unwrap();
    bridge.with_lock(|rt| {
        assert_eq!(rt.array_len(pair), 2);
        assert_eq!(rt.array_entry(pair, 0), first);
        assert_eq!(rt.array_entry(pair, 1), second);
    });
}

#[test]
fn test_missing_method() {
    let (_vm, bridge) = setup();
    let object = bridge.construct("EmptyClass", &[]).unwrap();

    let (target, record) = expect_invocation(object.call("nonexistent_method", &[]));
    assert_eq!(target, "EmptyClass#nonexistent_method");
    assert_eq!(record.type_name(), "NoMethodError");
    assert!(record.message().contains("nonexistent_method"));
}

#[test]
fn test_wrong_arity() {
    let (_vm, bridge) = setup();
    let bar = bridge.construct("Bar", &[]).unwrap();
    let one = bridge.integer(1).unwrap();

    let (_, record) = expect_invocation(bar.call("ping", &[one]));
    assert_eq!(record.type_name(), "ArgumentError");
    assert_eq!(record.message(), "wrong number of arguments (given 1, expected 0)");
}

#[test]
fn test_invocation_error_display() {
    let (_vm, bridge) = setup();
    let bar = bridge.construct("Bar", &[]).unwrap();

    let err = bar.call("run", &[]).unwrap_err();
    assert_eq!(err.to_string(), "Error invoking Bar#run(): RuntimeError: bad arg");
}

#[test]
fn test_object_usable_after_failed_call() {
    let (_vm, bridge) = setup();
    let bar = bridge.construct("Bar", &[]).unwrap();

    assert!(bar.call("run", &[]).is_err());
    let reply = bar.call("ping", &[]).unwrap();
    assert_eq!(bridge.string_value(reply).as_deref(), Some("pong"));
}

#[test]
fn test_call_on_raw_value() {
    let (_vm, bridge) = setup();
    let text = bridge.string("héllo").unwrap();

    let length = bridge.call(text, "length", &[]).unwrap();
    assert_eq!(bridge.int_value(length), Some(5));

    let err = bridge.call(text, "frobnicate", &[]).unwrap_err();
    match err {
        BridgeError::Invocation { target, record } => {
            assert_eq!(target, "frobnicate");
            assert_eq!(record.type_name(), "NoMethodError");
            assert_eq!(
                record.message(),
                "undefined method `frobnicate' for an instance of String"
            );
        }
        other => panic!("expected invocation error, got {:?}", other),
    }
}

#[test]
fn test_invoke_reports_protect_state() {
    let (_vm, bridge) = setup();
    let rt = bridge.runtime();
    let nil = bridge.nil();

    assert_eq!(invoke(rt, nil, "missing", &[]), Err(ProtectState::RAISE));
    // The shim result leaves the exception pending for the translator
    bridge.with_lock(|rt| {
        assert!(!rt.is_nil(rt.current_exception()));
        rt.clear_exception();
    });

    let result = call(rt, nil, "truthy_fn", &[]).unwrap();
    assert_eq!(bridge.int_value(result), Some(1));
}

// ============================================================================
// Reentrancy
// ============================================================================

#[test]
fn test_nested_call_from_inside_vm() {
    let (_vm, bridge) = setup();
    let outer = bridge.construct("Outer", &[]).unwrap();
    let value = bridge.integer(42).unwrap();

    let echoed = outer.call("through", &[value]).unwrap();
    assert_eq!(echoed, value);
}

#[test]
fn test_native_callback_reenters_bridge() {
    let (vm, bridge) = setup();
    let relay = vm.define_class("Relay", None).unwrap();
    let callback_bridge = bridge.clone();
    vm.define_method(relay, "relay", Arity::Exact(0), move |_, _, _| {
        // Already holding the lock: the bridge runs this in place
        let bar = callback_bridge.construct("Bar", &[]).unwrap();
        let reply = bar.call("ping", &[]).unwrap();
        assert!(callback_bridge.runtime().thread_has_lock());
        reply
    })
    .unwrap();

    let relay = bridge.construct("Relay", &[]).unwrap();
    let reply = relay.call("relay", &[]).unwrap();
    assert_eq!(bridge.string_value(reply).as_deref(), Some("pong"));
    assert_eq!(bridge.registry().len(bridge.runtime()), 1);
}

#[test]
fn test_nested_failure_stays_inside() {
    let (vm, bridge) = setup();
    let guard = vm.define_class("Guarded", None).unwrap();
    let callback_bridge = bridge.clone();
    vm.define_method(guard, "attempt", Arity::Exact(0), move |vm, _, _| {
        let bar = callback_bridge.construct("Bar", &[]).unwrap();
        match bar.call("run", &[]) {
            Ok(_) => vm.str_new("unexpected"),
            Err(err) => vm.str_new(err.record().map_or("", |record| record.message())),
        }
    })
    .unwrap();

    let guarded = bridge.construct("Guarded", &[]).unwrap();
    let reply = guarded.call("attempt", &[]).unwrap();
    assert_eq!(bridge.string_value(reply).as_deref(), Some("bad arg"));
}

// ============================================================================
// Argument type checking
// ============================================================================

#[test]
fn test_require_class() {
    let (_vm, bridge) = setup();
    let bar = bridge.construct("Bar", &[]).unwrap();
    let empty = bridge.construct("EmptyClass", &[]).unwrap();

    let ok = bridge.with_lock(|rt| {
        trap(rt, None, |rt| {
            require_class(rt, bar.value(), rt.path_to_class("Bar"));
            rt.nil()
        })
    });
    assert!(ok.is_ok());

    let record = bridge
        .with_lock(|rt| {
            trap(rt, None, |rt| {
                require_class(rt, empty.value(), rt.path_to_class("Bar"));
                rt.nil()
            })
        })
        .unwrap_err();
    assert_eq!(record.type_name(), "RuntimeError");
    assert_eq!(record.message(), "wrong argument type EmptyClass (expected Bar)");
}

// ============================================================================
// Top-level functions
// ============================================================================

#[test]
fn test_call_function_truthiness() {
    let (_vm, bridge) = setup();
    assert!(bridge.call_function("truthy_fn", &[]));
    assert!(!bridge.call_function("falsy_fn", &[]));
}

#[test]
fn test_call_function_echoes_error() {
    let (_vm, bridge) = setup();
    let rt = bridge.runtime();

    let mut out = Vec::new();
    assert!(!call_function_with_output(rt, "failing_fn", &[], &mut out));
    assert_eq!(String::from_utf8(out).unwrap(), "function failed\n");

    let mut out = Vec::new();
    assert!(!call_function_with_output(rt, "no_such_fn", &[], &mut out));
    assert!(String::from_utf8(out).unwrap().contains("no_such_fn"));

    bridge.with_lock(|rt| assert!(rt.is_nil(rt.current_exception())));
}
