//! Object handle and registry tests

use super::harness::*;
use rubyglue::{BridgeError, ObjectHandle};
use std::sync::Arc;
use std::thread;

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_construct_pins_object() {
    let (vm, bridge) = setup();
    let handle = bridge.construct("EmptyClass", &[]).unwrap();

    assert_eq!(handle.class_name(), "EmptyClass");
    assert_eq!(bridge.registry().len(bridge.runtime()), 1);
    assert!(bridge.registry().contains(bridge.runtime(), handle.value()));

    vm.gc();
    assert!(vm.is_live(handle.value()));
}

#[test]
fn test_construct_with_arguments() {
    let (_vm, bridge) = setup();
    let value = bridge.integer(7).unwrap();
    let handle = bridge.construct("Strict", &[value]).unwrap();

    let stored = handle.call("value", &[]).unwrap();
    assert_eq!(bridge.int_value(stored), Some(7));
}

#[test]
fn test_construct_unknown_class() {
    let (_vm, bridge) = setup();
    let err = bridge.construct("NoSuchClass", &[]).unwrap_err();

    match &err {
        BridgeError::Construction { class_path, record } => {
            assert_eq!(class_path, "NoSuchClass");
            assert_eq!(record.type_name(), "ArgumentError");
            assert_eq!(record.message(), "undefined class/module NoSuchClass");
        }
        other => panic!("expected construction error, got {:?}", other),
    }
    assert_eq!(
        err.to_string(),
        "Error creating class 'NoSuchClass': ArgumentError: undefined class/module NoSuchClass"
    );
    assert!(bridge.registry().is_empty(bridge.runtime()));
}

#[test]
fn test_construct_namespaced_class() {
    let (_vm, bridge) = setup();
    let client = bridge.construct("Net::Client", &[]).unwrap();

    assert_eq!(client.class_name(), "Net::Client");
    assert!(bridge.registry().contains(bridge.runtime(), client.value()));
    let class = client.call("class", &[]).unwrap();
    let path = bridge.call(class, "name", &[]).unwrap();
    assert_eq!(bridge.string_value(path).as_deref(), Some("Net::Client"));
}

#[test]
fn test_constructor_raise_leaves_registry_unchanged() {
    let (_vm, bridge) = setup();
    let existing = bridge.construct("Bar", &[]).unwrap();
    let arg = bridge.integer(1).unwrap();

    let err = bridge.construct("Bar", &[arg]).unwrap_err();
    match &err {
        BridgeError::Construction { class_path, record } => {
            assert_eq!(class_path, "Bar");
            assert_eq!(record.type_name(), "RuntimeError");
            assert!(record.message().contains("bad arg"));
        }
        other => panic!("expected construction error, got {:?}", other),
    }
    assert_eq!(bridge.registry().len(bridge.runtime()), 1);
    drop(existing);
}

#[test]
fn test_constructor_raise_pins_nothing() {
    let (_vm, bridge) = setup();
    let err = bridge.construct("Broken", &[]).unwrap_err();

    let record = err.record().unwrap();
    assert_eq!(record.type_name(), "ArgumentError");
    assert_eq!(record.message(), "broken constructor");
    assert!(bridge.registry().is_empty(bridge.runtime()));
}

#[test]
fn test_constructor_arity_mismatch() {
    let (_vm, bridge) = setup();
    let err = bridge.construct("Strict", &[]).unwrap_err();

    let record = err.record().unwrap();
    assert_eq!(record.type_name(), "ArgumentError");
    assert_eq!(record.message(), "wrong number of arguments (given 0, expected 1)");
    assert!(bridge.registry().is_empty(bridge.runtime()));
}

// ============================================================================
// Pinning
// ============================================================================

#[test]
fn test_drop_unpins_object() {
    let (vm, bridge) = setup();
    let handle = bridge.construct("EmptyClass", &[]).unwrap();
    let value = handle.value();

    drop(handle);
    assert!(bridge.registry().is_empty(bridge.runtime()));

    vm.gc();
    assert!(!vm.is_live(value));
}

#[test]
fn test_registry_size_tracks_live_handles() {
    let (_vm, bridge) = setup();
    let rt = bridge.runtime();

    let mut handles: Vec<_> = (0..10)
        .map(|_| bridge.construct("Counter", &[]).unwrap())
        .collect();
    assert_eq!(bridge.registry().len(rt), 10);

    // Drop every other handle
    let mut kept = Vec::new();
    for (index, handle) in handles.drain(..).enumerate() {
        if index % 2 == 0 {
            kept.push(handle);
        }
    }
    assert_eq!(bridge.registry().len(rt), 5);
    for handle in &kept {
        assert!(bridge.registry().contains(rt, handle.value()));
    }

    drop(kept);
    assert!(bridge.registry().is_empty(rt));
}

#[test]
fn test_collection_between_calls_keeps_state() {
    let (vm, bridge) = setup();
    let counter = bridge.construct("Counter", &[]).unwrap();

    counter.call("increment", &[]).unwrap();
    vm.gc();
    counter.call("increment", &[]).unwrap();
    vm.gc();
    let count = counter.call("increment", &[]).unwrap();

    assert_eq!(bridge.int_value(count), Some(3));
}

#[test]
fn test_unregister_absent_value_is_noop() {
    let (_vm, bridge) = setup();
    let handle = bridge.construct("EmptyClass", &[]).unwrap();
    let stray = bridge.string("not pinned").unwrap();

    bridge.with_lock(|rt| bridge.registry().unregister(rt, stray));
    assert_eq!(bridge.registry().len(bridge.runtime()), 1);
    drop(handle);
}

#[test]
fn test_registry_root_survives_collection() {
    let (vm, bridge) = setup();
    let first = bridge.construct("EmptyClass", &[]).unwrap();
    let roots = vm.root_count();
    assert_eq!(roots, 1);

    vm.gc();
    let second = ObjectHandle::new(&bridge, "EmptyClass", &[]).unwrap();
    assert_eq!(vm.root_count(), 1);
    assert_eq!(bridge.registry().len(bridge.runtime()), 2);

    drop(first);
    drop(second);
}

// ============================================================================
// Threads
// ============================================================================

#[test]
fn test_handles_move_between_threads() {
    let (vm, bridge) = setup();
    let counter = Arc::new(bridge.construct("Counter", &[]).unwrap());

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let counter = counter.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    counter.call("increment", &[]).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    vm.gc();
    let count = counter.call("increment", &[]).unwrap();
    assert_eq!(bridge.int_value(count), Some(101));
}

#[test]
fn test_drop_on_other_thread() {
    let (_vm, bridge) = setup();
    let handle = bridge.construct("EmptyClass", &[]).unwrap();

    thread::spawn(move || drop(handle)).join().unwrap();
    assert!(bridge.registry().is_empty(bridge.runtime()));
}
