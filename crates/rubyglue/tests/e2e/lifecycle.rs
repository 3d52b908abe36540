//! Startup and shutdown tests

use super::harness::*;
use crossbeam::channel;
use rubyglue::{BridgeConfig, BridgeError, Runtime};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_startup_applies_config() {
    let vm = fixture_vm();
    let config = BridgeConfig::from_toml_str(
        r#"
        script_name = "mod_app"
        load_paths = ["/srv/app/lib", "/srv/app/vendor"]
        "#,
    )
    .unwrap();
    let bridge = start_bridge(&vm, config);

    assert!(bridge.is_running());
    assert_eq!(vm.script_name(), "mod_app");
    assert_eq!(vm.load_path().len(), 2);
    assert_eq!(bridge.config().eval_filename, "eval");
}

#[test]
fn test_shutdown_is_idempotent() {
    let (vm, bridge) = setup();

    assert_eq!(bridge.shutdown(3), 3);
    assert!(vm.is_finalized());
    assert!(!bridge.is_running());
    assert!(bridge.registry().is_torn_down());

    // Second shutdown reports the first status and touches nothing
    assert_eq!(bridge.shutdown(9), 3);
}

#[test]
fn test_operations_after_shutdown() {
    let (_vm, bridge) = setup();
    bridge.shutdown(0);

    assert!(matches!(bridge.construct("EmptyClass", &[]), Err(BridgeError::NotRunning)));
    assert!(matches!(bridge.require("json"), Err(BridgeError::NotRunning)));
    assert!(matches!(bridge.load("/tmp/x.rb", false), Err(BridgeError::NotRunning)));
    assert!(matches!(bridge.eval("1", None, 1, bridge.runtime().nil()), Err(BridgeError::NotRunning)));
    assert!(!bridge.call_function("truthy_fn", &[]));
    assert!(matches!(bridge.string("late"), Err(BridgeError::NotRunning)));
    assert!(matches!(bridge.integer(1), Err(BridgeError::NotRunning)));
    assert_eq!(BridgeError::NotRunning.to_string(), "VM is not running");
}

#[test]
fn test_handles_outliving_shutdown() {
    let (vm, bridge) = setup();
    let handle = bridge.construct("Bar", &[]).unwrap();
    let value = handle.value();
    assert_eq!(vm.root_count(), 1);

    bridge.shutdown(0);
    // Teardown released the registry root
    assert_eq!(vm.root_count(), 0);

    assert!(matches!(handle.call("ping", &[]), Err(BridgeError::NotRunning)));
    // Dropping after shutdown performs no VM call (the VM would panic)
    drop(handle);

    vm.gc();
    assert!(!vm.is_live(value));
}

#[test]
fn test_call_queued_behind_shutdown_reports_not_running() {
    let (vm, bridge) = setup();
    let bar = Arc::new(bridge.construct("Bar", &[]).unwrap());
    let (tx, rx) = channel::bounded(1);

    let guard = vm.lock().acquire();
    let worker = {
        let bar = bar.clone();
        thread::spawn(move || {
            let result = bar.call("ping", &[]).map(|_| ());
            tx.send(result).unwrap();
        })
    };

    // The worker is waiting for the lock this thread owns
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(bridge.shutdown(0), 0);
    drop(guard);

    let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(matches!(result, Err(BridgeError::NotRunning)), "got {:?}", result);
    worker.join().unwrap();
    assert!(vm.is_finalized());
}

#[test]
fn test_registry_refuses_after_teardown() {
    let (_vm, bridge) = setup();
    let rt = bridge.runtime();
    let value = bridge.string("late").unwrap();

    bridge.registry().teardown(rt);
    let result = bridge.with_lock(|rt| bridge.registry().register(rt, value));
    assert!(matches!(result, Err(BridgeError::RegistryTornDown)));
}

#[test]
fn test_global_bridge() {
    let vm = fixture_vm();
    let runtime: Arc<dyn Runtime> = vm.clone();
    let first = rubyglue::startup(runtime.clone(), test_config());
    let second = rubyglue::startup(runtime, test_config());
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, &rubyglue::global().unwrap()));

    assert!(rubyglue::global().unwrap().call_function("truthy_fn", &[]));

    assert_eq!(rubyglue::shutdown(5), 5);
    assert_eq!(rubyglue::shutdown(7), 5);
    assert!(!first.is_running());
}
