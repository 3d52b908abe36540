//! Dynamic Invocation Proxy
//!
//! Calls a method by name on a raw VM value. [`invoke`] resolves the name,
//! builds a [`CallDescriptor`] and drives it through the protected call,
//! returning the shim-level result; [`call`] adds translation into a
//! [`BridgeError`]. Neither knows about object handles.

use crate::error::{BridgeError, BridgeResult};
use crate::exception::translate_current_error;
use crate::gvl::run_with_lock;
use crate::protect::{protected_call, Protected};
use crate::runtime::Runtime;
use crate::value::{Id, Value};
use std::io::Write;

/// One method call: receiver, method identifier and the exact argument list.
///
/// Built right before the call and dropped right after it.
#[derive(Debug, Clone, Copy)]
pub struct CallDescriptor<'a> {
    /// Receiver of the call
    pub receiver: Value,
    /// Interned method name
    pub method: Id,
    /// Positional arguments (an empty slice is a zero-arity call)
    pub args: &'a [Value],
}

impl<'a> CallDescriptor<'a> {
    /// Describe a call
    pub fn new(receiver: Value, method: Id, args: &'a [Value]) -> Self {
        Self {
            receiver,
            method,
            args,
        }
    }

    /// Perform the dynamic dispatch. *May raise*: run inside a protected call.
    pub fn dispatch(&self, rt: &dyn Runtime) -> Value {
        rt.funcall(self.receiver, self.method, self.args)
    }
}

/// Call `method` on `receiver` under the protected call.
///
/// On error the VM's current exception is left for the translator.
pub fn invoke(rt: &dyn Runtime, receiver: Value, method: &str, args: &[Value]) -> Protected<Value> {
    run_with_lock(rt, || {
        let call = CallDescriptor::new(receiver, rt.intern(method), args);
        protected_call(rt, |rt| call.dispatch(rt))
    })
}

/// Call `method` on `receiver`, translating a VM error into
/// [`BridgeError::Invocation`].
pub fn call(rt: &dyn Runtime, receiver: Value, method: &str, args: &[Value]) -> BridgeResult<Value> {
    run_with_lock(rt, || {
        invoke(rt, receiver, method, args).map_err(|_| BridgeError::Invocation {
            target: method.to_string(),
            record: translate_current_error(rt, None),
        })
    })
}

/// Call a top-level function (receiver nil), echoing any error message to
/// standard output. Returns the truthiness of the result, `false` on error.
pub fn call_function(rt: &dyn Runtime, name: &str, args: &[Value]) -> bool {
    call_function_with_output(rt, name, args, &mut std::io::stdout())
}

/// [`call_function`] writing the error message to `out`
pub fn call_function_with_output(
    rt: &dyn Runtime,
    name: &str,
    args: &[Value],
    out: &mut dyn Write,
) -> bool {
    let outcome = run_with_lock(rt, || call(rt, rt.nil(), name, args).map(|value| rt.truthy(value)));
    match outcome {
        Ok(truthy) => truthy,
        Err(err) => {
            let message = match err.record() {
                Some(record) => record.message().to_string(),
                None => err.to_string(),
            };
            tracing::warn!(function = name, %message, "VM function call failed");
            let _ = writeln!(out, "{}", message);
            false
        }
    }
}

/// Raise `RuntimeError` unless `value` is an instance of exactly `class`.
///
/// For native method bodies running inside the VM: the caller must own the
/// execution lock and be inside a protected call. *May raise.*
pub fn require_class(rt: &dyn Runtime, value: Value, class: Value) {
    if rt.is_instance_of(value, class) {
        return;
    }
    let actual = rt
        .string_value(rt.class_path(rt.class_of(value)))
        .unwrap_or_default();
    let expected = rt.string_value(rt.class_path(class)).unwrap_or_default();
    let runtime_error = rt.path_to_class("RuntimeError");
    rt.raise(
        runtime_error,
        &format!("wrong argument type {} (expected {})", actual, expected),
    );
}
