//! Embedding API consumed by the bridge
//!
//! [`Runtime`] is the seam between the bridge and the embedded interpreter:
//! the thin shim over its C-level embedding functions. The bridge itself never
//! touches VM state except through this trait.
//!
//! Two rules apply to every method:
//! - The calling thread must own the runtime's global execution lock
//!   (see [`run_with_lock`](crate::run_with_lock)).
//! - Methods documented as *may raise* perform the runtime's non-local exit
//!   when the VM signals an error. They may only be called from inside
//!   [`Runtime::protect`], which traps that exit and reports a
//!   [`ProtectState`] instead.

use crate::value::{Id, Value};
use std::fmt;
use std::path::Path;

/// Jump tag reported by a protected call that did not complete normally
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtectState(i32);

impl ProtectState {
    /// `return` escaped the protected frame
    pub const RETURN: Self = Self(1);
    /// `break` escaped the protected frame
    pub const BREAK: Self = Self(2);
    /// `next` escaped the protected frame
    pub const NEXT: Self = Self(3);
    /// `retry` escaped the protected frame
    pub const RETRY: Self = Self(4);
    /// `redo` escaped the protected frame
    pub const REDO: Self = Self(5);
    /// An exception was raised
    pub const RAISE: Self = Self(6);
    /// `throw` without a matching `catch`
    pub const THROW: Self = Self(7);
    /// Fatal VM error
    pub const FATAL: Self = Self(8);

    /// Wrap a raw tag reported by the runtime
    pub const fn from_tag(tag: i32) -> Self {
        Self(tag)
    }

    /// Raw tag number
    pub const fn tag(self) -> i32 {
        self.0
    }

    /// Whether the protected call ended because of a raised exception
    pub fn is_raise(self) -> bool {
        self == Self::RAISE
    }
}

impl fmt::Debug for ProtectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.0 {
            1 => "RETURN",
            2 => "BREAK",
            3 => "NEXT",
            4 => "RETRY",
            5 => "REDO",
            6 => "RAISE",
            7 => "THROW",
            8 => "FATAL",
            _ => "UNKNOWN",
        };
        write!(f, "ProtectState({}={})", name, self.0)
    }
}

/// Embedding API of the hosted interpreter.
pub trait Runtime: Send + Sync {
    // ========================================================================
    // Global execution lock
    // ========================================================================

    /// Whether the calling native thread currently owns the execution lock
    fn thread_has_lock(&self) -> bool;

    /// Acquire the execution lock on behalf of the calling thread, run `f`,
    /// and release it. Blocks until the lock is available. `f` must be
    /// invoked exactly once.
    fn call_with_lock(&self, f: &mut dyn FnMut());

    // ========================================================================
    // Error trapping
    // ========================================================================

    /// Run `f` under the VM's error-trapping frame.
    ///
    /// Returns `Err` with the jump tag when the VM signalled an error; the
    /// raised exception is then available from [`current_exception`](Self::current_exception).
    fn protect(&self, f: &mut dyn FnMut() -> Value) -> Result<Value, ProtectState>;

    /// Load a script file, trapping any error it raises.
    ///
    /// With `anonymous` set the file runs inside a fresh anonymous module so
    /// it cannot pollute the global namespace.
    fn load_protect(&self, path: &str, anonymous: bool) -> Result<(), ProtectState>;

    /// The VM's "current exception" global (`$!`); nil when none is set
    fn current_exception(&self) -> Value;

    /// Reset the "current exception" global to nil
    fn clear_exception(&self);

    /// Raise a new instance of `class` with `message`. Never returns.
    fn raise(&self, class: Value, message: &str) -> !;

    // ========================================================================
    // Values
    // ========================================================================

    /// The nil value
    fn nil(&self) -> Value;

    /// Whether `value` is nil
    fn is_nil(&self, value: Value) -> bool {
        value == self.nil()
    }

    /// Truthiness: everything except nil and false
    fn truthy(&self, value: Value) -> bool;

    /// Intern a method or constant name
    fn intern(&self, name: &str) -> Id;

    /// Create a VM string
    fn str_new(&self, s: &str) -> Value;

    /// Create a VM integer
    fn int_new(&self, n: i64) -> Value;

    /// Contents of a VM string; `None` when `value` is not a string
    fn string_value(&self, value: Value) -> Option<String>;

    /// Contents of a VM integer; `None` when `value` is not an integer
    fn int_value(&self, value: Value) -> Option<i64>;

    /// Create an empty VM array
    fn array_new(&self) -> Value;

    /// Append to a VM array
    fn array_push(&self, array: Value, value: Value);

    /// Length of a VM array (0 for non-arrays)
    fn array_len(&self, array: Value) -> usize;

    /// Element of a VM array; nil when out of range
    fn array_entry(&self, array: Value, index: usize) -> Value;

    /// Remove the element at `index`, returning it (nil when out of range)
    fn array_delete_at(&self, array: Value, index: usize) -> Value;

    /// Runtime class of `value`
    fn class_of(&self, value: Value) -> Value;

    /// Fully qualified path of `class` (e.g. `"Net::HTTP"`) as a VM string
    fn class_path(&self, class: Value) -> Value;

    /// String representation of `value` (its `to_s`). *May raise.*
    fn obj_as_string(&self, value: Value) -> Value;

    /// Whether `value` is an instance of exactly `class`
    fn is_instance_of(&self, value: Value, class: Value) -> bool;

    // ========================================================================
    // GC rooting
    // ========================================================================

    /// Mark `value` as a GC root until a matching [`gc_unregister`](Self::gc_unregister)
    fn gc_register(&self, value: Value);

    /// Drop one GC root registration for `value`
    fn gc_unregister(&self, value: Value);

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Dynamic dispatch of `method` on `receiver` with exactly `args`. *May raise.*
    fn funcall(&self, receiver: Value, method: Id, args: &[Value]) -> Value;

    /// Resolve a class path such as `"Foo::Bar"`. *May raise.*
    fn path_to_class(&self, path: &str) -> Value;

    /// Instantiate `class` with constructor arguments `args`. *May raise.*
    fn class_new_instance(&self, class: Value, args: &[Value]) -> Value;

    /// Require a feature by name. *May raise.*
    fn require(&self, feature: &str) -> Value;

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Tag the running program with `name` (`$0`)
    fn set_script_name(&self, name: &str);

    /// Append a directory to the feature load path
    fn push_load_path(&self, path: &Path);

    /// Finalize the VM. Returns the process exit status to use.
    fn cleanup(&self, exit_code: i32) -> i32;
}
