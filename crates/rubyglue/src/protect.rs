//! Protected Invocation
//!
//! The sole point where VM-level errors stop being the runtime's non-local
//! exit and become ordinary return values. [`protected_call`] always runs its
//! entry function under the Lock Ownership Guard and inside the runtime's
//! error-trapping frame, returning the shim-level discriminated result:
//!
//! - `Ok(value)` when the entry function completed,
//! - `Err(state)` when the VM signalled an error. The raised exception is left
//!   in the VM's "current exception" slot for the translator.
//!
//! [`trap`] is the layer directly above: it runs the protected call and the
//! translation inside one lock-held section, so the current exception cannot
//! be replaced by another thread in between, and the pending error is always
//! consumed before control returns to the caller.

use crate::exception::{translate_current_error, ExceptionRecord};
use crate::gvl::run_with_lock;
use crate::runtime::{ProtectState, Runtime};
use crate::value::Value;

/// Shim-level outcome of a protected call
pub type Protected<T> = Result<T, ProtectState>;

/// Run `entry` under the lock and the VM's error trap.
///
/// `entry` receives the runtime and may call functions documented as
/// *may raise*. On error the VM's pending exception is left for
/// [`translate_current_error`].
pub fn protected_call<F>(rt: &dyn Runtime, entry: F) -> Protected<Value>
where
    F: FnOnce(&dyn Runtime) -> Value,
{
    run_with_lock(rt, || {
        let mut entry = Some(entry);
        let outcome = rt.protect(&mut || match entry.take() {
            Some(entry) => entry(rt),
            None => rt.nil(),
        });
        if let Err(state) = outcome {
            tracing::trace!(?state, "protected call trapped a VM error");
        }
        outcome
    })
}

/// Protected call plus translation in one critical section.
///
/// `default_message`, when given, becomes the record's message in place of
/// the exception's own `to_s`.
pub fn trap<F>(
    rt: &dyn Runtime,
    default_message: Option<&str>,
    entry: F,
) -> Result<Value, ExceptionRecord>
where
    F: FnOnce(&dyn Runtime) -> Value,
{
    run_with_lock(rt, || {
        protected_call(rt, entry).map_err(|_| translate_current_error(rt, default_message))
    })
}
