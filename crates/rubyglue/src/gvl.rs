//! Lock Ownership Guard
//!
//! Every VM call made by the bridge goes through [`run_with_lock`]. When the
//! calling thread already owns the runtime's execution lock the work runs in
//! place; otherwise the runtime's own "call with lock" primitive runs it on
//! the caller's behalf and the caller blocks until it completes.

use crate::runtime::Runtime;

/// Run `f` while the calling thread owns the runtime's execution lock.
///
/// Reentrant: a thread that already owns the lock calls `f` directly without
/// blocking. Otherwise this is a synchronous rendezvous with no timeout.
///
/// # Panics
/// Panics if the runtime returns from `call_with_lock` without having run
/// the callback, which breaks the [`Runtime`] contract.
pub fn run_with_lock<R>(rt: &dyn Runtime, f: impl FnOnce() -> R) -> R {
    if rt.thread_has_lock() {
        return f();
    }

    tracing::trace!("handing call to lock-holding context");
    let mut f = Some(f);
    let mut result = None;
    rt.call_with_lock(&mut || {
        if let Some(f) = f.take() {
            result = Some(f());
        }
    });
    result.expect("Runtime::call_with_lock returned without running its callback")
}
