//! Script Loader
//!
//! `require`, `load` and `eval`, each a thin composition of the protected
//! call and the translator.

use crate::error::{BridgeError, BridgeResult};
use crate::exception::translate_current_error;
use crate::gvl::run_with_lock;
use crate::invoke;
use crate::protect::trap;
use crate::runtime::Runtime;
use crate::value::Value;

/// Filename reported by [`eval`] when none is given
pub const DEFAULT_EVAL_FILENAME: &str = "eval";

/// Require feature `name`.
///
/// On failure the record's message is `error loading <name>.rb` (`name`
/// may already carry the `.rb` suffix); the VM's own type and backtrace are
/// kept.
pub fn require(rt: &dyn Runtime, name: &str) -> BridgeResult<()> {
    let stem = name.strip_suffix(".rb").unwrap_or(name);
    let message = format!("error loading {}.rb", stem);
    trap(rt, Some(&message), |rt| {
        rt.require(name);
        rt.nil()
    })
    .map(|_| ())
    .map_err(|record| BridgeError::Load {
        target: name.to_string(),
        record,
    })
}

/// Load the script at `path` into the global namespace, or into a fresh
/// anonymous module when `anonymous` is set.
pub fn load(rt: &dyn Runtime, path: &str, anonymous: bool) -> BridgeResult<()> {
    // load_protect traps errors itself, so only the lock is needed here
    run_with_lock(rt, || match rt.load_protect(path, anonymous) {
        Ok(()) => Ok(()),
        Err(state) => {
            tracing::trace!(?state, path, "load trapped a VM error");
            Err(BridgeError::Load {
                target: path.to_string(),
                record: translate_current_error(rt, None),
            })
        }
    })
}

/// Evaluate `code` through the VM's `eval`, attributing it to `filename`
/// (default [`DEFAULT_EVAL_FILENAME`]) starting at `start_line`, so
/// backtraces point at a meaningful location instead of `(eval)`.
pub fn eval(
    rt: &dyn Runtime,
    code: &str,
    filename: Option<&str>,
    start_line: i32,
    binding: Value,
) -> BridgeResult<Value> {
    run_with_lock(rt, || {
        let args = [
            rt.str_new(code),
            binding,
            rt.str_new(filename.unwrap_or(DEFAULT_EVAL_FILENAME)),
            rt.int_new(i64::from(start_line)),
        ];
        invoke::call(rt, rt.nil(), "eval", &args)
    })
}
