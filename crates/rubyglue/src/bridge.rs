//! Bridge lifecycle and the process-wide handle
//!
//! A [`Bridge`] is the explicit context object tying one [`Runtime`] to its
//! [`ObjectRegistry`] and [`BridgeConfig`]. Hosts normally install exactly one
//! through [`startup`] and reach it through [`global`]; tests and multi-VM
//! hosts may also create bridges directly with [`Bridge::startup`].
//!
//! Shutdown tears down the registry before finalizing the runtime. After it,
//! every operation fails with [`BridgeError::NotRunning`] and object handles
//! dropped late perform no VM call at all.

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::gvl::run_with_lock;
use crate::invoke;
use crate::loader;
use crate::object::ObjectHandle;
use crate::registry::ObjectRegistry;
use crate::runtime::Runtime;
use crate::value::Value;
use once_cell::sync::OnceCell;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

static GLOBAL: OnceCell<Arc<Bridge>> = OnceCell::new();

/// A running VM together with its object registry
pub struct Bridge {
    runtime: Arc<dyn Runtime>,
    registry: ObjectRegistry,
    config: BridgeConfig,
    running: AtomicBool,
    exit_status: OnceCell<i32>,
}

impl Bridge {
    /// Start a bridge over an initialized runtime: tag the script name and
    /// extend the load path, then accept calls.
    pub fn startup(runtime: Arc<dyn Runtime>, config: BridgeConfig) -> Arc<Self> {
        let bridge = Arc::new(Self {
            runtime,
            registry: ObjectRegistry::new(),
            config,
            running: AtomicBool::new(false),
            exit_status: OnceCell::new(),
        });

        let rt = bridge.runtime();
        run_with_lock(rt, || {
            rt.set_script_name(&bridge.config.script_name);
            for path in &bridge.config.load_paths {
                rt.push_load_path(path);
            }
        });
        bridge.running.store(true, Ordering::SeqCst);

        tracing::info!(
            script = %bridge.config.script_name,
            load_paths = bridge.config.load_paths.len(),
            "VM bridge started"
        );
        bridge
    }

    /// Tear down the object registry, then finalize the runtime.
    ///
    /// Idempotent: later calls return the status of the first one.
    pub fn shutdown(&self, exit_code: i32) -> i32 {
        if self.running.swap(false, Ordering::SeqCst) {
            let rt = self.runtime();
            let status = run_with_lock(rt, || {
                self.registry.teardown(rt);
                rt.cleanup(exit_code)
            });
            let _ = self.exit_status.set(status);
            tracing::info!(exit_code, status, "VM bridge shut down");
        }
        self.exit_status.get().copied().unwrap_or(exit_code)
    }

    /// The runtime this bridge drives
    pub fn runtime(&self) -> &dyn Runtime {
        &*self.runtime
    }

    /// The object registry pinning live handles
    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    /// Startup configuration
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Check if the bridge accepts calls
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run `f` under the execution lock, failing with
    /// [`BridgeError::NotRunning`] once shutdown has begun.
    ///
    /// The flag is read inside the lock-held section: `shutdown` clears it
    /// before finalizing under the same lock, so a call queued behind it
    /// never reaches the finalized VM.
    pub(crate) fn run_live<R>(
        &self,
        f: impl FnOnce(&dyn Runtime) -> BridgeResult<R>,
    ) -> BridgeResult<R> {
        let rt = self.runtime();
        run_with_lock(rt, || {
            if !self.is_running() {
                return Err(BridgeError::NotRunning);
            }
            f(rt)
        })
    }

    /// Run `f` while owning the execution lock. Does not check that the
    /// bridge is running.
    pub fn with_lock<R>(&self, f: impl FnOnce(&dyn Runtime) -> R) -> R {
        let rt = self.runtime();
        run_with_lock(rt, || f(rt))
    }

    // ========================================================================
    // Value helpers
    // ========================================================================

    /// The nil value
    pub fn nil(&self) -> Value {
        self.with_lock(|rt| rt.nil())
    }

    /// Create a VM string
    pub fn string(&self, s: &str) -> BridgeResult<Value> {
        self.run_live(|rt| Ok(rt.str_new(s)))
    }

    /// Create a VM integer
    pub fn integer(&self, n: i64) -> BridgeResult<Value> {
        self.run_live(|rt| Ok(rt.int_new(n)))
    }

    /// Read a VM string; `None` for non-strings and after shutdown
    pub fn string_value(&self, value: Value) -> Option<String> {
        self.run_live(|rt| Ok(rt.string_value(value))).ok().flatten()
    }

    /// Read a VM integer; `None` for non-integers and after shutdown
    pub fn int_value(&self, value: Value) -> Option<i64> {
        self.run_live(|rt| Ok(rt.int_value(value))).ok().flatten()
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Instantiate `class_path` and wrap the new object in a pinned handle
    pub fn construct(self: &Arc<Self>, class_path: &str, args: &[Value]) -> BridgeResult<ObjectHandle> {
        ObjectHandle::new(self, class_path, args)
    }

    /// Call `method` on a raw VM value
    pub fn call(&self, receiver: Value, method: &str, args: &[Value]) -> BridgeResult<Value> {
        self.run_live(|rt| invoke::call(rt, receiver, method, args))
    }

    /// Call a top-level function; errors are echoed to stdout (when
    /// configured) and reported as `false`.
    pub fn call_function(&self, name: &str, args: &[Value]) -> bool {
        self.run_live(|rt| {
            Ok(if self.config.echo_function_errors {
                invoke::call_function_with_output(rt, name, args, &mut io::stdout())
            } else {
                invoke::call_function_with_output(rt, name, args, &mut io::sink())
            })
        })
        .unwrap_or(false)
    }

    /// Require a feature
    pub fn require(&self, name: &str) -> BridgeResult<()> {
        self.run_live(|rt| loader::require(rt, name))
    }

    /// Load a script file, optionally into an anonymous namespace
    pub fn load(&self, path: &str, anonymous: bool) -> BridgeResult<()> {
        self.run_live(|rt| loader::load(rt, path, anonymous))
    }

    /// Evaluate `code`, reporting `filename` (or the configured default) and
    /// `start_line` in backtraces
    pub fn eval(
        &self,
        code: &str,
        filename: Option<&str>,
        start_line: i32,
        binding: Value,
    ) -> BridgeResult<Value> {
        let filename = filename.unwrap_or(&self.config.eval_filename);
        self.run_live(|rt| loader::eval(rt, code, Some(filename), start_line, binding))
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("script_name", &self.config.script_name)
            .field("running", &self.is_running())
            .field("registry_torn_down", &self.registry.is_torn_down())
            .finish()
    }
}

// ============================================================================
// Process-wide handle
// ============================================================================

/// Start the process-wide bridge. No-op (returning the installed bridge) if
/// one was already started; a bridge that was shut down is not restarted.
pub fn startup(runtime: Arc<dyn Runtime>, config: BridgeConfig) -> Arc<Bridge> {
    GLOBAL
        .get_or_init(|| Bridge::startup(runtime, config))
        .clone()
}

/// The process-wide bridge, if started
pub fn global() -> Option<Arc<Bridge>> {
    GLOBAL.get().cloned()
}

/// Shut down the process-wide bridge. Idempotent; returns `exit_code`
/// unchanged when no bridge was started.
pub fn shutdown(exit_code: i32) -> i32 {
    match GLOBAL.get() {
        Some(bridge) => bridge.shutdown(exit_code),
        None => exit_code,
    }
}
