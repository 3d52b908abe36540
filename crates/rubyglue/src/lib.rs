//! Rubyglue: safe invocation bridge for an embedded scripting VM
//!
//! This crate lets native code drive a garbage-collected interpreter hosted
//! in the same process:
//! - Lock ownership guard (every VM call runs on the thread owning the VM's
//!   single execution lock)
//! - Protected invocation (VM errors are trapped at the boundary and never
//!   unwind through host frames)
//! - Exception translation (type, message and backtrace of the raised
//!   exception as an [`ExceptionRecord`])
//! - Object registry (GC root pinning host-referenced VM objects)
//! - Object handles, dynamic method calls, `require`/`load`/`eval`
//!
//! The interpreter itself is reached only through the [`Runtime`] trait.
//! With the `ruby` feature, [`ruby::RubyRuntime`] implements it over the C
//! Ruby VM.
//!
//! # Example
//!
//! ```rust,ignore
//! use rubyglue::{Bridge, BridgeConfig};
//!
//! let bridge = Bridge::startup(runtime, BridgeConfig::default());
//! bridge.require("json")?;
//! let parser = bridge.construct("JSON::Parser", &[bridge.string("{}")])?;
//! let doc = parser.call("parse", &[])?;
//! bridge.shutdown(0);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod bridge;
pub mod config;
pub mod error;
pub mod exception;
pub mod gvl;
pub mod invoke;
pub mod loader;
pub mod object;
pub mod protect;
pub mod registry;
#[cfg(feature = "ruby")]
pub mod ruby;
pub mod runtime;
pub mod sync;
pub mod value;

pub use bridge::{global, shutdown, startup, Bridge};
pub use config::{BridgeConfig, ConfigError};
pub use error::{BridgeError, BridgeResult};
pub use exception::{translate_current_error, ExceptionRecord, FRAME_PREFIX};
pub use gvl::run_with_lock;
pub use invoke::{call, call_function, invoke, require_class, CallDescriptor};
pub use loader::{eval, load, require};
pub use object::ObjectHandle;
pub use protect::{protected_call, trap, Protected};
pub use registry::ObjectRegistry;
#[cfg(feature = "ruby")]
pub use ruby::RubyRuntime;
pub use runtime::{ProtectState, Runtime};
pub use sync::{GlobalLock, GlobalLockGuard};
pub use value::{Id, Value};
