//! In-process object runtime implementing the rubyglue embedding API
//!
//! [`Sandbox`] is a small Ruby-flavoured VM that lives entirely inside the
//! host process. It has the properties the bridge has to cope with in a real
//! embedded interpreter:
//! - a single global execution lock, checked on every API call
//! - exceptions that unwind the native stack unless trapped by `protect`
//! - a tracing garbage collector that frees anything not reachable from a
//!   registered root
//! - `require`, `load` and `eval` with file/line attributed backtraces
//!
//! There is no parser. Native classes and methods are defined through the
//! host API, and script sources map to native programs registered with
//! [`Sandbox::define_program`].
//!
//! # Example
//!
//! ```rust,ignore
//! use rubyglue_sandbox::{Arity, Sandbox};
//!
//! let vm = Sandbox::new();
//! let greeter = vm.define_class("Greeter", None)?;
//! vm.define_method(greeter, "greet", Arity::Exact(0), |vm, _, _| vm.str_new("hello"))?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod builtins;
pub mod class;
pub mod error;
mod heap;
pub mod script;
pub mod vm;

pub use class::{Arity, MethodFn};
pub use error::{SandboxError, SandboxResult};
pub use script::{FeatureFn, ProgramFn, ScriptContext};
pub use vm::Sandbox;
