//! Classes, modules and native methods

use crate::vm::Sandbox;
use rubyglue::{Id, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Body of a native method: `(vm, self, args) -> result`.
///
/// Runs with the execution lock held and inside the caller's error trap, so
/// it may raise through [`Sandbox::raise_error`].
pub type MethodFn = dyn Fn(&Sandbox, Value, &[Value]) -> Value + Send + Sync;

/// Accepted argument counts of a method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly `n` arguments
    Exact(usize),
    /// Between `min` and `max` arguments, inclusive
    Range(usize, usize),
    /// At least `n` arguments
    AtLeast(usize),
}

impl Arity {
    /// Check if `count` arguments are accepted
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::Range(min, max) => (min..=max).contains(&count),
            Arity::AtLeast(min) => count >= min,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{}", n),
            Arity::Range(min, max) => write!(f, "{}..{}", min, max),
            Arity::AtLeast(min) => write!(f, "{}+", min),
        }
    }
}

#[derive(Clone)]
pub(crate) struct Method {
    pub arity: Arity,
    pub body: Arc<MethodFn>,
}

/// Class or module definition stored in the heap
pub(crate) struct ClassDef {
    /// Fully qualified path; anonymous modules use `#<Module:0x..>`
    pub path: String,
    pub superclass: Option<Value>,
    pub methods: HashMap<Id, Method>,
    /// Constants defined inside this namespace by `define_class_in`
    pub constants: HashMap<String, Value>,
    pub is_module: bool,
}

impl ClassDef {
    pub fn class(path: impl Into<String>, superclass: Option<Value>) -> Self {
        Self {
            path: path.into(),
            superclass,
            methods: HashMap::new(),
            constants: HashMap::new(),
            is_module: false,
        }
    }

    pub fn module(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            superclass: None,
            methods: HashMap::new(),
            constants: HashMap::new(),
            is_module: true,
        }
    }
}
