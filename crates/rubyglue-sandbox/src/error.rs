//! Host-side setup errors

use thiserror::Error;

/// Errors returned by the sandbox's host API (class and method definition)
///
/// These never cross into the VM; VM-level errors are raised exceptions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SandboxError {
    /// No class or module is bound to the path
    #[error("undefined class/module {0}")]
    UnknownClass(String),

    /// The path names a module where a class is needed, or vice versa
    #[error("{path} is not a {expected}")]
    WrongKind {
        /// Offending constant path
        path: String,
        /// `"class"` or `"module"`
        expected: &'static str,
    },

    /// The value is not a class or module
    #[error("value is not a class or module")]
    NotAClass,

    /// The VM was finalized
    #[error("VM has been cleaned up")]
    Finalized,
}

/// Result type for the host API
pub type SandboxResult<T> = Result<T, SandboxError>;
