//! Bridge error types

use crate::config::ConfigError;
use crate::exception::ExceptionRecord;
use crate::runtime::ProtectState;

/// Errors surfaced by bridge operations
///
/// The three VM-failure variants each carry the [`ExceptionRecord`] the
/// translator produced for the failing call.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Object instantiation raised (unknown class path, or the constructor raised)
    #[error("Error creating class '{class_path}': {record}")]
    Construction {
        /// Class path that was being instantiated
        class_path: String,
        /// Translated VM exception
        record: ExceptionRecord,
    },

    /// Method call raised (including "no such method")
    #[error("Error invoking {target}(): {record}")]
    Invocation {
        /// Call target, `Class#method` or the bare method name
        target: String,
        /// Translated VM exception
        record: ExceptionRecord,
    },

    /// `require` or `load` failed
    #[error("{record}")]
    Load {
        /// Feature name or file path
        target: String,
        /// Translated VM exception
        record: ExceptionRecord,
    },

    /// The interpreter failed to initialize
    #[error("Failed to boot the VM: {0:?}")]
    Boot(ProtectState),

    /// The VM was shut down (or never started)
    #[error("VM is not running")]
    NotRunning,

    /// The object registry was torn down at shutdown
    #[error("Object registry has been torn down")]
    RegistryTornDown,

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl BridgeError {
    /// The translated VM exception, for VM-failure variants
    pub fn record(&self) -> Option<&ExceptionRecord> {
        match self {
            BridgeError::Construction { record, .. }
            | BridgeError::Invocation { record, .. }
            | BridgeError::Load { record, .. } => Some(record),
            _ => None,
        }
    }
}

/// Bridge operation result
pub type BridgeResult<T> = Result<T, BridgeError>;
