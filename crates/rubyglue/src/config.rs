//! Bridge configuration
//!
//! ```toml
//! script_name = "mod_app"
//! load_paths = ["/srv/app/lib"]
//! eval_filename = "inline"
//! echo_function_errors = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// Malformed TOML
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Options applied when the bridge starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Name the running program is tagged with (`$0`)
    pub script_name: String,

    /// Directories appended to the runtime's feature load path
    pub load_paths: Vec<PathBuf>,

    /// Filename reported by `eval` when the caller gives none
    pub eval_filename: String,

    /// Whether `call_function` echoes a failing call's message to stdout
    pub echo_function_errors: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            script_name: "rubyglue".to_string(),
            load_paths: Vec::new(),
            eval_filename: "eval".to_string(),
            echo_function_errors: true,
        }
    }
}

impl BridgeConfig {
    /// Parse from TOML text; missing keys take their defaults
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Read and parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}
