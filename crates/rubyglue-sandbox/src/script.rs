//! Scripts: host-registered programs, features and the load path
//!
//! The sandbox has no parser. A *program* is a native closure registered
//! under the exact source text it stands for (surrounding whitespace
//! ignored); `eval`, `load` and file-backed `require` look the source up and
//! run the matching program. A *feature* is a closure registered under a
//! `require` name.

use crate::vm::Sandbox;
use rubyglue::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Body of a registered program
pub type ProgramFn = dyn Fn(&Sandbox, &ScriptContext) -> Value + Send + Sync;

/// Body of a registered feature
pub type FeatureFn = dyn Fn(&Sandbox) + Send + Sync;

/// Where and how a program is being run
#[derive(Debug, Clone)]
pub struct ScriptContext {
    /// File name reported in backtraces
    pub filename: String,
    /// First line number reported in backtraces
    pub line: i64,
    /// Binding passed to `eval` (nil for top level)
    pub binding: Value,
    /// Anonymous module wrapping a `load(path, true)`
    pub wrap: Option<Value>,
}

#[derive(Default)]
pub(crate) struct Scripts {
    programs: HashMap<String, Arc<ProgramFn>>,
    features: HashMap<String, Arc<FeatureFn>>,
    loaded: HashSet<String>,
    load_path: Vec<PathBuf>,
}

/// Found by a `require` lookup
pub(crate) enum Resolved {
    AlreadyLoaded,
    Feature(Arc<FeatureFn>),
    File(PathBuf),
    Missing,
}

/// `require` key of a feature name: `"json.rb"` and `"json"` are one feature
pub(crate) fn feature_key(name: &str) -> &str {
    name.strip_suffix(".rb").unwrap_or(name)
}

impl Scripts {
    pub fn define_program(&mut self, source: &str, program: Arc<ProgramFn>) {
        self.programs.insert(source.trim().to_string(), program);
    }

    pub fn program(&self, source: &str) -> Option<Arc<ProgramFn>> {
        self.programs.get(source.trim()).cloned()
    }

    pub fn provide_feature(&mut self, name: &str, feature: Arc<FeatureFn>) {
        self.features.insert(feature_key(name).to_string(), feature);
    }

    pub fn push_load_path(&mut self, path: &Path) {
        if !self.load_path.iter().any(|known| known == path) {
            self.load_path.push(path.to_path_buf());
        }
    }

    pub fn load_path(&self) -> &[PathBuf] {
        &self.load_path
    }

    pub fn mark_loaded(&mut self, key: &str) {
        self.loaded.insert(key.to_string());
    }

    pub fn is_loaded(&self, key: &str) -> bool {
        self.loaded.contains(key)
    }

    pub fn loaded_features(&self) -> Vec<String> {
        let mut features: Vec<String> = self.loaded.iter().cloned().collect();
        features.sort();
        features
    }

    /// Resolve a `require` key: registered features first, then `<key>.rb`
    /// under each load path entry in order.
    pub fn resolve(&self, key: &str) -> Resolved {
        if self.is_loaded(key) {
            return Resolved::AlreadyLoaded;
        }
        if let Some(feature) = self.features.get(key) {
            return Resolved::Feature(feature.clone());
        }
        let file_name = format!("{}.rb", key);
        let direct = Path::new(&file_name);
        if direct.is_absolute() && direct.is_file() {
            return Resolved::File(direct.to_path_buf());
        }
        self.load_path
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|candidate| candidate.is_file())
            .map_or(Resolved::Missing, Resolved::File)
    }
}
