//! Environment construction parameters.

use crate::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parameters for [`Environment::new`](crate::Environment::new).
///
/// Slot counts are capacity hints only; every table grows on demand.
///
/// # Examples
///
/// ```
/// use bridge::EnvironmentParams;
///
/// let params = EnvironmentParams::default()
///     .with_search_path("res")
///     .with_deletion_queue_size(100);
///
/// assert_eq!(params.search_paths, vec!["res".to_string()]);
/// assert!(params.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentParams {
    /// Expected number of native classes
    pub initial_class_slots: usize,
    /// Expected number of script classes
    pub initial_script_slots: usize,
    /// Expected number of bound objects
    pub initial_object_slots: usize,
    /// Deferred-deletion queue size, rounded up to a power of two
    pub deletion_queue_size: usize,
    /// Engine allocations between automatic collections (`0` disables)
    pub gc_threshold: usize,
    /// Maximum script call depth
    pub max_call_depth: usize,
    /// Roots of the default module resolver, searched in order
    pub search_paths: Vec<String>,
    /// Panic on invariant violations instead of logging them
    pub strict_checks: bool,
}

impl Default for EnvironmentParams {
    fn default() -> Self {
        Self {
            initial_class_slots: 128,
            initial_script_slots: 32,
            initial_object_slots: 256,
            deletion_queue_size: 64,
            gc_threshold: 10_000,
            max_call_depth: 256,
            search_paths: Vec::new(),
            strict_checks: false,
        }
    }
}

impl EnvironmentParams {
    /// Reads parameters from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| BridgeError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        let params: Self = serde_json::from_str(&text)
            .map_err(|err| BridgeError::InvalidParams(format!("{}: {}", path.display(), err)))?;
        params.validate()?;
        Ok(params)
    }

    /// Checks the parameters for values the environment cannot work with.
    pub fn validate(&self) -> BridgeResult<()> {
        if self.deletion_queue_size == 0 {
            return Err(BridgeError::InvalidParams(
                "deletion_queue_size must be greater than zero".to_string(),
            ));
        }
        if self.max_call_depth == 0 {
            return Err(BridgeError::InvalidParams(
                "max_call_depth must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Appends a resolver search path.
    pub fn with_search_path(mut self, path: impl Into<String>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    /// Sets the deferred-deletion queue size.
    pub fn with_deletion_queue_size(mut self, size: usize) -> Self {
        self.deletion_queue_size = size;
        self
    }

    /// Sets the automatic collection threshold.
    pub fn with_gc_threshold(mut self, threshold: usize) -> Self {
        self.gc_threshold = threshold;
        self
    }

    /// Enables or disables strict invariant checks.
    pub fn with_strict_checks(mut self, strict: bool) -> Self {
        self.strict_checks = strict;
        self
    }

    /// Sets the capacity hints for native classes, script classes and objects.
    pub fn with_capacity(mut self, classes: usize, scripts: usize, objects: usize) -> Self {
        self.initial_class_slots = classes;
        self.initial_script_slots = scripts;
        self.initial_object_slots = objects;
        self
    }
}
