//! Stack frame type for script error tracking.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a single frame in a script call stack.
///
/// # Examples
///
/// ```
/// use core_types::StackFrame;
///
/// let frame = StackFrame::new("myFunction", Some("res/main.js"));
/// assert_eq!(frame.function_name, Some("myFunction".to_string()));
/// assert_eq!(frame.to_string(), "myFunction (res/main.js)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Name of the function, or None for anonymous functions
    pub function_name: Option<String>,
    /// File path of the module the function belongs to, if known
    pub source_url: Option<String>,
}

impl StackFrame {
    /// Creates a frame for a named function.
    pub fn new(function_name: &str, source_url: Option<&str>) -> Self {
        Self {
            function_name: if function_name.is_empty() {
                None
            } else {
                Some(function_name.to_string())
            },
            source_url: source_url.map(str::to_string),
        }
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.function_name.as_deref().unwrap_or("<anonymous>");
        match &self.source_url {
            Some(url) => write!(f, "{} ({})", name, url),
            None => write!(f, "{} (native)", name),
        }
    }
}
