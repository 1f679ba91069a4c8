//! Script error types.
//!
//! A [`ScriptError`] is the host-side report of an exception raised while
//! running script code. It is produced when the exception is captured at the
//! boundary and never travels back into the engine.

use crate::StackFrame;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of script error.
///
/// These correspond to the built-in error constructors of the script language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Generic `Error`, also used for thrown non-error values
    Error,
    /// Syntax error in script source
    SyntaxError,
    /// Type error (e.g., calling a non-function)
    TypeError,
    /// Reference to an undefined variable
    ReferenceError,
    /// Value out of allowed range
    RangeError,
    /// Internal engine error
    InternalError,
}

impl ErrorKind {
    /// Returns the constructor name used for the `name` property of error objects.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::InternalError => "InternalError",
        }
    }

    /// Maps an error `name` back to its kind. Unknown names map to [`ErrorKind::Error`].
    pub fn from_name(name: &str) -> Self {
        match name {
            "SyntaxError" => ErrorKind::SyntaxError,
            "TypeError" => ErrorKind::TypeError,
            "ReferenceError" => ErrorKind::ReferenceError,
            "RangeError" => ErrorKind::RangeError,
            "InternalError" => ErrorKind::InternalError,
            _ => ErrorKind::Error,
        }
    }
}

/// A captured script exception with message and stack trace.
///
/// # Examples
///
/// ```
/// use core_types::{ErrorKind, ScriptError, StackFrame};
///
/// let error = ScriptError {
///     kind: ErrorKind::TypeError,
///     message: "bad this".to_string(),
///     stack: vec![StackFrame::new("update", Some("res/player.js"))],
/// };
///
/// assert_eq!(error.to_string(), "TypeError: bad this\n    at update (res/player.js)");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptError {
    /// The class of the error
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Call stack at the time the error was created, innermost frame first
    pub stack: Vec<StackFrame>,
}

impl ScriptError {
    /// Creates an error report without stack information.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stack: Vec::new(),
        }
    }

    /// Formats the stack trace part only, one frame per line.
    pub fn stack_trace(&self) -> String {
        self.stack
            .iter()
            .map(|frame| format!("    at {}", frame))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.name(), self.message)?;
        if !self.stack.is_empty() {
            write!(f, "\n{}", self.stack_trace())?;
        }
        Ok(())
    }
}

impl std::error::Error for ScriptError {}
