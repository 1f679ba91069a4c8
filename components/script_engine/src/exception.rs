//! Exception propagation.
//!
//! A thrown value is stored on the engine as the pending exception and the
//! throwing operation returns `Err(Thrown)`. A [`TryCatch`] captures the
//! pending exception at the boundary and clears it when dropped.

use crate::Engine;
use core_types::ScriptError;
use std::fmt;

/// Marker error: an exception is pending on the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thrown;

impl fmt::Display for Thrown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "script exception pending")
    }
}

impl std::error::Error for Thrown {}

/// Captures exceptions raised while it is alive.
///
/// # Examples
///
/// ```
/// use core_types::ErrorKind;
/// use script_engine::{Engine, TryCatch};
///
/// let engine = Engine::default();
/// let try_catch = TryCatch::new(&engine);
/// let _ = engine.throw_error(ErrorKind::RangeError, "too far");
///
/// let error = try_catch.exception().unwrap();
/// assert_eq!(error.kind, ErrorKind::RangeError);
/// assert!(!engine.has_pending_exception());
/// ```
pub struct TryCatch<'e> {
    engine: &'e Engine,
}

impl<'e> TryCatch<'e> {
    /// Opens a capture region.
    pub fn new(engine: &'e Engine) -> Self {
        Self { engine }
    }

    /// Whether an exception is pending.
    pub fn has_caught(&self) -> bool {
        self.engine.has_pending_exception()
    }

    /// Takes the pending exception and reports it with message and stack.
    pub fn exception(&self) -> Option<ScriptError> {
        self.engine
            .take_exception()
            .map(|value| self.engine.error_report(&value))
    }
}

impl Drop for TryCatch<'_> {
    fn drop(&mut self) {
        self.engine.clear_exception();
    }
}
