//! Bridge error types.

use crate::marshal::MarshalError;
use core_types::{HostPointer, NativeClassId, ScriptError};
use thiserror::Error;

/// Errors returned by [`Environment`](crate::Environment) operations.
///
/// Script exceptions never cross the boundary as unwinding: they are
/// captured, logged with their stack and reported as one of these values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    /// A host pointer was bound twice
    #[error("duplicate binding for {0}")]
    DuplicateBinding(HostPointer),
    /// The host pointer has no binding
    #[error("{0} is not bound")]
    UnboundPointer(HostPointer),
    /// The pointer was already marked persistent
    #[error("{0} is already persistent")]
    AlreadyPersistent(HostPointer),
    /// A host reference was released more often than it was taken
    #[error("reference count underflow for {0}")]
    RefCountUnderflow(HostPointer),
    /// Stale object id, or an object that cannot carry a binding
    #[error("invalid object: {0}")]
    InvalidObject(String),
    /// Class id out of range
    #[error("invalid class id {0}")]
    InvalidClass(NativeClassId),
    /// Stale script class id
    #[error("invalid script class")]
    InvalidScriptClass,
    /// A native class with this name was already declared
    #[error("duplicate class {0}")]
    DuplicateClass(String),
    /// No declared or reflected class has this name
    #[error("unknown class {0}")]
    UnknownClass(String),
    /// No loader or resolver accepted the id
    #[error("unknown module: {0}")]
    UnknownModule(String),
    /// A relative module id escapes its root
    #[error("bad path: {0}")]
    BadPath(String),
    /// The module source failed to compile or its body threw
    #[error("failed to load module {0}")]
    CompilationFailed(String),
    /// A script class could not be constructed for a host object
    #[error("failed to construct {0}")]
    ConstructionFailed(String),
    /// A call failed: stale function, dangling receiver, bad argument,
    /// exception, or unconvertible return value
    #[error("invalid method: {0}")]
    InvalidMethod(String),
    /// A script exception escaped a property access
    #[error("script exception: {0}")]
    Exception(ScriptError),
    /// Value conversion failed
    #[error(transparent)]
    Conversion(#[from] MarshalError),
    /// The caller is not on the environment's owning thread
    #[error("called from a thread that does not own the environment")]
    WrongThread,
    /// The environment has been disposed
    #[error("environment disposed")]
    Disposed,
    /// The token does not name a live environment
    #[error("unknown environment")]
    UnknownEnvironment,
    /// Configuration rejected
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    /// File system failure while reading a module
    #[error("i/o error on {path}: {message}")]
    Io {
        /// Path being accessed
        path: String,
        /// Underlying error message
        message: String,
    },
}

/// Result alias used throughout the bridge.
pub type BridgeResult<T> = Result<T, BridgeError>;
