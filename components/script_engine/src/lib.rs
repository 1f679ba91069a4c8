//! Script Engine - heap, handles and persistent globals for an embedded engine
//!
//! This component provides:
//! - A slot heap of script objects with prototypes, accessors and a single
//!   embedder internal field per wrapper object
//! - Native functions and class constructors with base-first construction
//! - Local handle scopes and persistent globals with weak callbacks
//! - Mark-and-sweep garbage collection
//! - Exception propagation with [`TryCatch`] capture at the host boundary
//! - Pluggable source compilation ([`SourceCompiler`]), JSON by default
//!
//! The engine is single-threaded: an [`Engine`] is neither `Send` nor `Sync`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod compiler;
mod engine;
mod exception;
mod gc;
mod handle;
mod heap;
mod json;
mod object;
mod value;

pub use compiler::{JsonCompiler, SourceCompiler};
pub use engine::{CallInfo, Engine, EngineConfig};
pub use exception::{Thrown, TryCatch};
pub use gc::GcStats;
pub use handle::{GlobalId, HandleScope, WeakCallback};
pub use heap::{InternalField, NativeFn, PromiseState};
pub use json::MAX_JSON_DEPTH;
pub use value::{format_number, JsValue, ObjectRef, SymbolId};
