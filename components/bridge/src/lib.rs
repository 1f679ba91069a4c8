//! Bridge - binds host objects, classes and modules to an embedded engine
//!
//! This component provides:
//! - An [`Environment`] owning one engine instance and every registry built
//!   on it, registered in a process-wide [`store`] under a token
//! - Object bindings with an explicit ownership state machine
//!   ([`BindingState`]) reconciling host reference counts with script GC
//! - Native classes, declared by the embedder or reflected from the
//!   [`HostObjectModel`], materialized on first access
//! - A CommonJS module cache with a resolver chain, built-in loaders and
//!   in-place reload
//! - Tagged conversion between [`Variant`](core_types::Variant) and script
//!   values ([`marshal`])
//! - Timers, a cross-thread [`Inbox`] and deferred finalization
//!
//! All environment state is affine to the thread that created it. The
//! token-based entry points in [`callbacks`] check the calling thread and
//! reject foreign ones.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod binding;
pub mod callbacks;
mod class_registry;
mod deletion_queue;
mod environment;
mod error;
mod fs;
mod function_cache;
mod host;
mod inbox;
mod loaders;
pub mod marshal;
mod module_cache;
mod object_registry;
pub mod path_util;
mod resolver;
mod script_class;
mod settings;
pub mod store;
mod string_cache;
mod timers;

pub use binding::{BindingPolicy, BindingState, RefCountUnderflow, Strength, Transition};
pub use class_registry::{ClassOrigin, ClassRegisterFn, Finalizer, NativeClassDeclaration, NativeClassInfo};
pub use deletion_queue::{DeletionQueue, PendingDeletion};
pub use environment::{Environment, Statistics, Symbols};
pub use error::{BridgeError, BridgeResult};
pub use fs::{FileSystem, MemoryFileSystem, NativeFileSystem};
pub use host::{HostCallError, HostClassInfo, HostObjectModel, NullHost};
pub use inbox::{Inbox, Message, MessageKind};
pub use loaders::{BridgeModuleLoader, HostModuleLoader, ModuleLoader, BRIDGE_MODULE, HOST_MODULE};
pub use marshal::MarshalError;
pub use module_cache::{ModuleState, ReloadResult, ScriptModule};
pub use resolver::{ModuleResolver, SearchPathResolver, MODULE_EXTENSIONS};
pub use script_class::{DefaultObject, ScriptClassInfo, ScriptPropertyInfo, PROPERTIES_KEY};
pub use settings::EnvironmentParams;
pub use timers::TimerId;
