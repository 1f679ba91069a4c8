//! The host object model consumed by the bridge.
//!
//! The bridge never dereferences a [`HostPointer`]. Everything it needs to
//! know about host objects (their classes, methods and lifetimes) goes
//! through [`HostObjectModel`].

use core_types::{EnvironmentToken, HostPointer, Variant};
use thiserror::Error;

/// Reflection data for one host class.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HostClassInfo {
    /// Class name as exposed to scripts
    pub name: String,
    /// Parent class name, materialized first
    pub parent: Option<String>,
    /// Readable and writable properties
    pub properties: Vec<String>,
    /// Callable methods
    pub methods: Vec<String>,
}

impl HostClassInfo {
    /// Creates reflection data with no members.
    pub fn new(name: impl Into<String>, parent: Option<&str>) -> Self {
        Self {
            name: name.into(),
            parent: parent.map(str::to_string),
            properties: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Adds a method.
    pub fn with_method(mut self, name: impl Into<String>) -> Self {
        self.methods.push(name.into());
        self
    }

    /// Adds a property.
    pub fn with_property(mut self, name: impl Into<String>) -> Self {
        self.properties.push(name.into());
        self
    }
}

/// Failure of a host method call or property access.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostCallError {
    /// No such method on the object's class
    #[error("unknown method {0}")]
    UnknownMethod(String),
    /// No such property on the object's class
    #[error("unknown property {0}")]
    UnknownProperty(String),
    /// An argument has the wrong type
    #[error("invalid argument {index}: {reason}")]
    InvalidArgument {
        /// Position of the argument
        index: usize,
        /// What was wrong with it
        reason: String,
    },
    /// The host object was already destroyed
    #[error("{0} is no longer alive")]
    DeadObject(HostPointer),
    /// Any other host-side failure
    #[error("{0}")]
    Failed(String),
}

/// The host application's object model.
///
/// Implementations are called from the environment's owning thread only.
/// A callback may re-enter the environment (for example, `finalize`
/// releasing child objects); the bridge holds no internal borrow while
/// calling out.
pub trait HostObjectModel {
    /// Reflection data for a class, or `None` if the host has no such class.
    fn class_info(&self, class_name: &str) -> Option<HostClassInfo>;

    /// The class name of a live host object.
    fn class_of(&self, pointer: HostPointer) -> Option<String>;

    /// Creates a new host object of the given class.
    fn instantiate(&self, class_name: &str) -> Option<HostPointer>;

    /// Whether the object's lifetime is governed by a host reference count.
    fn is_ref_counted(&self, _pointer: HostPointer) -> bool {
        false
    }

    /// Takes the initial host reference of a ref-counted object.
    ///
    /// Returns false if the object is already being destroyed.
    fn init_ref(&self, _pointer: HostPointer) -> bool {
        true
    }

    /// Drops the reference taken by [`init_ref`](Self::init_ref) when the
    /// binding it was taken for is rolled back.
    fn release_ref(&self, _pointer: HostPointer) {}

    /// Calls a method on a host object.
    fn call_method(
        &self,
        pointer: HostPointer,
        method: &str,
        args: &[Variant],
    ) -> Result<Variant, HostCallError>;

    /// Reads a property of a host object.
    fn get_property(&self, pointer: HostPointer, name: &str) -> Result<Variant, HostCallError>;

    /// Writes a property of a host object.
    fn set_property(
        &self,
        pointer: HostPointer,
        name: &str,
        value: Variant,
    ) -> Result<(), HostCallError>;

    /// Destroys (or releases) a host object whose script wrapper is gone.
    fn finalize(&self, pointer: HostPointer, persistent: bool);

    /// Called once an object is bound. The host installs its reference and
    /// free hooks here, routing them through [`crate::callbacks`] with `token`.
    fn on_bound(&self, _pointer: HostPointer, _token: EnvironmentToken) {}
}

/// A host with no classes and no objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHost;

impl HostObjectModel for NullHost {
    fn class_info(&self, _class_name: &str) -> Option<HostClassInfo> {
        None
    }

    fn class_of(&self, _pointer: HostPointer) -> Option<String> {
        None
    }

    fn instantiate(&self, _class_name: &str) -> Option<HostPointer> {
        None
    }

    fn call_method(
        &self,
        pointer: HostPointer,
        _method: &str,
        _args: &[Variant],
    ) -> Result<Variant, HostCallError> {
        Err(HostCallError::DeadObject(pointer))
    }

    fn get_property(&self, pointer: HostPointer, _name: &str) -> Result<Variant, HostCallError> {
        Err(HostCallError::DeadObject(pointer))
    }

    fn set_property(
        &self,
        pointer: HostPointer,
        _name: &str,
        _value: Variant,
    ) -> Result<(), HostCallError> {
        Err(HostCallError::DeadObject(pointer))
    }

    fn finalize(&self, _pointer: HostPointer, _persistent: bool) {}
}
