//! Native class bookkeeping.
//!
//! Two registries share one class table: classes declared by the embedder
//! with a registration function, and classes reflected from the host object
//! model. A class stays materialized for the lifetime of its environment;
//! a class whose constructor could not be built leaves an empty slot and is
//! retried on the next lookup.

use crate::{BridgeError, BridgeResult, Environment};
use core_types::{HostPointer, NativeClassId};
use script_engine::{GlobalId, ObjectRef, Thrown};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Builds the constructor of a declared class.
///
/// Receives the id the class was assigned and the parent constructor, if the
/// declaration names a parent.
pub type ClassRegisterFn =
    Rc<dyn Fn(&Environment, NativeClassId, Option<ObjectRef>) -> Result<ObjectRef, Thrown>>;

/// Releases the host side of an object whose wrapper was collected.
///
/// The flag tells whether the binding was persistent.
pub type Finalizer = Rc<dyn Fn(HostPointer, bool)>;

/// A class declared by the embedder, materialized on first access.
#[derive(Clone)]
pub struct NativeClassDeclaration {
    /// Parent class name, declared or reflected
    pub parent: Option<String>,
    /// Builds the constructor
    pub register: ClassRegisterFn,
    /// Called when a bound instance is finalized; `None` hands the object to the host
    pub finalizer: Option<Finalizer>,
}

impl NativeClassDeclaration {
    /// Declares a class built by `register`.
    pub fn new<F>(register: F) -> Self
    where
        F: Fn(&Environment, NativeClassId, Option<ObjectRef>) -> Result<ObjectRef, Thrown> + 'static,
    {
        Self {
            parent: None,
            register: Rc::new(register),
            finalizer: None,
        }
    }

    /// Sets the parent class.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Sets the finalizer.
    pub fn with_finalizer<F>(mut self, finalizer: F) -> Self
    where
        F: Fn(HostPointer, bool) + 'static,
    {
        self.finalizer = Some(Rc::new(finalizer));
        self
    }
}

impl fmt::Debug for NativeClassDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeClassDeclaration")
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

/// Where a native class came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassOrigin {
    /// Declared by the embedder
    Declared,
    /// Reflected from the host object model
    Reflected,
}

/// A materialized native class.
#[derive(Clone)]
pub struct NativeClassInfo {
    /// Class name
    pub name: String,
    /// Registry the class belongs to
    pub origin: ClassOrigin,
    /// Parent class
    pub parent: Option<NativeClassId>,
    /// Global holding the constructor, set once the constructor exists
    pub constructor: Option<GlobalId>,
    /// Custom finalizer of a declared class
    pub finalizer: Option<Finalizer>,
}

impl fmt::Debug for NativeClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeClassInfo")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .field("parent", &self.parent)
            .field("constructor", &self.constructor)
            .finish_non_exhaustive()
    }
}

/// The native class table.
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: Vec<Option<NativeClassInfo>>,
    declarations: HashMap<String, NativeClassDeclaration>,
    declared: HashMap<String, NativeClassId>,
    reflected: HashMap<String, NativeClassId>,
    constructors: HashMap<ObjectRef, NativeClassId>,
}

impl ClassRegistry {
    /// Creates a registry sized for `capacity` classes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            classes: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Records a declaration.
    ///
    /// # Errors
    ///
    /// Fails with [`BridgeError::DuplicateClass`] if the name is taken.
    pub fn declare(&mut self, name: &str, declaration: NativeClassDeclaration) -> BridgeResult<()> {
        if self.declarations.contains_key(name) || self.declared.contains_key(name) {
            return Err(BridgeError::DuplicateClass(name.to_string()));
        }
        self.declarations.insert(name.to_string(), declaration);
        Ok(())
    }

    /// The declaration of a class not yet materialized.
    pub fn declaration(&self, name: &str) -> Option<NativeClassDeclaration> {
        self.declarations.get(name).cloned()
    }

    /// Adds a class and indexes it by name in its registry.
    ///
    /// A materialized declaration leaves the pending set.
    pub fn add(&mut self, info: NativeClassInfo) -> NativeClassId {
        let id = NativeClassId(self.classes.len() as u32);
        match info.origin {
            ClassOrigin::Declared => {
                self.declarations.remove(&info.name);
                self.declared.insert(info.name.clone(), id);
            }
            ClassOrigin::Reflected => {
                self.reflected.insert(info.name.clone(), id);
            }
        }
        self.classes.push(Some(info));
        id
    }

    /// Drops a class whose constructor failed to build.
    ///
    /// The id is never reused. A declared class gets `declaration` back so a
    /// later lookup materializes it again.
    pub fn discard(&mut self, id: NativeClassId, declaration: Option<NativeClassDeclaration>) {
        let Some(info) = self.classes.get_mut(id.0 as usize).and_then(Option::take) else {
            return;
        };
        let index = match info.origin {
            ClassOrigin::Declared => &mut self.declared,
            ClassOrigin::Reflected => &mut self.reflected,
        };
        if index.get(&info.name) == Some(&id) {
            index.remove(&info.name);
        }
        if let Some(declaration) = declaration {
            self.declarations.insert(info.name, declaration);
        }
    }

    /// Attaches the constructor of a class.
    pub fn set_constructor(&mut self, id: NativeClassId, global: GlobalId, constructor: ObjectRef) {
        if let Some(Some(info)) = self.classes.get_mut(id.0 as usize) {
            info.constructor = Some(global);
            self.constructors.insert(constructor, id);
        }
    }

    /// A class by id.
    pub fn get(&self, id: NativeClassId) -> Option<&NativeClassInfo> {
        self.classes.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// A materialized declared class by name.
    pub fn find_declared(&self, name: &str) -> Option<NativeClassId> {
        self.declared.get(name).copied()
    }

    /// A reflected class by host class name.
    pub fn find_reflected(&self, name: &str) -> Option<NativeClassId> {
        self.reflected.get(name).copied()
    }

    /// The class whose constructor is `constructor`.
    pub fn class_of_constructor(&self, constructor: ObjectRef) -> Option<NativeClassId> {
        self.constructors.get(&constructor).copied()
    }

    /// Number of materialized classes.
    pub fn len(&self) -> usize {
        self.classes.iter().flatten().count()
    }

    /// Whether no class is materialized.
    pub fn is_empty(&self) -> bool {
        self.classes.iter().all(Option::is_none)
    }

    /// Constructor globals of every class.
    pub fn constructor_globals(&self) -> Vec<GlobalId> {
        self.classes
            .iter()
            .flatten()
            .filter_map(|info| info.constructor)
            .collect()
    }
}
