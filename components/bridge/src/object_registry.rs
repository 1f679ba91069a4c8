//! Index of host objects reflected into script space.
//!
//! The registry is pure bookkeeping: it records which wrapper global belongs
//! to which host pointer and tracks each binding's ownership state. Applying
//! the resulting engine actions is the environment's job.

use crate::binding::{BindingPolicy, BindingState, RefCountUnderflow, Transition};
use crate::{BridgeError, BridgeResult};
use core_types::{HostPointer, NativeClassId, ObjectId, SlotTable};
use script_engine::GlobalId;
use std::collections::{HashMap, HashSet};

/// One bound host object.
#[derive(Debug, Clone, Copy)]
pub struct ObjectHandle {
    /// Native class the object was bound as
    pub class_id: NativeClassId,
    /// The host object
    pub pointer: HostPointer,
    /// Global holding the script wrapper
    pub global: GlobalId,
    /// Ownership state
    pub state: BindingState,
}

/// Outcome of a host reference change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceOutcome {
    /// The pointer has no binding
    Unbound,
    /// The binding changed; apply `transition` to `global`
    Changed {
        /// Wrapper global
        global: GlobalId,
        /// Engine action to apply
        transition: Transition,
        /// Reference count after the change
        ref_count: u32,
    },
    /// A release with no outstanding reference
    Underflow,
}

/// A binding removed by [`ObjectRegistry::remove`].
#[derive(Debug, Clone, Copy)]
pub struct RemovedBinding {
    /// The slot id the binding had
    pub id: ObjectId,
    /// The binding itself
    pub handle: ObjectHandle,
    /// Whether the pointer was persistent
    pub persistent: bool,
}

/// Bound objects keyed by slot id and by host pointer.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    handles: SlotTable<ObjectHandle>,
    index: HashMap<HostPointer, ObjectId>,
    persistent: HashSet<HostPointer>,
}

impl ObjectRegistry {
    /// Creates a registry sized for `capacity` objects.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            handles: SlotTable::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            persistent: HashSet::new(),
        }
    }

    /// Records a new binding.
    ///
    /// # Errors
    ///
    /// Fails with [`BridgeError::DuplicateBinding`] if `pointer` is bound.
    pub fn bind(
        &mut self,
        class_id: NativeClassId,
        pointer: HostPointer,
        global: GlobalId,
        policy: BindingPolicy,
    ) -> BridgeResult<ObjectId> {
        if self.index.contains_key(&pointer) {
            return Err(BridgeError::DuplicateBinding(pointer));
        }
        let id = ObjectId(self.handles.insert(ObjectHandle {
            class_id,
            pointer,
            global,
            state: BindingState::new(policy),
        }));
        self.index.insert(pointer, id);
        Ok(id)
    }

    /// The binding of a pointer.
    pub fn object_id(&self, pointer: HostPointer) -> Option<ObjectId> {
        self.index.get(&pointer).copied()
    }

    /// A binding by id. Stale ids return `None`.
    pub fn get(&self, id: ObjectId) -> Option<&ObjectHandle> {
        self.handles.get(id.0)
    }

    /// The binding of a pointer.
    pub fn by_pointer(&self, pointer: HostPointer) -> Option<&ObjectHandle> {
        self.get(self.object_id(pointer)?)
    }

    /// Applies a host reference change.
    pub fn reference(&mut self, pointer: HostPointer, inc: bool) -> ReferenceOutcome {
        let Some(id) = self.object_id(pointer) else {
            return ReferenceOutcome::Unbound;
        };
        let Some(handle) = self.handles.get_mut(id.0) else {
            return ReferenceOutcome::Unbound;
        };
        match handle.state.reference(inc) {
            Ok(transition) => ReferenceOutcome::Changed {
                global: handle.global,
                transition,
                ref_count: handle.state.ref_count(),
            },
            Err(RefCountUnderflow) => ReferenceOutcome::Underflow,
        }
    }

    /// Adds a bound pointer to the persistent set.
    ///
    /// The caller takes the matching host reference.
    pub fn mark_persistent(&mut self, pointer: HostPointer) -> BridgeResult<()> {
        if !self.index.contains_key(&pointer) {
            return Err(BridgeError::UnboundPointer(pointer));
        }
        if !self.persistent.insert(pointer) {
            return Err(BridgeError::AlreadyPersistent(pointer));
        }
        Ok(())
    }

    /// Whether a pointer is persistent.
    pub fn is_persistent(&self, pointer: HostPointer) -> bool {
        self.persistent.contains(&pointer)
    }

    /// Removes a binding from every index. Returns `None` if it was not bound.
    pub fn remove(&mut self, pointer: HostPointer) -> Option<RemovedBinding> {
        let id = self.index.remove(&pointer)?;
        let persistent = self.persistent.remove(&pointer);
        let handle = self.handles.remove(id.0)?;
        Some(RemovedBinding {
            id,
            handle,
            persistent,
        })
    }

    /// Any bound pointer, used to drain the registry.
    pub fn first_pointer(&self) -> Option<HostPointer> {
        let id = self.handles.first_id()?;
        self.handles.get(id).map(|handle| handle.pointer)
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no object is bound.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Number of persistent bindings.
    pub fn persistent_count(&self) -> usize {
        self.persistent.len()
    }
}
