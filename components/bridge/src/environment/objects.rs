//! Object binding and the host reference protocol.

use super::Environment;
use crate::binding::{BindingPolicy, BindingState, Transition};
use crate::callbacks::object_gc_callback;
use crate::deletion_queue::PendingDeletion;
use crate::marshal::MarshalError;
use crate::object_registry::ReferenceOutcome;
use crate::{BridgeError, BridgeResult};
use core_types::{HostPointer, NativeClassId, ObjectId, ScriptClassId};
use log::{debug, error, trace, warn};
use script_engine::{JsValue, ObjectRef, TryCatch};

impl Environment {
    /// The binding of a host pointer.
    pub fn object_id(&self, pointer: HostPointer) -> Option<ObjectId> {
        self.objects.borrow().object_id(pointer)
    }

    /// Whether a host pointer is bound.
    pub fn is_bound(&self, pointer: HostPointer) -> bool {
        self.object_id(pointer).is_some()
    }

    /// The wrapper of a bound object. Stale ids return `None`.
    pub fn get_object(&self, object_id: ObjectId) -> Option<ObjectRef> {
        let global = self.objects.borrow().get(object_id)?.global;
        self.engine.global_value(global)?.as_object()
    }

    /// Ownership state of a binding.
    pub fn binding_state(&self, pointer: HostPointer) -> Option<BindingState> {
        self.objects.borrow().by_pointer(pointer).map(|handle| handle.state)
    }

    /// Whether a binding is persistent.
    pub fn is_persistent(&self, pointer: HostPointer) -> bool {
        self.objects.borrow().is_persistent(pointer)
    }

    pub(crate) fn object_of_pointer(&self, pointer: HostPointer) -> Option<ObjectRef> {
        let global = self.objects.borrow().by_pointer(pointer)?.global;
        self.engine.global_value(global)?.as_object()
    }

    /// Binds `pointer` to the wrapper `obj`.
    ///
    /// Stores the pointer in the wrapper's internal field and roots the
    /// wrapper with a global: strong for [`BindingPolicy::External`], weak
    /// with the finalizer armed for [`BindingPolicy::Managed`].
    ///
    /// # Errors
    ///
    /// * [`BridgeError::InvalidClass`] for an unknown class id
    /// * [`BridgeError::DuplicateBinding`] if `pointer` is already bound
    /// * [`BridgeError::InvalidObject`] if `obj` has no internal field
    pub fn bind_pointer(
        &self,
        class_id: NativeClassId,
        pointer: HostPointer,
        obj: ObjectRef,
        policy: BindingPolicy,
    ) -> BridgeResult<ObjectId> {
        self.check_thread()?;
        if self.classes.borrow().get(class_id).is_none() {
            return Err(self.violation(BridgeError::InvalidClass(class_id)));
        }
        if self.is_bound(pointer) {
            return Err(self.violation(BridgeError::DuplicateBinding(pointer)));
        }
        if !self.engine.set_internal_field(obj, Some(pointer)) {
            return Err(BridgeError::InvalidObject(format!(
                "{:?} cannot carry a host pointer",
                obj
            )));
        }

        let global = self.engine.new_global(JsValue::Object(obj));
        let bound = self
            .objects
            .borrow_mut()
            .bind(class_id, pointer, global, policy);
        let id = match bound {
            Ok(id) => id,
            Err(err) => {
                self.engine.reset_global(global);
                return Err(self.violation(err));
            }
        };
        if policy == BindingPolicy::Managed {
            self.engine.set_weak(global, pointer, object_gc_callback);
        }
        trace!(
            "bind_pointer class:{} id:{} pointer:{} policy:{:?}",
            class_id,
            id,
            pointer,
            policy
        );
        Ok(id)
    }

    /// Binds a host object with the external policy, taking its initial
    /// host reference if it is ref-counted, and notifies the host.
    ///
    /// The reference is only taken once the class and pointer checks pass,
    /// and is released again if the binding itself fails.
    pub fn bind_host_object(
        &self,
        class_id: NativeClassId,
        pointer: HostPointer,
        obj: ObjectRef,
    ) -> BridgeResult<ObjectId> {
        self.check_thread()?;
        if self.classes.borrow().get(class_id).is_none() {
            return Err(self.violation(BridgeError::InvalidClass(class_id)));
        }
        if self.is_bound(pointer) {
            return Err(self.violation(BridgeError::DuplicateBinding(pointer)));
        }
        let ref_counted = self.host.is_ref_counted(pointer);
        if ref_counted && !self.host.init_ref(pointer) {
            error!("can not bind a dead object {}", pointer);
            return Err(BridgeError::InvalidObject(format!("{} is being destroyed", pointer)));
        }
        let id = match self.bind_pointer(class_id, pointer, obj, BindingPolicy::External) {
            Ok(id) => id,
            Err(err) => {
                if ref_counted {
                    self.host.release_ref(pointer);
                }
                return Err(err);
            }
        };
        self.host.on_bound(pointer, self.token);
        Ok(id)
    }

    /// Applies a host reference change to `pointer`.
    ///
    /// Returns true only for unbound pointers: the host may destroy the
    /// object itself. For bound pointers destruction is left to the wrapper's
    /// finalizer and the result is false.
    ///
    /// # Errors
    ///
    /// [`BridgeError::RefCountUnderflow`] for a release with no outstanding
    /// reference; the binding is left unchanged.
    pub fn reference_object(&self, pointer: HostPointer, inc: bool) -> BridgeResult<bool> {
        self.check_thread()?;
        let outcome = self.objects.borrow_mut().reference(pointer, inc);
        match outcome {
            ReferenceOutcome::Unbound => {
                trace!("reference on unbound pointer {}", pointer);
                Ok(true)
            }
            ReferenceOutcome::Underflow => Err(self.violation(BridgeError::RefCountUnderflow(pointer))),
            ReferenceOutcome::Changed {
                global,
                transition,
                ref_count,
            } => {
                match transition {
                    Transition::Promote => {
                        self.engine.clear_weak(global);
                    }
                    Transition::Demote => {
                        self.engine.set_weak(global, pointer, object_gc_callback);
                    }
                    Transition::Unchanged => {}
                }
                trace!(
                    "reference pointer:{} {} ref_count:{} {:?}",
                    pointer,
                    if inc { "inc" } else { "dec" },
                    ref_count,
                    transition
                );
                Ok(false)
            }
        }
    }

    /// Keeps a binding strong for the lifetime of the environment.
    pub fn mark_as_persistent(&self, pointer: HostPointer) -> BridgeResult<()> {
        self.check_thread()?;
        let marked = self.objects.borrow_mut().mark_persistent(pointer);
        match marked {
            Ok(()) => {
                self.reference_object(pointer, true)?;
                trace!("mark_as_persistent pointer:{}", pointer);
                Ok(())
            }
            Err(err @ BridgeError::AlreadyPersistent(_)) => Err(self.violation(err)),
            Err(err) => {
                error!("failed to mark {} persistent: {}", pointer, err);
                Err(err)
            }
        }
    }

    /// Removes the binding of `pointer`.
    ///
    /// The pointer leaves every index before anything else happens, so a
    /// re-entrant call sees it as unbound. A wrapper that is still alive
    /// keeps existing with an empty internal field. With `finalize`, the
    /// host side is released as well, deferred while script frames are on
    /// the stack. Unknown pointers are ignored.
    pub fn free_object(&self, pointer: HostPointer, finalize: bool) -> BridgeResult<()> {
        self.check_thread()?;
        let removed = self.objects.borrow_mut().remove(pointer);
        let Some(removed) = removed else {
            return Ok(());
        };
        let handle = removed.handle;
        if let Some(JsValue::Object(obj)) = self.engine.global_value(handle.global) {
            self.engine.set_internal_field(obj, None);
        }
        self.engine.reset_global(handle.global);
        trace!(
            "free_object class:{} id:{} pointer:{} finalize:{}",
            handle.class_id,
            removed.id,
            pointer,
            finalize
        );

        if finalize {
            self.finalize(PendingDeletion {
                class_id: handle.class_id,
                pointer,
                persistent: removed.persistent,
            });
        }
        Ok(())
    }

    fn finalize(&self, entry: PendingDeletion) {
        if self.engine.call_depth() > 0 {
            let rejected = self.pending_delete.borrow_mut().push(entry).err();
            match rejected {
                None => return,
                Some(entry) => warn!(
                    "deletion queue full, finalizing {} immediately",
                    entry.pointer
                ),
            }
        }
        self.run_finalizer(entry);
    }

    fn run_finalizer(&self, entry: PendingDeletion) {
        let finalizer = self
            .classes
            .borrow()
            .get(entry.class_id)
            .and_then(|info| info.finalizer.clone());
        match finalizer {
            Some(finalizer) => finalizer(entry.pointer, entry.persistent),
            None => self.host.finalize(entry.pointer, entry.persistent),
        }
        trace!("finalized {} persistent:{}", entry.pointer, entry.persistent);
    }

    /// Runs every deferred finalization.
    pub(crate) fn exec_sync_delete(&self) {
        loop {
            let next = self.pending_delete.borrow_mut().pop();
            let Some(entry) = next else {
                break;
            };
            self.run_finalizer(entry);
        }
    }

    /// Binds `pointer` to a new instance of a script class.
    ///
    /// The class is constructed with the reserved cross-bind token so native
    /// constructors in its chain do not create host objects of their own. An
    /// object that is already bound is rebound instead and keeps its id.
    pub fn crossbind(&self, pointer: HostPointer, class_id: ScriptClassId) -> BridgeResult<ObjectId> {
        self.check_alive()?;
        if let Some(id) = self.object_id(pointer) {
            debug!("crossbind on already bound object {}, rebinding", pointer);
            self.rebind(pointer, class_id)?;
            return Ok(id);
        }

        let (constructor, native_class_id, name) = {
            let classes = self.script_classes.borrow();
            let info = classes.get(class_id.0).ok_or(BridgeError::InvalidScriptClass)?;
            (info.constructor, info.native_class_id, info.name.clone())
        };
        let constructor = self
            .engine
            .global_value(constructor)
            .ok_or(BridgeError::InvalidScriptClass)?;

        let _scope = self.engine.open_scope();
        let try_catch = TryCatch::new(&self.engine);
        let instance = self
            .engine
            .construct(&constructor, &[self.symbols.cross_bind.clone()]);
        let instance = match instance {
            Ok(JsValue::Object(instance)) => instance,
            Ok(_) => {
                error!("constructor of {} did not return an object", name);
                return Err(BridgeError::ConstructionFailed(name));
            }
            Err(_) => {
                if let Some(err) = try_catch.exception() {
                    error!("failed to construct {}: {}", name, err);
                }
                return Err(BridgeError::ConstructionFailed(name));
            }
        };
        let id = self.bind_host_object(native_class_id, pointer, instance)?;
        debug!("crossbind {} as {} id:{}", pointer, name, id);
        Ok(id)
    }

    /// Swaps the prototype of a bound object to that of a script class.
    pub fn rebind(&self, pointer: HostPointer, class_id: ScriptClassId) -> BridgeResult<()> {
        self.check_alive()?;
        let obj = self
            .object_of_pointer(pointer)
            .ok_or(BridgeError::UnboundPointer(pointer))?;
        let constructor = self
            .script_classes
            .borrow()
            .get(class_id.0)
            .map(|info| info.constructor)
            .ok_or(BridgeError::InvalidScriptClass)?;
        let prototype = self
            .engine
            .global_value(constructor)
            .and_then(|c| c.as_object())
            .and_then(|c| self.engine.data_property(c, "prototype"))
            .and_then(|p| p.as_object())
            .ok_or(BridgeError::InvalidScriptClass)?;

        let try_catch = TryCatch::new(&self.engine);
        if self.engine.set_prototype(obj, Some(prototype)).is_err() {
            let message = try_catch
                .exception()
                .map(|err| err.to_string())
                .unwrap_or_default();
            warn!("failed to rebind {}: {}", pointer, message);
            return Err(BridgeError::InvalidObject(message));
        }
        Ok(())
    }

    /// The wrapper of a host pointer, binding one on demand through the
    /// pointer's host class.
    pub(crate) fn wrap_host_object(&self, pointer: HostPointer) -> Result<JsValue, MarshalError> {
        if let Some(obj) = self.object_of_pointer(pointer) {
            return Ok(JsValue::Object(obj));
        }
        let class_name = self
            .host
            .class_of(pointer)
            .ok_or(MarshalError::UnknownHostClass(pointer))?;
        let class_id = self
            .expose_host_class(&class_name)
            .map_err(|_| MarshalError::UnknownHostClass(pointer))?;
        let obj = self.engine.new_wrapper(self.class_prototype(class_id));
        self.bind_host_object(class_id, pointer, obj)
            .map_err(|err| MarshalError::BindFailed(pointer, err.to_string()))?;
        if let Some(fresh) = self.fresh_bindings.borrow_mut().as_mut() {
            fresh.push(pointer);
        }
        Ok(JsValue::Object(obj))
    }
}
