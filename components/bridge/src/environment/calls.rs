//! Host-to-script calls and script property access.

use super::Environment;
use crate::function_cache::Release;
use crate::marshal::{self, MarshalError};
use crate::script_class::{DefaultObject, ScriptPropertyInfo};
use crate::{BridgeError, BridgeResult};
use core_types::{
    ErrorKind, FunctionId, HostPointer, ObjectId, ScriptClassId, ScriptError, Variant,
};
use log::{error, trace, warn};
use script_engine::{JsValue, ObjectRef, PromiseState, TryCatch};

impl Environment {
    /// Calls a cached function with `this` set to a bound object (or
    /// `undefined`).
    ///
    /// Arguments are converted before anything runs; a failure at any index
    /// aborts the call: the temporaries made so far go with the scope and
    /// host objects bound on demand for earlier arguments are unbound again.
    /// Script exceptions are logged with their stack, cleared and reported as
    /// [`BridgeError::InvalidMethod`]. A result without a host form is an
    /// error unless it is a pending promise, which yields [`Variant::Nil`].
    pub fn call_function(
        &self,
        object_id: Option<ObjectId>,
        function_id: FunctionId,
        args: &[Variant],
    ) -> BridgeResult<Variant> {
        self.check_alive()?;
        let _scope = self.engine.open_scope();
        let function = self
            .functions
            .borrow()
            .global(function_id)
            .and_then(|global| self.engine.global_value(global))
            .ok_or_else(|| BridgeError::InvalidMethod(format!("stale function {}", function_id)))?;
        let this = match object_id {
            Some(object_id) => {
                let obj = self.get_object(object_id).ok_or_else(|| {
                    BridgeError::InvalidMethod(format!("dangling object {}", object_id))
                })?;
                JsValue::Object(obj)
            }
            None => JsValue::Undefined,
        };

        let outer = self.fresh_bindings.replace(Some(Vec::new()));
        let converted = self.convert_arguments(function_id, args);
        let fresh = self.fresh_bindings.replace(outer).unwrap_or_default();
        let js_args = match converted {
            Ok(js_args) => js_args,
            Err(err) => {
                self.unbind_fresh(&fresh);
                return Err(err);
            }
        };

        let try_catch = TryCatch::new(&self.engine);
        let result = match self.engine.call(&function, this, &js_args) {
            Ok(result) => result,
            Err(_) => {
                let report = try_catch.exception();
                let message = report.as_ref().map(ScriptError::to_string).unwrap_or_default();
                if let Some(report) = report {
                    error!("{}\n{}", report, report.stack_trace());
                }
                return Err(BridgeError::InvalidMethod(message));
            }
        };
        match marshal::to_variant(self, &result) {
            Ok(value) => Ok(value),
            Err(_) if self.is_pending_promise(&result) => Ok(Variant::Nil),
            Err(err) => {
                error!("call {}: result does not convert: {}", function_id, err);
                Err(BridgeError::InvalidMethod(err.to_string()))
            }
        }
    }

    fn convert_arguments(
        &self,
        function_id: FunctionId,
        args: &[Variant],
    ) -> BridgeResult<Vec<JsValue>> {
        let mut js_args = Vec::with_capacity(args.len());
        for (index, arg) in args.iter().enumerate() {
            match marshal::to_js(self, arg) {
                Ok(value) => js_args.push(value),
                Err(err) => {
                    error!("call {}: argument {} does not convert: {}", function_id, index, err);
                    return Err(BridgeError::InvalidMethod(format!("argument {}: {}", index, err)));
                }
            }
        }
        Ok(js_args)
    }

    /// Rolls back bindings made for the arguments of a call that never ran.
    fn unbind_fresh(&self, fresh: &[HostPointer]) {
        for &pointer in fresh.iter().rev() {
            if let Err(err) = self.free_object(pointer, false) {
                warn!("failed to unbind argument {}: {}", pointer, err);
                continue;
            }
            if self.host.is_ref_counted(pointer) {
                self.host.release_ref(pointer);
            }
            trace!("argument binding of {} rolled back", pointer);
        }
    }

    fn is_pending_promise(&self, value: &JsValue) -> bool {
        value
            .as_object()
            .and_then(|obj| self.engine.promise_state(obj))
            .is_some_and(|state| matches!(state, PromiseState::Pending))
    }

    /// Caches a reference to `function`, returning the id already caching
    /// it if there is one. Every call must be matched by
    /// [`Environment::release_function`].
    pub fn get_cached_function(&self, function: ObjectRef) -> BridgeResult<FunctionId> {
        self.check_alive()?;
        if !self.engine.is_function(&JsValue::Object(function)) {
            return Err(BridgeError::InvalidMethod(format!("{:?} is not a function", function)));
        }
        let existing = self.functions.borrow_mut().retain_existing(function);
        if let Some(id) = existing {
            return Ok(id);
        }
        let global = self.engine.new_global(JsValue::Object(function));
        let id = self.functions.borrow_mut().insert(function, global);
        trace!("cached function {}", id);
        Ok(id)
    }

    /// Caches the method `name` of a bound object.
    pub fn retain_function(&self, object_id: ObjectId, name: &str) -> BridgeResult<FunctionId> {
        self.check_alive()?;
        let _scope = self.engine.open_scope();
        let obj = self
            .get_object(object_id)
            .ok_or_else(|| BridgeError::InvalidObject(format!("dangling object {}", object_id)))?;
        let name = self.strings.borrow_mut().intern(name);
        let try_catch = TryCatch::new(&self.engine);
        let method = match self.engine.get(obj, &name) {
            Ok(method) => method,
            Err(_) => return Err(self.script_exception(&try_catch)),
        };
        match method.as_object() {
            Some(function) if self.engine.is_function(&method) => self.get_cached_function(function),
            _ => Err(BridgeError::InvalidMethod(format!("{} is not a function", name))),
        }
    }

    /// Drops one reference to a cached function. Returns false for stale ids.
    pub fn release_function(&self, function_id: FunctionId) -> bool {
        let released = self.functions.borrow_mut().release(function_id);
        match released {
            Release::Invalid => false,
            Release::Retained => true,
            Release::Dropped(global) => {
                self.engine.reset_global(global);
                trace!("released function {}", function_id);
                true
            }
        }
    }

    /// Reads an exported script property of a bound object.
    pub fn get_script_property_value(
        &self,
        object_id: ObjectId,
        property: &ScriptPropertyInfo,
    ) -> BridgeResult<Variant> {
        self.check_alive()?;
        let _scope = self.engine.open_scope();
        let obj = self
            .get_object(object_id)
            .ok_or_else(|| BridgeError::InvalidObject(format!("dangling object {}", object_id)))?;
        let name = self.strings.borrow_mut().intern(&property.name);
        let try_catch = TryCatch::new(&self.engine);
        let value = match self.engine.get(obj, &name) {
            Ok(value) => value,
            Err(_) => return Err(self.script_exception(&try_catch)),
        };
        Ok(marshal::to_variant_typed(self, &value, property.kind)?)
    }

    /// Writes an exported script property of a bound object.
    ///
    /// The value is coerced to the declared kind first.
    pub fn set_script_property_value(
        &self,
        object_id: ObjectId,
        property: &ScriptPropertyInfo,
        value: &Variant,
    ) -> BridgeResult<()> {
        self.check_alive()?;
        let _scope = self.engine.open_scope();
        let obj = self
            .get_object(object_id)
            .ok_or_else(|| BridgeError::InvalidObject(format!("dangling object {}", object_id)))?;
        let coerced = value.clone().coerce(property.kind).ok_or(MarshalError::TypeMismatch {
            expected: property.kind,
            found: value.kind(),
        })?;
        let converted = marshal::to_js(self, &coerced)?;
        let name = self.strings.borrow_mut().intern(&property.name);
        let try_catch = TryCatch::new(&self.engine);
        if self.engine.set(obj, &name, converted).is_err() {
            return Err(self.script_exception(&try_catch));
        }
        Ok(())
    }

    /// The default value of an exported property, read from the class
    /// default object.
    ///
    /// The default object is constructed once, with the reserved `CDO`
    /// token. If it cannot be built or read, the kind's default value is
    /// returned.
    pub fn get_script_default_property_value(
        &self,
        class_id: ScriptClassId,
        property: &ScriptPropertyInfo,
    ) -> BridgeResult<Variant> {
        self.check_alive()?;
        let _scope = self.engine.open_scope();
        let fallback = || Variant::default_of(property.kind);
        let Some(default_object) = self.class_default_object(class_id)? else {
            warn!("no default object for {}, using the default {}", class_id, property.kind.name());
            return Ok(fallback());
        };
        let name = self.strings.borrow_mut().intern(&property.name);
        let try_catch = TryCatch::new(&self.engine);
        let value = match self.engine.get(default_object, &name) {
            Ok(value) => value,
            Err(_) => {
                if let Some(err) = try_catch.exception() {
                    warn!("reading default {}: {}", name, err);
                }
                return Ok(fallback());
            }
        };
        match marshal::to_variant_typed(self, &value, property.kind) {
            Ok(value) => Ok(value),
            Err(err) => {
                warn!("default {} does not convert: {}", name, err);
                Ok(fallback())
            }
        }
    }

    fn class_default_object(&self, class_id: ScriptClassId) -> BridgeResult<Option<ObjectRef>> {
        let (state, constructor, name) = {
            let classes = self.script_classes.borrow();
            let info = classes.get(class_id.0).ok_or(BridgeError::InvalidScriptClass)?;
            (info.default_object, info.constructor, info.name.clone())
        };
        match state {
            DefaultObject::Ready(global) => Ok(self.engine.global_value(global).and_then(|v| v.as_object())),
            DefaultObject::Failed => Ok(None),
            DefaultObject::Pending => {
                let constructor = self
                    .engine
                    .global_value(constructor)
                    .ok_or(BridgeError::InvalidScriptClass)?;
                let try_catch = TryCatch::new(&self.engine);
                let built = self
                    .engine
                    .construct(&constructor, &[self.symbols.cdo.clone()]);
                let (state, object) = match built {
                    Ok(JsValue::Object(obj)) => {
                        (DefaultObject::Ready(self.engine.new_global(JsValue::Object(obj))), Some(obj))
                    }
                    Ok(_) => (DefaultObject::Failed, None),
                    Err(_) => {
                        if let Some(err) = try_catch.exception() {
                            warn!("failed to construct the default object of {}: {}", name, err);
                        }
                        (DefaultObject::Failed, None)
                    }
                };
                if let Some(info) = self.script_classes.borrow_mut().get_mut(class_id.0) {
                    info.default_object = state;
                }
                Ok(object)
            }
        }
    }

    /// Takes the exception captured by `try_catch` as a [`BridgeError`].
    fn script_exception(&self, try_catch: &TryCatch<'_>) -> BridgeError {
        let report = try_catch
            .exception()
            .unwrap_or_else(|| ScriptError::new(ErrorKind::Error, "unknown exception"));
        error!("{}\n{}", report, report.stack_trace());
        BridgeError::Exception(report)
    }
}
