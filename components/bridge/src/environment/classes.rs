//! Native class materialization and script class parsing.

use super::{environment_of, Environment};
use crate::class_registry::{ClassOrigin, NativeClassDeclaration, NativeClassInfo};
use crate::host::HostClassInfo;
use crate::marshal;
use crate::script_class::{DefaultObject, ScriptClassInfo, ScriptPropertyInfo, PROPERTIES_KEY};
use crate::{BridgeError, BridgeResult};
use core_types::{ErrorKind, HostPointer, ModuleId, NativeClassId, ScriptClassId, VariantKind};
use indexmap::IndexMap;
use log::{debug, error, trace, warn};
use script_engine::{CallInfo, Engine, InternalField, JsValue, ObjectRef, Thrown, TryCatch};
use std::rc::{Rc, Weak};

impl Environment {
    // ========================================================================
    // Native classes
    // ========================================================================

    /// Declares a native class, materialized on first access.
    ///
    /// # Errors
    ///
    /// [`BridgeError::DuplicateClass`] if the name was declared before.
    pub fn declare_native_class(
        &self,
        name: &str,
        declaration: NativeClassDeclaration,
    ) -> BridgeResult<()> {
        self.check_alive()?;
        self.classes.borrow_mut().declare(name, declaration)
    }

    /// Materializes a class by name: declared classes first, then host classes.
    pub fn expose_class(&self, name: &str) -> BridgeResult<NativeClassId> {
        if let Some(id) = self.classes.borrow().find_declared(name) {
            return Ok(id);
        }
        let declaration = self.classes.borrow().declaration(name);
        match declaration {
            Some(declaration) => self.materialize_declared(name, declaration),
            None => self.expose_host_class(name),
        }
    }

    fn materialize_declared(
        &self,
        name: &str,
        declaration: NativeClassDeclaration,
    ) -> BridgeResult<NativeClassId> {
        let parent = match &declaration.parent {
            Some(parent) => Some(self.expose_class(parent)?),
            None => None,
        };
        let parent_constructor = parent.and_then(|id| self.class_constructor(id));
        let class_id = self.classes.borrow_mut().add(NativeClassInfo {
            name: name.to_string(),
            origin: ClassOrigin::Declared,
            parent,
            constructor: None,
            finalizer: declaration.finalizer.clone(),
        });

        let try_catch = TryCatch::new(&self.engine);
        match (declaration.register)(self, class_id, parent_constructor) {
            Ok(constructor) => {
                let global = self.engine.new_global(JsValue::Object(constructor));
                self.classes
                    .borrow_mut()
                    .set_constructor(class_id, global, constructor);
                debug!("declared class {} materialized as {}", name, class_id);
                Ok(class_id)
            }
            Err(_) => {
                if let Some(err) = try_catch.exception() {
                    error!("failed to register class {}: {}", name, err);
                }
                self.classes.borrow_mut().discard(class_id, Some(declaration));
                Err(BridgeError::ConstructionFailed(name.to_string()))
            }
        }
    }

    /// Materializes a host class and its ancestors from host reflection.
    ///
    /// Repeated lookups return the cached id.
    pub fn expose_host_class(&self, name: &str) -> BridgeResult<NativeClassId> {
        if let Some(id) = self.classes.borrow().find_reflected(name) {
            return Ok(id);
        }
        let info = self
            .host
            .class_info(name)
            .ok_or_else(|| BridgeError::UnknownClass(name.to_string()))?;
        let parent = match &info.parent {
            Some(parent) => Some(self.expose_host_class(parent)?),
            None => None,
        };
        let parent_constructor = parent.and_then(|id| self.class_constructor(id));
        let class_id = self.classes.borrow_mut().add(NativeClassInfo {
            name: name.to_string(),
            origin: ClassOrigin::Reflected,
            parent,
            constructor: None,
            finalizer: None,
        });

        let try_catch = TryCatch::new(&self.engine);
        match self.build_host_constructor(class_id, &info, parent_constructor) {
            Ok(constructor) => {
                let global = self.engine.new_global(JsValue::Object(constructor));
                self.classes
                    .borrow_mut()
                    .set_constructor(class_id, global, constructor);
                trace!("host class {} exposed as {}", name, class_id);
                Ok(class_id)
            }
            Err(_) => {
                if let Some(err) = try_catch.exception() {
                    error!("failed to expose host class {}: {}", name, err);
                }
                self.classes.borrow_mut().discard(class_id, None);
                Err(BridgeError::InvalidClass(class_id))
            }
        }
    }

    /// Reflection data of a materialized class.
    pub fn native_class(&self, class_id: NativeClassId) -> Option<NativeClassInfo> {
        self.classes.borrow().get(class_id).cloned()
    }

    /// The constructor of a materialized class.
    pub fn class_constructor(&self, class_id: NativeClassId) -> Option<ObjectRef> {
        let global = self.classes.borrow().get(class_id)?.constructor?;
        self.engine.global_value(global)?.as_object()
    }

    pub(crate) fn class_prototype(&self, class_id: NativeClassId) -> Option<ObjectRef> {
        let constructor = self.class_constructor(class_id)?;
        self.engine.data_property(constructor, "prototype")?.as_object()
    }

    /// The nearest native class constructor at or above `constructor`.
    fn nearest_native_class(&self, constructor: ObjectRef) -> Option<(NativeClassId, ObjectRef)> {
        let classes = self.classes.borrow();
        let mut current = Some(constructor);
        while let Some(link) = current {
            if let Some(id) = classes.class_of_constructor(link) {
                return Some((id, link));
            }
            current = self.engine.prototype_of(link);
        }
        None
    }

    pub(crate) fn is_reserved_token(&self, value: &JsValue) -> bool {
        *value == self.symbols.cross_bind || *value == self.symbols.cdo
    }

    fn build_host_constructor(
        &self,
        class_id: NativeClassId,
        info: &HostClassInfo,
        parent: Option<ObjectRef>,
    ) -> Result<ObjectRef, Thrown> {
        let weak = self.weak();
        let class_name: Rc<str> = Rc::from(info.name.as_str());
        let constructor = self.engine.new_class(&info.name, parent, true, move |engine, call| {
            construct_host_object(engine, call, &weak, class_id, &class_name)
        })?;
        let Some(prototype) = self
            .engine
            .data_property(constructor, "prototype")
            .and_then(|p| p.as_object())
        else {
            return Err(self
                .engine
                .throw_error(ErrorKind::InternalError, "class has no prototype"));
        };

        for method in &info.methods {
            let weak = self.weak();
            let name: Rc<str> = Rc::from(method.as_str());
            let function = self.engine.new_function(method, move |engine, call| {
                call_host_method(engine, call, &weak, &name)
            });
            self.engine.define(prototype, method, JsValue::Object(function));
        }
        for property in &info.properties {
            let (weak, name) = (self.weak(), Rc::<str>::from(property.as_str()));
            let getter = self.engine.new_function(property, move |engine, call| {
                let env = environment_of(engine, &weak)?;
                let pointer = this_pointer(engine, &call.this)?;
                let value = env
                    .host
                    .get_property(pointer, &name)
                    .map_err(|err| engine.throw_error(ErrorKind::Error, &err.to_string()))?;
                marshal::to_js(&env, &value)
                    .map_err(|err| engine.throw_error(ErrorKind::TypeError, &err.to_string()))
            });
            let (weak, name) = (self.weak(), Rc::<str>::from(property.as_str()));
            let setter = self.engine.new_function(property, move |engine, call| {
                let env = environment_of(engine, &weak)?;
                let pointer = this_pointer(engine, &call.this)?;
                let value = marshal::to_variant(&env, &call.arg(0))
                    .map_err(|err| engine.throw_error(ErrorKind::TypeError, &err.to_string()))?;
                env.host
                    .set_property(pointer, &name, value)
                    .map_err(|err| engine.throw_error(ErrorKind::Error, &err.to_string()))?;
                Ok(JsValue::Undefined)
            });
            self.engine
                .define_accessor(prototype, property, Some(getter), Some(setter));
        }
        Ok(constructor)
    }

    // ========================================================================
    // Script classes
    // ========================================================================

    /// A script class by id.
    pub fn script_class(&self, class_id: ScriptClassId) -> Option<ScriptClassInfo> {
        self.script_classes.borrow().get(class_id.0).cloned()
    }

    /// The script class defined by a module.
    pub fn module_script_class(&self, module_id: ModuleId) -> Option<ScriptClassId> {
        self.modules.borrow().get(module_id)?.script_class
    }

    /// Registers (or refreshes, on reload) the script class exported as
    /// `default` by a module.
    ///
    /// A default export qualifies when it is a class constructor with a
    /// native class among its ancestors. Exported properties are read from
    /// the constructor's [`PROPERTIES_KEY`] object.
    pub(crate) fn parse_script_class(&self, module_id: ModuleId) {
        let exports = self
            .module_exports(module_id)
            .and_then(|exports| exports.as_object());
        let Some(exports) = exports else {
            return;
        };
        let default = self.engine.data_property(exports, "default").unwrap_or_default();
        let Some(constructor) = default
            .as_object()
            .filter(|_| self.engine.is_constructor(&default))
        else {
            return;
        };
        let native = self
            .engine
            .prototype_of(constructor)
            .and_then(|parent| self.nearest_native_class(parent));
        let Some((native_class_id, _)) = native else {
            debug!("default export of module {} does not extend a native class", module_id);
            return;
        };
        let name = self
            .engine
            .function_name(constructor)
            .map(|name| name.to_string())
            .unwrap_or_default();
        let properties = self.script_properties(constructor, &name);
        let global = self.engine.new_global(JsValue::Object(constructor));

        if let Some(id) = self.module_script_class(module_id) {
            let mut script_classes = self.script_classes.borrow_mut();
            if let Some(info) = script_classes.get_mut(id.0) {
                self.engine.reset_global(info.constructor);
                if let DefaultObject::Ready(default_object) = info.default_object {
                    self.engine.reset_global(default_object);
                }
                info.name = name;
                info.native_class_id = native_class_id;
                info.constructor = global;
                info.default_object = DefaultObject::Pending;
                info.properties = properties;
                debug!("script class {} refreshed", id);
                return;
            }
        }
        let id = ScriptClassId(self.script_classes.borrow_mut().insert(ScriptClassInfo {
            module_id,
            name: name.clone(),
            native_class_id,
            constructor: global,
            default_object: DefaultObject::Pending,
            properties,
        }));
        if let Some(module) = self.modules.borrow_mut().get_mut(module_id) {
            module.script_class = Some(id);
        }
        debug!("script class {} registered as {}", name, id);
    }

    fn script_properties(
        &self,
        constructor: ObjectRef,
        class_name: &str,
    ) -> IndexMap<String, ScriptPropertyInfo> {
        let mut properties = IndexMap::new();
        let declared = self
            .engine
            .data_property(constructor, PROPERTIES_KEY)
            .and_then(|value| value.as_object());
        let Some(declared) = declared else {
            return properties;
        };
        for (name, kind) in self.engine.own_entries(declared) {
            match kind.as_str().and_then(VariantKind::from_name) {
                Some(kind) => {
                    properties.insert(name.to_string(), ScriptPropertyInfo::new(&*name, kind));
                }
                None => warn!(
                    "{}.{} has an unknown property kind {}",
                    class_name,
                    name,
                    self.engine.display_string(&kind)
                ),
            }
        }
        properties
    }
}

/// The host pointer behind `this`, or a script exception.
fn this_pointer(engine: &Engine, this: &JsValue) -> Result<HostPointer, Thrown> {
    let Some(obj) = this.as_object() else {
        return Err(engine.throw_error(ErrorKind::TypeError, "bad this"));
    };
    match engine.internal_field(obj) {
        InternalField::Pointer(pointer) => Ok(pointer),
        InternalField::Unset => Err(engine.throw_error(ErrorKind::Error, "host object has been freed")),
        InternalField::Absent => Err(engine.throw_error(ErrorKind::TypeError, "bad this")),
    }
}

fn construct_host_object(
    engine: &Engine,
    call: &CallInfo,
    weak: &Weak<Environment>,
    class_id: NativeClassId,
    class_name: &str,
) -> Result<JsValue, Thrown> {
    let Some(new_target) = call.new_target else {
        return Err(engine.throw_error(
            ErrorKind::TypeError,
            &format!("Class constructor {} cannot be invoked without 'new'", class_name),
        ));
    };
    let env = environment_of(engine, weak)?;
    if env.is_reserved_token(&call.arg(0)) {
        return Ok(JsValue::Undefined);
    }
    // Only the native class nearest to the constructed class creates the host object.
    match env.nearest_native_class(new_target) {
        Some((_, constructor)) if constructor == call.callee => {}
        _ => return Ok(JsValue::Undefined),
    }
    let Some(this) = call.this.as_object() else {
        return Err(engine.throw_error(ErrorKind::TypeError, "bad this"));
    };
    if engine.internal_field(this) != InternalField::Unset {
        return Ok(JsValue::Undefined);
    }
    let pointer = env.host.instantiate(class_name).ok_or_else(|| {
        engine.throw_error(
            ErrorKind::Error,
            &format!("failed to instantiate {}", class_name),
        )
    })?;
    if let Err(err) = env.bind_host_object(class_id, pointer, this) {
        env.host.finalize(pointer, false);
        return Err(engine.throw_error(ErrorKind::Error, &err.to_string()));
    }
    Ok(JsValue::Undefined)
}

fn call_host_method(
    engine: &Engine,
    call: &CallInfo,
    weak: &Weak<Environment>,
    method: &str,
) -> Result<JsValue, Thrown> {
    let env = environment_of(engine, weak)?;
    let pointer = this_pointer(engine, &call.this)?;
    let mut args = Vec::with_capacity(call.args.len());
    for (index, arg) in call.args.iter().enumerate() {
        let arg = marshal::to_variant(&env, arg).map_err(|err| {
            engine.throw_error(ErrorKind::TypeError, &format!("argument {}: {}", index, err))
        })?;
        args.push(arg);
    }
    let result = env
        .host
        .call_method(pointer, method, &args)
        .map_err(|err| engine.throw_error(ErrorKind::Error, &err.to_string()))?;
    marshal::to_js(&env, &result).map_err(|err| engine.throw_error(ErrorKind::TypeError, &err.to_string()))
}
