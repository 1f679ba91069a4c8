//! Object model operations: properties, prototypes, internal fields.

use crate::heap::{FunctionKind, HeapObject, ObjectKind, Property};
use crate::{format_number, Engine, InternalField, JsValue, ObjectRef, PromiseState, Thrown};
use core_types::{ErrorKind, HostPointer};
use std::rc::Rc;

const MAX_PROTOTYPE_CHAIN: usize = 1024;
const MAX_DISPLAY_DEPTH: usize = 8;

enum Lookup {
    Value(JsValue),
    Getter(Option<ObjectRef>),
    Intercept(ObjectRef, Option<ObjectRef>),
    Next(Option<ObjectRef>),
}

fn array_index(key: &str) -> Option<usize> {
    if key.len() > 1 && key.starts_with('0') {
        return None;
    }
    key.parse().ok()
}

fn own_lookup(object: &HeapObject, key: &str) -> Lookup {
    match object.properties.get(key) {
        Some(Property::Data(value)) => return Lookup::Value(value.clone()),
        Some(Property::Accessor { getter, .. }) => return Lookup::Getter(*getter),
        None => {}
    }
    match &object.kind {
        ObjectKind::Array(items) if key == "length" => {
            return Lookup::Value(JsValue::Number(items.len() as f64))
        }
        ObjectKind::Array(items) => {
            if let Some(item) = array_index(key).and_then(|i| items.get(i)) {
                return Lookup::Value(item.clone());
            }
        }
        ObjectKind::Function(data) if key == "name" => {
            return Lookup::Value(JsValue::String(data.name.clone()))
        }
        _ => {}
    }
    match object.interceptor {
        Some(interceptor) => Lookup::Intercept(interceptor, object.prototype),
        None => Lookup::Next(object.prototype),
    }
}

impl Engine {
    fn throw_collected(&self) -> Thrown {
        self.throw_error(ErrorKind::ReferenceError, "object has been collected")
    }

    /// Whether `obj` still refers to a live heap object.
    pub fn is_alive(&self, obj: ObjectRef) -> bool {
        self.heap.borrow().get(obj).is_some()
    }

    // ========================================================================
    // Property access
    // ========================================================================

    /// Reads `obj[key]`, walking the prototype chain.
    ///
    /// Accessors run with `obj` as receiver. An object with a named
    /// interceptor consults it for keys it does not own; an interceptor
    /// returning `undefined` declines and lookup continues.
    pub fn get(&self, obj: ObjectRef, key: &str) -> Result<JsValue, Thrown> {
        let mut current = Some(obj);
        let mut hops = 0;
        while let Some(target) = current {
            let lookup = self.heap.borrow().get(target).map(|o| own_lookup(o, key));
            let Some(lookup) = lookup else {
                return Err(self.throw_collected());
            };
            match lookup {
                Lookup::Value(value) => return Ok(value),
                Lookup::Getter(Some(getter)) => {
                    return self.call(&JsValue::Object(getter), JsValue::Object(obj), &[]);
                }
                Lookup::Getter(None) => return Ok(JsValue::Undefined),
                Lookup::Intercept(interceptor, next) => {
                    let value = self.call(
                        &JsValue::Object(interceptor),
                        JsValue::Object(target),
                        &[JsValue::string(key)],
                    )?;
                    if !value.is_undefined() {
                        return Ok(value);
                    }
                    current = next;
                }
                Lookup::Next(next) => current = next,
            }
            hops += 1;
            if hops > MAX_PROTOTYPE_CHAIN {
                return Err(self.throw_error(ErrorKind::RangeError, "prototype chain too deep"));
            }
        }
        Ok(JsValue::Undefined)
    }

    /// Reads `target[key]` for any value. Primitives other than nullish read as `undefined`.
    pub fn get_value(&self, target: &JsValue, key: &str) -> Result<JsValue, Thrown> {
        match target {
            JsValue::Object(obj) => self.get(*obj, key),
            JsValue::Undefined | JsValue::Null => {
                let shown = self.display_string(target);
                Err(self.throw_error(
                    ErrorKind::TypeError,
                    &format!("Cannot read properties of {} (reading '{}')", shown, key),
                ))
            }
            _ => Ok(JsValue::Undefined),
        }
    }

    /// Reads a data property along the prototype chain without running accessors or interceptors.
    pub fn data_property(&self, obj: ObjectRef, key: &str) -> Option<JsValue> {
        let heap = self.heap.borrow();
        let mut current = Some(obj);
        for _ in 0..MAX_PROTOTYPE_CHAIN {
            let object = heap.get(current?)?;
            match own_lookup(object, key) {
                Lookup::Value(value) => return Some(value),
                Lookup::Getter(_) => return None,
                Lookup::Intercept(_, next) | Lookup::Next(next) => current = next,
            }
        }
        None
    }

    /// Writes `obj[key] = value`.
    ///
    /// An inherited setter runs with `obj` as receiver; otherwise an own data
    /// property is created or overwritten.
    ///
    /// # Errors
    ///
    /// Throws a `TypeError` when the property is an accessor without a setter.
    pub fn set(&self, obj: ObjectRef, key: &str, value: JsValue) -> Result<(), Thrown> {
        let accessor = {
            let heap = self.heap.borrow();
            if heap.get(obj).is_none() {
                None
            } else {
                let mut current = Some(obj);
                let mut found = Some(None);
                while let Some(object) = current.and_then(|c| heap.get(c)) {
                    match object.properties.get(key) {
                        Some(Property::Data(_)) => break,
                        Some(Property::Accessor { setter, .. }) => {
                            found = Some(Some(setter.ok_or(())));
                            break;
                        }
                        None => current = object.prototype,
                    }
                }
                found
            }
        };
        match accessor {
            None => Err(self.throw_collected()),
            Some(Some(Ok(setter))) => {
                self.call(&JsValue::Object(setter), JsValue::Object(obj), &[value])?;
                Ok(())
            }
            Some(Some(Err(()))) => Err(self.throw_error(
                ErrorKind::TypeError,
                &format!("Cannot set property {} which has only a getter", key),
            )),
            Some(None) => {
                self.define(obj, key, value);
                Ok(())
            }
        }
    }

    /// Sets `target[key] = value` for any value.
    pub fn set_value(&self, target: &JsValue, key: &str, value: JsValue) -> Result<(), Thrown> {
        match target {
            JsValue::Object(obj) => self.set(*obj, key, value),
            _ => {
                let shown = self.display_string(target);
                Err(self.throw_error(
                    ErrorKind::TypeError,
                    &format!("Cannot set properties of {} (setting '{}')", shown, key),
                ))
            }
        }
    }

    /// Defines an own data property, bypassing setters. Returns false for a collected object.
    pub fn define(&self, obj: ObjectRef, key: &str, value: JsValue) -> bool {
        let mut heap = self.heap.borrow_mut();
        let Some(object) = heap.get_mut(obj) else {
            return false;
        };
        if let ObjectKind::Array(items) = &mut object.kind {
            if let Some(index) = array_index(key) {
                if index < items.len() {
                    items[index] = value;
                    return true;
                }
                if index == items.len() {
                    items.push(value);
                    return true;
                }
            }
        }
        object.properties.insert(Rc::from(key), Property::Data(value));
        true
    }

    /// Defines an own accessor property.
    pub fn define_accessor(
        &self,
        obj: ObjectRef,
        key: &str,
        getter: Option<ObjectRef>,
        setter: Option<ObjectRef>,
    ) -> bool {
        match self.heap.borrow_mut().get_mut(obj) {
            Some(object) => {
                object
                    .properties
                    .insert(Rc::from(key), Property::Accessor { getter, setter });
                true
            }
            None => false,
        }
    }

    /// Whether `obj` has an own property `key`.
    pub fn has_own(&self, obj: ObjectRef, key: &str) -> bool {
        let heap = self.heap.borrow();
        heap.get(obj).is_some_and(|object| {
            object.properties.contains_key(key)
                || matches!(&object.kind, ObjectKind::Array(items)
                    if key == "length" || array_index(key).is_some_and(|i| i < items.len()))
        })
    }

    /// Removes an own property. Returns whether it existed.
    pub fn delete(&self, obj: ObjectRef, key: &str) -> bool {
        self.heap
            .borrow_mut()
            .get_mut(obj)
            .is_some_and(|object| object.properties.shift_remove(key).is_some())
    }

    /// Own property keys in insertion order, array indices first.
    pub fn own_keys(&self, obj: ObjectRef) -> Vec<Rc<str>> {
        let heap = self.heap.borrow();
        let Some(object) = heap.get(obj) else {
            return Vec::new();
        };
        let mut keys: Vec<Rc<str>> = match &object.kind {
            ObjectKind::Array(items) => (0..items.len()).map(|i| Rc::from(i.to_string())).collect(),
            _ => Vec::new(),
        };
        keys.extend(object.properties.keys().cloned());
        keys
    }

    /// Own data properties in insertion order. Accessors are skipped.
    pub fn own_entries(&self, obj: ObjectRef) -> Vec<(Rc<str>, JsValue)> {
        let heap = self.heap.borrow();
        heap.get(obj)
            .map(|object| {
                object
                    .properties
                    .iter()
                    .filter_map(|(key, property)| match property {
                        Property::Data(value) => Some((key.clone(), value.clone())),
                        Property::Accessor { .. } => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Removes every own property of `obj`.
    pub fn clear_own_properties(&self, obj: ObjectRef) {
        if let Some(object) = self.heap.borrow_mut().get_mut(obj) {
            object.properties.clear();
        }
    }

    // ========================================================================
    // Arrays
    // ========================================================================

    /// The elements of an array, or `None` if `obj` is not an array.
    pub fn array_elements(&self, obj: ObjectRef) -> Option<Vec<JsValue>> {
        match &self.heap.borrow().get(obj)?.kind {
            ObjectKind::Array(items) => Some(items.clone()),
            _ => None,
        }
    }

    /// Appends to an array. Returns false if `obj` is not an array.
    pub fn array_push(&self, obj: ObjectRef, value: JsValue) -> bool {
        let mut heap = self.heap.borrow_mut();
        match heap.get_mut(obj).map(|o| &mut o.kind) {
            Some(ObjectKind::Array(items)) => {
                items.push(value);
                true
            }
            _ => false,
        }
    }

    /// Removes the first element equal to `value`. Returns whether one was removed.
    pub fn array_remove(&self, obj: ObjectRef, value: &JsValue) -> bool {
        let mut heap = self.heap.borrow_mut();
        match heap.get_mut(obj).map(|o| &mut o.kind) {
            Some(ObjectKind::Array(items)) => match items.iter().position(|item| item == value) {
                Some(index) => {
                    items.remove(index);
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    // ========================================================================
    // Prototypes and internal fields
    // ========================================================================

    /// The `[[Prototype]]` of `obj`.
    pub fn prototype_of(&self, obj: ObjectRef) -> Option<ObjectRef> {
        self.heap.borrow().get(obj)?.prototype
    }

    /// Replaces the `[[Prototype]]` of `obj`.
    ///
    /// # Errors
    ///
    /// Throws a `TypeError` if the new chain would contain `obj`.
    pub fn set_prototype(&self, obj: ObjectRef, prototype: Option<ObjectRef>) -> Result<(), Thrown> {
        let mut cursor = prototype;
        while let Some(link) = cursor {
            if link == obj {
                return Err(self.throw_error(ErrorKind::TypeError, "Cyclic __proto__ value"));
            }
            cursor = self.prototype_of(link);
        }
        let updated = match self.heap.borrow_mut().get_mut(obj) {
            Some(object) => {
                object.prototype = prototype;
                true
            }
            None => false,
        };
        if updated {
            Ok(())
        } else {
            Err(self.throw_collected())
        }
    }

    /// Whether `constructor.prototype` appears on the prototype chain of `obj`.
    pub fn instance_of(&self, obj: ObjectRef, constructor: ObjectRef) -> bool {
        let Some(JsValue::Object(target)) = self.data_property(constructor, "prototype") else {
            return false;
        };
        let mut cursor = self.prototype_of(obj);
        for _ in 0..MAX_PROTOTYPE_CHAIN {
            match cursor {
                Some(link) if link == target => return true,
                Some(link) => cursor = self.prototype_of(link),
                None => return false,
            }
        }
        false
    }

    /// The internal field state of `obj`. Collected objects report [`InternalField::Absent`].
    pub fn internal_field(&self, obj: ObjectRef) -> InternalField {
        self.heap
            .borrow()
            .get(obj)
            .map_or(InternalField::Absent, |object| object.internal)
    }

    /// Stores or clears the host pointer of an object that has an internal field.
    ///
    /// Returns false if the object has no internal field.
    pub fn set_internal_field(&self, obj: ObjectRef, pointer: Option<HostPointer>) -> bool {
        let mut heap = self.heap.borrow_mut();
        match heap.get_mut(obj) {
            Some(object) if object.internal != InternalField::Absent => {
                object.internal = pointer.map_or(InternalField::Unset, InternalField::Pointer);
                true
            }
            _ => false,
        }
    }

    /// Installs a named interceptor, called as `interceptor.call(obj, key)`
    /// for keys `obj` does not own.
    pub fn set_interceptor(&self, obj: ObjectRef, interceptor: ObjectRef) -> bool {
        match self.heap.borrow_mut().get_mut(obj) {
            Some(object) => {
                object.interceptor = Some(interceptor);
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Functions and promises
    // ========================================================================

    /// The name of a function object.
    pub fn function_name(&self, obj: ObjectRef) -> Option<Rc<str>> {
        Some(self.heap.borrow().get(obj)?.function()?.name.clone())
    }

    /// Records the source file a function was compiled from; it shows up in stack frames.
    pub fn set_function_source(&self, obj: ObjectRef, url: &str) -> bool {
        let mut heap = self.heap.borrow_mut();
        match heap.get_mut(obj).map(|o| &mut o.kind) {
            Some(ObjectKind::Function(data)) => {
                data.source_url = Some(Rc::from(url));
                true
            }
            _ => false,
        }
    }

    /// Creates a pending promise.
    pub fn new_promise(&self) -> ObjectRef {
        self.alloc(HeapObject::new(
            ObjectKind::Promise(PromiseState::Pending),
            Some(self.intrinsics.promise_prototype),
        ))
    }

    /// Settles a pending promise. Returns false if it was already settled.
    pub fn settle_promise(&self, promise: ObjectRef, outcome: Result<JsValue, JsValue>) -> bool {
        let mut heap = self.heap.borrow_mut();
        match heap.get_mut(promise).map(|o| &mut o.kind) {
            Some(ObjectKind::Promise(state)) if *state == PromiseState::Pending => {
                *state = match outcome {
                    Ok(value) => PromiseState::Fulfilled(value),
                    Err(reason) => PromiseState::Rejected(reason),
                };
                true
            }
            _ => false,
        }
    }

    /// The state of a promise.
    pub fn promise_state(&self, promise: ObjectRef) -> Option<PromiseState> {
        match &self.heap.borrow().get(promise)?.kind {
            ObjectKind::Promise(state) => Some(state.clone()),
            _ => None,
        }
    }

    // ========================================================================
    // Type checks
    // ========================================================================

    fn kind_matches(&self, value: &JsValue, check: impl Fn(&ObjectKind) -> bool) -> bool {
        value
            .as_object()
            .is_some_and(|obj| self.heap.borrow().get(obj).is_some_and(|o| check(&o.kind)))
    }

    /// Whether `value` is callable.
    pub fn is_function(&self, value: &JsValue) -> bool {
        self.kind_matches(value, |k| matches!(k, ObjectKind::Function(_)))
    }

    /// Whether `value` is a class constructor.
    pub fn is_constructor(&self, value: &JsValue) -> bool {
        value.as_object().is_some_and(|obj| {
            self.heap
                .borrow()
                .get(obj)
                .and_then(HeapObject::function)
                .is_some_and(|f| f.kind != FunctionKind::Plain)
        })
    }

    /// Whether `value` is an array.
    pub fn is_array(&self, value: &JsValue) -> bool {
        self.kind_matches(value, |k| matches!(k, ObjectKind::Array(_)))
    }

    /// Whether `value` is a promise.
    pub fn is_promise(&self, value: &JsValue) -> bool {
        self.kind_matches(value, |k| matches!(k, ObjectKind::Promise(_)))
    }

    /// Whether `value` is an error object.
    pub fn is_error(&self, value: &JsValue) -> bool {
        self.kind_matches(value, |k| matches!(k, ObjectKind::Error { .. }))
    }

    /// The `typeof` of a value.
    pub fn type_of(&self, value: &JsValue) -> &'static str {
        match value {
            JsValue::Undefined => "undefined",
            JsValue::Null => "object",
            JsValue::Boolean(_) => "boolean",
            JsValue::Number(_) => "number",
            JsValue::String(_) => "string",
            JsValue::Symbol(_) => "symbol",
            JsValue::Object(_) if self.is_function(value) => "function",
            JsValue::Object(_) => "object",
        }
    }

    /// String form of a value without running script code.
    pub fn display_string(&self, value: &JsValue) -> String {
        self.display_at_depth(value, 0)
    }

    fn display_at_depth(&self, value: &JsValue, depth: usize) -> String {
        let obj = match value {
            JsValue::Undefined => return "undefined".to_string(),
            JsValue::Null => return "null".to_string(),
            JsValue::Boolean(b) => return b.to_string(),
            JsValue::Number(n) => return format_number(*n),
            JsValue::String(s) => return s.to_string(),
            JsValue::Symbol(symbol) => {
                let description = self.symbol_description(*symbol).unwrap_or_default();
                return format!("Symbol({})", description);
            }
            JsValue::Object(obj) => *obj,
        };

        enum Shape {
            Function(Rc<str>),
            Array(Vec<JsValue>),
            Error,
            Promise,
            Plain,
        }
        let shape = {
            let heap = self.heap.borrow();
            match heap.get(obj).map(|o| &o.kind) {
                None => return "[object Collected]".to_string(),
                Some(ObjectKind::Function(data)) => Shape::Function(data.name.clone()),
                Some(ObjectKind::Array(items)) => Shape::Array(items.clone()),
                Some(ObjectKind::Error { .. }) => Shape::Error,
                Some(ObjectKind::Promise(_)) => Shape::Promise,
                Some(ObjectKind::Ordinary) => Shape::Plain,
            }
        };
        match shape {
            Shape::Function(name) => format!("function {}() {{ [native code] }}", name),
            Shape::Array(_) if depth >= MAX_DISPLAY_DEPTH => String::new(),
            Shape::Array(items) => items
                .iter()
                .map(|item| match item {
                    JsValue::Undefined | JsValue::Null => String::new(),
                    _ => self.display_at_depth(item, depth + 1),
                })
                .collect::<Vec<_>>()
                .join(","),
            Shape::Error => {
                let name = self
                    .data_property(obj, "name")
                    .map(|v| self.display_at_depth(&v, depth + 1))
                    .unwrap_or_else(|| "Error".to_string());
                let message = self
                    .data_property(obj, "message")
                    .map(|v| self.display_at_depth(&v, depth + 1))
                    .unwrap_or_default();
                if message.is_empty() {
                    name
                } else {
                    format!("{}: {}", name, message)
                }
            }
            Shape::Promise => "[object Promise]".to_string(),
            Shape::Plain => "[object Object]".to_string(),
        }
    }
}
