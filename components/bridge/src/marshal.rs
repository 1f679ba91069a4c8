//! Conversion between host [`Variant`]s and script values.
//!
//! Both directions are explicit tables over the value tags:
//!
//! | host         | script                                   |
//! |--------------|------------------------------------------|
//! | `Nil`        | `null` (and `undefined` on the way back) |
//! | `Bool`       | boolean                                  |
//! | `Int`        | number, within ±(2^53 - 1)               |
//! | `Float`      | number                                   |
//! | `String`     | string                                   |
//! | `Array`      | array                                    |
//! | `Dictionary` | plain object (own data properties)       |
//! | `Object`     | bound wrapper, created on demand         |
//!
//! Symbols, functions, promises and wrappers whose host object is gone have
//! no host form.

use crate::Environment;
use core_types::{HostPointer, Variant, VariantKind, MAX_SAFE_INTEGER};
use script_engine::{InternalField, JsValue};
use std::collections::BTreeMap;
use thiserror::Error;

/// Nesting limit for converted arrays and dictionaries. Cyclic script
/// graphs are rejected once they reach it.
pub const MAX_MARSHAL_DEPTH: usize = 64;

/// A value that cannot cross the boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarshalError {
    /// Integer outside the range a script number represents exactly
    #[error("integer {0} is outside the safe integer range")]
    UnsafeInteger(i64),
    /// The host does not know the object's class
    #[error("host object {0} has no exposed class")]
    UnknownHostClass(HostPointer),
    /// Binding a host object on demand failed
    #[error("cannot bind host object {0}: {1}")]
    BindFailed(HostPointer, String),
    /// The script value has no host form
    #[error("cannot convert a {0} to a host value")]
    Unsupported(&'static str),
    /// A wrapper whose host object was freed or never bound
    #[error("wrapper object has no host pointer")]
    NullPointer,
    /// Nesting deeper than [`MAX_MARSHAL_DEPTH`]
    #[error("value nested deeper than {0} levels")]
    TooDeep(usize),
    /// The value does not coerce to the declared kind
    #[error("expected {}, found {}", expected.name(), found.name())]
    TypeMismatch {
        /// Declared kind
        expected: VariantKind,
        /// Kind of the converted value
        found: VariantKind,
    },
}

/// Converts a host value to a script value.
///
/// The caller keeps a handle scope open so intermediate objects stay rooted.
pub fn to_js(env: &Environment, value: &Variant) -> Result<JsValue, MarshalError> {
    to_js_at(env, value, 0)
}

fn to_js_at(env: &Environment, value: &Variant, depth: usize) -> Result<JsValue, MarshalError> {
    if depth > MAX_MARSHAL_DEPTH {
        return Err(MarshalError::TooDeep(MAX_MARSHAL_DEPTH));
    }
    let engine = env.engine();
    let converted = match value {
        Variant::Nil | Variant::Object(None) => JsValue::Null,
        Variant::Bool(b) => JsValue::Boolean(*b),
        Variant::Int(n) => {
            if n.unsigned_abs() > MAX_SAFE_INTEGER as u64 {
                return Err(MarshalError::UnsafeInteger(*n));
            }
            JsValue::Number(*n as f64)
        }
        Variant::Float(n) => JsValue::Number(*n),
        Variant::String(s) => JsValue::string(s),
        Variant::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(to_js_at(env, item, depth + 1)?);
            }
            JsValue::Object(engine.new_array(out))
        }
        Variant::Dictionary(map) => {
            let obj = engine.new_object();
            for (key, item) in map {
                let item = to_js_at(env, item, depth + 1)?;
                engine.define(obj, key, item);
            }
            JsValue::Object(obj)
        }
        Variant::Object(Some(pointer)) => env.wrap_host_object(*pointer)?,
    };
    Ok(converted)
}

/// Converts a script value to a host value.
pub fn to_variant(env: &Environment, value: &JsValue) -> Result<Variant, MarshalError> {
    to_variant_at(env, value, 0)
}

/// Converts a script value and coerces it to `kind`.
pub fn to_variant_typed(
    env: &Environment,
    value: &JsValue,
    kind: VariantKind,
) -> Result<Variant, MarshalError> {
    let converted = to_variant(env, value)?;
    let found = converted.kind();
    converted.coerce(kind).ok_or(MarshalError::TypeMismatch {
        expected: kind,
        found,
    })
}

fn to_variant_at(env: &Environment, value: &JsValue, depth: usize) -> Result<Variant, MarshalError> {
    let obj = match value {
        JsValue::Undefined | JsValue::Null => return Ok(Variant::Nil),
        JsValue::Boolean(b) => return Ok(Variant::Bool(*b)),
        JsValue::Number(n) => return Ok(number_to_variant(*n)),
        JsValue::String(s) => return Ok(Variant::String(s.to_string())),
        JsValue::Symbol(_) => return Err(MarshalError::Unsupported("symbol")),
        JsValue::Object(obj) => *obj,
    };
    if depth > MAX_MARSHAL_DEPTH {
        return Err(MarshalError::TooDeep(MAX_MARSHAL_DEPTH));
    }

    let engine = env.engine();
    if engine.is_function(value) {
        return Err(MarshalError::Unsupported("function"));
    }
    if engine.is_promise(value) {
        return Err(MarshalError::Unsupported("promise"));
    }
    match engine.internal_field(obj) {
        InternalField::Pointer(pointer) => return Ok(Variant::Object(Some(pointer))),
        InternalField::Unset => return Err(MarshalError::NullPointer),
        InternalField::Absent => {}
    }

    if let Some(items) = engine.array_elements(obj) {
        let mut out = Vec::with_capacity(items.len());
        for item in &items {
            out.push(to_variant_at(env, item, depth + 1)?);
        }
        return Ok(Variant::Array(out));
    }
    let mut out = BTreeMap::new();
    for (key, item) in engine.own_entries(obj) {
        out.insert(key.to_string(), to_variant_at(env, &item, depth + 1)?);
    }
    Ok(Variant::Dictionary(out))
}

fn number_to_variant(n: f64) -> Variant {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER as f64 {
        Variant::Int(n as i64)
    } else {
        Variant::Float(n)
    }
}
