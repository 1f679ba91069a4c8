//! Conversion between script values and `serde_json` documents.

use crate::{Engine, JsValue};
use serde_json::{Map, Number, Value};

/// Nesting limit for [`Engine::to_json`]; deeper (or cyclic) graphs are rejected.
pub const MAX_JSON_DEPTH: usize = 64;

impl Engine {
    /// Builds a script value from a JSON document.
    pub fn from_json(&self, value: &Value) -> JsValue {
        match value {
            Value::Null => JsValue::Null,
            Value::Bool(b) => JsValue::Boolean(*b),
            Value::Number(n) => JsValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => JsValue::string(s),
            Value::Array(items) => {
                let items = items.iter().map(|item| self.from_json(item)).collect();
                JsValue::Object(self.new_array(items))
            }
            Value::Object(map) => {
                let obj = self.new_object();
                for (key, item) in map {
                    let item = self.from_json(item);
                    self.define(obj, key, item);
                }
                JsValue::Object(obj)
            }
        }
    }

    /// Serializes a script value as JSON.
    ///
    /// Follows `JSON.stringify` for data: `undefined`, functions and symbols
    /// are dropped from objects and become `null` in arrays; non-finite
    /// numbers become `null`. Returns `None` for a top-level value that has
    /// no JSON form or a graph nested deeper than [`MAX_JSON_DEPTH`].
    ///
    /// # Examples
    ///
    /// ```
    /// use script_engine::{Engine, JsValue};
    /// use serde_json::json;
    ///
    /// let engine = Engine::default();
    /// let value = engine.from_json(&json!({"a": [1, "two", null]}));
    /// assert_eq!(engine.to_json(&value), Some(json!({"a": [1.0, "two", null]})));
    /// assert_eq!(engine.to_json(&JsValue::Undefined), None);
    /// ```
    pub fn to_json(&self, value: &JsValue) -> Option<Value> {
        self.to_json_at_depth(value, 0).ok().flatten()
    }

    fn to_json_at_depth(&self, value: &JsValue, depth: usize) -> Result<Option<Value>, ()> {
        if depth > MAX_JSON_DEPTH {
            return Err(());
        }
        let obj = match value {
            JsValue::Undefined | JsValue::Symbol(_) => return Ok(None),
            JsValue::Null => return Ok(Some(Value::Null)),
            JsValue::Boolean(b) => return Ok(Some(Value::Bool(*b))),
            JsValue::Number(n) => return Ok(Some(Number::from_f64(*n).map_or(Value::Null, Value::Number))),
            JsValue::String(s) => return Ok(Some(Value::String(s.to_string()))),
            JsValue::Object(obj) => *obj,
        };
        if self.is_function(value) {
            return Ok(None);
        }
        if let Some(items) = self.array_elements(obj) {
            let mut out = Vec::with_capacity(items.len());
            for item in &items {
                out.push(self.to_json_at_depth(item, depth + 1)?.unwrap_or(Value::Null));
            }
            return Ok(Some(Value::Array(out)));
        }
        let mut out = Map::new();
        for (key, item) in self.own_entries(obj) {
            if let Some(item) = self.to_json_at_depth(&item, depth + 1)? {
                out.insert(key.to_string(), item);
            }
        }
        Ok(Some(Value::Object(out)))
    }
}
