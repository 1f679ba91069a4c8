//! Source compilation.
//!
//! The engine does not parse script text itself. A [`SourceCompiler`] turns
//! a source file into a function value. Module functions follow the CommonJS
//! wrapper convention and are called with
//! `(exports, require, module, __filename, __dirname)`.

use crate::{Engine, JsValue, Thrown};
use core_types::ErrorKind;
use std::rc::Rc;

/// Turns source text into a callable function value.
pub trait SourceCompiler {
    /// Compiles `source`, read from `filename`.
    ///
    /// # Errors
    ///
    /// Throws (usually a `SyntaxError`) when the source is malformed.
    fn compile(&self, engine: &Engine, filename: &str, source: &str) -> Result<JsValue, Thrown>;
}

impl<F> SourceCompiler for F
where
    F: Fn(&Engine, &str, &str) -> Result<JsValue, Thrown>,
{
    fn compile(&self, engine: &Engine, filename: &str, source: &str) -> Result<JsValue, Thrown> {
        self(engine, filename, source)
    }
}

/// Compiles JSON documents into module functions.
///
/// When called as a module, an object document is copied into the existing
/// `exports` object, so references taken before a reload stay valid; any
/// other document replaces `module.exports`. Called without arguments, the
/// function returns the document.
///
/// # Examples
///
/// ```
/// use script_engine::{Engine, JsValue};
///
/// let engine = Engine::default();
/// let func = engine.compile("config.json", r#"{"speed": 4}"#).unwrap();
/// let value = engine.call(&func, JsValue::Undefined, &[]).unwrap();
///
/// let speed = engine.get(value.as_object().unwrap(), "speed").unwrap();
/// assert_eq!(speed, JsValue::Number(4.0));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCompiler;

impl SourceCompiler for JsonCompiler {
    fn compile(&self, engine: &Engine, filename: &str, source: &str) -> Result<JsValue, Thrown> {
        let document: serde_json::Value = serde_json::from_str(source).map_err(|err| {
            engine.throw_error(ErrorKind::SyntaxError, &format!("{}: {}", filename, err))
        })?;
        let document = Rc::new(document);

        let func = engine.new_function(filename, move |engine, info| {
            let value = engine.from_json(&document);
            let exports = info.arg(0).as_object();
            let module = info.arg(2).as_object();
            match (exports, module) {
                (Some(exports), _) if document.is_object() => {
                    let Some(source) = value.as_object() else {
                        return Ok(value);
                    };
                    engine.clear_own_properties(exports);
                    for (key, item) in engine.own_entries(source) {
                        engine.set(exports, &key, item)?;
                    }
                    Ok(JsValue::Undefined)
                }
                (_, Some(module)) => {
                    engine.set(module, "exports", value)?;
                    Ok(JsValue::Undefined)
                }
                _ => Ok(value),
            }
        });
        engine.set_function_source(func, filename);
        Ok(JsValue::Object(func))
    }
}
