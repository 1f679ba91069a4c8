//! Built-in modules addressed by bare name.
//!
//! `require("jsb")` returns the bridge namespace and `require("host")`
//! returns the host class namespace. Loaders run once; the module is then
//! cached like any other.

use crate::Environment;
use core_types::ErrorKind;
use log::debug;
use script_engine::{JsValue, ObjectRef, Thrown};

/// Name of the bridge namespace module.
pub const BRIDGE_MODULE: &str = "jsb";

/// Name of the host class namespace module.
pub const HOST_MODULE: &str = "host";

/// Fills the exports of a built-in module.
pub trait ModuleLoader {
    /// Populates `exports`.
    fn load(&self, env: &Environment, exports: ObjectRef) -> Result<(), Thrown>;
}

/// The `jsb` namespace: bridge version, reserved construction tokens and
/// runtime statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct BridgeModuleLoader;

impl ModuleLoader for BridgeModuleLoader {
    fn load(&self, env: &Environment, exports: ObjectRef) -> Result<(), Thrown> {
        let engine = env.engine();
        engine.define(exports, "version", JsValue::from(env!("CARGO_PKG_VERSION")));

        let symbols = engine.new_object();
        let tokens = env.symbols();
        engine.define(symbols, "CrossBind", tokens.cross_bind.clone());
        engine.define(symbols, "CDO", tokens.cdo.clone());
        engine.define(exports, "symbols", JsValue::Object(symbols));

        let weak = env.weak();
        let stats = engine.new_function("stats", move |engine, _| {
            let Some(env) = weak.upgrade() else {
                return Err(engine.throw_error(ErrorKind::InternalError, "environment disposed"));
            };
            let stats = env.get_statistics();
            match serde_json::to_value(stats) {
                Ok(value) => Ok(engine.from_json(&value)),
                Err(err) => Err(engine.throw_error(ErrorKind::InternalError, &err.to_string())),
            }
        });
        engine.define(exports, "stats", JsValue::Object(stats));
        Ok(())
    }
}

/// The `host` namespace: host classes materialized on first access.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostModuleLoader;

impl ModuleLoader for HostModuleLoader {
    fn load(&self, env: &Environment, exports: ObjectRef) -> Result<(), Thrown> {
        let weak = env.weak();
        let interceptor = env.engine().new_function("host", move |engine, info| {
            let (Some(env), Some(name), Some(target)) =
                (weak.upgrade(), info.arg(0).as_str().map(str::to_string), info.this.as_object())
            else {
                return Ok(JsValue::Undefined);
            };
            let constructor = match env.expose_host_class(&name) {
                Ok(class_id) => env.class_constructor(class_id),
                Err(err) => {
                    debug!("host namespace has no {}: {}", name, err);
                    return Ok(JsValue::Undefined);
                }
            };
            match constructor {
                Some(constructor) => {
                    engine.define(target, &name, JsValue::Object(constructor));
                    Ok(JsValue::Object(constructor))
                }
                None => Ok(JsValue::Undefined),
            }
        });
        env.engine().set_interceptor(exports, interceptor);
        Ok(())
    }
}
