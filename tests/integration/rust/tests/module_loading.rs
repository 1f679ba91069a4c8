//! Module loading, reloading and host-to-script calls
//!
//! Module bodies are Rust closures registered with the scripted compiler;
//! the file content names the body to run.

use bridge::{
    BindingPolicy, BridgeError, EnvironmentParams, FileSystem, ModuleResolver, ReloadResult,
    ScriptPropertyInfo, SearchPathResolver,
};
use core_types::{ErrorKind, Variant, VariantKind};
use integration_tests::{Harness, ModuleScope};
use script_engine::{Engine, JsValue, TryCatch};
use std::cell::Cell;
use std::rc::Rc;

struct CountingResolver {
    inner: SearchPathResolver,
    calls: Rc<Cell<usize>>,
}

impl ModuleResolver for CountingResolver {
    fn resolve(&self, fs: &dyn FileSystem, module_id: &str) -> Option<String> {
        self.calls.set(self.calls.get() + 1);
        self.inner.resolve(fs, module_id)
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Test: loading twice yields one module and one resolution
#[test]
fn test_repeated_load_is_cached() {
    let h = Harness::with_params(EnvironmentParams::default());
    let calls = Rc::new(Cell::new(0));
    h.env.add_module_resolver(Rc::new(CountingResolver {
        inner: SearchPathResolver::new(["res"]),
        calls: Rc::clone(&calls),
    }));
    h.fs.write("res/a/b.json", r#"{"answer": 42}"#);

    let first = h.env.load("a/b").unwrap();
    let exports = h.env.module_exports(first);
    let second = h.env.load("a/b").unwrap();

    assert_eq!(first, second);
    assert_eq!(h.env.module_exports(second), exports);
    assert_eq!(calls.get(), 1);
}

/// Test: nested requires share cached modules and record the graph
#[test]
fn test_shared_dependency_loaded_once() {
    let h = Harness::new();
    let runs = Rc::new(Cell::new(0));
    let counter = Rc::clone(&runs);
    h.add_script("res/lib/math.js", "math", move |engine, module| {
        counter.set(counter.get() + 1);
        module.export(engine, "pi", JsValue::Number(3.0))
    });
    h.add_script("res/game/a.js", "a", |engine, module| {
        let math = module.require(engine, "../lib/math")?;
        module.export(engine, "math", math)
    });
    h.add_script("res/game/b.js", "b", |engine, module| {
        let math = module.require(engine, "lib/math")?;
        module.export(engine, "math", math)
    });

    let a = h.env.load("game/a").unwrap();
    let b = h.env.load("game/b").unwrap();
    let math = h.env.find_module("res/lib/math.js").unwrap();

    assert_eq!(runs.get(), 1);
    assert_eq!(
        h.engine().get(h.exports("game/a"), "math"),
        h.engine().get(h.exports("game/b"), "math")
    );
    let parents = h.env.module(math).unwrap().parents;
    assert_eq!(parents, vec![a, b]);
}

/// Test: the original exception reaches the outermost loader
#[test]
fn test_nested_exception_keeps_original_error() {
    let h = Harness::new();
    h.add_script("res/inner.js", "inner", |engine, _| {
        Err(engine.throw_error(ErrorKind::RangeError, "inner failed"))
    });
    h.add_script("res/outer.js", "outer", |engine, module| {
        module.require(engine, "./inner")?;
        module.export(engine, "unreachable", JsValue::Boolean(true))
    });

    let Err(BridgeError::Exception(report)) = h.env.load("outer") else {
        panic!("expected the inner exception");
    };
    assert_eq!(report.kind, ErrorKind::RangeError);
    assert_eq!(report.message, "inner failed");
    assert!(report
        .stack
        .iter()
        .any(|frame| frame.source_url.as_deref() == Some("res/inner.js")));
    assert_eq!(h.env.get_statistics().modules, 0);
}

/// Test: a script can catch a failed require and go on
#[test]
fn test_script_recovers_from_failed_require() {
    let h = Harness::new();
    h.add_script("res/optional.js", "optional", |engine, module| {
        let try_catch = TryCatch::new(engine);
        let found = module.require(engine, "./missing").is_ok();
        let message = try_catch
            .exception()
            .map(|err| err.message)
            .unwrap_or_default();
        module.export(engine, "found", JsValue::Boolean(found))?;
        module.export(engine, "message", JsValue::from(message))
    });

    h.env.load("optional").unwrap();
    let exports = h.exports("optional");
    assert_eq!(h.engine().get(exports, "found"), Ok(JsValue::Boolean(false)));
    let message = h.engine().get(exports, "message").unwrap();
    assert!(message.as_str().is_some_and(|m| m.contains("unknown module: ./missing")));
}

// ============================================================================
// Reloading
// ============================================================================

/// Test: reload keeps the module and exports identity and updates content
#[test]
fn test_reload_updates_in_place() {
    let h = Harness::new();
    h.add_script("res/config.js", "config-v1", |engine, module| {
        module.export(engine, "level", JsValue::Number(1.0))
    });
    h.compiler.script("config-v2", |engine, module| {
        module.export(engine, "level", JsValue::Number(2.0))
    });

    let module = h.env.load("config").unwrap();
    let exports = h.exports("config");

    h.fs.write("res/config.js", "config-v2");
    assert_eq!(h.env.mark_as_reloading("config"), ReloadResult::Requested);
    assert_eq!(h.env.load("config"), Ok(module));

    assert_eq!(h.exports("config"), exports);
    assert_eq!(h.engine().get(exports, "level"), Ok(JsValue::Number(2.0)));
}

/// Test: reload of a script class refreshes its exported properties
#[test]
fn test_reload_script_class() {
    let h = Harness::new();
    let class_body = |fields: &'static [&'static str]| {
        move |engine: &Engine, module: &ModuleScope| {
            let host = module.require(engine, "host")?;
            let parent = engine.get_value(&host, "Actor")?.as_object();
            let class = engine.new_class("Hero", parent, false, |_, _| Ok(JsValue::Undefined))?;
            let properties = engine.new_object();
            for field in fields {
                engine.define(properties, field, JsValue::from("float"));
            }
            engine.define(class, "__properties__", JsValue::Object(properties));
            module.export(engine, "default", JsValue::Object(class))
        }
    };
    h.add_script("res/hero.js", "hero-v1", class_body(&["speed"]));
    h.compiler.script("hero-v2", class_body(&["speed", "armor"]));

    let module = h.env.load("hero").unwrap();
    let class_id = h.env.module_script_class(module).unwrap();
    assert_eq!(h.env.script_class(class_id).unwrap().properties.len(), 1);

    h.fs.write("res/hero.js", "hero-v2");
    h.env.reload_module(module).unwrap();

    let info = h.env.script_class(class_id).unwrap();
    assert_eq!(info.properties.keys().map(String::as_str).collect::<Vec<_>>(), vec!["speed", "armor"]);
    assert_eq!(info.native_class_id, h.env.expose_host_class("Actor").unwrap());
}

// ============================================================================
// Calls
// ============================================================================

/// Test: a failed argument conversion runs nothing and leaks nothing
#[test]
fn test_argument_failure_leaves_no_temporaries() {
    let h = Harness::new();
    let invoked = Rc::new(Cell::new(false));
    let flag = Rc::clone(&invoked);
    h.add_script("res/handler.js", "handler", move |engine, module| {
        let flag = Rc::clone(&flag);
        let handler = engine.new_function("handle", move |_, _| {
            flag.set(true);
            Ok(JsValue::Undefined)
        });
        module.export(engine, "handle", JsValue::Object(handler))
    });
    h.env.load("handler").unwrap();
    let handle = h
        .engine()
        .get(h.exports("handler"), "handle")
        .unwrap()
        .as_object()
        .unwrap();
    let function_id = h.env.get_cached_function(handle).unwrap();

    h.env.gc();
    let handles = h.engine().handle_count();
    let heap = h.engine().live_objects();

    let args = [
        Variant::from("first"),
        Variant::Array(vec![Variant::Int(1), Variant::Int(2)]),
        Variant::Int(i64::MAX),
        Variant::Bool(true),
    ];
    assert!(matches!(
        h.env.call_function(None, function_id, &args),
        Err(BridgeError::InvalidMethod(_))
    ));
    assert!(!invoked.get());

    h.env.gc();
    assert_eq!(h.engine().handle_count(), handles);
    assert_eq!(h.engine().live_objects(), heap);
}

/// Test: host objects bound for a failed call are unbound again
#[test]
fn test_argument_failure_unbinds_host_objects() {
    let h = Harness::new();
    let invoked = Rc::new(Cell::new(false));
    let flag = Rc::clone(&invoked);
    let handle = h.engine().new_function("handle", move |_, _| {
        flag.set(true);
        Ok(JsValue::Undefined)
    });
    let function_id = h.env.get_cached_function(handle).unwrap();
    let actor = h.host.spawn("Actor");
    let resource = h.host.spawn("Resource");
    let (bound, _) = h.bind("Actor", BindingPolicy::External);
    h.env.expose_host_class("Resource").unwrap();
    h.env.gc();
    let handles = h.engine().handle_count();
    let bindings = h.env.get_statistics().live_objects;

    let args = [
        Variant::Object(Some(actor)),
        Variant::Object(Some(bound)),
        Variant::Object(Some(resource)),
        Variant::Int(i64::MAX),
    ];
    assert!(matches!(
        h.env.call_function(None, function_id, &args),
        Err(BridgeError::InvalidMethod(message)) if message.starts_with("argument 3")
    ));
    assert!(!invoked.get());

    assert!(!h.env.is_bound(actor));
    assert!(!h.env.is_bound(resource));
    assert!(h.env.is_bound(bound));
    assert_eq!(h.host.host_refs(resource), 0);
    assert!(h.host.is_alive(actor));
    assert!(h.host.is_alive(resource));
    assert!(h.host.finalized().is_empty());
    assert_eq!(h.env.get_statistics().live_objects, bindings);
    h.env.gc();
    assert_eq!(h.engine().handle_count(), handles);

    let args = [Variant::Object(Some(resource))];
    assert_eq!(h.env.call_function(None, function_id, &args), Ok(Variant::Nil));
    assert!(invoked.get());
    assert!(h.env.is_bound(resource));
    assert_eq!(h.host.host_refs(resource), 1);
}

/// Test: host calls into script methods of a bound object
#[test]
fn test_call_script_method_on_bound_object() {
    let h = Harness::new();
    let (pointer, obj) = h.bind("Actor", BindingPolicy::External);
    let object_id = h.env.object_id(pointer).unwrap();
    let heal = h.engine().new_function("heal", |engine, call| {
        let Some(target) = call.this.as_object() else {
            return Err(engine.throw_error(ErrorKind::TypeError, "no receiver"));
        };
        let hp = engine.get(target, "hp")?.as_number().unwrap_or_default();
        let amount = call.arg(0).as_number().unwrap_or_default();
        engine.set(target, "hp", JsValue::Number(hp + amount))?;
        engine.get(target, "hp")
    });
    h.engine().define(obj, "heal", JsValue::Object(heal));

    let function_id = h.env.retain_function(object_id, "heal").unwrap();
    assert_eq!(
        h.env.call_function(Some(object_id), function_id, &[Variant::Int(5)]),
        Ok(Variant::Int(15))
    );
    assert_eq!(h.host.hp(pointer), Some(15));

    assert!(h.env.release_function(function_id));
    assert!(h.env.call_function(Some(object_id), function_id, &[]).is_err());
}

/// Test: exported properties of a crossbound script object
#[test]
fn test_crossbind_script_properties() {
    let h = Harness::new();
    h.add_script("res/npc.js", "npc", |engine, module| {
        let host = module.require(engine, "host")?;
        let parent = engine.get_value(&host, "Actor")?.as_object();
        let class = engine.new_class("Npc", parent, false, |engine, call| {
            engine.set_value(&call.this, "mood", JsValue::from("calm"))
                .map(|_| JsValue::Undefined)
        })?;
        let properties = engine.new_object();
        engine.define(properties, "mood", JsValue::from("string"));
        engine.define(class, "__properties__", JsValue::Object(properties));
        module.export(engine, "default", JsValue::Object(class))
    });
    let module = h.env.load("npc").unwrap();
    let class_id = h.env.module_script_class(module).unwrap();
    let pointer = h.host.spawn("Actor");

    let object_id = h.env.crossbind(pointer, class_id).unwrap();
    let mood = ScriptPropertyInfo::new("mood", VariantKind::String);
    assert_eq!(
        h.env.get_script_property_value(object_id, &mood),
        Ok(Variant::from("calm"))
    );
    assert_eq!(
        h.env.get_script_default_property_value(class_id, &mood),
        Ok(Variant::from("calm"))
    );
    h.env
        .set_script_property_value(object_id, &mood, &Variant::from("angry"))
        .unwrap();
    assert_eq!(
        h.env.get_script_property_value(object_id, &mood),
        Ok(Variant::from("angry"))
    );

    let obj = h.env.get_object(object_id).unwrap();
    assert_eq!(
        h.engine().call_method(obj, "hit", &[JsValue::Number(4.0)]),
        Ok(JsValue::Number(6.0))
    );
    assert!(h.host.is_alive(pointer));
}
