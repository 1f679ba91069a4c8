//! Unit tests for the script engine

use core_types::{ErrorKind, HostPointer};
use script_engine::{
    Engine, EngineConfig, InternalField, JsValue, PromiseState, Thrown, TryCatch,
};
use std::cell::Cell;
use std::rc::Rc;

fn pointer(address: usize) -> HostPointer {
    HostPointer::new(address).unwrap()
}

// ============================================================================
// Property Tests
// ============================================================================

#[test]
fn test_get_walks_prototype_chain() {
    let engine = Engine::default();
    let base = engine.new_object();
    engine.set(base, "speed", 3.0.into()).unwrap();
    let derived = engine.new_object_with_proto(Some(base));

    assert_eq!(engine.get(derived, "speed").unwrap(), JsValue::Number(3.0));
    assert!(!engine.has_own(derived, "speed"));
    assert_eq!(engine.get(derived, "missing").unwrap(), JsValue::Undefined);
}

#[test]
fn test_accessor_runs_with_receiver() {
    let engine = Engine::default();
    let proto = engine.new_object();
    let getter = engine.new_function("get hp", |engine, info| {
        let this = info.this.as_object().unwrap();
        engine.get(this, "_hp")
    });
    let setter = engine.new_function("set hp", |engine, info| {
        let this = info.this.as_object().unwrap();
        engine.set(this, "_hp", info.arg(0))?;
        Ok(JsValue::Undefined)
    });
    engine.define_accessor(proto, "hp", Some(getter), Some(setter));

    let obj = engine.new_object_with_proto(Some(proto));
    engine.set(obj, "hp", 7.0.into()).unwrap();

    assert!(engine.has_own(obj, "_hp"));
    assert!(!engine.has_own(obj, "hp"));
    assert_eq!(engine.get(obj, "hp").unwrap(), JsValue::Number(7.0));
}

#[test]
fn test_getter_only_property_rejects_writes() {
    let engine = Engine::default();
    let obj = engine.new_object();
    let getter = engine.new_function("get", |_, _| Ok(JsValue::Null));
    engine.define_accessor(obj, "fixed", Some(getter), None);

    let try_catch = TryCatch::new(&engine);
    assert_eq!(engine.set(obj, "fixed", 1.0.into()), Err(Thrown));
    assert_eq!(try_catch.exception().unwrap().kind, ErrorKind::TypeError);
}

#[test]
fn test_interceptor_defines_lazily() {
    let engine = Engine::default();
    let calls = Rc::new(Cell::new(0));
    let seen = calls.clone();
    let host = engine.new_object();
    let interceptor = engine.new_function("intercept", move |engine, info| {
        seen.set(seen.get() + 1);
        let this = info.this.as_object().unwrap();
        match info.arg(0).as_str() {
            Some("Node") => {
                let value = JsValue::from("node-class");
                engine.define(this, "Node", value.clone());
                Ok(value)
            }
            _ => Ok(JsValue::Undefined),
        }
    });
    engine.set_interceptor(host, interceptor);

    assert_eq!(engine.get(host, "Node").unwrap(), JsValue::from("node-class"));
    assert_eq!(engine.get(host, "Node").unwrap(), JsValue::from("node-class"));
    assert_eq!(engine.get(host, "Unknown").unwrap(), JsValue::Undefined);
    assert_eq!(calls.get(), 2);
}

#[test]
fn test_delete_preserves_key_order() {
    let engine = Engine::default();
    let obj = engine.new_object();
    for key in ["a", "b", "c"] {
        engine.set(obj, key, JsValue::Null).unwrap();
    }
    assert!(engine.delete(obj, "b"));
    assert!(!engine.delete(obj, "b"));

    let keys: Vec<String> = engine.own_keys(obj).iter().map(|k| k.to_string()).collect();
    assert_eq!(keys, vec!["a", "c"]);
}

#[test]
fn test_array_elements_and_length() {
    let engine = Engine::default();
    let array = engine.new_array(vec![1.0.into(), "x".into()]);
    engine.array_push(array, JsValue::Null);

    assert_eq!(engine.get(array, "length").unwrap(), JsValue::Number(3.0));
    assert_eq!(engine.get(array, "1").unwrap(), JsValue::from("x"));
    assert!(engine.array_remove(array, &JsValue::from("x")));
    assert_eq!(
        engine.array_elements(array).unwrap(),
        vec![JsValue::Number(1.0), JsValue::Null]
    );
}

#[test]
fn test_cyclic_prototype_is_rejected() {
    let engine = Engine::default();
    let a = engine.new_object();
    let b = engine.new_object_with_proto(Some(a));

    let try_catch = TryCatch::new(&engine);
    assert!(engine.set_prototype(a, Some(b)).is_err());
    assert!(try_catch.has_caught());
}

// ============================================================================
// Call and Class Tests
// ============================================================================

#[test]
fn test_call_non_function_throws_type_error() {
    let engine = Engine::default();
    let try_catch = TryCatch::new(&engine);

    let result = engine.call(&JsValue::from(3.0), JsValue::Undefined, &[]);
    assert_eq!(result, Err(Thrown));

    let error = try_catch.exception().unwrap();
    assert_eq!(error.kind, ErrorKind::TypeError);
    assert_eq!(error.message, "3 is not a function");
}

#[test]
fn test_function_data_is_passed_back() {
    let engine = Engine::default();
    let func = engine.new_function_with_data("echo", JsValue::from(42.0), |_, info| {
        Ok(info.data.clone())
    });
    let result = engine.call(&func.into(), JsValue::Undefined, &[]).unwrap();
    assert_eq!(result, JsValue::Number(42.0));
    assert_eq!(engine.function_name(func).as_deref(), Some("echo"));
}

#[test]
fn test_construct_runs_chain_base_first() {
    let engine = Engine::default();
    let order = Rc::new(std::cell::RefCell::new(Vec::new()));

    let log = order.clone();
    let base = engine
        .new_class("Base", None, true, move |_, _| {
            log.borrow_mut().push("Base");
            Ok(JsValue::Undefined)
        })
        .unwrap();
    let log = order.clone();
    let derived = engine
        .new_class("Derived", Some(base), false, move |_, info| {
            assert!(info.is_construct_call());
            log.borrow_mut().push("Derived");
            Ok(JsValue::Undefined)
        })
        .unwrap();

    let instance = engine.construct(&derived.into(), &[]).unwrap();
    let instance = instance.as_object().unwrap();

    assert_eq!(*order.borrow(), vec!["Base", "Derived"]);
    assert!(engine.instance_of(instance, base));
    assert!(engine.instance_of(instance, derived));
    assert_eq!(engine.internal_field(instance), InternalField::Unset);
}

#[test]
fn test_plain_function_is_not_constructor() {
    let engine = Engine::default();
    let func = engine.new_function("f", |_, _| Ok(JsValue::Undefined));
    let try_catch = TryCatch::new(&engine);

    assert!(engine.construct(&func.into(), &[]).is_err());
    assert_eq!(try_catch.exception().unwrap().kind, ErrorKind::TypeError);
    assert!(engine.new_class("C", Some(func), false, |_, _| Ok(JsValue::Undefined)).is_err());
}

#[test]
fn test_internal_field_requires_wrapper() {
    let engine = Engine::default();
    let plain = engine.new_object();
    let wrapper = engine.new_wrapper(None);

    assert!(!engine.set_internal_field(plain, Some(pointer(0x10))));
    assert!(engine.set_internal_field(wrapper, Some(pointer(0x10))));
    assert_eq!(engine.internal_field(wrapper), InternalField::Pointer(pointer(0x10)));
    assert!(engine.set_internal_field(wrapper, None));
    assert_eq!(engine.internal_field(wrapper), InternalField::Unset);
}

#[test]
fn test_call_depth_limit() {
    let engine = Engine::new(EngineConfig {
        max_call_depth: 8,
        ..EngineConfig::default()
    });
    let recurse = engine.new_function("recurse", |engine, info| {
        engine.call(&JsValue::Object(info.callee), JsValue::Undefined, &[])
    });

    let try_catch = TryCatch::new(&engine);
    assert!(engine.call(&recurse.into(), JsValue::Undefined, &[]).is_err());

    let error = try_catch.exception().unwrap();
    assert_eq!(error.kind, ErrorKind::RangeError);
    assert_eq!(error.stack.len(), 8);
    assert_eq!(engine.call_depth(), 0);
}

#[test]
fn test_error_report_for_thrown_primitive() {
    let engine = Engine::default();
    let report = engine.error_report(&JsValue::from("boom"));
    assert_eq!(report.kind, ErrorKind::Error);
    assert_eq!(report.message, "boom");
    assert!(report.stack.is_empty());
}

#[test]
fn test_error_stack_names_source() {
    let engine = Engine::default();
    let func = engine.new_function("update", |engine, _| {
        Err(engine.throw_error(ErrorKind::Error, "bad state"))
    });
    engine.set_function_source(func, "res/player.js");

    let try_catch = TryCatch::new(&engine);
    let _ = engine.call(&func.into(), JsValue::Undefined, &[]);
    let error = try_catch.exception().unwrap();

    assert_eq!(error.to_string(), "Error: bad state\n    at update (res/player.js)");
}

#[test]
fn test_promise_settles_once() {
    let engine = Engine::default();
    let promise = engine.new_promise();
    assert!(engine.is_promise(&promise.into()));
    assert!(engine.settle_promise(promise, Ok(1.0.into())));
    assert!(!engine.settle_promise(promise, Err(JsValue::Null)));
    assert_eq!(
        engine.promise_state(promise),
        Some(PromiseState::Fulfilled(JsValue::Number(1.0)))
    );
}

// ============================================================================
// Handle and GC Tests
// ============================================================================

thread_local! {
    static COLLECTED: Cell<usize> = const { Cell::new(0) };
}

fn count_collected(_: &Engine, _: HostPointer) {
    COLLECTED.with(|c| c.set(c.get() + 1));
}

#[test]
fn test_handle_scope_roots_until_closed() {
    let engine = Engine::new(EngineConfig {
        gc_threshold: 0,
        ..EngineConfig::default()
    });
    let obj = {
        let scope = engine.open_scope();
        let obj = engine.new_object();
        scope.handle(obj.into());
        engine.collect_garbage();
        assert!(engine.is_alive(obj));
        obj
    };
    assert_eq!(engine.handle_count(), 0);
    engine.collect_garbage();
    assert!(!engine.is_alive(obj));
}

#[test]
fn test_strong_global_keeps_reachable_graph() {
    let engine = Engine::default();
    let parent = engine.new_object();
    let child = engine.new_object();
    engine.set(parent, "child", child.into()).unwrap();
    let global = engine.new_global(parent.into());

    engine.collect_garbage();
    assert!(engine.is_alive(child));

    assert!(engine.reset_global(global));
    assert!(!engine.reset_global(global));
    engine.collect_garbage();
    assert!(!engine.is_alive(parent));
    assert!(!engine.is_alive(child));
}

#[test]
fn test_weak_global_fires_callback_once() {
    COLLECTED.with(|c| c.set(0));
    let engine = Engine::default();
    let obj = engine.new_object();
    let global = engine.new_global(obj.into());
    assert!(engine.set_weak(global, pointer(0x40), count_collected));
    assert!(engine.is_weak(global));

    let stats = engine.collect_garbage();
    assert_eq!(stats.weak_callbacks, 1);
    assert_eq!(engine.global_value(global), None);

    engine.collect_garbage();
    assert_eq!(COLLECTED.with(Cell::get), 1);
    assert!(engine.reset_global(global));
}

#[test]
fn test_weak_global_survives_while_reachable() {
    COLLECTED.with(|c| c.set(0));
    let engine = Engine::default();
    let obj = engine.new_object();
    engine.set(engine.global(), "keep", obj.into()).unwrap();
    let global = engine.new_global(obj.into());
    engine.set_weak(global, pointer(0x40), count_collected);

    engine.collect_garbage();
    assert_eq!(engine.global_value(global), Some(JsValue::Object(obj)));

    engine.clear_weak(global);
    engine.delete(engine.global(), "keep");
    engine.collect_garbage();
    assert!(engine.is_alive(obj));
    assert_eq!(COLLECTED.with(Cell::get), 0);
}

#[test]
fn test_outermost_scope_triggers_collection() {
    let engine = Engine::new(EngineConfig {
        gc_threshold: 4,
        ..EngineConfig::default()
    });
    {
        let _scope = engine.open_scope();
        for _ in 0..8 {
            engine.new_object();
        }
        assert_eq!(engine.gc_count(), 0);
    }
    assert_eq!(engine.gc_count(), 1);
}

#[test]
fn test_inner_scope_does_not_collect() {
    let engine = Engine::new(EngineConfig {
        gc_threshold: 2,
        ..EngineConfig::default()
    });
    let _outer = engine.open_scope();
    let pending = engine.new_object();
    {
        let _inner = engine.open_scope();
        for _ in 0..4 {
            engine.new_object();
        }
    }
    assert_eq!(engine.gc_count(), 0);
    assert!(engine.is_alive(pending));
}

// ============================================================================
// Compiler and JSON Tests
// ============================================================================

#[test]
fn test_json_module_keeps_exports_identity() {
    let engine = Engine::default();
    let exports = engine.new_object();
    let module = engine.new_object();
    engine.set(exports, "stale", true.into()).unwrap();

    let func = engine.compile("data.json", r#"{"hp": 10}"#).unwrap();
    engine
        .call(&func, JsValue::Undefined, &[exports.into(), JsValue::Undefined, module.into()])
        .unwrap();

    assert!(!engine.has_own(exports, "stale"));
    assert_eq!(engine.get(exports, "hp").unwrap(), JsValue::Number(10.0));
}

#[test]
fn test_json_array_replaces_module_exports() {
    let engine = Engine::default();
    let exports = engine.new_object();
    let module = engine.new_object();

    let func = engine.compile("list.json", "[1, 2]").unwrap();
    engine
        .call(&func, JsValue::Undefined, &[exports.into(), JsValue::Undefined, module.into()])
        .unwrap();

    let replaced = engine.get(module, "exports").unwrap();
    assert!(engine.is_array(&replaced));
}

#[test]
fn test_malformed_json_is_syntax_error() {
    let engine = Engine::default();
    let try_catch = TryCatch::new(&engine);
    assert!(engine.compile("broken.json", "{").is_err());

    let error = try_catch.exception().unwrap();
    assert_eq!(error.kind, ErrorKind::SyntaxError);
    assert!(error.message.starts_with("broken.json"));
}

#[test]
fn test_closure_compiler() {
    let engine = Engine::default();
    engine.set_compiler(Rc::new(
        |engine: &Engine, name: &str, source: &str| -> Result<JsValue, Thrown> {
            let text = format!("{}:{}", name, source);
            let func = engine.new_function(name, move |_, _| Ok(JsValue::from(text.as_str())));
            Ok(JsValue::Object(func))
        },
    ));

    let func = engine.compile("a.js", "body").unwrap();
    let value = engine.call(&func, JsValue::Undefined, &[]).unwrap();
    assert_eq!(value, JsValue::from("a.js:body"));
}

#[test]
fn test_to_json_drops_functions() {
    let engine = Engine::default();
    let obj = engine.new_object();
    let func = engine.new_function("f", |_, _| Ok(JsValue::Undefined));
    engine.set(obj, "f", func.into()).unwrap();
    engine.set(obj, "n", f64::INFINITY.into()).unwrap();

    let json = engine.to_json(&obj.into()).unwrap();
    assert_eq!(json, serde_json::json!({"n": null}));
}

#[test]
fn test_to_json_rejects_cycles() {
    let engine = Engine::default();
    let obj = engine.new_object();
    engine.set(obj, "self", obj.into()).unwrap();
    assert_eq!(engine.to_json(&obj.into()), None);
}
