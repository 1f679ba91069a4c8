//! Binding lifecycle across the host, the bridge and the collector
//!
//! Covers the reference-count and strength rules of both binding policies,
//! collector-driven finalization and teardown.

use bridge::{marshal, BindingPolicy, BridgeError, MarshalError, Strength};
use core_types::Variant;
use integration_tests::Harness;
use script_engine::{JsValue, TryCatch};

fn strength(h: &Harness, pointer: core_types::HostPointer) -> (Strength, u32) {
    let state = h.env.binding_state(pointer).expect("bound");
    (state.strength(), state.ref_count())
}

/// Test: a pointer binds once until it is freed
#[test]
fn test_rebinding_requires_free() {
    let h = Harness::new();
    let (pointer, _) = h.bind("Actor", BindingPolicy::External);
    let class_id = h.env.expose_host_class("Actor").unwrap();

    let second = h.engine().new_wrapper(None);
    assert_eq!(
        h.env.bind_pointer(class_id, pointer, second, BindingPolicy::External),
        Err(BridgeError::DuplicateBinding(pointer))
    );

    h.env.free_object(pointer, false).unwrap();
    assert!(h
        .env
        .bind_pointer(class_id, pointer, second, BindingPolicy::External)
        .is_ok());
}

/// Test: external binding counts host references while staying strong
#[test]
fn test_external_reference_sequence() {
    let h = Harness::new();
    let (pointer, _) = h.bind("Actor", BindingPolicy::External);
    assert_eq!(strength(&h, pointer), (Strength::Strong, 0));

    h.env.reference_object(pointer, true).unwrap();
    h.env.reference_object(pointer, true).unwrap();
    h.env.reference_object(pointer, false).unwrap();

    assert_eq!(strength(&h, pointer), (Strength::Strong, 1));
    h.env.gc();
    assert!(h.env.is_bound(pointer));
    assert!(h.host.finalized().is_empty());
}

/// Test: an external binding becomes collectable once the host lets go
#[test]
fn test_external_binding_collected_after_last_release() {
    let h = Harness::new();
    let (pointer, _) = h.bind("Actor", BindingPolicy::External);

    h.env.reference_object(pointer, true).unwrap();
    h.env.reference_object(pointer, false).unwrap();
    assert_eq!(strength(&h, pointer), (Strength::Weak, 0));

    h.env.gc();
    assert!(!h.env.is_bound(pointer));
    assert_eq!(h.host.finalized(), vec![(pointer, false)]);
}

/// Test: managed reference then release is a strength no-op
#[test]
fn test_managed_reference_round_trip() {
    let h = Harness::new();
    let (pointer, _) = h.bind("Actor", BindingPolicy::Managed);
    let before = strength(&h, pointer);

    h.env.reference_object(pointer, true).unwrap();
    assert_eq!(strength(&h, pointer), (Strength::Strong, 1));
    h.env.reference_object(pointer, false).unwrap();

    assert_eq!(strength(&h, pointer), before);
    assert_eq!(before, (Strength::Weak, 0));
}

/// Test: a script reference keeps a weak binding alive
#[test]
fn test_weak_binding_survives_while_script_holds_it() {
    let h = Harness::new();
    let (pointer, obj) = h.bind("Actor", BindingPolicy::Managed);
    let global = h.engine().global();
    h.engine().define(global, "player", JsValue::Object(obj));

    h.env.gc();
    assert!(h.env.is_bound(pointer));

    h.engine().delete(global, "player");
    h.env.gc();
    assert!(!h.env.is_bound(pointer));
    assert!(!h.host.is_alive(pointer));
}

/// Test: freeing twice finalizes once
#[test]
fn test_free_is_idempotent() {
    let h = Harness::new();
    let (pointer, _) = h.bind("Actor", BindingPolicy::External);

    h.env.free_object(pointer, true).unwrap();
    h.env.free_object(pointer, true).unwrap();

    assert_eq!(h.host.finalized(), vec![(pointer, false)]);
}

/// Test: script calls reach the host through a bound wrapper
#[test]
fn test_wrapper_forwards_to_host() {
    let h = Harness::new();
    let (pointer, obj) = h.bind("Actor", BindingPolicy::External);
    let engine = h.engine();

    assert_eq!(
        engine.call_method(obj, "hit", &[JsValue::Number(3.0)]),
        Ok(JsValue::Number(7.0))
    );
    engine.set(obj, "hp", JsValue::Number(25.0)).unwrap();
    assert_eq!(h.host.hp(pointer), Some(25));
    assert_eq!(engine.get(obj, "hp"), Ok(JsValue::Number(25.0)));
}

/// Test: a ref-counted host object being destroyed cannot be wrapped
#[test]
fn test_dying_resource_is_not_bound() {
    let h = Harness::new();
    let alive = h.host.spawn("Resource");
    let dying = h.host.spawn_dying("Resource");

    assert!(marshal::to_js(&h.env, &Variant::Object(Some(alive))).is_ok());
    assert!(h.env.is_bound(alive));
    assert!(matches!(
        marshal::to_js(&h.env, &Variant::Object(Some(dying))),
        Err(MarshalError::BindFailed(pointer, _)) if pointer == dying
    ));
    assert!(!h.env.is_bound(dying));
}

/// Test: a rejected host binding leaves the host reference count alone
#[test]
fn test_rejected_binding_keeps_host_refs() {
    let h = Harness::new();
    let (pointer, obj) = h.bind("Resource", BindingPolicy::External);
    let class_id = h.env.expose_host_class("Resource").unwrap();

    let other = h.engine().new_wrapper(None);
    assert_eq!(
        h.env.bind_host_object(class_id, pointer, other),
        Err(BridgeError::DuplicateBinding(pointer))
    );
    assert_eq!(h.host.host_refs(pointer), 0);
    assert_eq!(h.env.get_object(h.env.object_id(pointer).unwrap()), Some(obj));

    let fresh = h.host.spawn("Resource");
    let plain = h.engine().new_object();
    assert!(matches!(
        h.env.bind_host_object(class_id, fresh, plain),
        Err(BridgeError::InvalidObject(_))
    ));
    assert_eq!(h.host.host_refs(fresh), 0);
    assert!(!h.env.is_bound(fresh));
}

/// Test: a constructed host object that cannot be bound is destroyed
#[test]
fn test_failed_construction_finalizes_instance() {
    let h = Harness::new();
    let class_id = h.env.expose_host_class("Resource").unwrap();
    let constructor = h.env.class_constructor(class_id).unwrap();
    let engine = h.engine();
    let _scope = engine.open_scope();
    h.host.refuse_refs(true);

    let try_catch = TryCatch::new(engine);
    assert!(engine.construct(&JsValue::Object(constructor), &[]).is_err());
    assert!(try_catch.exception().is_some());

    let finalized = h.host.finalized();
    assert_eq!(finalized.len(), 1);
    let (pointer, persistent) = finalized[0];
    assert!(!persistent);
    assert!(!h.host.is_alive(pointer));
    assert!(!h.env.is_bound(pointer));
    assert_eq!(h.env.get_statistics().live_objects, 0);
}

/// Test: teardown finalizes what the host still has bound
#[test]
fn test_drop_finalizes_bound_objects() {
    let Harness { env, host, .. } = Harness::new();
    let class_id = env.expose_host_class("Actor").unwrap();
    let pointer = host.spawn("Actor");
    let obj = env.engine().new_wrapper(None);
    env.bind_pointer(class_id, pointer, obj, BindingPolicy::Managed)
        .unwrap();
    env.mark_as_persistent(pointer).unwrap();

    env.gc();
    assert!(host.is_alive(pointer));

    drop(env);
    assert_eq!(host.finalized(), vec![(pointer, true)]);
}
