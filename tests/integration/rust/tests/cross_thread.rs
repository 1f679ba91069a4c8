//! Thread affinity, token routing and the cross-thread inbox

use bridge::{callbacks, store, BindingPolicy, BridgeError, Message};
use core_types::ErrorKind;
use integration_tests::Harness;
use script_engine::JsValue;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;
use std::thread;

// ============================================================================
// Thread Affinity
// ============================================================================

/// Test: callbacks from a foreign thread fail without side effects
#[test]
fn test_foreign_thread_callbacks_rejected() {
    let h = Harness::new();
    let (pointer, _) = h.bind("Actor", BindingPolicy::External);
    h.env.reference_object(pointer, true).unwrap();
    let token = h.env.token();
    let before = h.env.binding_state(pointer);

    let results = thread::spawn(move || {
        (
            callbacks::reference_callback(token, pointer, true),
            callbacks::reference_callback(token, pointer, false),
            callbacks::free_callback(token, pointer),
            store::access(token).map(|_| ()),
        )
    })
    .join()
    .unwrap();

    assert_eq!(results.0, Err(BridgeError::WrongThread));
    assert_eq!(results.1, Err(BridgeError::WrongThread));
    assert_eq!(results.2, Err(BridgeError::WrongThread));
    assert_eq!(results.3, Err(BridgeError::WrongThread));
    assert_eq!(h.env.binding_state(pointer), before);
    assert!(h.env.is_bound(pointer));
    assert!(h.host.finalized().is_empty());
}

/// Test: the owning thread reaches the environment through its token
#[test]
fn test_owner_thread_callbacks_apply() {
    let h = Harness::new();
    let (pointer, _) = h.bind("Actor", BindingPolicy::External);
    let token = h.env.token();

    assert_eq!(callbacks::reference_callback(token, pointer, true), Ok(false));
    assert_eq!(h.env.binding_state(pointer).unwrap().ref_count(), 1);

    callbacks::free_callback(token, pointer).unwrap();
    assert!(!h.env.is_bound(pointer));
    assert!(h.host.finalized().is_empty());
}

// ============================================================================
// Token Routing
// ============================================================================

/// Test: two environments on one thread stay isolated
#[test]
fn test_tokens_route_to_their_environment() {
    let first = Harness::new();
    let second = Harness::new();
    assert_ne!(first.env.token(), second.env.token());

    let routed = store::access(first.env.token()).unwrap();
    assert!(Rc::ptr_eq(&routed, &first.env));
    drop(routed);

    let (pointer, _) = first.bind("Actor", BindingPolicy::External);
    assert_eq!(
        callbacks::reference_callback(second.env.token(), pointer, true),
        Ok(true)
    );
    assert_eq!(first.env.binding_state(pointer).unwrap().ref_count(), 0);
    assert!(!second.env.is_bound(pointer));
}

/// Test: a dropped environment's token no longer resolves
#[test]
fn test_token_unknown_after_drop() {
    let h = Harness::new();
    let (pointer, _) = h.bind("Actor", BindingPolicy::External);
    let token = h.env.token();
    assert!(store::is_registered(token));

    drop(h);

    assert!(!store::is_registered(token));
    assert!(matches!(store::access(token), Err(BridgeError::UnknownEnvironment)));
    assert_eq!(
        callbacks::free_callback(token, pointer),
        Err(BridgeError::UnknownEnvironment)
    );
}

// ============================================================================
// Inbox
// ============================================================================

fn record_handler(h: &Harness, name: &str, log: &Rc<RefCell<Vec<Value>>>) -> JsValue {
    let log = Rc::clone(log);
    let handler = h.engine().new_function(name, move |engine, call| {
        let payload = engine.to_json(&call.arg(0)).unwrap_or(Value::Null);
        log.borrow_mut().push(payload);
        Ok(JsValue::Undefined)
    });
    JsValue::Object(handler)
}

/// Test: messages posted by a worker are delivered on the next update
#[test]
fn test_worker_messages_delivered_on_update() {
    let h = Harness::new();
    let (pointer, obj) = h.bind("Actor", BindingPolicy::External);
    let target = h.env.object_id(pointer).unwrap();
    let messages = Rc::new(RefCell::new(Vec::new()));
    let errors = Rc::new(RefCell::new(Vec::new()));
    h.engine()
        .define(obj, "onmessage", record_handler(&h, "onmessage", &messages));
    h.engine()
        .define(obj, "onerror", record_handler(&h, "onerror", &errors));

    let inbox = h.env.inbox();
    thread::spawn(move || {
        for name in ["ping", "pong"] {
            inbox.post(Message::data(target, json!(name)));
        }
        inbox.post(Message::error(target, json!("lost connection")));
    })
    .join()
    .unwrap();

    assert!(messages.borrow().is_empty());
    assert_eq!(h.env.inbox().len(), 3);

    h.env.update(0);

    assert_eq!(*messages.borrow(), vec![json!("ping"), json!("pong")]);
    assert_eq!(*errors.borrow(), vec![json!("lost connection")]);
    assert!(h.env.inbox().is_empty());
}

/// Test: messages for objects that are gone are dropped
#[test]
fn test_message_for_freed_object_dropped() {
    let h = Harness::new();
    let (pointer, obj) = h.bind("Actor", BindingPolicy::External);
    let target = h.env.object_id(pointer).unwrap();
    let messages = Rc::new(RefCell::new(Vec::new()));
    h.engine()
        .define(obj, "onmessage", record_handler(&h, "onmessage", &messages));

    h.env.inbox().post(Message::data(target, json!("late")));
    h.env.free_object(pointer, false).unwrap();
    h.env.update(0);

    assert!(messages.borrow().is_empty());
    assert!(h.env.inbox().is_empty());
}

/// Test: a throwing handler does not stop later deliveries
#[test]
fn test_throwing_handler_isolated() {
    let h = Harness::new();
    let (first_pointer, first) = h.bind("Actor", BindingPolicy::External);
    let (second_pointer, second) = h.bind("Actor", BindingPolicy::External);
    let first_id = h.env.object_id(first_pointer).unwrap();
    let second_id = h.env.object_id(second_pointer).unwrap();

    let failing = h.engine().new_function("onmessage", |engine, _| {
        Err(engine.throw_error(ErrorKind::Error, "handler failed"))
    });
    h.engine()
        .define(first, "onmessage", JsValue::Object(failing));
    let messages = Rc::new(RefCell::new(Vec::new()));
    h.engine()
        .define(second, "onmessage", record_handler(&h, "onmessage", &messages));

    let inbox = h.env.inbox();
    inbox.post(Message::data(first_id, json!(1)));
    inbox.post(Message::data(second_id, json!("delivered")));
    h.env.update(0);

    assert_eq!(*messages.borrow(), vec![json!("delivered")]);
    assert!(!h.engine().has_pending_exception());
}
