//! Unit tests for the Variant enum

use core_types::{HostPointer, Variant, VariantKind, MAX_SAFE_INTEGER};
use std::collections::BTreeMap;

#[test]
fn test_kind_tags() {
    assert_eq!(Variant::Nil.kind(), VariantKind::Nil);
    assert_eq!(Variant::Bool(true).kind(), VariantKind::Bool);
    assert_eq!(Variant::Float(1.5).kind(), VariantKind::Float);
    assert_eq!(Variant::Array(vec![]).kind(), VariantKind::Array);
    assert_eq!(
        Variant::Dictionary(BTreeMap::new()).kind(),
        VariantKind::Dictionary
    );
    assert_eq!(Variant::Object(None).kind(), VariantKind::Object);
}

#[test]
fn test_default_is_nil() {
    assert!(Variant::default().is_nil());
}

#[test]
fn test_default_of_every_kind_has_that_kind() {
    for kind in [
        VariantKind::Nil,
        VariantKind::Bool,
        VariantKind::Int,
        VariantKind::Float,
        VariantKind::String,
        VariantKind::Array,
        VariantKind::Dictionary,
        VariantKind::Object,
    ] {
        assert_eq!(Variant::default_of(kind).kind(), kind);
    }
}

#[test]
fn test_safe_integer_bound() {
    assert_eq!(MAX_SAFE_INTEGER, 9_007_199_254_740_991);
}

#[test]
fn test_serializes_as_tagged_json() {
    let pointer = HostPointer::new(0x20).unwrap();
    let mut map = BTreeMap::new();
    map.insert("hp".to_string(), Variant::Int(10));
    map.insert("owner".to_string(), Variant::Object(Some(pointer)));
    let value = Variant::Dictionary(map);

    let json = serde_json::to_string(&value).unwrap();
    let back: Variant = serde_json::from_str(&json).unwrap();
    assert_eq!(back, value);
}

#[test]
fn test_debug_output() {
    let pointer = HostPointer::new(0x20).unwrap();
    assert_eq!(format!("{:?}", Variant::Object(Some(pointer))), "Object(0x20)");
    assert_eq!(format!("{:?}", Variant::Array(vec![Variant::Int(1)])), "[Int(1)]");
}
