// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use super::*;
use crate::value::structural_eq;

fn roundtrip(value: &RemoteValue) -> RemoteValue {
    let node = serialize(value).unwrap();
    // Every node must survive the JSON text layer unchanged.
    let text = serde_json::to_string(&node).unwrap();
    let back: SerializedValue = serde_json::from_str(&text).unwrap();
    assert_eq!(node, back);
    parse(&back).unwrap()
}

#[yare::parameterized(
    null = { RemoteValue::Null },
    bool_true = { RemoteValue::Bool(true) },
    number = { RemoteValue::Number(42.5) },
    string = { RemoteValue::String("hello".into()) },
    empty_string = { RemoteValue::String(String::new()) },
    bigint = { RemoteValue::BigInt("123456789012345678901234567890".into()) },
    url = { RemoteValue::Url("https://example.com/".into()) },
    regex = { RemoteValue::Regex { source: "a+b".into(), flags: "gi".into() } },
    handle = { RemoteValue::Handle(4) },
)]
fn roundtrips_exactly(value: RemoteValue) {
    let back = roundtrip(&value);
    assert!(structural_eq(&value, &back), "{value:?} != {back:?}");
}

#[test]
fn preserves_special_numbers() {
    for value in [
        RemoteValue::Number(f64::NAN),
        RemoteValue::Number(f64::INFINITY),
        RemoteValue::Number(f64::NEG_INFINITY),
        RemoteValue::Number(-0.0),
    ] {
        let back = roundtrip(&value);
        match (&value, &back) {
            (RemoteValue::Number(a), RemoteValue::Number(b)) => {
                assert!(
                    (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits(),
                    "{a} did not survive"
                );
            }
            other => panic!("unexpected shapes: {other:?}"),
        }
    }
}

#[test]
fn undefined_and_symbol_become_the_sentinel() {
    let node = serialize(&RemoteValue::Undefined).unwrap();
    assert_eq!(node.v, Some(Sentinel::Undefined));

    let node = serialize(&RemoteValue::Symbol(Some("desc".into()))).unwrap();
    assert_eq!(node.v, Some(Sentinel::Undefined));
    assert!(matches!(parse(&node).unwrap(), RemoteValue::Undefined));
}

#[test]
fn null_payload_survives_the_text_layer() {
    let node = serialize(&RemoteValue::Null).unwrap();
    let text = serde_json::to_string(&node).unwrap();
    assert!(text.contains("\"n\":null"), "{text}");
    let back: SerializedValue = serde_json::from_str(&text).unwrap();
    assert_eq!(back.n, Some(serde_json::Value::Null));
    assert!(!back.is_backref());
}

#[test]
fn timestamps_roundtrip() {
    let at = Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 11).unwrap();
    let back = roundtrip(&RemoteValue::Date(at));
    match back {
        RemoteValue::Date(out) => assert_eq!(out, at),
        other => panic!("expected date, got {other:?}"),
    }
}

#[test]
fn cyclic_graph_closes_on_itself() {
    // x = [1, ['deep', {deeper: []}]]; x.push(x)
    let x = Arc::new(parking_lot::Mutex::new(vec![
        RemoteValue::Number(1.0),
        RemoteValue::array(vec![
            RemoteValue::String("deep".into()),
            RemoteValue::object(vec![("deeper".into(), RemoteValue::array(vec![]))]),
        ]),
    ]));
    x.lock().push(RemoteValue::Array(Arc::clone(&x)));
    let value = RemoteValue::Array(x);

    let back = roundtrip(&value);
    let RemoteValue::Array(outer) = &back else {
        panic!("expected array");
    };
    let items = outer.lock().clone();
    assert_eq!(items.len(), 3);
    // The 3rd element is the outer array itself.
    match &items[2] {
        RemoteValue::Array(inner) => assert!(Arc::ptr_eq(outer, inner)),
        other => panic!("expected self-reference, got {other:?}"),
    }
    assert!(structural_eq(&value, &back));
}

#[test]
fn shared_subtree_keeps_identity() {
    let shared = RemoteValue::object(vec![("k".into(), RemoteValue::Number(7.0))]);
    let value = RemoteValue::array(vec![shared.clone(), shared]);

    let node = serialize(&value).unwrap();
    let items = node.a.as_ref().unwrap();
    assert!(!items[0].is_backref());
    assert!(items[1].is_backref());
    assert_eq!(items[1].i, items[0].i);

    let back = parse(&node).unwrap();
    let RemoteValue::Array(cell) = back else {
        panic!("expected array");
    };
    let items = cell.lock().clone();
    match (&items[0], &items[1]) {
        (RemoteValue::Object(a), RemoteValue::Object(b)) => assert!(Arc::ptr_eq(a, b)),
        other => panic!("expected shared objects, got {other:?}"),
    }
}

#[test]
fn repeated_equal_primitives_backreference() {
    let value = RemoteValue::array(vec![RemoteValue::Number(1.0), RemoteValue::Number(1.0)]);
    let node = serialize(&value).unwrap();
    let items = node.a.as_ref().unwrap();
    assert!(items[1].is_backref());
    assert!(structural_eq(&value, &parse(&node).unwrap()));
}

#[test]
fn positions_are_preorder() {
    let value = RemoteValue::array(vec![
        RemoteValue::String("a".into()),
        RemoteValue::array(vec![RemoteValue::String("b".into())]),
        RemoteValue::String("c".into()),
    ]);
    let node = serialize(&value).unwrap();
    assert_eq!(node.i, 0);
    let items = node.a.as_ref().unwrap();
    assert_eq!(items[0].i, 1);
    assert_eq!(items[1].i, 2);
    assert_eq!(items[1].a.as_ref().unwrap()[0].i, 3);
    assert_eq!(items[2].i, 4);
}

#[test]
fn errors_roundtrip_with_cause_chain() {
    let inner = RemoteError::new("TypeError", "inner").with_stack("at x:1:2");
    let outer = RemoteError::new("Error", "outer")
        .with_cause(RemoteValue::error(inner))
        .with_stack("at y:3:4");
    let value = RemoteValue::error(outer);

    let back = roundtrip(&value);
    assert!(structural_eq(&value, &back));
    let RemoteValue::Error(cell) = back else {
        panic!("expected error");
    };
    let err = cell.lock().clone();
    assert_eq!(err.name, "Error");
    assert_eq!(err.message, "outer");
    assert_eq!(err.stack.as_deref(), Some("at y:3:4"));
    match err.cause {
        RemoteValue::Error(inner) => {
            assert_eq!(inner.lock().name, "TypeError");
        }
        other => panic!("expected error cause, got {other:?}"),
    }
}

#[test]
fn absent_cause_is_emitted_as_undefined() {
    let node = serialize(&RemoteValue::error(RemoteError::new("Error", "boom"))).unwrap();
    let err = node.e.as_ref().unwrap();
    let cause = err.c.as_ref().unwrap();
    assert_eq!(cause.v, Some(Sentinel::Undefined));
}

#[test]
fn functions_are_unencodable() {
    let err = serialize(&RemoteValue::Function("() => {}".into())).unwrap_err();
    assert!(err.to_string().contains("Unexpected value"));
}

#[test]
fn fallback_substitutes_in_place() {
    let value = RemoteValue::array(vec![
        RemoteValue::Number(1.0),
        RemoteValue::Function("() => {}".into()),
        RemoteValue::Number(3.0),
    ]);
    let node = serialize_with_fallback(&value, &RemoteValue::Null).unwrap();
    let back = parse(&node).unwrap();
    let expected = RemoteValue::array(vec![
        RemoteValue::Number(1.0),
        RemoteValue::Null,
        RemoteValue::Number(3.0),
    ]);
    assert!(structural_eq(&expected, &back));
}

#[test]
fn function_fallback_still_fails() {
    let result = serialize_with_fallback(
        &RemoteValue::Function("() => {}".into()),
        &RemoteValue::Function("() => 1".into()),
    );
    assert!(result.is_err());
}

#[test]
fn backref_to_unvisited_node_is_rejected() {
    let node = SerializedValue {
        a: Some(vec![SerializedValue::backref(9)]),
        ..SerializedValue::backref(0)
    };
    assert!(matches!(
        parse(&node),
        Err(ParseError::BadBackref { index: 9 })
    ));
}

// -- Property tests -----------------------------------------------------------

fn leaf() -> impl Strategy<Value = RemoteValue> {
    prop_oneof![
        Just(RemoteValue::Undefined),
        Just(RemoteValue::Null),
        any::<bool>().prop_map(RemoteValue::Bool),
        any::<f64>().prop_map(RemoteValue::Number),
        "[a-z]{0,12}".prop_map(RemoteValue::String),
        "[0-9]{1,30}".prop_map(RemoteValue::BigInt),
    ]
}

fn value_tree() -> impl Strategy<Value = RemoteValue> {
    leaf().prop_recursive(4, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(RemoteValue::array),
            prop::collection::vec(("[a-z]{1,6}", inner), 0..6)
                .prop_map(RemoteValue::object),
        ]
    })
}

proptest! {
    #[test]
    fn any_tree_roundtrips(value in value_tree()) {
        let node = serialize(&value).unwrap();
        let text = serde_json::to_string(&node).unwrap();
        let back: SerializedValue = serde_json::from_str(&text).unwrap();
        let out = parse(&back).unwrap();
        prop_assert!(structural_eq(&value, &out));
    }
}
