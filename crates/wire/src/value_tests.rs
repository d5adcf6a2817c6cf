// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use super::*;

#[test]
fn same_value_treats_nan_as_equal() {
    let a = RemoteValue::Number(f64::NAN);
    let b = RemoteValue::Number(f64::NAN);
    assert!(a.same_value(&b));
}

#[test]
fn same_value_distinguishes_signed_zero() {
    let pos = RemoteValue::Number(0.0);
    let neg = RemoteValue::Number(-0.0);
    assert!(!pos.same_value(&neg));
    assert!(pos.same_value(&RemoteValue::Number(0.0)));
}

#[test]
fn containers_compare_by_identity() {
    let a = RemoteValue::array(vec![RemoteValue::Number(1.0)]);
    let b = RemoteValue::array(vec![RemoteValue::Number(1.0)]);
    assert!(!a.same_value(&b));
    assert!(a.same_value(&a.clone()));
}

#[test]
fn structural_eq_compares_by_shape() {
    let a = RemoteValue::object(vec![
        ("x".into(), RemoteValue::Number(1.0)),
        ("y".into(), RemoteValue::array(vec![RemoteValue::Bool(true)])),
    ]);
    let b = RemoteValue::object(vec![
        ("x".into(), RemoteValue::Number(1.0)),
        ("y".into(), RemoteValue::array(vec![RemoteValue::Bool(true)])),
    ]);
    assert!(structural_eq(&a, &b));

    let c = RemoteValue::object(vec![("x".into(), RemoteValue::Number(2.0))]);
    assert!(!structural_eq(&a, &c));
}

#[test]
fn structural_eq_terminates_on_cycles() {
    let make_cycle = || {
        let cell = Arc::new(parking_lot::Mutex::new(vec![RemoteValue::Number(1.0)]));
        cell.lock().push(RemoteValue::Array(Arc::clone(&cell)));
        RemoteValue::Array(cell)
    };
    assert!(structural_eq(&make_cycle(), &make_cycle()));
}

#[yare::parameterized(
    undefined = { RemoteValue::Undefined, false },
    null = { RemoteValue::Null, false },
    zero = { RemoteValue::Number(0.0), false },
    nan = { RemoteValue::Number(f64::NAN), false },
    empty = { RemoteValue::String(String::new()), false },
    word = { RemoteValue::String("x".into()), true },
    one = { RemoteValue::Number(1.0), true },
    object = { RemoteValue::object(vec![]), true },
)]
fn truthiness(value: RemoteValue, expected: bool) {
    assert_eq!(value.truthy(), expected);
}

#[test]
fn kind_names_are_stable() {
    assert_eq!(RemoteValue::Function("f".into()).kind(), "function");
    assert_eq!(RemoteValue::Symbol(None).kind(), "symbol");
    assert_eq!(RemoteValue::Handle(3).kind(), "handle");
}
