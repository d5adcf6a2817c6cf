// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::serialize;
use crate::value::RemoteValue;

fn reparse(msg: &BridgeMessage) -> BridgeMessage {
    BridgeMessage::from_text(&msg.to_text().unwrap()).unwrap()
}

#[test]
fn route_request_wire_shape() {
    let msg = BridgeMessage::Route(RouteMessage::Request(RouteRequestMeta {
        id: 3,
        url: "http://127.0.0.1:4000/x".into(),
        method: "POST".into(),
        headers_array: vec![HeaderEntry::new("content-type", "text/plain")],
        resource_type: "fetch".into(),
        is_navigation_request: false,
        has_body: true,
    }));
    let json: serde_json::Value = serde_json::from_str(&msg.to_text().unwrap()).unwrap();
    assert_eq!(json["type"], "route");
    assert_eq!(json["op"], "request");
    assert_eq!(json["headersArray"][0]["name"], "content-type");
    assert_eq!(json["isNavigationRequest"], false);
    assert_eq!(json["hasBody"], true);
    assert!(msg.announces_body());

    match reparse(&msg) {
        BridgeMessage::Route(RouteMessage::Request(meta)) => {
            assert_eq!(meta.id, 3);
            assert_eq!(meta.method, "POST");
            assert!(meta.has_body);
        }
        other => panic!("unexpected reparse: {other:?}"),
    }
}

#[test]
fn route_action_fulfill_announces_body() {
    let msg = BridgeMessage::Route(RouteMessage::Action(RouteActionMsg {
        id: 1,
        resolve_id: 7,
        kind: RouteActionKind::Fulfill(FulfillParams {
            status: Some(200),
            content_type: Some("text/plain".into()),
            has_body: true,
            ..FulfillParams::default()
        }),
    }));
    let json: serde_json::Value = serde_json::from_str(&msg.to_text().unwrap()).unwrap();
    assert_eq!(json["action"], "fulfill");
    assert_eq!(json["resolveID"], 7);
    assert!(msg.announces_body());

    match reparse(&msg) {
        BridgeMessage::Route(RouteMessage::Action(action)) => match action.kind {
            RouteActionKind::Fulfill(params) => {
                assert_eq!(params.status, Some(200));
                assert!(params.has_body);
            }
            other => panic!("unexpected kind: {other:?}"),
        },
        other => panic!("unexpected reparse: {other:?}"),
    }
}

#[test]
fn plain_continue_announces_no_body() {
    let msg = BridgeMessage::Route(RouteMessage::Action(RouteActionMsg {
        id: 0,
        resolve_id: 1,
        kind: RouteActionKind::Continue(ContinueParams::default()),
    }));
    assert!(!msg.announces_body());
}

#[test]
fn handle_evaluate_roundtrips() {
    let arg = serialize(&RemoteValue::array(vec![RemoteValue::Number(1.0)])).unwrap();
    let msg = BridgeMessage::Handle(HandleMessage::Request(HandleRequest {
        id: 1,
        resolve_id: 4,
        action: HandleAction::Evaluate {
            source: "(p, v) => v".into(),
            arg: Some(arg),
            h: false,
        },
    }));
    let json: serde_json::Value = serde_json::from_str(&msg.to_text().unwrap()).unwrap();
    assert_eq!(json["type"], "handle");
    assert_eq!(json["op"], "request");
    assert_eq!(json["action"], "evaluate");
    assert_eq!(json["fn"], "(p, v) => v");

    match reparse(&msg) {
        BridgeMessage::Handle(HandleMessage::Request(req)) => match req.action {
            HandleAction::Evaluate { source, arg, h } => {
                assert_eq!(source, "(p, v) => v");
                assert!(arg.is_some());
                assert!(!h);
            }
            other => panic!("unexpected action: {other:?}"),
        },
        other => panic!("unexpected reparse: {other:?}"),
    }
}

#[test]
fn handle_result_shapes_disambiguate() {
    let id: HandleResult = serde_json::from_str("5").unwrap();
    assert!(matches!(id, HandleResult::Id(5)));

    let props: HandleResult = serde_json::from_str(r#"[["p", 2], ["q", 3]]"#).unwrap();
    match props {
        HandleResult::Properties(pairs) => {
            assert_eq!(pairs, vec![("p".to_owned(), 2), ("q".to_owned(), 3)]);
        }
        other => panic!("unexpected result: {other:?}"),
    }

    let value: HandleResult = serde_json::from_str(r#"{"i": 0, "n": 3.0}"#).unwrap();
    assert!(matches!(value, HandleResult::Value(_)));
}

#[test]
fn resolve_error_field_defaults_off() {
    let text = r#"{"type":"handle","op":"resolve","id":1,"resolveID":2,"result":{"i":0,"n":null}}"#;
    match BridgeMessage::from_text(text).unwrap() {
        BridgeMessage::Handle(HandleMessage::Resolve(res)) => {
            assert!(!res.error);
            assert!(matches!(res.result, Some(HandleResult::Value(_))));
        }
        other => panic!("unexpected parse: {other:?}"),
    }
}

#[test]
fn bypass_header_is_session_scoped() {
    assert_eq!(bypass_header("abc"), "bypass-abc");
}
