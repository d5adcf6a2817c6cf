// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The closed sum of bridge messages.
//!
//! Text frames carry exactly these shapes, tagged `type: route | handle`.
//! Binary frames are never standalone: a body frame follows a text frame
//! whose shape announces it ([`BridgeMessage::announces_body`]), and both
//! transports keep a one-shot expect-body flag per direction.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::serial::SerializedValue;

/// Reserved handle id of the browsing context.
pub const CONTEXT_HANDLE_ID: u64 = 0;
/// Reserved handle id of the page.
pub const PAGE_HANDLE_ID: u64 = 1;

/// Sub-protocol negotiated on the bridge WebSocket.
pub const BRIDGE_SUBPROTOCOL: &str = "route";
/// URL path of the bridge upgrade endpoint on the bundle server.
pub const BRIDGE_PATH: &str = "/__inpage__";

/// Name of the header that lets in-page code fetch without re-interception.
pub fn bypass_header(session: &str) -> String {
    format!("bypass-{session}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BridgeMessage {
    Route(RouteMessage),
    Handle(HandleMessage),
}

// -- Route messages -----------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum RouteMessage {
    /// Client → host: attach or detach the universal interceptor.
    Toggle {
        enabled: bool,
        #[serde(rename = "resolveID")]
        resolve_id: u64,
    },
    /// Host → client: an intercepted request awaiting a decision.
    Request(RouteRequestMeta),
    /// Client → host: the terminal decision for a parked route.
    Action(RouteActionMsg),
    /// Host → client: acknowledgment of a toggle or an action.
    Resolve {
        id: u64,
        #[serde(rename = "resolveID")]
        resolve_id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    pub name: String,
    pub value: String,
}

impl HeaderEntry {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRequestMeta {
    pub id: u64,
    pub url: String,
    pub method: String,
    pub headers_array: Vec<HeaderEntry>,
    pub resource_type: String,
    pub is_navigation_request: bool,
    pub has_body: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteActionMsg {
    pub id: u64,
    #[serde(rename = "resolveID")]
    pub resolve_id: u64,
    #[serde(flatten)]
    pub kind: RouteActionKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum RouteActionKind {
    Continue(ContinueParams),
    Fulfill(FulfillParams),
    #[serde(rename_all = "camelCase")]
    Abort {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_code: Option<String>,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<HeaderEntry>>,
    /// When set, the next binary frame is the overridden post data.
    #[serde(default)]
    pub has_post_data: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<HeaderEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Host-side file to serve as the body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// When set, the next binary frame is the response body.
    #[serde(default)]
    pub has_body: bool,
}

// -- Handle messages ----------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum HandleMessage {
    /// Client → host: an action against target-vector slot `id`.
    Request(HandleRequest),
    /// Host → client: the action's outcome.
    Resolve(HandleResolve),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandleRequest {
    pub id: u64,
    #[serde(rename = "resolveID")]
    pub resolve_id: u64,
    #[serde(flatten)]
    pub action: HandleAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum HandleAction {
    Evaluate {
        #[serde(rename = "fn")]
        source: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arg: Option<SerializedValue>,
        /// Register the result as a new handle instead of serializing it.
        h: bool,
    },
    JsonValue,
    GetProperties,
    GetProperty {
        name: String,
    },
    Dispose,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandleResolve {
    pub id: u64,
    #[serde(rename = "resolveID")]
    pub resolve_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<HandleResult>,
    /// When set, `result` is a thrown value.
    #[serde(default)]
    pub error: bool,
}

/// Outcome payload of a handle action: a freshly registered handle id as a
/// plain number (`evaluate` with `h`, `get-property`), the `[name, id]`
/// pairs of `get-properties`, or a serialized value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HandleResult {
    Id(u64),
    Properties(Vec<(String, u64)>),
    Value(SerializedValue),
}

// -- Framing ------------------------------------------------------------------

impl BridgeMessage {
    /// Whether the next frame in this message's direction is its body.
    pub fn announces_body(&self) -> bool {
        match self {
            Self::Route(RouteMessage::Request(meta)) => meta.has_body,
            Self::Route(RouteMessage::Action(action)) => match &action.kind {
                RouteActionKind::Continue(params) => params.has_post_data,
                RouteActionKind::Fulfill(params) => params.has_body,
                RouteActionKind::Abort { .. } => false,
            },
            _ => false,
        }
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl fmt::Display for BridgeMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Route(RouteMessage::Toggle { enabled, .. }) => {
                write!(f, "route/toggle({enabled})")
            }
            Self::Route(RouteMessage::Request(meta)) => {
                write!(f, "route/request#{} {}", meta.id, meta.url)
            }
            Self::Route(RouteMessage::Action(action)) => {
                let kind = match action.kind {
                    RouteActionKind::Continue(_) => "continue",
                    RouteActionKind::Fulfill(_) => "fulfill",
                    RouteActionKind::Abort { .. } => "abort",
                };
                write!(f, "route/action#{} {kind}", action.id)
            }
            Self::Route(RouteMessage::Resolve { id, .. }) => write!(f, "route/resolve#{id}"),
            Self::Handle(HandleMessage::Request(req)) => {
                let action = match req.action {
                    HandleAction::Evaluate { .. } => "evaluate",
                    HandleAction::JsonValue => "json-value",
                    HandleAction::GetProperties => "get-properties",
                    HandleAction::GetProperty { .. } => "get-property",
                    HandleAction::Dispose => "dispose",
                };
                write!(f, "handle/request#{} {action}", req.id)
            }
            Self::Handle(HandleMessage::Resolve(res)) => write!(f, "handle/resolve#{}", res.id),
        }
    }
}

#[cfg(test)]
#[path = "msg_tests.rs"]
mod tests;
