// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Route host: universal interception, bypass escape hatch, parked routes.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use inpagewire::msg::{
    bypass_header, BridgeMessage, HeaderEntry, RouteActionKind, RouteActionMsg, RouteMessage,
    RouteRequestMeta,
};

use crate::engine::{ContinuePayload, FulfillPayload, RouteOp};
use crate::host::SessionState;

/// Parked intercepted requests. Slot allocation is append-only for the
/// session; a taken slot stays empty.
pub struct RouteList {
    slots: Vec<Option<Box<dyn RouteOp>>>,
}

impl RouteList {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn park(&mut self, op: Box<dyn RouteOp>) -> u64 {
        self.slots.push(Some(op));
        (self.slots.len() - 1) as u64
    }

    pub fn take(&mut self, id: u64) -> Option<Box<dyn RouteOp>> {
        self.slots.get_mut(id as usize).and_then(Option::take)
    }

    /// Drop every parked route. Used on toggle-off and bridge disconnect.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn parked(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

impl Default for RouteList {
    fn default() -> Self {
        Self::new()
    }
}

/// Attach the universal interceptor and start forwarding.
pub async fn attach(state: &Arc<SessionState>) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::channel(16);
    state.context.set_interceptor(Some(tx)).await?;
    let state = Arc::clone(state);
    tokio::spawn(async move {
        while let Some(op) = rx.recv().await {
            let state = Arc::clone(&state);
            tokio::spawn(async move { intercepted(state, op).await });
        }
    });
    Ok(())
}

/// Detach the interceptor and drop parked routes.
pub async fn detach(state: &Arc<SessionState>) -> anyhow::Result<()> {
    state.context.set_interceptor(None).await?;
    state.routes.lock().clear();
    Ok(())
}

async fn intercepted(state: Arc<SessionState>, op: Box<dyn RouteOp>) {
    let marker = bypass_header(&state.uuid);
    let headers = op.headers();

    // The escape hatch: strip the marker and continue without forwarding.
    let bypassed = headers
        .iter()
        .any(|(name, value)| name.eq_ignore_ascii_case(&marker) && value == "true");
    if bypassed {
        let remaining: Vec<(String, String)> = headers
            .into_iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case(&marker))
            .collect();
        let overrides = ContinuePayload {
            headers: Some(remaining),
            ..ContinuePayload::default()
        };
        if let Err(err) = op.continue_with(overrides).await {
            warn!(error = %err, "bypass continue failed");
        }
        return;
    }

    if !state.client_attached() {
        if let Err(err) = op.continue_with(ContinuePayload::default()).await {
            warn!(error = %err, "pass-through continue failed");
        }
        return;
    }

    let body = op.body().filter(|body| !body.is_empty());
    let meta_headers = headers
        .iter()
        .map(|(name, value)| HeaderEntry::new(name.clone(), value.clone()))
        .collect();
    let url = op.url();
    let method = op.method();
    let resource_type = op.resource_type();
    let is_navigation_request = op.is_navigation();

    let id = state.routes.lock().park(op);
    let meta = RouteRequestMeta {
        id,
        url,
        method,
        headers_array: meta_headers,
        resource_type,
        is_navigation_request,
        has_body: body.is_some(),
    };
    debug!(id = meta.id, url = %meta.url, "forwarding intercepted request");
    state
        .send(BridgeMessage::Route(RouteMessage::Request(meta)), body)
        .await;
}

/// Perform a client decision against its parked route and acknowledge it.
pub async fn perform(state: &Arc<SessionState>, action: RouteActionMsg, body: Option<Bytes>) {
    let op = state.routes.lock().take(action.id);
    let error = match op {
        None => {
            warn!(id = action.id, "route action for an unknown or spent id");
            Some(format!("unknown route id {}", action.id))
        }
        Some(op) => match run(op, action.kind, body).await {
            Ok(()) => None,
            Err(err) => {
                warn!(id = action.id, error = %err, "route action failed");
                Some(format!("{err:#}"))
            }
        },
    };
    state
        .send(
            BridgeMessage::Route(RouteMessage::Resolve {
                id: action.id,
                resolve_id: action.resolve_id,
                error,
            }),
            None,
        )
        .await;
}

async fn run(
    op: Box<dyn RouteOp>,
    kind: RouteActionKind,
    body: Option<Bytes>,
) -> anyhow::Result<()> {
    match kind {
        RouteActionKind::Continue(params) => {
            let overrides = ContinuePayload {
                url: params.url,
                method: params.method,
                headers: params.headers.map(to_pairs),
                post_data: body,
            };
            op.continue_with(overrides).await
        }
        RouteActionKind::Abort { error_code } => op.abort(error_code).await,
        RouteActionKind::Fulfill(params) => {
            let (file_body, guessed) = match &params.path {
                Some(path) => {
                    let data = tokio::fs::read(path).await?;
                    (Some(Bytes::from(data)), guess_mime(Path::new(path)))
                }
                None => (None, None),
            };
            let payload = FulfillPayload {
                status: params.status.unwrap_or(200),
                headers: params.headers.map(to_pairs).unwrap_or_default(),
                content_type: params.content_type.or(guessed.map(str::to_owned)),
                body: body.or(file_body).unwrap_or_else(Bytes::new),
            };
            op.fulfill(payload).await
        }
    }
}

fn to_pairs(entries: Vec<HeaderEntry>) -> Vec<(String, String)> {
    entries
        .into_iter()
        .map(|entry| (entry.name, entry.value))
        .collect()
}

fn guess_mime(path: &Path) -> Option<&'static str> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("html") => Some("text/html"),
        Some("js") | Some("mjs") => Some("text/javascript"),
        Some("css") => Some("text/css"),
        Some("json") | Some("map") => Some("application/json"),
        Some("txt") => Some("text/plain"),
        Some("wasm") => Some("application/wasm"),
        Some("svg") => Some("image/svg+xml"),
        Some("png") => Some("image/png"),
        _ => None,
    }
}
