// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client half of the bridge: frame loops, correlation, dispatch.
//!
//! One reader task demultiplexes inbound text frames by `(type, id,
//! resolveID)` into pending oneshots and forwards intercepted-request frames
//! to the route dispatcher. One writer task serializes outbound traffic so a
//! text frame and the body frame it announces are never interleaved with
//! other sends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use inpagewire::msg::{
    BridgeMessage, HandleAction, HandleMessage, HandleRequest, HandleResolve, RouteActionKind,
    RouteActionMsg, RouteMessage,
};
use inpagewire::value::RemoteValue;

use crate::route;
use crate::socket::{Frame, FrameSink, FrameSource};

/// A value thrown on the other side of the bridge, carried as an error.
#[derive(Debug)]
pub struct RemoteThrow(pub RemoteValue);

impl std::fmt::Display for RemoteThrow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            RemoteValue::Error(cell) => {
                let err = cell.lock().clone();
                write!(f, "{}: {}", err.name, err.message)
            }
            other => write!(f, "thrown {}", other.kind()),
        }
    }
}

impl std::error::Error for RemoteThrow {}

pub(crate) struct Outbound {
    pub text: String,
    pub body: Option<Bytes>,
}

pub(crate) struct BridgeInner {
    pub session: String,
    pub base_url: String,
    out_tx: mpsc::Sender<Outbound>,
    pending_handles: Mutex<HashMap<(u64, u64), oneshot::Sender<HandleResolve>>>,
    pending_routes: Mutex<HashMap<(u64, u64), oneshot::Sender<Option<String>>>>,
    /// Per-handle monotonically increasing resolve ids.
    handle_seq: Mutex<HashMap<u64, u64>>,
    route_seq: AtomicU64,
    pub refcounts: Mutex<HashMap<u64, usize>>,
    pub routes: route::Registry,
    open: AtomicBool,
    pub shutdown: CancellationToken,
}

/// Handle on the running bridge connection.
#[derive(Clone)]
pub struct Bridge {
    pub(crate) inner: Arc<BridgeInner>,
}

impl Bridge {
    /// Start the frame loops over an already-handshaken socket.
    pub fn spawn(
        sink: Box<dyn FrameSink>,
        source: Box<dyn FrameSource>,
        session: String,
        base_url: String,
    ) -> Self {
        let (out_tx, out_rx) = mpsc::channel::<Outbound>(64);
        let inner = Arc::new(BridgeInner {
            session,
            base_url,
            out_tx,
            pending_handles: Mutex::new(HashMap::new()),
            pending_routes: Mutex::new(HashMap::new()),
            handle_seq: Mutex::new(HashMap::new()),
            route_seq: AtomicU64::new(0),
            refcounts: Mutex::new(HashMap::new()),
            routes: route::Registry::new(),
            open: AtomicBool::new(true),
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(write_loop(out_rx, sink));
        tokio::spawn(read_loop(Arc::clone(&inner), source));

        Self { inner }
    }

    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst)
    }

    /// Resolves when the connection has gone away.
    pub async fn closed(&self) {
        self.inner.shutdown.cancelled().await;
    }
}

async fn write_loop(mut out_rx: mpsc::Receiver<Outbound>, mut sink: Box<dyn FrameSink>) {
    while let Some(outbound) = out_rx.recv().await {
        if sink.send(Frame::Text(outbound.text)).await.is_err() {
            break;
        }
        if let Some(body) = outbound.body {
            if sink.send(Frame::Binary(body)).await.is_err() {
                break;
            }
        }
    }
    sink.close().await.ok();
}

async fn read_loop(inner: Arc<BridgeInner>, mut source: Box<dyn FrameSource>) {
    loop {
        let frame = match source.next().await {
            Some(frame) => frame,
            None => break,
        };
        let text = match frame {
            Frame::Text(text) => text,
            Frame::Binary(_) => {
                warn!("unannounced binary frame on the bridge");
                continue;
            }
        };
        let msg = match BridgeMessage::from_text(&text) {
            Ok(msg) => msg,
            Err(err) => {
                warn!(error = %err, "unparsable bridge message");
                continue;
            }
        };
        let body = if msg.announces_body() {
            match source.next().await {
                Some(Frame::Binary(body)) => Some(body),
                Some(Frame::Text(_)) => {
                    warn!("text frame where a body frame was announced");
                    continue;
                }
                None => break,
            }
        } else {
            None
        };
        dispatch(&inner, msg, body);
    }

    inner.open.store(false, Ordering::SeqCst);
    // Outstanding calls are abandoned with the page; dropping the senders
    // wakes every awaiting future with a closed-bridge error.
    inner.pending_handles.lock().clear();
    inner.pending_routes.lock().clear();
    inner.shutdown.cancel();
}

fn dispatch(inner: &Arc<BridgeInner>, msg: BridgeMessage, body: Option<Bytes>) {
    match msg {
        BridgeMessage::Handle(HandleMessage::Resolve(res)) => {
            let waiter = inner
                .pending_handles
                .lock()
                .remove(&(res.id, res.resolve_id));
            match waiter {
                Some(tx) => {
                    tx.send(res).ok();
                }
                // Fire-and-forget disposes are acknowledged with nothing
                // waiting; anything else is a correlation violation.
                None => debug!(id = res.id, "handle resolve without a waiter"),
            }
        }
        BridgeMessage::Route(RouteMessage::Resolve {
            id,
            resolve_id,
            error,
        }) => {
            let waiter = inner.pending_routes.lock().remove(&(id, resolve_id));
            match waiter {
                Some(tx) => {
                    tx.send(error).ok();
                }
                None => warn!(id, resolve_id, "route resolve without a waiter"),
            }
        }
        BridgeMessage::Route(RouteMessage::Request(meta)) => {
            let inner = Arc::clone(inner);
            tokio::spawn(route::dispatch(inner, meta, body));
        }
        other => warn!(message = %other, "unexpected message on the client side"),
    }
}

impl BridgeInner {
    fn next_handle_resolve_id(&self, id: u64) -> u64 {
        let mut seq = self.handle_seq.lock();
        let counter = seq.entry(id).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Send a handle action and await the host's resolve.
    pub(crate) async fn handle_request(
        &self,
        id: u64,
        action: HandleAction,
    ) -> anyhow::Result<HandleResolve> {
        let resolve_id = self.next_handle_resolve_id(id);
        let msg = BridgeMessage::Handle(HandleMessage::Request(HandleRequest {
            id,
            resolve_id,
            action,
        }));
        let (tx, rx) = oneshot::channel();
        self.pending_handles.lock().insert((id, resolve_id), tx);
        let sent = self
            .out_tx
            .send(Outbound {
                text: msg.to_text().context("encode handle request")?,
                body: None,
            })
            .await;
        if sent.is_err() {
            self.pending_handles.lock().remove(&(id, resolve_id));
            anyhow::bail!("bridge is closed");
        }
        rx.await.map_err(|_| anyhow::anyhow!("bridge is closed"))
    }

    /// Best-effort dispose used by the finalization path. A closed channel
    /// simply drops the notification.
    pub(crate) fn fire_dispose(&self, id: u64) {
        if !self.open.load(Ordering::SeqCst) {
            return;
        }
        let resolve_id = self.next_handle_resolve_id(id);
        let msg = BridgeMessage::Handle(HandleMessage::Request(HandleRequest {
            id,
            resolve_id,
            action: HandleAction::Dispose,
        }));
        if let Ok(text) = msg.to_text() {
            self.out_tx.try_send(Outbound { text, body: None }).ok();
        }
    }

    /// Send a route action for route `id` and await the host's resolve.
    pub(crate) async fn route_action(
        &self,
        id: u64,
        kind: RouteActionKind,
        body: Option<Bytes>,
    ) -> anyhow::Result<()> {
        let resolve_id = self.route_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let msg = BridgeMessage::Route(RouteMessage::Action(RouteActionMsg {
            id,
            resolve_id,
            kind,
        }));
        let (tx, rx) = oneshot::channel();
        self.pending_routes.lock().insert((id, resolve_id), tx);
        let sent = self
            .out_tx
            .send(Outbound {
                text: msg.to_text().context("encode route action")?,
                body,
            })
            .await;
        if sent.is_err() {
            self.pending_routes.lock().remove(&(id, resolve_id));
            anyhow::bail!("bridge is closed");
        }
        let error = rx.await.map_err(|_| anyhow::anyhow!("bridge is closed"))?;
        match error {
            None => Ok(()),
            Some(detail) => Err(anyhow::anyhow!("route action failed: {detail}")),
        }
    }

    /// Send an interception toggle and await its acknowledgment. Toggles are
    /// correlated on the reserved route id 0.
    pub(crate) async fn toggle(&self, enabled: bool) -> anyhow::Result<()> {
        let resolve_id = self.route_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let msg = BridgeMessage::Route(RouteMessage::Toggle {
            enabled,
            resolve_id,
        });
        let (tx, rx) = oneshot::channel();
        self.pending_routes.lock().insert((0, resolve_id), tx);
        let sent = self
            .out_tx
            .send(Outbound {
                text: msg.to_text().context("encode toggle")?,
                body: None,
            })
            .await;
        if sent.is_err() {
            self.pending_routes.lock().remove(&(0, resolve_id));
            anyhow::bail!("bridge is closed");
        }
        let error = rx.await.map_err(|_| anyhow::anyhow!("bridge is closed"))?;
        match error {
            None => Ok(()),
            Some(detail) => Err(anyhow::anyhow!("toggle failed: {detail}")),
        }
    }

    pub(crate) fn retain_handle(&self, id: u64) {
        *self.refcounts.lock().entry(id).or_insert(0) += 1;
    }

    /// Drop one reference to `id`; returns true when it was the last one.
    pub(crate) fn release_handle(&self, id: u64) -> bool {
        let mut counts = self.refcounts.lock();
        match counts.get_mut(&id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                counts.remove(&id);
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
