// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host half of the bridge: per-session state and dispatch.
//!
//! A session is one page lifetime. The target vector and the route list are
//! both owned here and mutated only through the session's message handling;
//! handle evaluations run on spawned tasks but re-enter through the state
//! locks.

pub mod handles;
pub mod objects;
pub mod routes;
pub mod targets;
pub mod ws;

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use inpagewire::msg::BridgeMessage;

use crate::engine::{BrowserContext, Page};
use crate::expr::EvalValue;

pub(crate) struct Outbound {
    pub text: String,
    pub body: Option<Bytes>,
}

pub struct SessionState {
    pub uuid: String,
    pub context: Arc<dyn BrowserContext>,
    pub page: Arc<dyn Page>,
    pub targets: Mutex<targets::TargetList>,
    pub routes: Mutex<routes::RouteList>,
    out_tx: Mutex<Option<mpsc::Sender<Outbound>>>,
    /// Bumped on every successful bridge handshake. The runner compares
    /// epochs so a rerun is only observed after the client actually
    /// reconnected.
    connections: watch::Sender<u64>,
}

impl SessionState {
    pub fn new(
        uuid: String,
        context: Arc<dyn BrowserContext>,
        page: Arc<dyn Page>,
    ) -> Arc<Self> {
        let context_object = EvalValue::Object(Arc::new(objects::ContextObject::new(
            Arc::clone(&context),
        )));
        let page_object = EvalValue::Object(Arc::new(objects::PageObject::new(Arc::clone(&page))));
        let (connections, _) = watch::channel(0);
        Arc::new(Self {
            uuid,
            context,
            page,
            targets: Mutex::new(targets::TargetList::new(context_object, page_object)),
            routes: Mutex::new(routes::RouteList::new()),
            out_tx: Mutex::new(None),
            connections,
        })
    }

    pub fn client_attached(&self) -> bool {
        self.out_tx.lock().is_some()
    }

    pub fn connection_epoch(&self) -> u64 {
        *self.connections.borrow()
    }

    pub fn subscribe_connections(&self) -> watch::Receiver<u64> {
        self.connections.subscribe()
    }

    fn client_connected(&self, out_tx: mpsc::Sender<Outbound>) {
        *self.out_tx.lock() = Some(out_tx);
        self.connections.send_modify(|epoch| *epoch += 1);
    }

    fn client_gone(&self) {
        *self.out_tx.lock() = None;
    }

    /// Queue a message (and its body frame) toward the attached client.
    pub(crate) async fn send(&self, msg: BridgeMessage, body: Option<Bytes>) {
        let tx = self.out_tx.lock().clone();
        let Some(tx) = tx else {
            debug!(message = %msg, "no client attached; dropping message");
            return;
        };
        let text = match msg.to_text() {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "unencodable outbound message");
                return;
            }
        };
        tx.send(Outbound { text, body }).await.ok();
    }
}
