// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bridge WebSocket loop on the host.
//!
//! One connection per session. The first text frame is the session UUID
//! handshake; afterwards text frames are bridge messages and binary frames
//! are bodies announced by the preceding text frame.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use inpagewire::msg::{BridgeMessage, HandleMessage, RouteMessage};

use crate::host::{handles, routes, Outbound, SessionState};

pub async fn handle_socket(socket: WebSocket, state: Arc<SessionState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Handshake: the session UUID distinguishes harness traffic.
    match ws_rx.next().await {
        Some(Ok(Message::Text(text))) if text.as_str() == state.uuid => {}
        other => {
            info!("bridge connection without a matching handshake: {other:?}");
            return;
        }
    }

    let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(64);
    state.client_connected(out_tx);
    debug!(epoch = state.connection_epoch(), "bridge client attached");

    let writer = tokio::spawn(async move {
        while let Some(outbound) = out_rx.recv().await {
            if ws_tx
                .send(Message::Text(outbound.text.into()))
                .await
                .is_err()
            {
                break;
            }
            if let Some(body) = outbound.body {
                if ws_tx.send(Message::Binary(body)).await.is_err() {
                    break;
                }
            }
        }
    });

    loop {
        let frame = match ws_rx.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(err)) => {
                debug!(error = %err, "bridge socket error");
                break;
            }
            None => break,
        };
        let text = match frame {
            Message::Text(text) => text.to_string(),
            Message::Binary(_) => {
                warn!("unannounced binary frame from the client");
                continue;
            }
            Message::Close(_) => break,
            _ => continue,
        };
        let msg = match BridgeMessage::from_text(&text) {
            Ok(msg) => msg,
            Err(err) => {
                warn!(error = %err, "unparsable bridge message from the client");
                continue;
            }
        };
        let body = if msg.announces_body() {
            match next_body(&mut ws_rx).await {
                Ok(body) => body,
                Err(gone) => {
                    if gone {
                        break;
                    }
                    continue;
                }
            }
        } else {
            None
        };

        match msg {
            BridgeMessage::Handle(HandleMessage::Request(req)) => {
                // Evaluations may run long and overlap; each reply finds its
                // waiter by (id, resolveID).
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let resolve = handles::perform(&state, req).await;
                    state
                        .send(
                            BridgeMessage::Handle(HandleMessage::Resolve(resolve)),
                            None,
                        )
                        .await;
                });
            }
            BridgeMessage::Route(RouteMessage::Toggle {
                enabled,
                resolve_id,
            }) => {
                // Handled inline so toggle bursts serialize in arrival
                // order.
                let outcome = if enabled {
                    routes::attach(&state).await
                } else {
                    routes::detach(&state).await
                };
                let error = outcome.err().map(|err| format!("{err:#}"));
                state
                    .send(
                        BridgeMessage::Route(RouteMessage::Resolve {
                            id: 0,
                            resolve_id,
                            error,
                        }),
                        None,
                    )
                    .await;
            }
            BridgeMessage::Route(RouteMessage::Action(action)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    routes::perform(&state, action, body).await;
                });
            }
            other => warn!(message = %other, "unexpected message on the host side"),
        }
    }

    // Disconnect: stop forwarding and drop parked routes so nothing leaks.
    state.client_gone();
    if let Err(err) = routes::detach(&state).await {
        debug!(error = %err, "interceptor detach on disconnect failed");
    }
    writer.abort();
    debug!("bridge client detached");
}

/// Read the announced body frame. `Err(true)` means the socket is gone.
async fn next_body<S>(ws_rx: &mut S) -> Result<Option<Bytes>, bool>
where
    S: futures_util::Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        match ws_rx.next().await {
            Some(Ok(Message::Binary(body))) => return Ok(Some(body)),
            Some(Ok(Message::Text(_))) => {
                warn!("text frame where a body frame was announced");
                return Err(false);
            }
            Some(Ok(Message::Close(_))) | None => return Err(true),
            Some(Ok(_)) => continue,
            Some(Err(_)) => return Err(true),
        }
    }
}
