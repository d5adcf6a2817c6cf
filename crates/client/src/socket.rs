// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame-level socket abstraction for the bridge.
//!
//! The bridge needs exactly two frame kinds (text and binary) over one
//! duplex connection. [`connect_ws`] provides the tokio-tungstenite
//! implementation used in production; [`memory_pair`] provides an in-process
//! pair for unit tests.

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use inpagewire::msg::BRIDGE_SUBPROTOCOL;

/// One bridge frame. Binary frames are always bodies announced by the
/// preceding text frame.
#[derive(Debug, Clone)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: Frame) -> anyhow::Result<()>;
    async fn close(&mut self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` once the connection is gone.
    async fn next(&mut self) -> Option<Frame>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct WsSink(SplitSink<WsStream, Message>);
struct WsSource(SplitStream<WsStream>);

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: Frame) -> anyhow::Result<()> {
        let msg = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data),
        };
        self.0.send(msg).await.context("send bridge frame")
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.0.send(Message::Close(None)).await.ok();
        Ok(())
    }
}

#[async_trait]
impl FrameSource for WsSource {
    async fn next(&mut self) -> Option<Frame> {
        loop {
            match self.0.next().await? {
                Ok(Message::Text(text)) => return Some(Frame::Text(text.to_string())),
                Ok(Message::Binary(data)) => return Some(Frame::Binary(data)),
                Ok(Message::Close(_)) | Err(_) => return None,
                // Ping/pong are handled by the stream itself.
                Ok(_) => {}
            }
        }
    }
}

/// Open the bridge WebSocket with the `route` sub-protocol and perform the
/// session handshake: the first text frame carries the session UUID.
pub async fn connect_ws(
    ws_url: &str,
    session: &str,
) -> anyhow::Result<(Box<dyn FrameSink>, Box<dyn FrameSource>)> {
    let mut request = ws_url
        .into_client_request()
        .context("build bridge request")?;
    request.headers_mut().insert(
        SEC_WEBSOCKET_PROTOCOL,
        BRIDGE_SUBPROTOCOL.parse().context("sub-protocol header")?,
    );
    let (stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .context("open bridge websocket")?;
    let (sink, source) = stream.split();
    let mut sink = WsSink(sink);
    sink.send(Frame::Text(session.to_owned())).await?;
    Ok((Box::new(sink), Box::new(WsSource(source))))
}

// -- In-memory pair for tests -------------------------------------------------

struct MemorySink(mpsc::Sender<Frame>);
struct MemorySource(mpsc::Receiver<Frame>);

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, frame: Frame) -> anyhow::Result<()> {
        self.0
            .send(frame)
            .await
            .map_err(|_| anyhow::anyhow!("peer closed"))
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn next(&mut self) -> Option<Frame> {
        self.0.recv().await
    }
}

pub type SocketHalf = (Box<dyn FrameSink>, Box<dyn FrameSource>);

/// Two connected frame sockets. Whatever one side sends, the other receives.
pub fn memory_pair() -> (SocketHalf, SocketHalf) {
    let (a_tx, a_rx) = mpsc::channel(64);
    let (b_tx, b_rx) = mpsc::channel(64);
    let left: SocketHalf = (Box::new(MemorySink(a_tx)), Box::new(MemorySource(b_rx)));
    let right: SocketHalf = (Box::new(MemorySink(b_tx)), Box::new(MemorySource(a_rx)));
    (left, right)
}
