// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The browser-visible API surface: init/done lifecycle, route
//! registration, bypass fetch, and the reserved handles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tracing::{debug, error};

use inpagewire::msg::{bypass_header, CONTEXT_HANDLE_ID, PAGE_HANDLE_ID};

use crate::bridge::Bridge;
use crate::fetch::{FetchRequest, FetchResponse, Fetcher, HttpFetcher};
use crate::handle::Handle;
use crate::matcher::UrlMatcher;
use crate::route::{self, RouteHandlerFn};
use crate::socket::{connect_ws, FrameSink, FrameSource};

/// Where the done signal goes. In a page this dispatches the done event the
/// supervising host's injected script is waiting on.
pub trait DoneSink: Send + Sync {
    fn signal(&self, exit_code: i32);
}

impl<F: Fn(i32) + Send + Sync> DoneSink for F {
    fn signal(&self, exit_code: i32) {
        self(exit_code);
    }
}

type InitCallback = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

pub struct ClientOptions {
    /// Bridge endpoint, e.g. `ws://127.0.0.1:4000/__inpage__`.
    pub ws_url: String,
    /// Page origin used to resolve relative patterns and fetches.
    pub base_url: String,
    /// Session UUID from the init event.
    pub session: String,
    pub fetcher: Option<Arc<dyn Fetcher>>,
    pub done_sink: Arc<dyn DoneSink>,
}

struct ClientInner {
    bridge: Bridge,
    fetcher: Arc<dyn Fetcher>,
    done_sink: Arc<dyn DoneSink>,
    init_callbacks: Mutex<Vec<InitCallback>>,
    done_called: AtomicBool,
}

/// The in-page test runtime.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Open the bridge and build the runtime.
    pub async fn connect(opts: ClientOptions) -> anyhow::Result<Self> {
        let (sink, source) = connect_ws(&opts.ws_url, &opts.session).await?;
        Ok(Self::over_socket(sink, source, opts))
    }

    /// Build the runtime over an already-handshaken socket. Used by page
    /// environment adapters and tests.
    pub fn over_socket(
        sink: Box<dyn FrameSink>,
        source: Box<dyn FrameSource>,
        opts: ClientOptions,
    ) -> Self {
        let bridge = Bridge::spawn(sink, source, opts.session, opts.base_url);
        Self {
            inner: Arc::new(ClientInner {
                bridge,
                fetcher: opts
                    .fetcher
                    .unwrap_or_else(|| Arc::new(HttpFetcher::new())),
                done_sink: opts.done_sink,
                init_callbacks: Mutex::new(Vec::new()),
                done_called: AtomicBool::new(false),
            }),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.inner.bridge.inner.base_url
    }

    pub fn session(&self) -> &str {
        &self.inner.bridge.inner.session
    }

    pub fn bridge(&self) -> &Bridge {
        &self.inner.bridge
    }

    /// Proxy to the page (reserved id 1).
    pub fn page_handle(&self) -> Handle {
        Handle::new(Arc::clone(&self.inner.bridge.inner), PAGE_HANDLE_ID)
    }

    /// Proxy to the browsing context (reserved id 0).
    pub fn context_handle(&self) -> Handle {
        Handle::new(Arc::clone(&self.inner.bridge.inner), CONTEXT_HANDLE_ID)
    }

    // -- Lifecycle ------------------------------------------------------------

    /// Register a callback to run after the test imports complete.
    pub fn on_init<F, Fut>(&self, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.inner
            .init_callbacks
            .lock()
            .push(Box::new(move || Box::pin(callback())));
    }

    /// Run the registered init callbacks sequentially. A failure signals
    /// `done(1)` unless done was already called.
    pub async fn run_init(&self) {
        loop {
            let callback = {
                let mut callbacks = self.inner.init_callbacks.lock();
                if callbacks.is_empty() {
                    None
                } else {
                    Some(callbacks.remove(0))
                }
            };
            let Some(callback) = callback else { break };
            if let Err(err) = callback().await {
                error!(error = %err, "init callback failed");
                if !self.inner.done_called.load(Ordering::SeqCst) {
                    self.done(1);
                }
                return;
            }
        }
    }

    /// Signal test termination. The first call wins.
    pub fn done(&self, exit_code: i32) {
        if self.inner.done_called.swap(true, Ordering::SeqCst) {
            debug!(exit_code, "done called more than once");
            return;
        }
        self.inner.done_sink.signal(exit_code);
    }

    pub fn done_called(&self) -> bool {
        self.inner.done_called.load(Ordering::SeqCst)
    }

    // -- Routing --------------------------------------------------------------

    /// Compile a glob matcher against this page's base URL.
    pub fn glob(&self, pattern: &str) -> anyhow::Result<UrlMatcher> {
        UrlMatcher::glob(pattern, self.base_url())
    }

    /// Install a route handler on the browsing context.
    pub async fn context_route(
        &self,
        matcher: UrlMatcher,
        callback: RouteHandlerFn,
        times: Option<u64>,
    ) -> anyhow::Result<()> {
        route::register(&self.inner.bridge.inner, matcher, callback, times).await
    }

    /// Remove route handlers. Without `callback`, every handler for the
    /// matcher goes.
    pub async fn context_unroute(
        &self,
        matcher: &UrlMatcher,
        callback: Option<&RouteHandlerFn>,
    ) -> anyhow::Result<()> {
        route::deregister(&self.inner.bridge.inner, matcher, callback).await
    }

    // -- Fetching -------------------------------------------------------------

    fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_owned()
        } else {
            format!(
                "{}/{}",
                self.base_url().trim_end_matches('/'),
                url.trim_start_matches('/')
            )
        }
    }

    /// Fetch through the page environment (interceptable).
    pub async fn fetch(&self, mut request: FetchRequest) -> anyhow::Result<FetchResponse> {
        request.url = self.resolve_url(&request.url);
        self.inner.fetcher.fetch(request).await
    }

    /// Fetch that no matcher on the context will observe: the bypass marker
    /// makes the host continue it before forwarding.
    pub async fn bypass_fetch(&self, mut request: FetchRequest) -> anyhow::Result<FetchResponse> {
        request.url = self.resolve_url(&request.url);
        let marker = bypass_header(self.session());
        let request = request.with_header(marker, "true");
        self.inner.fetcher.fetch(request).await
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
