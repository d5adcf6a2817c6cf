// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-side route handling: the LIFO handler stack and the per-request
//! state machine.
//!
//! A request forwarded by the host is matched against the stack from the
//! most recently registered handler down. Each handler either takes a
//! terminal action (`continue`, `abort`, `fulfill`) or falls back to the
//! next one; when nobody terminates, the dispatcher issues the inner
//! continue carrying whatever overrides the fallbacks accumulated.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tracing::{debug, warn};

use inpagewire::msg::{
    ContinueParams, FulfillParams, HeaderEntry, RouteActionKind, RouteRequestMeta,
};

use crate::bridge::BridgeInner;
use crate::fetch::FetchResponse;

pub type RouteHandlerFn =
    Arc<dyn Fn(Route) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Wrap an async closure as a route handler.
pub fn handler<F, Fut>(f: F) -> RouteHandlerFn
where
    F: Fn(Route) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |route| Box::pin(f(route)))
}

pub(crate) struct RouteEntry {
    pub matcher: crate::matcher::UrlMatcher,
    pub callback: RouteHandlerFn,
    pub times: Option<u64>,
    pub handled: AtomicU64,
}

impl RouteEntry {
    fn expires_with_next_call(&self) -> bool {
        self.times
            .is_some_and(|times| self.handled.load(Ordering::SeqCst) + 1 >= times)
    }
}

/// The handler stack. Push order is registration order; matching walks it
/// in reverse.
pub(crate) struct Registry {
    entries: Mutex<Vec<Arc<RouteEntry>>>,
    /// Serializes interception toggles so on/off bursts keep their order.
    toggle_lock: tokio::sync::Mutex<()>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            toggle_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Push an entry; returns true when the stack was empty before.
    fn push(&self, entry: Arc<RouteEntry>) -> bool {
        let mut entries = self.entries.lock();
        let was_empty = entries.is_empty();
        entries.push(entry);
        was_empty
    }

    /// Remove one entry by identity; returns true when the stack is now
    /// empty.
    fn remove(&self, entry: &Arc<RouteEntry>) -> bool {
        let mut entries = self.entries.lock();
        entries.retain(|candidate| !Arc::ptr_eq(candidate, entry));
        entries.is_empty()
    }

    fn matching(&self, url: &str) -> Vec<Arc<RouteEntry>> {
        self.entries
            .lock()
            .iter()
            .rev()
            .filter(|entry| entry.matcher.matches(url))
            .cloned()
            .collect()
    }

    fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Register a route handler. Turning the stack non-empty toggles
/// interception on, behind the toggle lock.
pub(crate) async fn register(
    bridge: &Arc<BridgeInner>,
    matcher: crate::matcher::UrlMatcher,
    callback: RouteHandlerFn,
    times: Option<u64>,
) -> anyhow::Result<()> {
    let entry = Arc::new(RouteEntry {
        matcher,
        callback,
        times,
        handled: AtomicU64::new(0),
    });
    let became_nonempty = bridge.routes.push(entry);
    if became_nonempty {
        let _serialize = bridge.routes.toggle_lock.lock().await;
        bridge.toggle(true).await?;
    }
    Ok(())
}

/// Deregister handlers matching `matcher` (and `callback`, when given).
/// Emptying the stack toggles interception off.
pub(crate) async fn deregister(
    bridge: &Arc<BridgeInner>,
    matcher: &crate::matcher::UrlMatcher,
    callback: Option<&RouteHandlerFn>,
) -> anyhow::Result<()> {
    let emptied = {
        let mut entries = bridge.routes.entries.lock();
        let was_empty = entries.is_empty();
        entries.retain(|entry| {
            let matcher_hit = entry.matcher.same(matcher);
            let callback_hit = callback.is_none_or(|cb| Arc::ptr_eq(&entry.callback, cb));
            !(matcher_hit && callback_hit)
        });
        !was_empty && entries.is_empty()
    };
    if emptied {
        let _serialize = bridge.routes.toggle_lock.lock().await;
        bridge.toggle(false).await?;
    }
    Ok(())
}

// -- Per-request state --------------------------------------------------------

#[derive(Default)]
struct Overrides {
    url: Option<String>,
    method: Option<String>,
    headers: Option<Vec<HeaderEntry>>,
    post_data: Option<Bytes>,
}

pub(crate) struct RouteShared {
    meta: RouteRequestMeta,
    body: Option<Bytes>,
    /// Set by the one terminal transition this request gets.
    terminal: Mutex<bool>,
    overrides: Mutex<Overrides>,
}

impl RouteShared {
    fn is_terminal(&self) -> bool {
        *self.terminal.lock()
    }
}

/// Overrides a handler passes to `fallback` or `continue`.
#[derive(Debug, Clone, Default)]
pub struct ContinueOverrides {
    pub url: Option<String>,
    pub method: Option<String>,
    pub headers: Option<Vec<(String, String)>>,
    pub post_data: Option<Bytes>,
}

/// What to fulfill an intercepted request with.
#[derive(Debug, Clone, Default)]
pub struct FulfillOpts {
    pub status: Option<u16>,
    pub headers: Option<Vec<(String, String)>>,
    pub content_type: Option<String>,
    pub body: Option<Bytes>,
    /// Host-side file to serve instead of `body`.
    pub path: Option<String>,
}

impl FulfillOpts {
    pub fn body_text(text: &str) -> Self {
        Self {
            body: Some(Bytes::copy_from_slice(text.as_bytes())),
            ..Self::default()
        }
    }

    /// Fulfill with a fetched response, decomposed client-side.
    pub fn from_response(response: &FetchResponse) -> Self {
        Self {
            status: Some(response.status),
            headers: Some(response.headers.clone()),
            body: Some(response.body.clone()),
            ..Self::default()
        }
    }
}

/// A forwarded request's view with the accumulated overrides applied.
#[derive(Debug, Clone)]
pub struct RouteView {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub post_data: Option<Bytes>,
    pub resource_type: String,
    pub is_navigation_request: bool,
}

/// The object a route handler decides on. Each handler invocation gets its
/// own `Route`; the underlying request state is shared down the chain.
#[derive(Clone)]
pub struct Route {
    bridge: Arc<BridgeInner>,
    shared: Arc<RouteShared>,
    /// This handler already decided (terminal or fallback).
    acted: Arc<AtomicBool>,
    fell_back: Arc<AtomicBool>,
}

impl Route {
    fn for_handler(bridge: &Arc<BridgeInner>, shared: &Arc<RouteShared>) -> Self {
        Self {
            bridge: Arc::clone(bridge),
            shared: Arc::clone(shared),
            acted: Arc::new(AtomicBool::new(false)),
            fell_back: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The request as the next action would forward it.
    pub fn request(&self) -> RouteView {
        let overrides = self.shared.overrides.lock();
        let headers = match &overrides.headers {
            Some(entries) => entries
                .iter()
                .map(|entry| (entry.name.clone(), entry.value.clone()))
                .collect(),
            None => self
                .shared
                .meta
                .headers_array
                .iter()
                .map(|entry| (entry.name.clone(), entry.value.clone()))
                .collect(),
        };
        RouteView {
            url: overrides
                .url
                .clone()
                .unwrap_or_else(|| self.shared.meta.url.clone()),
            method: overrides
                .method
                .clone()
                .unwrap_or_else(|| self.shared.meta.method.clone()),
            headers,
            post_data: overrides.post_data.clone().or_else(|| self.shared.body.clone()),
            resource_type: self.shared.meta.resource_type.clone(),
            is_navigation_request: self.shared.meta.is_navigation_request,
        }
    }

    /// Exactly-once check shared by every decision. Rejects synchronously.
    fn begin(&self, terminal: bool) -> anyhow::Result<()> {
        let mut taken = self.shared.terminal.lock();
        if *taken || self.acted.load(Ordering::SeqCst) {
            anyhow::bail!("route is already handled");
        }
        self.acted.store(true, Ordering::SeqCst);
        if terminal {
            *taken = true;
        }
        Ok(())
    }

    fn merge(&self, overrides: ContinueOverrides) {
        let mut acc = self.shared.overrides.lock();
        if let Some(url) = overrides.url {
            acc.url = Some(url);
        }
        if let Some(method) = overrides.method {
            acc.method = Some(method);
        }
        if let Some(headers) = overrides.headers {
            acc.headers = Some(
                headers
                    .into_iter()
                    .map(|(name, value)| HeaderEntry::new(name, value))
                    .collect(),
            );
        }
        if let Some(post_data) = overrides.post_data {
            acc.post_data = Some(post_data);
        }
    }

    /// Merge overrides and pass control to the next matching handler.
    pub fn fallback(&self, overrides: ContinueOverrides) -> anyhow::Result<()> {
        self.begin(false)?;
        self.fell_back.store(true, Ordering::SeqCst);
        self.merge(overrides);
        Ok(())
    }

    /// Terminally continue the request toward the network.
    pub async fn continue_with(&self, overrides: ContinueOverrides) -> anyhow::Result<()> {
        self.begin(true)?;
        self.merge(overrides);
        let (params, body) = self.continue_payload();
        self.bridge
            .route_action(self.shared.meta.id, RouteActionKind::Continue(params), body)
            .await
    }

    /// Terminally abort the request.
    pub async fn abort(&self, error_code: Option<&str>) -> anyhow::Result<()> {
        self.begin(true)?;
        self.bridge
            .route_action(
                self.shared.meta.id,
                RouteActionKind::Abort {
                    error_code: error_code.map(str::to_owned),
                },
                None,
            )
            .await
    }

    /// Terminally fulfill the request. Resolves only after the host has
    /// performed the action.
    pub async fn fulfill(&self, opts: FulfillOpts) -> anyhow::Result<()> {
        self.begin(true)?;
        let body = opts.body.filter(|body| !body.is_empty());
        let params = FulfillParams {
            status: opts.status,
            headers: opts.headers.map(|headers| {
                headers
                    .into_iter()
                    .map(|(name, value)| HeaderEntry::new(name, value))
                    .collect()
            }),
            content_type: opts.content_type,
            path: opts.path,
            has_body: body.is_some(),
        };
        self.bridge
            .route_action(self.shared.meta.id, RouteActionKind::Fulfill(params), body)
            .await
    }

    fn continue_payload(&self) -> (ContinueParams, Option<Bytes>) {
        let overrides = self.shared.overrides.lock();
        let body = overrides.post_data.clone().filter(|data| !data.is_empty());
        let params = ContinueParams {
            url: overrides.url.clone(),
            method: overrides.method.clone(),
            headers: overrides.headers.clone(),
            has_post_data: body.is_some(),
        };
        (params, body)
    }
}

/// Walk the matching handlers for one forwarded request.
pub(crate) async fn dispatch(
    bridge: Arc<BridgeInner>,
    meta: RouteRequestMeta,
    body: Option<Bytes>,
) {
    let id = meta.id;
    let matching = bridge.routes.matching(&meta.url);
    let shared = Arc::new(RouteShared {
        meta,
        body,
        terminal: Mutex::new(false),
        overrides: Mutex::new(Overrides::default()),
    });

    // A toggle-off triggered by expiry is deferred past this request's
    // terminal action; flipping it earlier would let the host drop the very
    // route being handled.
    let mut toggle_off_pending = false;
    let mut terminal = false;

    for entry in matching {
        // Expiring handlers leave the stack before they run, so their own
        // failures cannot affect later requests.
        if entry.expires_with_next_call() {
            let emptied = bridge.routes.remove(&entry);
            toggle_off_pending = toggle_off_pending || emptied;
        }
        entry.handled.fetch_add(1, Ordering::SeqCst);

        let route = Route::for_handler(&bridge, &shared);
        if let Err(err) = (entry.callback)(route.clone()).await {
            warn!(error = %err, "route handler failed");
        }
        if shared.is_terminal() {
            terminal = true;
            break;
        }
        if !route.acted.load(Ordering::SeqCst) {
            debug!("route handler returned without deciding; treating as fallback");
        }
    }

    if !terminal {
        // Nobody took the request: the inner continue, with whatever
        // overrides the fallback chain accumulated.
        let placeholder = Route::for_handler(&bridge, &shared);
        let (params, body) = placeholder.continue_payload();
        if let Err(err) = bridge
            .route_action(id, RouteActionKind::Continue(params), body)
            .await
        {
            warn!(error = %err, "inner continue failed");
        }
    }

    if toggle_off_pending && bridge.routes.is_empty() {
        let _serialize = bridge.routes.toggle_lock.lock().await;
        if bridge.routes.is_empty() {
            if let Err(err) = bridge.toggle(false).await {
                warn!(error = %err, "toggle off after handler expiry failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "route_tests.rs"]
mod tests;
