// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A fully scriptable in-process engine.
//!
//! The stub stands in for a real browser: `goto` fetches the document and
//! then runs the registered page script (the test suite's stand-in for the
//! built entry), fetches travel through the attached interceptor exactly
//! like page traffic would, and `continue` performs a real HTTP request so
//! pass-through genuinely hits the bundle server.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tracing::debug;

use inpagewire::value::{RemoteError, RemoteValue};

use super::{
    Browser, BrowserContext, BrowserKind, ContinuePayload, Engine, FulfillPayload, LaunchOptions,
    Page, RouteOp, RouteSink,
};

/// Marker the stub recognizes as the runner's injected done-wait script.
pub(crate) const DONE_WAIT_MARKER: &str = "addEventListener('done'";

pub type PageScript = Arc<dyn Fn(PageEnv) -> BoxFuture<'static, ()> + Send + Sync>;
pub type EvaluateHook =
    Arc<dyn Fn(String, Option<RemoteValue>, PageEnv) -> BoxFuture<'static, anyhow::Result<RemoteValue>> + Send + Sync>;

/// A window-level signal (`done`, `error`, or anything a test dispatches).
#[derive(Debug, Clone)]
pub struct StubSignal {
    pub name: String,
    pub detail: RemoteValue,
}

struct StubShared {
    version: String,
    page_script: Mutex<Option<PageScript>>,
    evaluate_hook: Mutex<Option<EvaluateHook>>,
    interceptor: Mutex<Option<RouteSink>>,
    /// Signals recorded since the last navigation. Recorded-then-notified,
    /// so a waiter arriving late still observes them.
    signals: Mutex<Vec<StubSignal>>,
    notify: Notify,
    http: reqwest::Client,
    goto_count: AtomicU64,
}

impl StubShared {
    fn dispatch(&self, name: &str, detail: RemoteValue) {
        self.signals.lock().push(StubSignal {
            name: name.to_owned(),
            detail,
        });
        self.notify.notify_waiters();
    }

    async fn wait_done(&self) -> RemoteValue {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before scanning so a signal landing in between still
            // wakes this waiter.
            notified.as_mut().enable();
            if let Some(outcome) = self.scan_outcome() {
                return outcome;
            }
            notified.await;
        }
    }

    fn scan_outcome(&self) -> Option<RemoteValue> {
        let signals = self.signals.lock();
        for signal in signals.iter() {
            match signal.name.as_str() {
                "done" => return Some(signal.detail.clone()),
                "error" => {
                    let mut props = vec![("code".to_owned(), RemoteValue::Number(1.0))];
                    if let RemoteValue::String(stack) = &signal.detail {
                        props.push(("stack".to_owned(), RemoteValue::String(stack.clone())));
                    }
                    return Some(RemoteValue::object(props));
                }
                _ => {}
            }
        }
        None
    }
}

/// What the page script sees: its window. Fetches travel through the
/// attached interceptor; dispatching signals is how `done` and test events
/// reach the supervising host.
#[derive(Clone)]
pub struct PageEnv {
    shared: Arc<StubShared>,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct PageFetch {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub navigation: bool,
}

impl PageFetch {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_owned(),
            headers: Vec::new(),
            body: None,
            navigation: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl PageResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl PageEnv {
    /// Dispatch a window signal by name.
    pub fn dispatch(&self, name: &str, detail: RemoteValue) {
        self.shared.dispatch(name, detail);
    }

    pub fn done(&self, exit_code: i32) {
        self.dispatch("done", RemoteValue::Number(f64::from(exit_code)));
    }

    pub fn page_error(&self, stack: &str) {
        self.dispatch("error", RemoteValue::String(stack.to_owned()));
    }

    /// Signals recorded since the last navigation.
    pub fn recorded(&self) -> Vec<StubSignal> {
        self.shared.signals.lock().clone()
    }

    fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_owned()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                url.trim_start_matches('/')
            )
        }
    }

    /// Fetch as the page would: interceptable when interception is on.
    pub async fn fetch(&self, mut request: PageFetch) -> anyhow::Result<PageResponse> {
        request.url = self.resolve(&request.url);
        let interceptor = self.shared.interceptor.lock().clone();
        match interceptor {
            Some(sink) => {
                let (reply_tx, reply_rx) = oneshot::channel();
                let op = StubRouteOp {
                    request: request.clone(),
                    http: self.shared.http.clone(),
                    reply: Mutex::new(Some(reply_tx)),
                };
                if sink.send(Box::new(op)).await.is_err() {
                    // Interceptor detached mid-flight; fall through to the
                    // network.
                    return direct_fetch(&self.shared.http, &request).await;
                }
                reply_rx
                    .await
                    .map_err(|_| anyhow::anyhow!("intercepted request dropped"))?
            }
            None => direct_fetch(&self.shared.http, &request).await,
        }
    }
}

async fn direct_fetch(
    http: &reqwest::Client,
    request: &PageFetch,
) -> anyhow::Result<PageResponse> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())?;
    let mut builder = http.request(method, &request.url);
    for (name, value) in &request.headers {
        builder = builder.header(
            reqwest::header::HeaderName::from_bytes(name.as_bytes())?,
            reqwest::header::HeaderValue::from_str(value)?,
        );
    }
    if let Some(body) = &request.body {
        builder = builder.body(body.clone());
    }
    let response = builder.send().await?;
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_owned(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    let body = response.bytes().await?;
    Ok(PageResponse {
        status,
        headers,
        body,
    })
}

struct StubRouteOp {
    request: PageFetch,
    http: reqwest::Client,
    reply: Mutex<Option<oneshot::Sender<anyhow::Result<PageResponse>>>>,
}

impl StubRouteOp {
    fn reply(&self, outcome: anyhow::Result<PageResponse>) {
        if let Some(tx) = self.reply.lock().take() {
            tx.send(outcome).ok();
        }
    }
}

#[async_trait]
impl RouteOp for StubRouteOp {
    fn url(&self) -> String {
        self.request.url.clone()
    }

    fn method(&self) -> String {
        self.request.method.clone()
    }

    fn headers(&self) -> Vec<(String, String)> {
        self.request.headers.clone()
    }

    fn resource_type(&self) -> String {
        if self.request.navigation {
            "document".to_owned()
        } else {
            "fetch".to_owned()
        }
    }

    fn is_navigation(&self) -> bool {
        self.request.navigation
    }

    fn body(&self) -> Option<Bytes> {
        self.request.body.clone()
    }

    async fn fulfill(&self, payload: FulfillPayload) -> anyhow::Result<()> {
        let mut headers = payload.headers;
        if let Some(content_type) = payload.content_type {
            headers.push(("content-type".to_owned(), content_type));
        }
        self.reply(Ok(PageResponse {
            status: payload.status,
            headers,
            body: payload.body,
        }));
        Ok(())
    }

    async fn continue_with(&self, overrides: ContinuePayload) -> anyhow::Result<()> {
        let request = PageFetch {
            url: overrides.url.unwrap_or_else(|| self.request.url.clone()),
            method: overrides
                .method
                .unwrap_or_else(|| self.request.method.clone()),
            headers: overrides
                .headers
                .unwrap_or_else(|| self.request.headers.clone()),
            body: overrides.post_data.or_else(|| self.request.body.clone()),
            navigation: self.request.navigation,
        };
        let outcome = direct_fetch(&self.http, &request).await;
        self.reply(outcome);
        Ok(())
    }

    async fn abort(&self, error_code: Option<String>) -> anyhow::Result<()> {
        let code = error_code.unwrap_or_else(|| "failed".to_owned());
        self.reply(Err(anyhow::anyhow!("request aborted: {code}")));
        Ok(())
    }
}

// -- Engine family ------------------------------------------------------------

#[derive(Clone)]
pub struct StubEngine {
    shared: Arc<StubShared>,
    kind: BrowserKind,
}

impl StubEngine {
    pub fn new() -> Self {
        Self::with_kind(BrowserKind::Chromium)
    }

    pub fn with_kind(kind: BrowserKind) -> Self {
        Self {
            shared: Arc::new(StubShared {
                version: format!("HeadlessStub/124.0.{kind}"),
                page_script: Mutex::new(None),
                evaluate_hook: Mutex::new(None),
                interceptor: Mutex::new(None),
                signals: Mutex::new(Vec::new()),
                notify: Notify::new(),
                http: reqwest::Client::new(),
                goto_count: AtomicU64::new(0),
            }),
            kind,
        }
    }

    /// Script to run on every navigation, standing in for the built entry.
    pub fn set_page_script<F, Fut>(&self, script: F)
    where
        F: Fn(PageEnv) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        *self.shared.page_script.lock() =
            Some(Arc::new(move |env| Box::pin(script(env))));
    }

    /// Override how the page answers engine-side `evaluate` calls.
    pub fn on_evaluate<F, Fut>(&self, hook: F)
    where
        F: Fn(String, Option<RemoteValue>, PageEnv) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<RemoteValue>> + Send + 'static,
    {
        *self.shared.evaluate_hook.lock() =
            Some(Arc::new(move |source, arg, env| Box::pin(hook(source, arg, env))));
    }

    pub fn goto_count(&self) -> u64 {
        self.shared.goto_count.load(Ordering::SeqCst)
    }

    /// Signals recorded since the last navigation.
    pub fn recorded(&self) -> Vec<StubSignal> {
        self.shared.signals.lock().clone()
    }
}

impl Default for StubEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Engine for StubEngine {
    fn kind(&self) -> BrowserKind {
        self.kind
    }

    async fn launch(&self, _opts: &LaunchOptions) -> anyhow::Result<Arc<dyn Browser>> {
        Ok(Arc::new(StubBrowser {
            shared: Arc::clone(&self.shared),
            kind: self.kind,
        }))
    }
}

pub struct StubBrowser {
    shared: Arc<StubShared>,
    kind: BrowserKind,
}

#[async_trait]
impl Browser for StubBrowser {
    fn version(&self) -> String {
        self.shared.version.clone()
    }

    async fn new_context(
        self: Arc<Self>,
        base_url: &str,
    ) -> anyhow::Result<Arc<dyn BrowserContext>> {
        Ok(Arc::new(StubContext {
            shared: Arc::clone(&self.shared),
            base_url: base_url.trim_end_matches('/').to_owned(),
            browser: self,
        }))
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct StubContext {
    shared: Arc<StubShared>,
    base_url: String,
    browser: Arc<StubBrowser>,
}

#[async_trait]
impl BrowserContext for StubContext {
    async fn new_page(self: Arc<Self>) -> anyhow::Result<Arc<dyn Page>> {
        Ok(Arc::new(StubPage {
            shared: Arc::clone(&self.shared),
            context: self,
            last_url: Mutex::new(None),
        }))
    }

    async fn set_interceptor(&self, sink: Option<RouteSink>) -> anyhow::Result<()> {
        *self.shared.interceptor.lock() = sink;
        Ok(())
    }

    fn browser(&self) -> Arc<dyn Browser> {
        Arc::clone(&self.browser) as Arc<dyn Browser>
    }
}

pub struct StubPage {
    shared: Arc<StubShared>,
    context: Arc<StubContext>,
    last_url: Mutex<Option<String>>,
}

impl StubPage {
    fn env(&self) -> PageEnv {
        PageEnv {
            shared: Arc::clone(&self.shared),
            base_url: self.context.base_url.clone(),
        }
    }

    async fn navigate(&self, url: &str) -> anyhow::Result<()> {
        self.shared.goto_count.fetch_add(1, Ordering::SeqCst);
        self.shared.signals.lock().clear();
        *self.last_url.lock() = Some(url.to_owned());

        let env = self.env();
        let mut request = PageFetch::get(url);
        request.navigation = true;
        let document = env.fetch(request).await;
        let loaded = matches!(&document, Ok(response) if response.status < 400);
        if !loaded {
            debug!(url, "stub navigation failed to load the document");
            env.dispatch("error", RemoteValue::Undefined);
            return Ok(());
        }

        let script = self.shared.page_script.lock().clone();
        match script {
            Some(script) => {
                tokio::spawn(script(env));
            }
            None => {
                // An empty entry finishes without tests; nothing signals
                // done, exactly like a page with no test files would.
                debug!(url, "no page script registered");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Page for StubPage {
    async fn goto(&self, url: &str) -> anyhow::Result<()> {
        self.navigate(url).await
    }

    async fn evaluate(
        &self,
        source: &str,
        arg: Option<RemoteValue>,
    ) -> anyhow::Result<RemoteValue> {
        if source.contains(DONE_WAIT_MARKER) {
            return Ok(self.shared.wait_done().await);
        }
        let hook = self.shared.evaluate_hook.lock().clone();
        if let Some(hook) = hook {
            return hook(source.to_owned(), arg, self.env()).await;
        }
        Err(anyhow::Error::new(StubEvaluateError {
            source: source.to_owned(),
        }))
    }

    async fn reload(&self) -> anyhow::Result<()> {
        let url = self.last_url.lock().clone();
        match url {
            Some(url) => self.navigate(&url).await,
            None => anyhow::bail!("reload before any navigation"),
        }
    }

    fn context(&self) -> Arc<dyn BrowserContext> {
        Arc::clone(&self.context) as Arc<dyn BrowserContext>
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn start_coverage(&self) -> anyhow::Result<bool> {
        Ok(self.context.browser.kind == BrowserKind::Chromium)
    }

    async fn stop_coverage(&self) -> anyhow::Result<Option<serde_json::Value>> {
        if self.context.browser.kind != BrowserKind::Chromium {
            return Ok(None);
        }
        Ok(Some(serde_json::json!({
            "result": [{
                "url": format!("{}/test.js", self.context.base_url),
                "functions": [],
            }],
        })))
    }
}

#[derive(Debug)]
struct StubEvaluateError {
    source: String,
}

impl std::fmt::Display for StubEvaluateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "stub page has no evaluate hook for source {:?}",
            self.source
        )
    }
}

impl std::error::Error for StubEvaluateError {}

/// A convenience error value for page scripts that need to report a thrown
/// initialization failure with a stack.
pub fn thrown_with_stack(message: &str, stack: &str) -> RemoteValue {
    RemoteValue::error(RemoteError::new("Error", message).with_stack(stack))
}
