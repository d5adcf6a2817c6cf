// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Automation-engine adapter traits.
//!
//! The harness drives a browser through these seams and never talks to a
//! driver directly. A production build links a real driver; the test suite
//! uses [`stub::StubEngine`], which is fully scriptable in-process.

pub mod stub;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use inpagewire::value::RemoteValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    Chromium,
    Firefox,
    Webkit,
}

impl fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chromium => f.write_str("chromium"),
            Self::Firefox => f.write_str("firefox"),
            Self::Webkit => f.write_str("webkit"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub devtools: bool,
    /// Driver-specific launch options, passed through untouched.
    pub server_options: Option<serde_json::Value>,
}

#[async_trait]
pub trait Engine: Send + Sync {
    fn kind(&self) -> BrowserKind;
    async fn launch(&self, opts: &LaunchOptions) -> anyhow::Result<Arc<dyn Browser>>;
}

impl fmt::Debug for dyn Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine").field("kind", &self.kind()).finish()
    }
}

#[async_trait]
pub trait Browser: Send + Sync {
    fn version(&self) -> String;
    async fn new_context(self: Arc<Self>, base_url: &str)
        -> anyhow::Result<Arc<dyn BrowserContext>>;
    async fn close(&self) -> anyhow::Result<()>;
}

/// Channel on which an attached interceptor delivers every request made by
/// the context.
pub type RouteSink = mpsc::Sender<Box<dyn RouteOp>>;

#[async_trait]
pub trait BrowserContext: Send + Sync {
    async fn new_page(self: Arc<Self>) -> anyhow::Result<Arc<dyn Page>>;
    /// Attach (`Some`) or detach (`None`) the universal interceptor.
    async fn set_interceptor(&self, sink: Option<RouteSink>) -> anyhow::Result<()>;
    fn browser(&self) -> Arc<dyn Browser>;
}

#[async_trait]
pub trait Page: Send + Sync {
    async fn goto(&self, url: &str) -> anyhow::Result<()>;
    /// Evaluate a function source inside the page.
    async fn evaluate(
        &self,
        source: &str,
        arg: Option<RemoteValue>,
    ) -> anyhow::Result<RemoteValue>;
    async fn reload(&self) -> anyhow::Result<()>;
    fn context(&self) -> Arc<dyn BrowserContext>;
    async fn close(&self) -> anyhow::Result<()>;
    /// Returns false when this page cannot record coverage.
    async fn start_coverage(&self) -> anyhow::Result<bool>;
    async fn stop_coverage(&self) -> anyhow::Result<Option<serde_json::Value>>;
}

/// One intercepted request, parked until a terminal action is performed
/// against it.
#[async_trait]
pub trait RouteOp: Send + Sync {
    fn url(&self) -> String;
    fn method(&self) -> String;
    fn headers(&self) -> Vec<(String, String)>;
    fn resource_type(&self) -> String;
    fn is_navigation(&self) -> bool;
    fn body(&self) -> Option<Bytes>;
    async fn fulfill(&self, payload: FulfillPayload) -> anyhow::Result<()>;
    async fn continue_with(&self, overrides: ContinuePayload) -> anyhow::Result<()>;
    async fn abort(&self, error_code: Option<String>) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FulfillPayload {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub content_type: Option<String>,
    pub body: Bytes,
}

#[derive(Debug, Clone, Default)]
pub struct ContinuePayload {
    pub url: Option<String>,
    pub method: Option<String>,
    pub headers: Option<Vec<(String, String)>>,
    pub post_data: Option<Bytes>,
}

/// Look up the linked driver for `kind`.
///
/// Driver adapters are separate builds; this library ships none, so naming a
/// browser without embedding one is a startup error. Tests inject
/// [`stub::StubEngine`] through `run::run_with_engine`.
pub fn resolve(kind: BrowserKind) -> anyhow::Result<Arc<dyn Engine>> {
    anyhow::bail!("no driver linked for {kind}; embed an engine adapter or use run_with_engine")
}
