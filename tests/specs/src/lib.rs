// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Harness for end-to-end spec tests.
//!
//! Runs the real host (bundle server, bridge, runner) against the stub
//! engine, with the real client runtime connecting over a loopback
//! WebSocket. Page scripts registered on the stub stand in for the built
//! entry: they discover the session UUID from the served bundle, open the
//! bridge, and drive the client API exactly like in-page test code would.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use inpage::config::RunConfig;
use inpage::engine::stub::{PageEnv, PageFetch, StubEngine};
use inpage::engine::BrowserKind;
use inpage::run;
use inpageclient::{Client, ClientOptions, FetchRequest, FetchResponse, Fetcher};
use inpagewire::msg::BRIDGE_PATH;

/// A run configuration pointed at a temp directory, with the defaults the
/// spec suite wants.
pub fn config_for(dir: &Path, patterns: &[&str]) -> RunConfig {
    RunConfig {
        cwd: dir.to_owned(),
        setup: None,
        tests: patterns.iter().map(|p| (*p).to_owned()).collect(),
        entry_points: Vec::new(),
        watch: false,
        browser: BrowserKind::Chromium,
        browser_server_options: None,
        headless: true,
        devtools: false,
        no_cov: true,
    }
}

pub fn write_file(dir: &Path, rel: &str, text: &str) -> PathBuf {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    std::fs::write(&path, text).ok();
    path
}

/// Run the harness with a page script standing in for the built entry.
/// Returns the exit code and every failure the script reported.
pub async fn run_scripted<F, Fut>(
    config: RunConfig,
    script: F,
) -> anyhow::Result<(i32, Vec<String>)>
where
    F: Fn(PageEnv) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
{
    run_scripted_on(StubEngine::new(), config, script).await
}

/// Like [`run_scripted`], but over a caller-prepared engine (e.g. with an
/// evaluate hook installed).
pub async fn run_scripted_on<F, Fut>(
    engine: StubEngine,
    config: RunConfig,
    script: F,
) -> anyhow::Result<(i32, Vec<String>)>
where
    F: Fn(PageEnv) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let (report_tx, mut report_rx) = mpsc::unbounded_channel::<String>();
    let script = Arc::new(script);
    engine.set_page_script(move |env| {
        let script = Arc::clone(&script);
        let report_tx = report_tx.clone();
        async move {
            if let Err(err) = script(env.clone()).await {
                report_tx.send(format!("{err:#}")).ok();
                env.done(1);
            }
        }
    });

    let code = run::run_with_engine(config, Arc::new(engine), CancellationToken::new()).await?;

    let mut failures = Vec::new();
    while let Ok(failure) = report_rx.try_recv() {
        failures.push(failure);
    }
    Ok((code, failures))
}

/// Assert a scripted run succeeded: exit code 0 and no reported failures.
pub fn assert_clean(outcome: (i32, Vec<String>)) {
    let (code, failures) = outcome;
    assert!(failures.is_empty(), "page script failures: {failures:#?}");
    assert_eq!(code, 0, "unexpected exit code");
}

/// The session UUID the synthesized entry announces.
pub fn extract_session(entry_text: &str) -> anyhow::Result<String> {
    let re = regex::Regex::new(r"detail: '([0-9a-f-]{36})'")?;
    re.captures(entry_text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_owned())
        .ok_or_else(|| anyhow::anyhow!("no session uuid in the entry"))
}

/// A [`Fetcher`] that routes the client's fetches through the stub page, so
/// they are interceptable like real page traffic.
pub struct EnvFetcher(pub PageEnv);

#[async_trait]
impl Fetcher for EnvFetcher {
    async fn fetch(&self, request: FetchRequest) -> anyhow::Result<FetchResponse> {
        let response = self
            .0
            .fetch(PageFetch {
                url: request.url,
                method: request.method,
                headers: request.headers,
                body: request.body,
                navigation: false,
            })
            .await?;
        Ok(FetchResponse {
            status: response.status,
            headers: response.headers,
            body: response.body,
        })
    }
}

/// Do what the built entry does: load the bundle, read the session UUID,
/// open the bridge, and wire the done signal back to the page.
pub async fn page_client(env: &PageEnv) -> anyhow::Result<Client> {
    let entry = env.fetch(PageFetch::get("/test.js")).await?;
    anyhow::ensure!(entry.status == 200, "entry load failed: {}", entry.status);
    let session = extract_session(&entry.text())?;

    let ws_url = format!(
        "{}{}",
        env.base_url.replacen("http://", "ws://", 1),
        BRIDGE_PATH
    );
    let done_env = env.clone();
    Client::connect(ClientOptions {
        ws_url,
        base_url: env.base_url.clone(),
        session,
        fetcher: Some(Arc::new(EnvFetcher(env.clone()))),
        done_sink: Arc::new(move |code: i32| done_env.done(code)),
    })
    .await
}
