// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level run orchestration, shared by `main` and the integration
//! suite.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use inpagewire::value::RemoteValue;

use crate::bundle::concat::ConcatBundler;
use crate::bundle::server::{BuildSpec, BundleServer, ServeOptions};
use crate::bundle::{entry, sourcemap};
use crate::config::{Config, RunConfig};
use crate::coverage::{CoverageSink, V8CoverageDir};
use crate::engine::{self, BrowserKind, Engine, LaunchOptions};
use crate::host::SessionState;

/// Script injected into the page: resolves with the forwarded exit code on
/// the done event, or an error record when initialization fails.
pub const DONE_WAIT_SOURCE: &str = "() => new Promise((resolve) => {\n  addEventListener('done', (event) => resolve(event.detail | 0), { once: true });\n  addEventListener('error', (event) => resolve({ code: 1, stack: event.error && event.error.stack }), { once: true });\n})";

/// Initialize the tracing subscriber from the CLI flags.
///
/// Uses `try_init` so it's safe to call multiple times (e.g. from tests).
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let _ = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
}

/// Run with the driver named by the configuration. Ctrl-C ends watch and
/// headed loops.
pub async fn run(config: RunConfig) -> anyhow::Result<i32> {
    let engine = engine::resolve(config.browser)?;
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });
    run_with_engine(config, engine, shutdown).await
}

/// Run against an injected engine. `shutdown` ends watch/headed loops.
pub async fn run_with_engine(
    config: RunConfig,
    engine: Arc<dyn Engine>,
    shutdown: CancellationToken,
) -> anyhow::Result<i32> {
    let tests = entry::discover_tests(&config.cwd, &config.tests)?;
    if tests.is_empty() && !config.watch {
        error!("no test file found");
        return Ok(1);
    }
    info!(count = tests.len(), "discovered test files");

    let session_uuid = Uuid::new_v4().to_string();
    let server = BundleServer::start(ServeOptions {
        spec: BuildSpec {
            cwd: config.cwd.clone(),
            patterns: config.tests.clone(),
            setup: config.setup.clone(),
            entry_points: config.entry_points.clone(),
            session: session_uuid.clone(),
        },
        static_dir: None,
        watch: config.watch,
        bundler: Arc::new(ConcatBundler::new()),
    })
    .await?;
    let base_url = server.base_url.clone();

    let browser = engine
        .launch(&LaunchOptions {
            headless: config.headless,
            devtools: config.devtools,
            server_options: config.browser_server_options.clone(),
        })
        .await?;
    let context = Arc::clone(&browser).new_context(&base_url).await?;
    let page = Arc::clone(&context).new_page().await?;
    let session = SessionState::new(session_uuid, Arc::clone(&context), Arc::clone(&page));
    server.set_session(Arc::clone(&session));

    let coverage_wanted = !config.no_cov && engine.kind() == BrowserKind::Chromium;
    let coverage_armed = coverage_wanted && page.start_coverage().await.unwrap_or(false);

    if let Err(err) = page.goto(&format!("{base_url}/")).await {
        error!(error = %err, "page failed to load the entry");
        return Ok(1);
    }

    let mut exit_code = wait_run(&session, &server).await;

    // Coverage is collected only for the first run.
    if coverage_armed {
        match page.stop_coverage().await {
            Ok(Some(data)) => {
                if let Some(sink) = V8CoverageDir::from_env() {
                    if let Err(err) = sink.write(&data).await {
                        warn!(error = %err, "coverage write failed");
                    }
                }
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "coverage stop failed"),
        }
    }

    if config.watch || !config.headless {
        let mut changed = server.subscribe_changed();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                received = changed.recv() => {
                    if received.is_err() {
                        break;
                    }
                    let previous_epoch = session.connection_epoch();
                    if let Err(err) = page.reload().await {
                        error!(error = %err, "reload after change failed");
                        exit_code = exit_code.max(1);
                        continue;
                    }
                    // A rerun counts only once the bridge client actually
                    // reconnected; otherwise a single navigation would be
                    // observed twice.
                    wait_reconnect(&session, previous_epoch).await;
                    let code = wait_run(&session, &server).await;
                    exit_code = exit_code.max(code);
                }
            }
        }
    }

    server.stop();
    if !config.watch && config.headless {
        page.close().await.ok();
        browser.close().await.ok();
    }
    Ok(exit_code)
}

/// Await one run's outcome through the injected done-wait script.
async fn wait_run(session: &Arc<SessionState>, server: &BundleServer) -> i32 {
    match session.page.evaluate(DONE_WAIT_SOURCE, None).await {
        Ok(RemoteValue::Number(code)) => code as i32,
        Ok(RemoteValue::Object(cell)) => {
            let props = cell.lock().clone();
            let code = props
                .iter()
                .find(|(key, _)| key == "code")
                .and_then(|(_, value)| value.as_number())
                .unwrap_or(1.0) as i32;
            if let Some(stack) = props
                .iter()
                .find(|(key, _)| key == "stack")
                .and_then(|(_, value)| value.as_str().map(str::to_owned))
            {
                let maps = server.state.output.lock().line_maps.clone();
                let remapped = sourcemap::remap_stack(&stack, &maps);
                error!("uncaught error during initialization:\n{remapped}");
            } else {
                error!("page failed during initialization");
            }
            code
        }
        Ok(other) => {
            warn!(kind = other.kind(), "unexpected done-wait result");
            1
        }
        Err(err) => {
            error!(error = %err, "done-wait evaluation failed");
            1
        }
    }
}

/// Wait (bounded) for the bridge client to reconnect past `previous`.
async fn wait_reconnect(session: &Arc<SessionState>, previous: u64) {
    let mut connections = session.subscribe_connections();
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while *connections.borrow_and_update() <= previous {
            if connections.changed().await.is_err() {
                break;
            }
        }
    })
    .await;
    if waited.is_err() {
        debug!("bridge client did not reconnect after reload");
    }
}
