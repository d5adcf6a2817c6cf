// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The bundle server: in-memory artifacts, static fallbacks, the bridge
//! upgrade, and watch-mode rebuilds.
//!
//! Requests that arrive during an in-flight build wait for it to finish.
//! A failed rebuild keeps the previous successful output in place, so
//! reruns retry against the old artifacts until the next edit.

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::body::Body;
use axum::extract::{Request, State, WebSocketUpgrade};
use axum::http::header::{CONTENT_TYPE, ETAG};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tracing::{debug, error, info};

use inpagewire::msg::{BRIDGE_PATH, BRIDGE_SUBPROTOCOL};

use crate::host::{self, SessionState};

use super::watcher::{debounced, watch_root, DEBOUNCE};
use super::{entry, BuildOutput, BuildRequest, Bundler};

/// What one serve session rebuilds from. Patterns are re-expanded on every
/// rebuild so newly created test files join the bundle.
#[derive(Debug, Clone)]
pub struct BuildSpec {
    pub cwd: PathBuf,
    pub patterns: Vec<String>,
    pub setup: Option<PathBuf>,
    pub entry_points: Vec<(String, PathBuf)>,
    pub session: String,
}

impl BuildSpec {
    fn request(&self) -> anyhow::Result<BuildRequest> {
        let tests = entry::discover_tests(&self.cwd, &self.patterns)?;
        Ok(BuildRequest {
            cwd: self.cwd.clone(),
            setup: self.setup.clone(),
            tests,
            entry_points: self.entry_points.clone(),
            session: self.session.clone(),
        })
    }
}

pub struct ServeOptions {
    pub spec: BuildSpec,
    pub static_dir: Option<PathBuf>,
    pub watch: bool,
    pub bundler: Arc<dyn Bundler>,
}

pub struct BundleState {
    pub output: Mutex<BuildOutput>,
    spec: Mutex<BuildSpec>,
    bundler: Arc<dyn Bundler>,
    building: watch::Sender<bool>,
    changed: broadcast::Sender<()>,
    session: Mutex<Option<Arc<SessionState>>>,
    static_dir: Option<PathBuf>,
    cwd: PathBuf,
}

pub struct BundleServer {
    pub base_url: String,
    pub state: Arc<BundleState>,
    shutdown: CancellationToken,
    _watcher: Option<notify::RecommendedWatcher>,
}

impl BundleServer {
    pub async fn start(opts: ServeOptions) -> anyhow::Result<Self> {
        let (building, _) = watch::channel(false);
        let (changed, _) = broadcast::channel(8);
        let state = Arc::new(BundleState {
            output: Mutex::new(BuildOutput::default()),
            cwd: opts.spec.cwd.clone(),
            spec: Mutex::new(opts.spec),
            bundler: opts.bundler,
            building,
            changed,
            session: Mutex::new(None),
            static_dir: opts.static_dir,
        });

        rebuild(&state).await;

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
            .await
            .context("bind bundle server")?;
        let addr = listener.local_addr().context("bundle server address")?;
        let base_url = format!("http://{addr}");

        let router = Router::new()
            .route(BRIDGE_PATH, any(bridge_upgrade))
            .fallback(serve_request)
            .with_state(Arc::clone(&state));

        let shutdown = CancellationToken::new();
        let server_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(server_shutdown.cancelled_owned())
                .await;
            if let Err(err) = served {
                error!(error = %err, "bundle server failed");
            }
        });
        info!(%base_url, "bundle server listening");

        let watcher = if opts.watch {
            let (wake_tx, mut wake_rx) = mpsc::channel(8);
            let watcher = watch_root(&state.cwd, wake_tx)?;
            let watch_state = Arc::clone(&state);
            let watch_shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = watch_shutdown.cancelled() => break,
                        woke = debounced(&mut wake_rx, DEBOUNCE) => {
                            if !woke {
                                break;
                            }
                            rebuild(&watch_state).await;
                        }
                    }
                }
            });
            Some(watcher)
        } else {
            None
        };

        Ok(Self {
            base_url,
            state,
            shutdown,
            _watcher: watcher,
        })
    }

    /// Bind the bridge endpoint to a session. Connections arriving before
    /// this are turned away.
    pub fn set_session(&self, session: Arc<SessionState>) {
        *self.state.session.lock() = Some(session);
    }

    pub fn subscribe_changed(&self) -> broadcast::Receiver<()> {
        self.state.changed.subscribe()
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for BundleServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Run one build. Failures keep the previous successful output.
pub async fn rebuild(state: &Arc<BundleState>) {
    state.building.send_replace(true);
    let spec = state.spec.lock().clone();
    let outcome = match spec.request() {
        Ok(request) => state.bundler.build(&request).await,
        Err(err) => Err(err),
    };
    match outcome {
        Ok(output) => {
            let differs = {
                let mut current = state.output.lock();
                let differs = !current.same_as(&output);
                *current = output;
                differs
            };
            if differs {
                debug!("build output changed");
                state.changed.send(()).ok();
            }
        }
        Err(err) => error!(error = %err, "build failed; keeping previous output"),
    }
    state.building.send_replace(false);
}

async fn bridge_upgrade(
    State(state): State<Arc<BundleState>>,
    ws: WebSocketUpgrade,
) -> Response {
    let session = state.session.lock().clone();
    match session {
        Some(session) => ws
            .protocols([BRIDGE_SUBPROTOCOL])
            .on_upgrade(move |socket| host::ws::handle_socket(socket, session))
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "no active session").into_response(),
    }
}

async fn serve_request(State(state): State<Arc<BundleState>>, req: Request) -> Response {
    // Block until any in-flight build completes, then serve its output.
    let mut building = state.building.subscribe();
    while *building.borrow_and_update() {
        if building.changed().await.is_err() {
            break;
        }
    }

    let path = req.uri().path();
    let lookup = if path == "/" { "/index.html" } else { path };
    let artifact = state.output.lock().files.get(lookup).cloned();
    if let Some(file) = artifact {
        return Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, format!("{}; charset=utf-8", file.mime))
            .header(ETAG, format!("\"{}\"", file.hash))
            .body(Body::from(file.text))
            .unwrap_or_default();
    }

    // Static assets first, then the working directory.
    match &state.static_dir {
        Some(dir) => {
            let outcome = ServeDir::new(dir)
                .fallback(ServeDir::new(&state.cwd))
                .oneshot(req)
                .await;
            unwrap_infallible(outcome)
        }
        None => unwrap_infallible(ServeDir::new(&state.cwd).oneshot(req).await),
    }
}

fn unwrap_infallible<R: IntoResponse>(outcome: Result<R, Infallible>) -> Response {
    match outcome {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
