// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File watching for watch mode, with a short debounce to coalesce bursts.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// How long a change burst must be quiet before a rebuild starts.
pub const DEBOUNCE: Duration = Duration::from_millis(100);

/// Watch `root` recursively, waking `wake_tx` on relevant events. The
/// returned watcher must be kept alive for as long as watching should
/// continue.
pub fn watch_root(
    root: &Path,
    wake_tx: mpsc::Sender<()>,
) -> anyhow::Result<notify::RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(
        move |outcome: Result<notify::Event, notify::Error>| {
            let Ok(event) = outcome else { return };
            let relevant = event.kind.is_create() || event.kind.is_modify() || event.kind.is_remove();
            if relevant {
                // A full channel already means a wake-up is pending.
                wake_tx.try_send(()).ok();
            }
        },
    )
    .context("create file watcher")?;
    watcher
        .watch(root, RecursiveMode::Recursive)
        .with_context(|| format!("watch {}", root.display()))?;
    Ok(watcher)
}

/// Wait for a change, then keep absorbing follow-up events until the burst
/// has been quiet for `window`. Returns false once the channel is closed
/// and drained.
pub async fn debounced(wake_rx: &mut mpsc::Receiver<()>, window: Duration) -> bool {
    if wake_rx.recv().await.is_none() {
        return false;
    }
    loop {
        match tokio::time::timeout(window, wake_rx.recv()).await {
            Ok(Some(())) => continue,
            // Channel closed: still report the change we saw.
            Ok(None) => return true,
            Err(_quiet) => return true,
        }
    }
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
