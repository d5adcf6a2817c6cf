// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coverage sink seam.
//!
//! The harness only collects raw engine coverage (Chromium, first run) and
//! hands it off; format conversion belongs to external tooling reading the
//! sink directory.

use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;

pub const COVERAGE_DIR_ENV: &str = "NODE_V8_COVERAGE";

#[async_trait]
pub trait CoverageSink: Send + Sync {
    async fn write(&self, data: &serde_json::Value) -> anyhow::Result<()>;
}

/// Writes raw coverage JSON into the `NODE_V8_COVERAGE` directory.
pub struct V8CoverageDir {
    dir: PathBuf,
}

impl V8CoverageDir {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// The sink configured by the environment, if any.
    pub fn from_env() -> Option<Self> {
        let dir = std::env::var_os(COVERAGE_DIR_ENV)?;
        if dir.is_empty() {
            return None;
        }
        Some(Self::new(PathBuf::from(dir)))
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }
}

#[async_trait]
impl CoverageSink for V8CoverageDir {
    async fn write(&self, data: &serde_json::Value) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("create coverage dir {}", self.dir.display()))?;
        let name = format!("coverage-{}.json", uuid::Uuid::new_v4());
        let path = self.dir.join(name);
        let body = serde_json::to_vec(data).context("encode coverage data")?;
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("write coverage file {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "coverage_tests.rs"]
mod tests;
