// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;

use crate::engine::BrowserKind;

/// Run unit tests inside a real browser page, supervised from the host.
#[derive(Debug, Parser)]
#[command(name = "inpage", version, about)]
pub struct Config {
    /// Test file globs, mixed with `name=path` extra entry points.
    #[arg()]
    pub inputs: Vec<String>,

    /// Working directory for file discovery and static serving.
    #[arg(long, env = "INPAGE_CWD")]
    pub cwd: Option<PathBuf>,

    /// Configuration file (JSON object, or list of objects for sequential
    /// runs).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Setup file imported before every test file.
    #[arg(short = 's', long)]
    pub setup: Option<PathBuf>,

    /// Rebuild on file change and rerun.
    #[arg(short = 'w', long)]
    pub watch: bool,

    /// Browser to run the tests in.
    #[arg(short = 'b', long, value_enum)]
    pub browser: Option<BrowserKind>,

    /// Extra launch options for the browser server, as JSON.
    #[arg(long)]
    pub browser_server_options: Option<String>,

    /// Keep the browser headed and open devtools.
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Skip coverage collection.
    #[arg(long = "no-cov")]
    pub no_cov: bool,

    /// Log format (json or text).
    #[arg(long, env = "INPAGE_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "INPAGE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// One run's options as the configuration file spells them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FileConfig {
    pub cwd: Option<PathBuf>,
    pub setup: Option<PathBuf>,
    pub tests: Option<Vec<String>>,
    pub entry_points: Option<BTreeMap<String, PathBuf>>,
    pub watch: Option<bool>,
    pub browser: Option<BrowserKind>,
    pub browser_server_options: Option<serde_json::Value>,
    pub headless: Option<bool>,
    pub no_cov: Option<bool>,
}

/// The file accepts a single object or an ordered list of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FileConfigs {
    One(FileConfig),
    Many(Vec<FileConfig>),
}

impl FileConfigs {
    fn into_vec(self) -> Vec<FileConfig> {
        match self {
            Self::One(one) => vec![one],
            Self::Many(many) => many,
        }
    }
}

/// A fully resolved run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub cwd: PathBuf,
    pub setup: Option<PathBuf>,
    pub tests: Vec<String>,
    pub entry_points: Vec<(String, PathBuf)>,
    pub watch: bool,
    pub browser: BrowserKind,
    pub browser_server_options: Option<serde_json::Value>,
    pub headless: bool,
    pub devtools: bool,
    pub no_cov: bool,
}

impl Config {
    /// Split positional inputs into test globs and `name=path` entries.
    fn split_inputs(&self) -> (Vec<String>, Vec<(String, PathBuf)>) {
        let mut patterns = Vec::new();
        let mut entry_points = Vec::new();
        for input in &self.inputs {
            match input.split_once('=') {
                Some((name, path)) if !name.is_empty() => {
                    entry_points.push((name.to_owned(), PathBuf::from(path)));
                }
                _ => patterns.push(input.clone()),
            }
        }
        (patterns, entry_points)
    }

    /// Resolve the configuration file (when given) and merge the command
    /// line over it, producing the ordered list of runs.
    pub fn load_runs(&self) -> anyhow::Result<Vec<RunConfig>> {
        let file_runs = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("read config file {}", path.display()))?;
                let parsed: FileConfigs = serde_json::from_str(&text)
                    .with_context(|| format!("parse config file {}", path.display()))?;
                parsed.into_vec()
            }
            None => vec![FileConfig::default()],
        };

        let cli_server_options = match &self.browser_server_options {
            Some(raw) => Some(
                serde_json::from_str::<serde_json::Value>(raw)
                    .context("parse --browser-server-options")?,
            ),
            None => None,
        };
        let (cli_patterns, cli_entry_points) = self.split_inputs();

        let mut runs = Vec::with_capacity(file_runs.len());
        for file in file_runs {
            let cwd = self
                .cwd
                .clone()
                .or(file.cwd)
                .map_or_else(default_cwd, |dir| absolute(&dir));
            let tests = if cli_patterns.is_empty() {
                file.tests.unwrap_or_default()
            } else {
                cli_patterns.clone()
            };
            let mut entry_points: Vec<(String, PathBuf)> = file
                .entry_points
                .unwrap_or_default()
                .into_iter()
                .collect();
            entry_points.extend(cli_entry_points.iter().cloned());

            runs.push(RunConfig {
                setup: self.setup.clone().or(file.setup),
                tests,
                entry_points,
                watch: self.watch || file.watch.unwrap_or(false),
                browser: self
                    .browser
                    .or(file.browser)
                    .unwrap_or(BrowserKind::Chromium),
                browser_server_options: cli_server_options
                    .clone()
                    .or(file.browser_server_options),
                // Debug implies a headed browser with devtools.
                headless: !self.debug && file.headless.unwrap_or(true),
                devtools: self.debug,
                no_cov: self.no_cov || file.no_cov.unwrap_or(false),
                cwd,
            });
        }
        Ok(runs)
    }
}

fn default_cwd() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn absolute(dir: &Path) -> PathBuf {
    if dir.is_absolute() {
        dir.to_owned()
    } else {
        default_cwd().join(dir)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
