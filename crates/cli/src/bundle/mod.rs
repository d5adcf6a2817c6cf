// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bundle pipeline: build the browser entry, serve it, rebuild on change.
//!
//! The bundler itself is an external collaborator behind [`Bundler`];
//! [`concat::ConcatBundler`] is the built-in implementation. Everything
//! else here is the interaction the harness owns: the in-memory artifact
//! map, blocking requests during in-flight builds, and the changed signal
//! that drives reruns.

pub mod concat;
pub mod entry;
pub mod server;
pub mod sourcemap;
pub mod watcher;

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct BuiltFile {
    pub hash: String,
    pub text: String,
    pub mime: &'static str,
}

impl BuiltFile {
    pub fn new(text: String, mime: &'static str) -> Self {
        Self {
            hash: hash_text(&text),
            text,
            mime,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildOutput {
    /// Served path (`/test.js`) to artifact.
    pub files: HashMap<String, BuiltFile>,
    /// Served path to its line map, for stack remapping.
    pub line_maps: HashMap<String, sourcemap::LineMap>,
}

impl BuildOutput {
    /// Whether both builds produced identical artifacts.
    pub fn same_as(&self, other: &BuildOutput) -> bool {
        self.files.len() == other.files.len()
            && self.files.iter().all(|(path, file)| {
                other
                    .files
                    .get(path)
                    .is_some_and(|candidate| candidate.hash == file.hash)
            })
    }
}

#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub cwd: PathBuf,
    pub setup: Option<PathBuf>,
    /// Test files, relative to `cwd`, in import order.
    pub tests: Vec<PathBuf>,
    pub entry_points: Vec<(String, PathBuf)>,
    /// Session UUID announced by the entry's init event.
    pub session: String,
}

#[async_trait]
pub trait Bundler: Send + Sync {
    async fn build(&self, request: &BuildRequest) -> anyhow::Result<BuildOutput>;
}

pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
