// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test discovery and virtual-entry synthesis.

use std::path::{Path, PathBuf};

use anyhow::Context;
use globset::{Glob, GlobSetBuilder};

use super::BuildRequest;

/// Expand the test patterns under `cwd` into a sorted, deduplicated file
/// list (paths relative to `cwd`).
pub fn discover_tests(cwd: &Path, patterns: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    if patterns.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("test pattern {pattern:?}"))?);
    }
    let set = builder.build().context("compile test patterns")?;

    let mut found = Vec::new();
    for dir_entry in walkdir::WalkDir::new(cwd)
        .follow_links(false)
        .into_iter()
        // Depth 0 is `cwd` itself, whatever it is named.
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.path()))
    {
        let dir_entry = match dir_entry {
            Ok(entry) => entry,
            Err(_) => continue,
        };
        if !dir_entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = dir_entry.path().strip_prefix(cwd) else {
            continue;
        };
        if set.is_match(relative) {
            found.push(relative.to_owned());
        }
    }
    found.sort();
    found.dedup();
    Ok(found)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.') && name.len() > 1)
}

/// The virtual entry module: import the setup file, then every test file,
/// then announce readiness with the session UUID.
pub fn synthesize(request: &BuildRequest) -> String {
    let mut out = String::new();
    if let Some(setup) = &request.setup {
        out.push_str(&format!("import './{}';\n", slashed(setup)));
    }
    for test in &request.tests {
        out.push_str(&format!("import './{}';\n", slashed(test)));
    }
    out.push_str(&format!(
        "dispatchEvent(new CustomEvent('init', {{ detail: '{}' }}));\n",
        request.session
    ));
    out
}

pub(crate) fn slashed(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
#[path = "entry_tests.rs"]
mod tests;
