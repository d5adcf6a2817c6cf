// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The built-in bundler: inline concatenation with exact line maps.
//!
//! Produces `/index.html` (the document shell), `/test.js` (setup + tests
//! inlined in import order, closed by the init dispatch), `/test.js.map`,
//! `/entry.js` (the import-form virtual entry, usable by native-ESM
//! setups), and one `/<name>.js` per extra entry point.

use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;

use super::entry::{slashed, synthesize};
use super::sourcemap::{LineMap, Segment};
use super::{BuildOutput, BuildRequest, BuiltFile, Bundler};

const INDEX_HTML: &str = "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"></head>\n<body><script type=\"module\" src=\"/test.js\"></script></body>\n</html>\n";

pub struct ConcatBundler;

impl ConcatBundler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConcatBundler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Bundler for ConcatBundler {
    async fn build(&self, request: &BuildRequest) -> anyhow::Result<BuildOutput> {
        let mut bundle = String::new();
        let mut segments = Vec::new();
        let mut gen_line = 1u32;

        let modules = request
            .setup
            .iter()
            .chain(request.tests.iter())
            .cloned()
            .collect::<Vec<_>>();
        for module in &modules {
            let absolute = if module.is_absolute() {
                module.clone()
            } else {
                request.cwd.join(module)
            };
            let text = tokio::fs::read_to_string(&absolute)
                .await
                .with_context(|| format!("read {}", absolute.display()))?;
            let rel = slashed(module);

            bundle.push_str(&format!("// -- {rel}\n"));
            gen_line += 1;
            let lines = text.lines().count() as u32;
            segments.push(Segment {
                gen_start: gen_line,
                len: lines,
                source: rel,
                src_start: 1,
            });
            bundle.push_str(&text);
            if !text.ends_with('\n') {
                bundle.push('\n');
            }
            gen_line += lines;
        }
        bundle.push_str(&format!(
            "dispatchEvent(new CustomEvent('init', {{ detail: '{}' }}));\n",
            request.session
        ));
        bundle.push_str("//# sourceMappingURL=/test.js.map\n");

        let line_map = LineMap { segments };
        let mut files = HashMap::new();
        files.insert(
            "/index.html".to_owned(),
            BuiltFile::new(INDEX_HTML.to_owned(), "text/html"),
        );
        files.insert(
            "/test.js".to_owned(),
            BuiltFile::new(bundle, "text/javascript"),
        );
        files.insert(
            "/test.js.map".to_owned(),
            BuiltFile::new(line_map.to_json().to_string(), "application/json"),
        );
        files.insert(
            "/entry.js".to_owned(),
            BuiltFile::new(synthesize(request), "text/javascript"),
        );

        for (name, path) in &request.entry_points {
            let absolute = if path.is_absolute() {
                path.clone()
            } else {
                request.cwd.join(path)
            };
            let text = tokio::fs::read_to_string(&absolute)
                .await
                .with_context(|| format!("read entry point {}", absolute.display()))?;
            files.insert(
                format!("/{name}.js"),
                BuiltFile::new(text, "text/javascript"),
            );
        }

        let mut line_maps = HashMap::new();
        line_maps.insert("/test.js".to_owned(), line_map);
        Ok(BuildOutput { files, line_maps })
    }
}

#[cfg(test)]
#[path = "concat_tests.rs"]
mod tests;
