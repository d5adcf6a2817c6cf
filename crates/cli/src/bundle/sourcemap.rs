// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line maps for the built output, and stack remapping back to sources.
//!
//! The built-in bundler concatenates whole files, so a per-file line-range
//! map is exact. External bundler adapters may carry richer maps; the
//! remapping contract here only needs line granularity.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One contiguous run of generated lines taken from a single source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// First generated line (1-based).
    pub gen_start: u32,
    pub len: u32,
    pub source: String,
    /// First source line of the run (1-based).
    pub src_start: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineMap {
    pub segments: Vec<Segment>,
}

impl LineMap {
    /// Map a generated line back to `(source, line)`.
    pub fn resolve(&self, gen_line: u32) -> Option<(&str, u32)> {
        self.segments
            .iter()
            .find(|segment| {
                gen_line >= segment.gen_start && gen_line < segment.gen_start + segment.len
            })
            .map(|segment| {
                (
                    segment.source.as_str(),
                    segment.src_start + (gen_line - segment.gen_start),
                )
            })
    }

    /// The served `.map` artifact body.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "version": 3,
            "sources": self
                .segments
                .iter()
                .map(|segment| segment.source.clone())
                .collect::<Vec<_>>(),
            "x_line_segments": self.segments,
        })
    }
}

/// Rewrite `bundled-path:line[:col]` frames in a stack trace to point at
/// the original sources. Frames that resolve nowhere are left alone.
pub fn remap_stack(stack: &str, maps: &HashMap<String, LineMap>) -> String {
    let mut out = stack.to_owned();
    for (path, map) in maps {
        // The origin prefix is folded into the replacement so a remapped
        // frame reads as a plain source path.
        let Ok(frame) = regex::Regex::new(&format!(
            r"(?:https?://[^\s/]+)?{}:(\d+)(?::(\d+))?",
            regex::escape(path)
        )) else {
            continue;
        };
        out = frame
            .replace_all(&out, |caps: &regex::Captures<'_>| {
                let line: u32 = caps
                    .get(1)
                    .and_then(|m| m.as_str().parse().ok())
                    .unwrap_or(0);
                match map.resolve(line) {
                    Some((source, src_line)) => format!("{source}:{src_line}"),
                    None => caps
                        .get(0)
                        .map(|m| m.as_str().to_owned())
                        .unwrap_or_default(),
                }
            })
            .into_owned();
    }
    out
}

#[cfg(test)]
#[path = "sourcemap_tests.rs"]
mod tests;
