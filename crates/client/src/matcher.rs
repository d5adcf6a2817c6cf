// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Route matcher algebra: any, glob, regex, predicate.

use std::sync::Arc;

use regex::Regex;

use inpagewire::glob::glob_to_regex;

pub type UrlPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

#[derive(Clone)]
pub enum UrlMatcher {
    /// The empty pattern: matches every URL.
    Any,
    Glob { pattern: String, regex: Regex },
    Regex(Regex),
    Predicate(UrlPredicate),
}

impl std::fmt::Debug for UrlMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => f.write_str("Any"),
            Self::Glob { pattern, .. } => write!(f, "Glob({pattern:?})"),
            Self::Regex(re) => write!(f, "Regex({:?})", re.as_str()),
            Self::Predicate(_) => f.write_str("Predicate"),
        }
    }
}

impl UrlMatcher {
    pub fn any() -> Self {
        Self::Any
    }

    /// Compile a glob pattern. A pattern starting with `/` is resolved
    /// against the page's base URL; the empty pattern matches anything.
    pub fn glob(pattern: &str, base_url: &str) -> anyhow::Result<Self> {
        if pattern.is_empty() {
            return Ok(Self::Any);
        }
        let full = if pattern.starts_with('/') {
            format!("{}{}", base_url.trim_end_matches('/'), pattern)
        } else {
            pattern.to_owned()
        };
        let regex = glob_to_regex(&full)?;
        Ok(Self::Glob {
            pattern: full,
            regex,
        })
    }

    pub fn regex(regex: Regex) -> Self {
        Self::Regex(regex)
    }

    pub fn predicate(pred: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self::Predicate(Arc::new(pred))
    }

    pub fn matches(&self, url: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Glob { regex, .. } => regex.is_match(url),
            Self::Regex(regex) => regex.is_match(url),
            Self::Predicate(pred) => pred(url),
        }
    }

    /// Matcher equality as used by unroute: globs by resolved pattern,
    /// regexes by source, predicates by identity.
    pub fn same(&self, other: &UrlMatcher) -> bool {
        match (self, other) {
            (Self::Any, Self::Any) => true,
            (Self::Glob { pattern: a, .. }, Self::Glob { pattern: b, .. }) => a == b,
            (Self::Regex(a), Self::Regex(b)) => a.as_str() == b.as_str(),
            (Self::Predicate(a), Self::Predicate(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "matcher_tests.rs"]
mod tests;
