//! Scrape configuration bundle.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::QueueItem;

/// URL reachability rule applied during the crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeMode {
    /// Same origin and path under the base URL's directory.
    Subpages,
    /// Same hostname.
    Hostname,
    /// Same registrable domain (subdomains allowed).
    Domain,
}

impl Default for ScopeMode {
    fn default() -> Self {
        Self::Subpages
    }
}

/// How page bytes are retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeMode {
    /// Plain HTTP fetch only.
    Fetch,
    /// Always render through the browser backend.
    Playwright,
    /// HTTP first, browser rendering when configured and needed.
    Auto,
}

impl Default for ScrapeMode {
    fn default() -> Self {
        Self::Auto
    }
}

pub const DEFAULT_MAX_PAGES: usize = 1000;
pub const DEFAULT_MAX_DEPTH: usize = 3;
pub const DEFAULT_MAX_CONCURRENCY: usize = 3;

fn default_max_pages() -> Option<usize> {
    Some(DEFAULT_MAX_PAGES)
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_true() -> bool {
    true
}

/// Everything a single scrape needs to know. Persisted alongside the
/// version so refresh jobs can re-run with identical settings.
///
/// Pattern entries wrapped in `/…/` are regular expressions; anything
/// else is a glob. When no user excludes are given the built-in default
/// excludes apply (see `scraper::urls`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScraperOptions {
    pub url: String,
    pub library: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Page budget. `None` means unlimited (used by refresh jobs so new
    /// pages can still be discovered).
    #[serde(default = "default_max_pages")]
    pub max_pages: Option<usize>,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default)]
    pub scope: ScopeMode,
    #[serde(default = "default_true")]
    pub follow_redirects: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_patterns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_patterns: Option<Vec<String>>,
    #[serde(default)]
    pub scrape_mode: ScrapeMode,
    #[serde(default = "default_true")]
    pub ignore_errors: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    /// Pre-populated frontier used by refresh jobs. Items carry the
    /// persisted `page_id`/`etag` for conditional refetch and deletion.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub initial_queue: Vec<QueueItem>,
    #[serde(default)]
    pub is_refresh: bool,
}

impl ScraperOptions {
    pub fn new(url: impl Into<String>, library: impl Into<String>, version: Option<String>) -> Self {
        Self {
            url: url.into(),
            library: library.into(),
            version,
            max_pages: default_max_pages(),
            max_depth: DEFAULT_MAX_DEPTH,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            scope: ScopeMode::default(),
            follow_redirects: true,
            include_patterns: None,
            exclude_patterns: None,
            scrape_mode: ScrapeMode::default(),
            ignore_errors: true,
            headers: None,
            initial_queue: Vec::new(),
            is_refresh: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_survive_round_trip() {
        let opts = ScraperOptions::new("https://example.com/docs/", "example", None);
        let json = serde_json::to_string(&opts).unwrap();
        let back: ScraperOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, opts);
        assert_eq!(back.max_pages, Some(DEFAULT_MAX_PAGES));
        assert_eq!(back.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(back.scope, ScopeMode::Subpages);
        assert!(back.follow_redirects);
        assert!(back.ignore_errors);
    }

    #[test]
    fn missing_fields_get_defaults() {
        let opts: ScraperOptions = serde_json::from_str(
            r#"{"url":"https://e.com/","library":"e"}"#,
        )
        .unwrap();
        assert_eq!(opts.max_pages, Some(DEFAULT_MAX_PAGES));
        assert_eq!(opts.max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert!(!opts.is_refresh);
        assert!(opts.initial_queue.is_empty());
    }
}
