//! Source-typed byte retrieval.
//!
//! Fetchers turn a source string (URL or file path) into `RawContent`.
//! They honor conditional requests (`If-None-Match`), map 304 to
//! `NotModified` and 404/ENOENT to `NotFound`, populate `source` with the
//! final URL after redirects, and propagate cancellation unchanged.

mod auto;
mod browser;
mod file;
mod http;

pub use auto::AutoFetcher;
pub use browser::BrowserRenderer;
pub use file::FileFetcher;
pub use http::HttpFetcher;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::RawContent;

/// Default per-fetch timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Default retry budget for transient failures.
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Process-level fetch tuning, threaded from the app config into every
/// strategy's fetchers.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub max_retries: usize,
    pub user_agent: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_FETCH_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            user_agent: None,
        }
    }
}

impl FetchConfig {
    /// Per-fetch options seeded with these defaults.
    pub fn fetch_options(&self, cancel: &CancellationToken) -> FetchOptions {
        FetchOptions {
            timeout: self.timeout,
            max_retries: self.max_retries,
            cancel: cancel.clone(),
            ..Default::default()
        }
    }
}

/// Per-fetch knobs.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Stored etag for conditional refetch.
    pub etag: Option<String>,
    /// Extra request headers.
    pub headers: BTreeMap<String, String>,
    pub follow_redirects: bool,
    pub timeout: Duration,
    pub max_retries: usize,
    pub cancel: CancellationToken,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            etag: None,
            headers: BTreeMap::new(),
            follow_redirects: true,
            timeout: DEFAULT_FETCH_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            cancel: CancellationToken::new(),
        }
    }
}

/// Byte retrieval contract.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Whether this fetcher understands the source string.
    fn can_fetch(&self, source: &str) -> bool;

    async fn fetch(&self, source: &str, options: &FetchOptions) -> Result<RawContent>;
}
