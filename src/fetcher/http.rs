//! HTTP fetcher with conditional requests and retry/backoff.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, redirect, Client, StatusCode};
use tracing::{debug, warn};

use super::{FetchOptions, Fetcher};
use crate::error::{IngestError, Result};
use crate::models::{FetchStatus, RawContent};
use crate::utils::mime::{mime_from_path, parse_content_type};

const USER_AGENT: &str = concat!("docdex/", env!("CARGO_PKG_VERSION"));

/// Base delay for the exponential backoff ladder.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// HTTP(S) fetcher over a shared reqwest client pair.
///
/// Two clients are held because reqwest fixes the redirect policy at
/// build time; `follow_redirects` picks between them per request.
pub struct HttpFetcher {
    redirecting: Client,
    direct: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::with_user_agent(USER_AGENT)
    }

    pub fn with_user_agent(user_agent: &str) -> Self {
        let build = |policy: redirect::Policy| {
            Client::builder()
                .user_agent(user_agent)
                .redirect(policy)
                .gzip(true)
                .brotli(true)
                .cookie_store(true)
                .build()
                .expect("failed to build HTTP client")
        };
        Self {
            redirecting: build(redirect::Policy::limited(10)),
            direct: build(redirect::Policy::none()),
        }
    }

    fn client(&self, follow_redirects: bool) -> &Client {
        if follow_redirects {
            &self.redirecting
        } else {
            &self.direct
        }
    }

    async fn attempt(&self, url: &str, options: &FetchOptions) -> Result<RawContent> {
        let mut request = self
            .client(options.follow_redirects)
            .get(url)
            .timeout(options.timeout);

        if let Some(etag) = &options.etag {
            request = request.header(header::IF_NONE_MATCH, etag.as_str());
        }
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = tokio::select! {
            _ = options.cancel.cancelled() => return Err(IngestError::Cancelled),
            r = request.send() => r.map_err(|e| IngestError::fetch(url, e.to_string()))?,
        };

        let status = response.status();
        let final_url = response.url().to_string();

        if status == StatusCode::NOT_MODIFIED {
            return Ok(RawContent::not_modified(final_url, options.etag.clone()));
        }
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Ok(RawContent::not_found(final_url));
        }
        if !status.is_success() {
            return Err(IngestError::fetch_status(
                url,
                status.as_u16(),
                format!("unexpected status {status}"),
            ));
        }

        let etag = header_string(&response, header::ETAG);
        let last_modified = header_string(&response, header::LAST_MODIFIED);
        let (mime_type, charset) = match header_string(&response, header::CONTENT_TYPE) {
            Some(value) => parse_content_type(&value),
            None => (mime_from_path(&final_url), None),
        };

        let bytes = tokio::select! {
            _ = options.cancel.cancelled() => return Err(IngestError::Cancelled),
            b = response.bytes() => b.map_err(|e| IngestError::fetch(url, e.to_string()))?,
        };

        Ok(RawContent {
            content: bytes.to_vec(),
            mime_type,
            charset,
            source: final_url,
            etag,
            last_modified,
            status: FetchStatus::Success,
        })
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

fn header_string(response: &reqwest::Response, name: header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Transient failures worth another attempt: rate limiting, server
/// errors, and transport-level errors (no status at all).
fn is_retryable(error: &IngestError) -> bool {
    match error {
        IngestError::Fetch { status, .. } => match status {
            Some(429) | Some(503) => true,
            Some(s) => *s >= 500,
            None => true,
        },
        _ => false,
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn can_fetch(&self, source: &str) -> bool {
        source.starts_with("http://") || source.starts_with("https://")
    }

    async fn fetch(&self, source: &str, options: &FetchOptions) -> Result<RawContent> {
        let mut attempt = 0usize;
        loop {
            if options.cancel.is_cancelled() {
                return Err(IngestError::Cancelled);
            }
            match self.attempt(source, options).await {
                Ok(content) => return Ok(content),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) if attempt < options.max_retries && is_retryable(&e) => {
                    let delay = RETRY_BASE_DELAY * 2u32.saturating_pow(attempt as u32);
                    warn!(url = source, attempt, %e, "fetch failed, retrying in {delay:?}");
                    tokio::select! {
                        _ = options.cancel.cancelled() => return Err(IngestError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => {
                    debug!(url = source, %e, "fetch failed");
                    return Err(e);
                }
            }
        }
    }
}
