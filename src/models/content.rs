//! Fetched content and scrape results.

use serde::{Deserialize, Serialize};

use super::Chunk;

/// Outcome classification of a single fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    /// Fresh content was retrieved.
    #[default]
    Success,
    /// Server returned 304 for a conditional request.
    NotModified,
    /// 404 or missing file. Triggers cleanup of tracked pages.
    NotFound,
}

/// Raw bytes as returned by a fetcher, before pipeline processing.
#[derive(Debug, Clone)]
pub struct RawContent {
    pub content: Vec<u8>,
    pub mime_type: String,
    pub charset: Option<String>,
    /// Final URL after redirects.
    pub source: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub status: FetchStatus,
}

impl RawContent {
    /// Empty body marker for 304 responses.
    pub fn not_modified(source: impl Into<String>, etag: Option<String>) -> Self {
        Self {
            content: Vec::new(),
            mime_type: String::new(),
            charset: None,
            source: source.into(),
            etag,
            last_modified: None,
            status: FetchStatus::NotModified,
        }
    }

    /// Empty body marker for 404 / missing-file responses.
    pub fn not_found(source: impl Into<String>) -> Self {
        Self {
            content: Vec::new(),
            mime_type: String::new(),
            charset: None,
            source: source.into(),
            etag: None,
            last_modified: None,
            status: FetchStatus::NotFound,
        }
    }
}

/// One BFS frontier entry. `page_id`/`etag` are carried only by refresh
/// items hydrated from persisted pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub url: String,
    pub depth: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl QueueItem {
    pub fn new(url: impl Into<String>, depth: usize) -> Self {
        Self {
            url: url.into(),
            depth,
            page_id: None,
            etag: None,
        }
    }
}

/// Fully processed page, ready for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResult {
    pub url: String,
    pub title: String,
    pub content_type: String,
    pub text_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    pub links: Vec<String>,
    pub errors: Vec<String>,
    pub chunks: Vec<Chunk>,
}
