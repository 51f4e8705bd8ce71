//! Persistence contract for libraries, versions and pages.
//!
//! The engine only consumes this trait; real implementations (SQLite,
//! Postgres, a vector store) live outside the crate. `MemoryStore` is the
//! in-process reference implementation used by the CLI and tests. Page
//! writes are treated as idempotent by `(library, version, url)`; stores
//! are expected to provide their own locking/transactionality.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{ScrapeResult, ScraperOptions};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Persisted indexing status of a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl VersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LibraryRecord {
    pub id: i64,
    pub name: String,
}

/// One `(library, version)` row as the manager sees it.
#[derive(Debug, Clone)]
pub struct VersionRecord {
    pub id: i64,
    pub library_id: i64,
    /// Empty string means "unversioned".
    pub name: String,
    pub status: VersionStatus,
    pub error_message: Option<String>,
    pub progress_pages: usize,
    pub progress_max_pages: usize,
    pub source_url: Option<String>,
    pub scraper_options: Option<ScraperOptions>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Minimal per-page projection used to seed refresh queues.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRecord {
    pub page_id: i64,
    pub version_id: i64,
    pub url: String,
    pub depth: usize,
    pub etag: Option<String>,
}

/// Abstract persistence collaborator.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create the library and version rows if missing; returns the version id.
    async fn ensure_library_and_version(
        &self,
        library: &str,
        version: Option<&str>,
    ) -> Result<i64>;

    /// Create a version row under an existing library if missing.
    async fn ensure_version(&self, library_id: i64, version: Option<&str>) -> Result<i64>;

    async fn update_version_status(
        &self,
        version_id: i64,
        status: VersionStatus,
        error: Option<&str>,
    ) -> Result<()>;

    async fn update_version_progress(
        &self,
        version_id: i64,
        pages: usize,
        max_pages: usize,
    ) -> Result<()>;

    /// Persist the options a version was (or will be) scraped with.
    async fn store_scraper_options(
        &self,
        version_id: i64,
        options: &ScraperOptions,
    ) -> Result<()>;

    async fn get_scraper_options(&self, version_id: i64) -> Result<Option<ScraperOptions>>;

    async fn get_versions_by_status(
        &self,
        statuses: &[VersionStatus],
    ) -> Result<Vec<VersionRecord>>;

    async fn get_version_by_id(&self, version_id: i64) -> Result<Option<VersionRecord>>;

    async fn get_library_by_id(&self, library_id: i64) -> Result<Option<LibraryRecord>>;

    async fn get_pages_by_version_id(&self, version_id: i64) -> Result<Vec<PageRecord>>;

    /// Persist one processed page with its chunks.
    async fn add_scrape_result(
        &self,
        library: &str,
        version: Option<&str>,
        depth: usize,
        result: &ScrapeResult,
    ) -> Result<()>;

    async fn delete_page(&self, page_id: i64) -> Result<()>;

    /// Drop every page for the identity ahead of a full re-ingest.
    async fn remove_all_documents(&self, library: &str, version: Option<&str>) -> Result<()>;
}
