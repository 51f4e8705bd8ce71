//! Ingestion job state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ProgressSnapshot, ScraperOptions};

/// Lifecycle states of an ingestion job.
///
/// ```text
/// Queued --dispatch--> Running --ok--> Completed
///    |                    `-err------> Failed
///    |                    `-cancel---> Cancelling --observed--> Cancelled
///    `--cancel--> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelling,
    Cancelled,
}

impl JobStatus {
    /// Terminal states are never left once entered.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize a `(library, version)` pair into its identity key.
///
/// The empty version and a missing version are the same identity, and
/// comparison is case-insensitive.
pub fn normalize_identity(library: &str, version: Option<&str>) -> (String, String) {
    (
        library.trim().to_lowercase(),
        version.unwrap_or("").trim().to_lowercase(),
    )
}

/// One ingestion job. Owned and mutated exclusively by the job manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub library: String,
    pub version: Option<String>,
    /// Persisted version row backing this job.
    pub version_id: i64,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub source_url: String,
    pub options: ScraperOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    pub fn new(
        library: impl Into<String>,
        version: Option<String>,
        version_id: i64,
        options: ScraperOptions,
    ) -> Self {
        let library = library.into();
        Self {
            id: Uuid::new_v4(),
            source_url: options.url.clone(),
            library,
            version,
            version_id,
            status: JobStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            options,
            progress: None,
            error: None,
        }
    }

    /// Identity key for exclusivity checks.
    pub fn identity(&self) -> (String, String) {
        normalize_identity(&self.library, self.version.as_deref())
    }

    /// Display form `library@version` (unversioned shown as `library`).
    pub fn label(&self) -> String {
        match self.version.as_deref() {
            Some(v) if !v.is_empty() => format!("{}@{}", self.library, v),
            _ => self.library.clone(),
        }
    }
}
