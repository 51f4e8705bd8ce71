//! Error kinds surfaced at the engine boundary.
//!
//! Classification is by kind, never by message matching: cancellation is a
//! distinguished variant that every blocking operation must propagate
//! unchanged, and fatal-vs-recoverable decisions key off the variant.

use thiserror::Error;

/// Engine-level error kinds.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The owning job's cancellation token was observed.
    #[error("operation cancelled")]
    Cancelled,

    /// Invalid caller input. Never enqueues a job.
    #[error("validation error: {0}")]
    Validation(String),

    /// A referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Byte retrieval failed after retries.
    #[error("fetch failed for {url}: {message}")]
    Fetch {
        url: String,
        status: Option<u16>,
        message: String,
    },

    /// Content transformation failed.
    #[error("processing error: {0}")]
    Processing(String),

    /// The persistence collaborator reported an error.
    #[error("store error: {0}")]
    Store(String),
}

impl IngestError {
    /// Build a fetch error without an HTTP status (transport failures, I/O).
    pub fn fetch(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            status: None,
            message: message.into(),
        }
    }

    /// Build a fetch error carrying the response status.
    pub fn fetch_status(url: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            status: Some(status),
            message: message.into(),
        }
    }

    /// True when this error is the distinguished cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<url::ParseError> for IngestError {
    fn from(e: url::ParseError) -> Self {
        Self::Validation(format!("invalid URL: {e}"))
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(e: serde_json::Error) -> Self {
        Self::Processing(format!("JSON error: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
