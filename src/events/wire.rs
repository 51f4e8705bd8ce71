//! External serialization of bus events.
//!
//! When events cross a process boundary (RPC bridge, SSE relay) they are
//! serialized with kebab-case type names, camelCase payload fields and
//! ISO-8601 timestamps. This module is the canonical wire schema; internal
//! enum ordinals never leave the process.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::Event;
use crate::models::{Job, ProgressSnapshot};

/// Wire name for an event type.
pub fn wire_name(event: &Event) -> &'static str {
    match event {
        Event::JobStatusChange(_) => "job-status-change",
        Event::JobProgress { .. } => "job-progress",
        Event::JobListChange => "job-list-change",
        Event::LibraryChange => "library-change",
    }
}

#[derive(Debug, Serialize)]
struct ErrorPayload {
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobStatusChangePayload {
    id: String,
    library: String,
    version: Option<String>,
    status: String,
    error: Option<ErrorPayload>,
    created_at: String,
    started_at: Option<String>,
    finished_at: Option<String>,
    source_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProgressPayload {
    pages_scraped: usize,
    total_pages: usize,
    total_discovered: usize,
    current_url: String,
    depth: usize,
    max_depth: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobProgressPayload {
    id: String,
    library: String,
    version: Option<String>,
    progress: ProgressPayload,
}

fn iso(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Public version field: empty internal version is exposed as `null`.
fn public_version(job: &Job) -> Option<String> {
    match job.version.as_deref() {
        Some("") | None => None,
        Some(v) => Some(v.to_string()),
    }
}

fn status_payload(job: &Job) -> JobStatusChangePayload {
    JobStatusChangePayload {
        id: job.id.to_string(),
        library: job.library.clone(),
        version: public_version(job),
        status: job.status.as_str().to_string(),
        error: job.error.clone().map(|message| ErrorPayload { message }),
        created_at: iso(&job.created_at),
        started_at: job.started_at.as_ref().map(iso),
        finished_at: job.finished_at.as_ref().map(iso),
        source_url: Some(job.source_url.clone()),
    }
}

fn progress_payload(job: &Job, progress: &ProgressSnapshot) -> JobProgressPayload {
    JobProgressPayload {
        id: job.id.to_string(),
        library: job.library.clone(),
        version: public_version(job),
        progress: ProgressPayload {
            pages_scraped: progress.pages_scraped,
            total_pages: progress.total_pages,
            total_discovered: progress.total_discovered,
            current_url: progress.current_url.clone(),
            depth: progress.depth,
            max_depth: progress.max_depth,
        },
    }
}

/// Serialize an event into `(wire type, JSON payload)`.
pub fn to_wire(event: &Event) -> (&'static str, Value) {
    let payload = match event {
        Event::JobStatusChange(job) => {
            serde_json::to_value(status_payload(job)).unwrap_or(Value::Null)
        }
        Event::JobProgress { job, progress } => {
            serde_json::to_value(progress_payload(job, progress)).unwrap_or(Value::Null)
        }
        Event::JobListChange | Event::LibraryChange => Value::Object(Default::default()),
    };
    (wire_name(event), payload)
}
