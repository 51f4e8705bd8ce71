//! Job lifecycle: manager, worker, callbacks.

mod manager;
mod worker;

pub use manager::JobManager;
pub use worker::execute_job;

use std::sync::Arc;

use crate::error::IngestError;
use crate::models::{Job, ProgressSnapshot};

/// Default bound on concurrently running jobs.
pub const DEFAULT_JOB_CONCURRENCY: usize = 3;

pub type JobStatusCallback = Arc<dyn Fn(&Job) + Send + Sync>;
pub type JobProgressCallback = Arc<dyn Fn(&Job, &ProgressSnapshot) + Send + Sync>;
pub type JobErrorCallback = Arc<dyn Fn(&Job, &IngestError) + Send + Sync>;

/// Direct callbacks, offered in addition to the event bus for embedders
/// that want a single wiring point.
#[derive(Clone, Default)]
pub struct ManagerCallbacks {
    pub on_job_status_change: Option<JobStatusCallback>,
    pub on_job_progress: Option<JobProgressCallback>,
    pub on_job_error: Option<JobErrorCallback>,
}
