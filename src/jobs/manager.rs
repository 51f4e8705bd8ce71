//! Job manager: queueing, exclusivity, scheduling, persistence mirroring
//! and crash recovery.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::worker;
use super::{ManagerCallbacks, DEFAULT_JOB_CONCURRENCY};
use crate::error::{IngestError, Result};
use crate::events::{Event, EventBus};
use crate::models::{
    normalize_identity, Job, JobStatus, ProgressSnapshot, QueueItem, ScraperOptions,
};
use crate::scraper::StrategyRegistry;
use crate::store::{DocumentStore, VersionStatus};

struct ManagerState {
    jobs: HashMap<Uuid, Job>,
    /// Creation order, for stable listings.
    order: Vec<Uuid>,
    /// FIFO of queued job ids awaiting dispatch.
    queue: VecDeque<Uuid>,
    running: usize,
    tokens: HashMap<Uuid, CancellationToken>,
    status_tx: HashMap<Uuid, watch::Sender<JobStatus>>,
}

impl ManagerState {
    fn new() -> Self {
        Self {
            jobs: HashMap::new(),
            order: Vec::new(),
            queue: VecDeque::new(),
            running: 0,
            tokens: HashMap::new(),
            status_tx: HashMap::new(),
        }
    }
}

/// Long-lived ingestion job manager.
///
/// Owns the job map exclusively: every transition goes through here.
/// Status and progress changes are mirrored to the store best-effort;
/// store failures are logged and never affect in-memory state.
pub struct JobManager {
    store: Arc<dyn DocumentStore>,
    registry: Arc<StrategyRegistry>,
    bus: Arc<EventBus>,
    concurrency: usize,
    accepting: AtomicBool,
    state: Mutex<ManagerState>,
    callbacks: Mutex<ManagerCallbacks>,
}

impl JobManager {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        registry: Arc<StrategyRegistry>,
        bus: Arc<EventBus>,
    ) -> Arc<Self> {
        Self::with_concurrency(store, registry, bus, DEFAULT_JOB_CONCURRENCY)
    }

    pub fn with_concurrency(
        store: Arc<dyn DocumentStore>,
        registry: Arc<StrategyRegistry>,
        bus: Arc<EventBus>,
        concurrency: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            registry,
            bus,
            concurrency: concurrency.max(1),
            accepting: AtomicBool::new(true),
            state: Mutex::new(ManagerState::new()),
            callbacks: Mutex::new(ManagerCallbacks::default()),
        })
    }

    pub fn set_callbacks(&self, callbacks: ManagerCallbacks) {
        *self.callbacks.lock().expect("callbacks lock poisoned") = callbacks;
    }

    /// Hydrate persisted state and begin dispatching.
    ///
    /// Versions left `running` by a crash are forced back to `queued`,
    /// then every queued version becomes an in-memory job again,
    /// preserving `created_at` order.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.accepting.store(true, Ordering::SeqCst);

        let interrupted = self
            .store
            .get_versions_by_status(&[VersionStatus::Running])
            .await
            .map_err(|e| IngestError::Store(e.to_string()))?;
        for version in &interrupted {
            warn!(version_id = version.id, "resetting interrupted version to queued");
            self.store
                .update_version_status(version.id, VersionStatus::Queued, None)
                .await
                .map_err(|e| IngestError::Store(e.to_string()))?;
        }

        let queued = self
            .store
            .get_versions_by_status(&[VersionStatus::Queued])
            .await
            .map_err(|e| IngestError::Store(e.to_string()))?;

        let mut hydrated = 0usize;
        for version in queued {
            let Some(options) = version.scraper_options.clone() else {
                warn!(version_id = version.id, "queued version has no stored options, skipping");
                continue;
            };
            let library = match self
                .store
                .get_library_by_id(version.library_id)
                .await
                .map_err(|e| IngestError::Store(e.to_string()))?
            {
                Some(library) => library.name,
                None => {
                    warn!(version_id = version.id, "queued version has no library row, skipping");
                    continue;
                }
            };
            let job_version = if version.name.is_empty() {
                None
            } else {
                Some(version.name.clone())
            };

            let mut job = Job::new(library, job_version, version.id, options);
            job.created_at = version.created_at;

            let mut state = self.state.lock().expect("manager state lock poisoned");
            let identity = job.identity();
            if state
                .jobs
                .values()
                .any(|j| !j.status.is_terminal() && j.identity() == identity)
            {
                continue;
            }
            let id = job.id;
            state.status_tx.insert(id, watch::channel(job.status).0);
            state.jobs.insert(id, job);
            state.order.push(id);
            state.queue.push_back(id);
            hydrated += 1;
        }

        if hydrated > 0 {
            info!(count = hydrated, "recovered queued jobs from store");
            self.bus.emit(Event::JobListChange);
        }
        self.dispatch();
        Ok(())
    }

    /// Stop dispatching, cancel everything in flight, await terminal
    /// transitions.
    pub async fn stop(self: &Arc<Self>) -> Result<()> {
        self.accepting.store(false, Ordering::SeqCst);
        let active: Vec<Uuid> = {
            let state = self.state.lock().expect("manager state lock poisoned");
            state
                .jobs
                .values()
                .filter(|j| !j.status.is_terminal())
                .map(|j| j.id)
                .collect()
        };
        for id in &active {
            let _ = self.cancel_job(*id);
        }
        for id in active {
            let _ = self.wait_for_job_completion(id).await;
        }
        self.registry.cleanup_all().await;
        Ok(())
    }

    /// Enqueue a new scrape, cancelling any previous non-terminal job
    /// for the same normalized identity first.
    pub async fn enqueue_scrape_job(
        self: &Arc<Self>,
        library: &str,
        version: Option<&str>,
        mut options: ScraperOptions,
    ) -> Result<Uuid> {
        let library = library.trim();
        if library.is_empty() {
            return Err(IngestError::Validation("library must not be empty".into()));
        }
        url::Url::parse(&options.url)
            .map_err(|e| IngestError::Validation(format!("invalid URL {}: {e}", options.url)))?;
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(IngestError::Validation("manager is stopped".into()));
        }

        let identity = normalize_identity(library, version);

        // Identity exclusivity: supersede the existing job and wait for
        // it to unwind before creating the replacement.
        let duplicate = {
            let state = self.state.lock().expect("manager state lock poisoned");
            state
                .jobs
                .values()
                .find(|j| !j.status.is_terminal() && j.identity() == identity)
                .map(|j| j.id)
        };
        if let Some(previous) = duplicate {
            info!(job = %previous, library, "cancelling superseded job for same identity");
            let _ = self.cancel_job(previous)?;
            let _ = self.wait_for_job_completion(previous).await;
        }

        let version_id = self
            .store
            .ensure_library_and_version(library, version)
            .await
            .map_err(|e| IngestError::Store(e.to_string()))?;

        options.library = library.to_string();
        options.version = version
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let job_version = options.version.clone();

        if let Err(e) = self.store.store_scraper_options(version_id, &options).await {
            warn!(version_id, %e, "failed to persist scraper options");
        }
        if let Err(e) = self
            .store
            .update_version_status(version_id, VersionStatus::Queued, None)
            .await
        {
            warn!(version_id, %e, "failed to persist queued status");
        }

        let job = Job::new(library, job_version, version_id, options);
        let id = job.id;
        let snapshot = {
            let mut state = self.state.lock().expect("manager state lock poisoned");
            state.status_tx.insert(id, watch::channel(job.status).0);
            state.jobs.insert(id, job.clone());
            state.order.push(id);
            state.queue.push_back(id);
            job
        };

        self.notify_status(&snapshot);
        self.bus.emit(Event::JobListChange);
        self.dispatch();
        Ok(id)
    }

    /// Re-ingest a previously indexed version.
    ///
    /// A completed version reuses its persisted pages as the initial
    /// queue for conditional refetches; anything else falls back to a
    /// full re-scrape with the stored options.
    pub async fn enqueue_refresh_job(
        self: &Arc<Self>,
        library: &str,
        version: Option<&str>,
    ) -> Result<Uuid> {
        let version_id = self
            .store
            .ensure_library_and_version(library, version)
            .await
            .map_err(|e| IngestError::Store(e.to_string()))?;
        let record = self
            .store
            .get_version_by_id(version_id)
            .await
            .map_err(|e| IngestError::Store(e.to_string()))?
            .ok_or_else(|| IngestError::NotFound(format!("version {version_id}")))?;

        let label = match version.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => format!("{library}@{v}"),
            None => library.to_string(),
        };
        let mut options = record
            .scraper_options
            .clone()
            .ok_or_else(|| IngestError::NotFound(format!("No scraper options for {label}")))?;

        if record.status != VersionStatus::Completed {
            // Not a clean refresh base: full re-scrape with stored options.
            options.is_refresh = false;
            options.initial_queue = Vec::new();
            return self.enqueue_scrape_job(library, version, options).await;
        }

        let pages = self
            .store
            .get_pages_by_version_id(version_id)
            .await
            .map_err(|e| IngestError::Store(e.to_string()))?;
        if pages.is_empty() {
            return Err(IngestError::NotFound(format!("No pages found for {label}")));
        }

        options.is_refresh = true;
        // Unlimited budget so newly added pages are still discovered.
        options.max_pages = None;
        options.initial_queue = pages
            .into_iter()
            .map(|p| QueueItem {
                url: p.url,
                depth: p.depth,
                page_id: Some(p.page_id),
                etag: p.etag,
            })
            .collect();

        self.enqueue_scrape_job(library, version, options).await
    }

    pub fn get_job(&self, id: Uuid) -> Option<Job> {
        let state = self.state.lock().expect("manager state lock poisoned");
        state.jobs.get(&id).cloned()
    }

    /// Jobs in creation order, optionally filtered by status.
    pub fn get_jobs(&self, status: Option<JobStatus>) -> Vec<Job> {
        let state = self.state.lock().expect("manager state lock poisoned");
        state
            .order
            .iter()
            .filter_map(|id| state.jobs.get(id))
            .filter(|j| status.map_or(true, |s| j.status == s))
            .cloned()
            .collect()
    }

    /// Request cancellation. No-op on terminal jobs; queued jobs cancel
    /// immediately; running jobs flip to `Cancelling` until the worker
    /// observes the token.
    pub fn cancel_job(self: &Arc<Self>, id: Uuid) -> Result<JobStatus> {
        let (snapshot, newly_terminal) = {
            let mut state = self.state.lock().expect("manager state lock poisoned");
            let job = state
                .jobs
                .get(&id)
                .cloned()
                .ok_or_else(|| IngestError::NotFound(format!("job {id}")))?;

            match job.status {
                status if status.is_terminal() => return Ok(status),
                JobStatus::Queued => {
                    state.queue.retain(|queued| *queued != id);
                    let job = state.jobs.get_mut(&id).expect("job present");
                    job.status = JobStatus::Cancelled;
                    job.finished_at = Some(Utc::now());
                    let snapshot = job.clone();
                    if let Some(tx) = state.status_tx.get(&id) {
                        let _ = tx.send(JobStatus::Cancelled);
                    }
                    (snapshot, true)
                }
                JobStatus::Running | JobStatus::Cancelling => {
                    let job = state.jobs.get_mut(&id).expect("job present");
                    job.status = JobStatus::Cancelling;
                    let snapshot = job.clone();
                    if let Some(token) = state.tokens.get(&id) {
                        token.cancel();
                    }
                    if let Some(tx) = state.status_tx.get(&id) {
                        let _ = tx.send(JobStatus::Cancelling);
                    }
                    (snapshot, false)
                }
                JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => {
                    unreachable!("terminal handled above")
                }
            }
        };

        self.notify_status(&snapshot);
        if newly_terminal {
            self.mirror_status(&snapshot);
        }
        Ok(snapshot.status)
    }

    /// Drop terminal jobs from the in-memory map.
    pub fn clear_completed_jobs(&self) -> usize {
        let removed = {
            let mut state = self.state.lock().expect("manager state lock poisoned");
            let terminal: Vec<Uuid> = state
                .jobs
                .values()
                .filter(|j| j.status.is_terminal())
                .map(|j| j.id)
                .collect();
            for id in &terminal {
                state.jobs.remove(id);
                state.tokens.remove(id);
                state.status_tx.remove(id);
                state.order.retain(|o| o != id);
            }
            terminal.len()
        };
        if removed > 0 {
            self.bus.emit(Event::JobListChange);
        }
        removed
    }

    /// Suspend until the job reaches a terminal state.
    ///
    /// Resolves on `Completed`; fails with the job's error message on
    /// `Failed` and with the cancellation error on `Cancelled`.
    pub async fn wait_for_job_completion(&self, id: Uuid) -> Result<()> {
        let mut rx = {
            let state = self.state.lock().expect("manager state lock poisoned");
            state
                .status_tx
                .get(&id)
                .ok_or_else(|| IngestError::NotFound(format!("job {id}")))?
                .subscribe()
        };
        let status = *rx
            .wait_for(|status| status.is_terminal())
            .await
            .map_err(|_| IngestError::NotFound(format!("job {id}")))?;

        match status {
            JobStatus::Completed => Ok(()),
            JobStatus::Cancelled => Err(IngestError::Cancelled),
            JobStatus::Failed => {
                let message = self
                    .get_job(id)
                    .and_then(|j| j.error)
                    .unwrap_or_else(|| "job failed".to_string());
                Err(IngestError::Processing(message))
            }
            other => Err(IngestError::Processing(format!(
                "unexpected terminal status {other}"
            ))),
        }
    }

    /// Dispatch queued jobs while worker slots are free. Non-blocking:
    /// each dispatched job runs in its own task.
    fn dispatch(self: &Arc<Self>) {
        loop {
            if !self.accepting.load(Ordering::SeqCst) {
                return;
            }
            let dispatched = {
                let mut state = self.state.lock().expect("manager state lock poisoned");
                if state.running >= self.concurrency {
                    return;
                }
                let Some(id) = state.queue.pop_front() else {
                    return;
                };
                // Queue entries may have been cancelled while waiting.
                let Some(job) = state.jobs.get_mut(&id) else {
                    continue;
                };
                if job.status != JobStatus::Queued {
                    continue;
                }
                job.status = JobStatus::Running;
                job.started_at = Some(Utc::now());
                state.running += 1;
                let token = CancellationToken::new();
                state.tokens.insert(id, token.clone());
                if let Some(tx) = state.status_tx.get(&id) {
                    let _ = tx.send(JobStatus::Running);
                }
                Some((state.jobs.get(&id).expect("job present").clone(), token))
            };

            if let Some((snapshot, token)) = dispatched {
                self.notify_status(&snapshot);
                self.mirror_status(&snapshot);
                let manager = self.clone();
                tokio::spawn(async move {
                    manager.run_job(snapshot, token).await;
                });
            }
        }
    }

    async fn run_job(self: Arc<Self>, job: Job, token: CancellationToken) {
        let id = job.id;
        let progress_sink: worker::ProgressSink = {
            let manager = self.clone();
            Arc::new(move |progress| manager.record_progress(id, progress))
        };
        let error_sink: worker::PageErrorSink = {
            let manager = self.clone();
            Arc::new(move |error| manager.report_page_error(id, error))
        };

        let result = worker::execute_job(
            &job,
            self.store.clone(),
            &self.registry,
            progress_sink,
            error_sink,
            token.clone(),
        )
        .await;

        let snapshot = {
            let mut state = self.state.lock().expect("manager state lock poisoned");
            state.running = state.running.saturating_sub(1);
            state.tokens.remove(&id);
            let job = state.jobs.get_mut(&id).expect("running job present");

            let (status, error) = match &result {
                _ if job.status == JobStatus::Cancelling => (JobStatus::Cancelled, None),
                Err(e) if e.is_cancelled() => (JobStatus::Cancelled, None),
                Err(e) => (JobStatus::Failed, Some(e.to_string())),
                Ok(()) => (JobStatus::Completed, None),
            };
            job.status = status;
            job.error = error;
            job.finished_at = Some(Utc::now());
            if let Some(tx) = state.status_tx.get(&id) {
                let _ = tx.send(status);
            }
            state.jobs.get(&id).expect("job present").clone()
        };

        match snapshot.status {
            JobStatus::Completed => info!(job = %id, library = %snapshot.label(), "job completed"),
            JobStatus::Cancelled => info!(job = %id, library = %snapshot.label(), "job cancelled"),
            _ => error!(
                job = %id,
                library = %snapshot.label(),
                error = snapshot.error.as_deref().unwrap_or(""),
                "job failed"
            ),
        }

        self.notify_status(&snapshot);
        self.mirror_status(&snapshot);
        if snapshot.status == JobStatus::Completed {
            // The persisted library set may have changed.
            self.bus.emit(Event::LibraryChange);
        }
        self.dispatch();
    }

    /// Per-page progress: update the job, fan out, mirror counters.
    fn record_progress(&self, id: Uuid, progress: ProgressSnapshot) {
        let snapshot = {
            let mut state = self.state.lock().expect("manager state lock poisoned");
            let Some(job) = state.jobs.get_mut(&id) else {
                return;
            };
            // The job keeps a light snapshot; full results only flow
            // through the event.
            let mut stored = progress.clone();
            stored.result = None;
            job.progress = Some(stored);
            job.clone()
        };

        let callbacks = self.callbacks.lock().expect("callbacks lock poisoned").clone();
        if let Some(cb) = &callbacks.on_job_progress {
            cb(&snapshot, &progress);
        }
        self.bus.emit(Event::JobProgress {
            job: snapshot.clone(),
            progress: progress.clone(),
        });

        let store = self.store.clone();
        let version_id = snapshot.version_id;
        let pages = progress.pages_scraped;
        let total = progress.total_pages;
        tokio::spawn(async move {
            if let Err(e) = store.update_version_progress(version_id, pages, total).await {
                warn!(version_id, %e, "failed to mirror progress to store");
            }
        });
    }

    fn report_page_error(&self, id: Uuid, error: IngestError) {
        let Some(job) = self.get_job(id) else {
            return;
        };
        warn!(job = %id, %error, "page-level error");
        let callbacks = self.callbacks.lock().expect("callbacks lock poisoned").clone();
        if let Some(cb) = &callbacks.on_job_error {
            cb(&job, &error);
        }
    }

    /// Emit a status transition on the bus and direct callbacks.
    fn notify_status(&self, job: &Job) {
        let callbacks = self.callbacks.lock().expect("callbacks lock poisoned").clone();
        if let Some(cb) = &callbacks.on_job_status_change {
            cb(job);
        }
        self.bus.emit(Event::JobStatusChange(job.clone()));
    }

    /// Mirror a status to the store, detached and best-effort.
    fn mirror_status(&self, job: &Job) {
        let Some(status) = version_status_of(job.status) else {
            return;
        };
        let store = self.store.clone();
        let version_id = job.version_id;
        let error = job.error.clone();
        tokio::spawn(async move {
            if let Err(e) = store
                .update_version_status(version_id, status, error.as_deref())
                .await
            {
                warn!(version_id, %e, "failed to mirror status to store");
            }
        });
    }
}

/// Store equivalent of a job status. `Cancelling` is transient and has
/// no persisted form.
fn version_status_of(status: JobStatus) -> Option<VersionStatus> {
    match status {
        JobStatus::Queued => Some(VersionStatus::Queued),
        JobStatus::Running => Some(VersionStatus::Running),
        JobStatus::Completed => Some(VersionStatus::Completed),
        JobStatus::Failed => Some(VersionStatus::Failed),
        JobStatus::Cancelled => Some(VersionStatus::Cancelled),
        JobStatus::Cancelling => None,
    }
}
