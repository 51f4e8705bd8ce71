//! Manager behavior: lifecycle, exclusivity, refresh, cancellation,
//! recovery, events.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{BlockingStrategy, MockPage, MockStrategy};
use docdex::scraper::ScraperStrategy;
use docdex::store::{DocumentStore, MemoryStore, VersionStatus};
use docdex::{
    Chunk, ChunkType, Event, EventBus, EventType, FetchStatus, JobManager, JobStatus,
    ScrapeResult, ScraperOptions, SectionInfo, StrategyRegistry,
};

fn build_manager(
    strategy: Arc<dyn ScraperStrategy>,
    store: Arc<MemoryStore>,
    concurrency: usize,
) -> (Arc<JobManager>, Arc<EventBus>) {
    let registry = Arc::new(StrategyRegistry::with_strategies(vec![strategy]));
    let bus = Arc::new(EventBus::new());
    let manager = JobManager::with_concurrency(store, registry, bus.clone(), concurrency);
    (manager, bus)
}

fn page_result(url: &str, etag: &str) -> ScrapeResult {
    ScrapeResult {
        url: url.to_string(),
        title: "t".to_string(),
        content_type: "text/markdown".to_string(),
        text_content: "body".to_string(),
        etag: Some(etag.to_string()),
        last_modified: None,
        links: Vec::new(),
        errors: Vec::new(),
        chunks: vec![Chunk::new(vec![ChunkType::Text], "body", SectionInfo::root())],
    }
}

/// Give detached store-mirror tasks a moment to land.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn job_runs_to_completion_and_persists_pages() {
    let strategy = Arc::new(MockStrategy::new(vec![
        ("https://e/", MockPage::with_links(&["https://e/a"])),
        ("https://e/a", MockPage::with_links(&[])),
    ]));
    let store = Arc::new(MemoryStore::new());
    let (manager, _bus) = build_manager(strategy, store.clone(), 3);

    let options = ScraperOptions::new("https://e/", "mylib", Some("1.0".to_string()));
    let id = manager
        .enqueue_scrape_job("mylib", Some("1.0"), options)
        .await
        .unwrap();
    manager.wait_for_job_completion(id).await.unwrap();

    let job = manager.get_job(id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.started_at.is_some());
    assert!(job.finished_at.is_some());
    assert_eq!(job.progress.as_ref().unwrap().pages_scraped, 2);

    settle().await;
    let version = store.get_version_by_id(job.version_id).await.unwrap().unwrap();
    assert_eq!(version.status, VersionStatus::Completed);
    assert_eq!(version.progress_pages, 2);
    let pages = store.get_pages_by_version_id(job.version_id).await.unwrap();
    assert_eq!(pages.len(), 2);
}

#[tokio::test]
async fn enqueue_validation_is_fatal_and_never_enqueues() {
    let strategy = Arc::new(MockStrategy::new(vec![]));
    let store = Arc::new(MemoryStore::new());
    let (manager, _bus) = build_manager(strategy, store, 3);

    let options = ScraperOptions::new("https://e/", "lib", None);
    assert!(manager
        .enqueue_scrape_job("", None, options.clone())
        .await
        .is_err());

    let options = ScraperOptions::new("not a url", "lib", None);
    assert!(manager.enqueue_scrape_job("lib", None, options).await.is_err());

    assert!(manager.get_jobs(None).is_empty());
}

#[tokio::test]
async fn duplicate_identity_cancels_previous_job_first() {
    let (started_tx, mut started_rx) = tokio::sync::mpsc::unbounded_channel();
    let strategy = Arc::new(BlockingStrategy {
        started: started_tx,
    });
    let store = Arc::new(MemoryStore::new());
    let (manager, _bus) = build_manager(strategy, store, 3);

    let first = manager
        .enqueue_scrape_job(
            "libA",
            Some("1.0"),
            ScraperOptions::new("https://a/", "libA", Some("1.0".to_string())),
        )
        .await
        .unwrap();
    started_rx.recv().await.unwrap();
    assert_eq!(manager.get_job(first).unwrap().status, JobStatus::Running);

    let second = manager
        .enqueue_scrape_job(
            "libA",
            Some("1.0"),
            ScraperOptions::new("https://b/", "libA", Some("1.0".to_string())),
        )
        .await
        .unwrap();

    assert_ne!(first, second);
    assert_eq!(manager.get_job(first).unwrap().status, JobStatus::Cancelled);

    // At most one non-terminal job per identity, at any instant.
    let live: Vec<_> = manager
        .get_jobs(None)
        .into_iter()
        .filter(|j| !j.status.is_terminal())
        .collect();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id, second);

    manager.cancel_job(second).unwrap();
    let _ = manager.wait_for_job_completion(second).await;
}

#[tokio::test]
async fn cancelling_queued_job_never_starts_it() {
    let (started_tx, mut started_rx) = tokio::sync::mpsc::unbounded_channel();
    let strategy = Arc::new(BlockingStrategy {
        started: started_tx,
    });
    let store = Arc::new(MemoryStore::new());
    let (manager, _bus) = build_manager(strategy, store, 1);

    let running = manager
        .enqueue_scrape_job(
            "libA",
            None,
            ScraperOptions::new("https://a/", "libA", None),
        )
        .await
        .unwrap();
    started_rx.recv().await.unwrap();

    let queued = manager
        .enqueue_scrape_job(
            "libB",
            None,
            ScraperOptions::new("https://b/", "libB", None),
        )
        .await
        .unwrap();
    assert_eq!(manager.get_job(queued).unwrap().status, JobStatus::Queued);

    let status = manager.cancel_job(queued).unwrap();
    assert_eq!(status, JobStatus::Cancelled);
    let job = manager.get_job(queued).unwrap();
    assert!(job.started_at.is_none());
    assert!(job.finished_at.is_some());

    // Cancel on a terminal job is a no-op returning the current status.
    assert_eq!(manager.cancel_job(queued).unwrap(), JobStatus::Cancelled);

    manager.cancel_job(running).unwrap();
    let err = manager.wait_for_job_completion(running).await.unwrap_err();
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn failed_job_carries_error_message() {
    let strategy = Arc::new(MockStrategy::new(vec![(
        "https://e/",
        MockPage {
            error: Some("upstream exploded".to_string()),
            ..Default::default()
        },
    )]));
    let store = Arc::new(MemoryStore::new());
    let (manager, _bus) = build_manager(strategy, store.clone(), 3);

    let mut options = ScraperOptions::new("https://e/", "lib", None);
    options.ignore_errors = false;
    let id = manager.enqueue_scrape_job("lib", None, options).await.unwrap();

    let err = manager.wait_for_job_completion(id).await.unwrap_err();
    assert!(err.to_string().contains("upstream exploded"));

    let job = manager.get_job(id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.as_deref().unwrap().contains("upstream exploded"));

    settle().await;
    let version = store.get_version_by_id(job.version_id).await.unwrap().unwrap();
    assert_eq!(version.status, VersionStatus::Failed);
    assert!(version.error_message.is_some());
}

#[tokio::test]
async fn crash_recovery_requeues_interrupted_versions() {
    let store = Arc::new(MemoryStore::new());
    let version_id = store
        .ensure_library_and_version("mylib", Some("2.0"))
        .await
        .unwrap();
    let options = ScraperOptions::new("https://e/", "mylib", Some("2.0".to_string()));
    store.store_scraper_options(version_id, &options).await.unwrap();
    store
        .update_version_status(version_id, VersionStatus::Running, None)
        .await
        .unwrap();
    let persisted_created_at = store
        .get_version_by_id(version_id)
        .await
        .unwrap()
        .unwrap()
        .created_at;

    // Fill the single worker slot so the recovered job stays queued.
    let (started_tx, mut started_rx) = tokio::sync::mpsc::unbounded_channel();
    let strategy = Arc::new(BlockingStrategy {
        started: started_tx,
    });
    let (manager, _bus) = build_manager(strategy, store.clone(), 1);
    let blocker = manager
        .enqueue_scrape_job(
            "other",
            None,
            ScraperOptions::new("https://other/", "other", None),
        )
        .await
        .unwrap();
    started_rx.recv().await.unwrap();

    manager.start().await.unwrap();

    let version = store.get_version_by_id(version_id).await.unwrap().unwrap();
    assert_eq!(version.status, VersionStatus::Queued);

    let recovered: Vec<_> = manager
        .get_jobs(Some(JobStatus::Queued))
        .into_iter()
        .filter(|j| j.library == "mylib")
        .collect();
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].created_at, persisted_created_at);
    assert_eq!(recovered[0].version.as_deref(), Some("2.0"));

    manager.cancel_job(blocker).unwrap();
    manager.cancel_job(recovered[0].id).unwrap();
    let _ = manager.wait_for_job_completion(blocker).await;
    let _ = manager.wait_for_job_completion(recovered[0].id).await;
}

#[tokio::test]
async fn refresh_uses_conditional_fetches_and_deletes_missing_pages() {
    let store = Arc::new(MemoryStore::new());
    let version_id = store
        .ensure_library_and_version("lib", Some("1"))
        .await
        .unwrap();
    let options = ScraperOptions::new("https://e/", "lib", Some("1".to_string()));
    store.store_scraper_options(version_id, &options).await.unwrap();
    store
        .add_scrape_result("lib", Some("1"), 1, &page_result("https://e/u1", "e1"))
        .await
        .unwrap();
    store
        .add_scrape_result("lib", Some("1"), 1, &page_result("https://e/u2", "e2"))
        .await
        .unwrap();
    store
        .update_version_status(version_id, VersionStatus::Completed, None)
        .await
        .unwrap();

    let strategy = Arc::new(MockStrategy::new(vec![
        ("https://e/", MockPage::with_links(&[]).discovery_only()),
        (
            "https://e/u1",
            MockPage::default().status(FetchStatus::NotModified),
        ),
        (
            "https://e/u2",
            MockPage::default().status(FetchStatus::NotFound),
        ),
    ]));
    let (manager, bus) = build_manager(strategy, store.clone(), 3);

    let progress_events = Arc::new(Mutex::new(Vec::new()));
    {
        let sink = progress_events.clone();
        bus.on(EventType::JobProgress, move |event| {
            if let Event::JobProgress { progress, .. } = event {
                sink.lock().unwrap().push(progress.clone());
            }
        });
    }

    let id = manager.enqueue_refresh_job("lib", Some("1")).await.unwrap();
    manager.wait_for_job_completion(id).await.unwrap();

    let job = manager.get_job(id).unwrap();
    assert!(job.options.is_refresh);
    assert_eq!(job.options.max_pages, None);

    let events = progress_events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|p| p.result.is_none()));
    assert!(events
        .iter()
        .any(|p| p.current_url.ends_with("u2") && p.deleted));

    // u1 untouched, u2 removed.
    let pages = store.get_pages_by_version_id(version_id).await.unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].url, "https://e/u1");
    assert_eq!(pages[0].etag.as_deref(), Some("e1"));
}

#[tokio::test]
async fn refresh_of_incomplete_version_falls_back_to_full_scrape() {
    let store = Arc::new(MemoryStore::new());
    let version_id = store
        .ensure_library_and_version("lib", None)
        .await
        .unwrap();
    let options = ScraperOptions::new("https://e/", "lib", None);
    store.store_scraper_options(version_id, &options).await.unwrap();
    store
        .update_version_status(version_id, VersionStatus::Failed, Some("old failure"))
        .await
        .unwrap();

    let strategy = Arc::new(MockStrategy::new(vec![(
        "https://e/",
        MockPage::with_links(&[]),
    )]));
    let (manager, _bus) = build_manager(strategy, store.clone(), 3);

    let id = manager.enqueue_refresh_job("lib", None).await.unwrap();
    manager.wait_for_job_completion(id).await.unwrap();

    let job = manager.get_job(id).unwrap();
    assert!(!job.options.is_refresh);
    assert!(job.options.initial_queue.is_empty());
    assert_eq!(job.status, JobStatus::Completed);
}

#[tokio::test]
async fn refresh_of_empty_completed_version_fails() {
    let store = Arc::new(MemoryStore::new());
    let version_id = store
        .ensure_library_and_version("lib", Some("3"))
        .await
        .unwrap();
    let options = ScraperOptions::new("https://e/", "lib", Some("3".to_string()));
    store.store_scraper_options(version_id, &options).await.unwrap();
    store
        .update_version_status(version_id, VersionStatus::Completed, None)
        .await
        .unwrap();

    let strategy = Arc::new(MockStrategy::new(vec![]));
    let (manager, _bus) = build_manager(strategy, store, 3);

    let err = manager
        .enqueue_refresh_job("lib", Some("3"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("No pages found"));
}

#[tokio::test]
async fn cancelled_running_job_makes_no_further_store_writes() {
    let (started_tx, mut started_rx) = tokio::sync::mpsc::unbounded_channel();
    let strategy = Arc::new(BlockingStrategy {
        started: started_tx,
    });
    let store = Arc::new(MemoryStore::new());
    let (manager, _bus) = build_manager(strategy, store.clone(), 3);

    let id = manager
        .enqueue_scrape_job(
            "lib",
            None,
            ScraperOptions::new("https://e/", "lib", None),
        )
        .await
        .unwrap();
    started_rx.recv().await.unwrap();

    let status = manager.cancel_job(id).unwrap();
    assert_eq!(status, JobStatus::Cancelling);

    let err = manager.wait_for_job_completion(id).await.unwrap_err();
    assert!(err.is_cancelled());

    let job = manager.get_job(id).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.finished_at.is_some());

    let pages = store.get_pages_by_version_id(job.version_id).await.unwrap();
    assert!(pages.is_empty());

    settle().await;
    let version = store.get_version_by_id(job.version_id).await.unwrap().unwrap();
    assert_eq!(version.status, VersionStatus::Cancelled);
}

#[tokio::test]
async fn clear_completed_removes_terminal_jobs() {
    let strategy = Arc::new(MockStrategy::new(vec![(
        "https://e/",
        MockPage::with_links(&[]),
    )]));
    let store = Arc::new(MemoryStore::new());
    let (manager, _bus) = build_manager(strategy, store, 3);

    let id = manager
        .enqueue_scrape_job(
            "lib",
            None,
            ScraperOptions::new("https://e/", "lib", None),
        )
        .await
        .unwrap();
    manager.wait_for_job_completion(id).await.unwrap();

    assert_eq!(manager.clear_completed_jobs(), 1);
    assert!(manager.get_job(id).is_none());
    assert_eq!(manager.clear_completed_jobs(), 0);
}

#[tokio::test]
async fn bus_sees_full_status_sequence_and_library_change() {
    let strategy = Arc::new(MockStrategy::new(vec![(
        "https://e/",
        MockPage::with_links(&[]),
    )]));
    let store = Arc::new(MemoryStore::new());
    let (manager, bus) = build_manager(strategy, store, 3);

    let statuses = Arc::new(Mutex::new(Vec::new()));
    let library_changes = Arc::new(Mutex::new(0usize));
    {
        let sink = statuses.clone();
        bus.on(EventType::JobStatusChange, move |event| {
            if let Event::JobStatusChange(job) = event {
                sink.lock().unwrap().push(job.status);
            }
        });
    }
    {
        let counter = library_changes.clone();
        bus.on(EventType::LibraryChange, move |_| {
            *counter.lock().unwrap() += 1;
        });
    }

    let id = manager
        .enqueue_scrape_job(
            "lib",
            None,
            ScraperOptions::new("https://e/", "lib", None),
        )
        .await
        .unwrap();
    manager.wait_for_job_completion(id).await.unwrap();
    settle().await;

    let seen = statuses.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![JobStatus::Queued, JobStatus::Running, JobStatus::Completed]
    );
    assert_eq!(*library_changes.lock().unwrap(), 1);
}
