//! Executes a single ingestion job.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{IngestError, Result};
use crate::models::{Job, ProgressSnapshot};
use crate::scraper::{crawl, ScrapeCallback, StrategyRegistry};
use crate::store::DocumentStore;

/// Per-page sink the worker reports into; provided by the manager.
pub type ProgressSink = Arc<dyn Fn(ProgressSnapshot) + Send + Sync>;
/// Non-fatal page error sink.
pub type PageErrorSink = Arc<dyn Fn(IngestError) + Send + Sync>;

/// Run one job to completion.
///
/// Side-effect rules per page: cancellation is honored before anything
/// else; a `deleted` page is removed from the store and a delete failure
/// fails the whole job (index integrity); a fresh result replaces its
/// old page row (refresh) and is then added, where add failures are
/// reported but tolerated.
pub async fn execute_job(
    job: &Job,
    store: Arc<dyn DocumentStore>,
    registry: &StrategyRegistry,
    on_progress: ProgressSink,
    on_page_error: PageErrorSink,
    cancel: CancellationToken,
) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(IngestError::Cancelled);
    }

    let options = &job.options;
    if !options.is_refresh {
        // Full re-ingest starts from an empty page set.
        store
            .remove_all_documents(&job.library, job.version.as_deref())
            .await
            .map_err(|e| IngestError::Store(e.to_string()))?;
    }

    let strategy = registry.find(&options.url).ok_or_else(|| {
        IngestError::Validation(format!("no scraper strategy accepts {}", options.url))
    })?;

    info!(job = %job.id, url = %options.url, refresh = options.is_refresh, "job started");

    let callback: ScrapeCallback = {
        let store = store.clone();
        let library = job.library.clone();
        let version = job.version.clone();
        let cancel = cancel.clone();
        Arc::new(move |progress: ProgressSnapshot| {
            let store = store.clone();
            let library = library.clone();
            let version = version.clone();
            let cancel = cancel.clone();
            let on_progress = on_progress.clone();
            let on_page_error = on_page_error.clone();
            Box::pin(async move {
                if cancel.is_cancelled() {
                    return Err(IngestError::Cancelled);
                }
                on_progress(progress.clone());

                if progress.deleted {
                    if let Some(page_id) = progress.page_id {
                        debug!(page_id, url = %progress.current_url, "deleting removed page");
                        store.delete_page(page_id).await.map_err(|e| {
                            IngestError::Store(format!("failed to delete page {page_id}: {e}"))
                        })?;
                    }
                    return Ok(());
                }

                if let Some(result) = &progress.result {
                    if let Some(page_id) = progress.page_id {
                        // Refresh: drop the stale row before re-adding.
                        store.delete_page(page_id).await.map_err(|e| {
                            IngestError::Store(format!("failed to delete page {page_id}: {e}"))
                        })?;
                    }
                    if let Err(e) = store
                        .add_scrape_result(&library, version.as_deref(), progress.depth, result)
                        .await
                    {
                        on_page_error(IngestError::Store(format!(
                            "failed to store {}: {e}",
                            result.url
                        )));
                    }
                }
                Ok(())
            })
        })
    };

    crawl(strategy.as_ref(), options, &callback, &cancel).await?;

    if cancel.is_cancelled() {
        return Err(IngestError::Cancelled);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::models::{
        Chunk, ChunkType, FetchStatus, QueueItem, ScrapeResult, ScraperOptions, SectionInfo,
    };
    use crate::scraper::{ProcessedItem, ScraperStrategy};
    use crate::store::{
        LibraryRecord, MemoryStore, PageRecord, Result as StoreResult, StoreError, VersionRecord,
        VersionStatus,
    };

    /// Store decorator that can be told to fail deletes or adds.
    struct FlakyStore {
        inner: MemoryStore,
        fail_deletes: AtomicBool,
        fail_adds: AtomicBool,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                fail_deletes: AtomicBool::new(false),
                fail_adds: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl DocumentStore for FlakyStore {
        async fn ensure_library_and_version(
            &self,
            library: &str,
            version: Option<&str>,
        ) -> StoreResult<i64> {
            self.inner.ensure_library_and_version(library, version).await
        }

        async fn ensure_version(&self, library_id: i64, version: Option<&str>) -> StoreResult<i64> {
            self.inner.ensure_version(library_id, version).await
        }

        async fn update_version_status(
            &self,
            version_id: i64,
            status: VersionStatus,
            error: Option<&str>,
        ) -> StoreResult<()> {
            self.inner.update_version_status(version_id, status, error).await
        }

        async fn update_version_progress(
            &self,
            version_id: i64,
            pages: usize,
            max_pages: usize,
        ) -> StoreResult<()> {
            self.inner
                .update_version_progress(version_id, pages, max_pages)
                .await
        }

        async fn store_scraper_options(
            &self,
            version_id: i64,
            options: &ScraperOptions,
        ) -> StoreResult<()> {
            self.inner.store_scraper_options(version_id, options).await
        }

        async fn get_scraper_options(&self, version_id: i64) -> StoreResult<Option<ScraperOptions>> {
            self.inner.get_scraper_options(version_id).await
        }

        async fn get_versions_by_status(
            &self,
            statuses: &[VersionStatus],
        ) -> StoreResult<Vec<VersionRecord>> {
            self.inner.get_versions_by_status(statuses).await
        }

        async fn get_version_by_id(&self, version_id: i64) -> StoreResult<Option<VersionRecord>> {
            self.inner.get_version_by_id(version_id).await
        }

        async fn get_library_by_id(&self, library_id: i64) -> StoreResult<Option<LibraryRecord>> {
            self.inner.get_library_by_id(library_id).await
        }

        async fn get_pages_by_version_id(&self, version_id: i64) -> StoreResult<Vec<PageRecord>> {
            self.inner.get_pages_by_version_id(version_id).await
        }

        async fn add_scrape_result(
            &self,
            library: &str,
            version: Option<&str>,
            depth: usize,
            result: &ScrapeResult,
        ) -> StoreResult<()> {
            if self.fail_adds.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("add refused".into()));
            }
            self.inner
                .add_scrape_result(library, version, depth, result)
                .await
        }

        async fn delete_page(&self, page_id: i64) -> StoreResult<()> {
            if self.fail_deletes.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("delete refused".into()));
            }
            self.inner.delete_page(page_id).await
        }

        async fn remove_all_documents(&self, library: &str, version: Option<&str>) -> StoreResult<()> {
            self.inner.remove_all_documents(library, version).await
        }
    }

    /// Strategy producing one scripted page per queue item.
    struct ScriptedStrategy {
        status: FetchStatus,
    }

    #[async_trait]
    impl ScraperStrategy for ScriptedStrategy {
        fn can_handle(&self, _url: &str) -> bool {
            true
        }

        async fn process_item(
            &self,
            item: &QueueItem,
            _options: &ScraperOptions,
            _cancel: &CancellationToken,
        ) -> crate::error::Result<ProcessedItem> {
            let content = if self.status == FetchStatus::Success {
                Some(crate::pipelines::PipelineResult {
                    title: None,
                    content_type: "text/markdown".to_string(),
                    text_content: "body".to_string(),
                    links: Vec::new(),
                    errors: Vec::new(),
                    chunks: vec![Chunk::new(
                        vec![ChunkType::Text],
                        "body",
                        SectionInfo::root(),
                    )],
                })
            } else {
                None
            };
            Ok(ProcessedItem {
                url: item.url.clone(),
                content,
                status: self.status,
                ..Default::default()
            })
        }
    }

    fn job_with(store_options: ScraperOptions) -> Job {
        Job::new("lib", None, 1, store_options)
    }

    fn sinks() -> (ProgressSink, PageErrorSink, Arc<Mutex<Vec<String>>>) {
        let errors: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        (
            Arc::new(|_| {}),
            Arc::new(move |e| sink.lock().unwrap().push(e.to_string())),
            errors,
        )
    }

    async fn seeded_store(store: &FlakyStore) -> i64 {
        let version_id = store
            .ensure_library_and_version("lib", None)
            .await
            .unwrap();
        store
            .add_scrape_result(
                "lib",
                None,
                1,
                &ScrapeResult {
                    url: "https://e/u1".to_string(),
                    title: "t".to_string(),
                    content_type: "text/markdown".to_string(),
                    text_content: "old".to_string(),
                    etag: Some("e1".to_string()),
                    last_modified: None,
                    links: Vec::new(),
                    errors: Vec::new(),
                    chunks: Vec::new(),
                },
            )
            .await
            .unwrap();
        version_id
    }

    fn refresh_options(page_id: i64) -> ScraperOptions {
        let mut options = ScraperOptions::new("https://e/", "lib", None);
        options.is_refresh = true;
        options.max_pages = None;
        options.initial_queue = vec![QueueItem {
            url: "https://e/u1".to_string(),
            depth: 1,
            page_id: Some(page_id),
            etag: Some("e1".to_string()),
        }];
        options
    }

    #[tokio::test]
    async fn delete_failure_during_refresh_fails_the_job() {
        let store = Arc::new(FlakyStore::new());
        let version_id = seeded_store(&store).await;
        let page_id = store.get_pages_by_version_id(version_id).await.unwrap()[0].page_id;
        store.fail_deletes.store(true, Ordering::SeqCst);

        let registry = crate::scraper::StrategyRegistry::with_strategies(vec![Arc::new(
            ScriptedStrategy {
                status: FetchStatus::NotFound,
            },
        )]);
        let job = job_with(refresh_options(page_id));
        let (progress, errors, _log) = sinks();

        let err = execute_job(
            &job,
            store.clone(),
            &registry,
            progress,
            errors,
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, IngestError::Store(_)));
    }

    #[tokio::test]
    async fn add_failure_is_reported_but_tolerated() {
        let store = Arc::new(FlakyStore::new());
        let _ = seeded_store(&store).await;
        store.fail_adds.store(true, Ordering::SeqCst);

        let registry = crate::scraper::StrategyRegistry::with_strategies(vec![Arc::new(
            ScriptedStrategy {
                status: FetchStatus::Success,
            },
        )]);
        let mut options = ScraperOptions::new("https://e/", "lib", None);
        options.is_refresh = true; // keep the seeded pages in place
        let job = job_with(options);
        let (progress, errors, log) = sinks();

        execute_job(
            &job,
            store.clone(),
            &registry,
            progress,
            errors,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let reported = log.lock().unwrap();
        assert_eq!(reported.len(), 1);
        assert!(reported[0].contains("add refused"));
    }

    #[tokio::test]
    async fn full_scrape_clears_existing_documents_first() {
        let store = Arc::new(FlakyStore::new());
        let version_id = seeded_store(&store).await;
        assert_eq!(
            store.get_pages_by_version_id(version_id).await.unwrap().len(),
            1
        );

        let registry = crate::scraper::StrategyRegistry::with_strategies(vec![Arc::new(
            ScriptedStrategy {
                status: FetchStatus::Success,
            },
        )]);
        let job = job_with(ScraperOptions::new("https://e/", "lib", None));
        let (progress, errors, _log) = sinks();

        execute_job(
            &job,
            store.clone(),
            &registry,
            progress,
            errors,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let pages = store.get_pages_by_version_id(version_id).await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].url, "https://e/");
    }

    #[tokio::test]
    async fn pre_cancelled_job_does_nothing() {
        let store = Arc::new(FlakyStore::new());
        let version_id = seeded_store(&store).await;

        let registry = crate::scraper::StrategyRegistry::with_strategies(vec![Arc::new(
            ScriptedStrategy {
                status: FetchStatus::Success,
            },
        )]);
        let job = job_with(ScraperOptions::new("https://e/", "lib", None));
        let (progress, errors, _log) = sinks();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = execute_job(&job, store.clone(), &registry, progress, errors, cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());

        // Not even the pre-scrape cleanup ran.
        assert_eq!(
            store.get_pages_by_version_id(version_id).await.unwrap().len(),
            1
        );
    }
}
