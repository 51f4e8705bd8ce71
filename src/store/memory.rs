//! In-memory reference implementation of the store contract.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::{
    DocumentStore, LibraryRecord, PageRecord, Result, StoreError, VersionRecord, VersionStatus,
};
use crate::models::{normalize_identity, ScrapeResult, ScraperOptions};

#[derive(Default)]
struct Inner {
    next_library_id: i64,
    next_version_id: i64,
    next_page_id: i64,
    libraries: HashMap<i64, LibraryRecord>,
    versions: HashMap<i64, VersionRecord>,
    pages: HashMap<i64, StoredPage>,
}

#[derive(Clone)]
struct StoredPage {
    record: PageRecord,
    #[allow(dead_code)]
    result: ScrapeResult,
}

/// Reference store keeping everything in process memory.
///
/// Shared across the manager and tests through `Arc`; recovery tests
/// simulate a process restart by building a new manager over the same
/// store instance.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn normalized(library: &str, version: Option<&str>) -> (String, String) {
        normalize_identity(library, version)
    }

    fn find_version_id(inner: &Inner, library: &str, version: Option<&str>) -> Option<i64> {
        let (lib, ver) = Self::normalized(library, version);
        let library_id = inner
            .libraries
            .values()
            .find(|l| l.name == lib)
            .map(|l| l.id)?;
        inner
            .versions
            .values()
            .find(|v| v.library_id == library_id && v.name == ver)
            .map(|v| v.id)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ensure_library_and_version(
        &self,
        library: &str,
        version: Option<&str>,
    ) -> Result<i64> {
        let (lib, _) = Self::normalized(library, version);
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        let library_id = match inner.libraries.values().find(|l| l.name == lib) {
            Some(l) => l.id,
            None => {
                inner.next_library_id += 1;
                let id = inner.next_library_id;
                inner.libraries.insert(id, LibraryRecord { id, name: lib });
                id
            }
        };
        ensure_version_locked(&mut inner, library_id, version)
    }

    async fn ensure_version(&self, library_id: i64, version: Option<&str>) -> Result<i64> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        if !inner.libraries.contains_key(&library_id) {
            return Err(StoreError::NotFound(format!("library {library_id}")));
        }
        ensure_version_locked(&mut inner, library_id, version)
    }

    async fn update_version_status(
        &self,
        version_id: i64,
        status: VersionStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        let version = inner
            .versions
            .get_mut(&version_id)
            .ok_or_else(|| StoreError::NotFound(format!("version {version_id}")))?;
        version.status = status;
        version.error_message = error.map(str::to_string);
        version.updated_at = Utc::now();
        Ok(())
    }

    async fn update_version_progress(
        &self,
        version_id: i64,
        pages: usize,
        max_pages: usize,
    ) -> Result<()> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        let version = inner
            .versions
            .get_mut(&version_id)
            .ok_or_else(|| StoreError::NotFound(format!("version {version_id}")))?;
        version.progress_pages = pages;
        version.progress_max_pages = max_pages;
        version.updated_at = Utc::now();
        Ok(())
    }

    async fn store_scraper_options(
        &self,
        version_id: i64,
        options: &ScraperOptions,
    ) -> Result<()> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        let version = inner
            .versions
            .get_mut(&version_id)
            .ok_or_else(|| StoreError::NotFound(format!("version {version_id}")))?;
        version.source_url = Some(options.url.clone());
        version.scraper_options = Some(options.clone());
        version.updated_at = Utc::now();
        Ok(())
    }

    async fn get_scraper_options(&self, version_id: i64) -> Result<Option<ScraperOptions>> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        Ok(inner
            .versions
            .get(&version_id)
            .and_then(|v| v.scraper_options.clone()))
    }

    async fn get_versions_by_status(
        &self,
        statuses: &[VersionStatus],
    ) -> Result<Vec<VersionRecord>> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        let mut versions: Vec<VersionRecord> = inner
            .versions
            .values()
            .filter(|v| statuses.contains(&v.status))
            .cloned()
            .collect();
        versions.sort_by_key(|v| v.created_at);
        Ok(versions)
    }

    async fn get_version_by_id(&self, version_id: i64) -> Result<Option<VersionRecord>> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        Ok(inner.versions.get(&version_id).cloned())
    }

    async fn get_library_by_id(&self, library_id: i64) -> Result<Option<LibraryRecord>> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        Ok(inner.libraries.get(&library_id).cloned())
    }

    async fn get_pages_by_version_id(&self, version_id: i64) -> Result<Vec<PageRecord>> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        let mut pages: Vec<PageRecord> = inner
            .pages
            .values()
            .filter(|p| p.record.version_id == version_id)
            .map(|p| p.record.clone())
            .collect();
        pages.sort_by_key(|p| p.page_id);
        Ok(pages)
    }

    async fn add_scrape_result(
        &self,
        library: &str,
        version: Option<&str>,
        depth: usize,
        result: &ScrapeResult,
    ) -> Result<()> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        let version_id = Self::find_version_id(&inner, library, version).ok_or_else(|| {
            StoreError::NotFound(format!("version for {library}@{}", version.unwrap_or("")))
        })?;

        // Idempotent by (version, url): replace any existing page row.
        let existing = inner
            .pages
            .values()
            .find(|p| p.record.version_id == version_id && p.record.url == result.url)
            .map(|p| p.record.page_id);
        let page_id = match existing {
            Some(id) => id,
            None => {
                inner.next_page_id += 1;
                inner.next_page_id
            }
        };
        inner.pages.insert(
            page_id,
            StoredPage {
                record: PageRecord {
                    page_id,
                    version_id,
                    url: result.url.clone(),
                    depth,
                    etag: result.etag.clone(),
                },
                result: result.clone(),
            },
        );
        Ok(())
    }

    async fn delete_page(&self, page_id: i64) -> Result<()> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        inner
            .pages
            .remove(&page_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("page {page_id}")))
    }

    async fn remove_all_documents(&self, library: &str, version: Option<&str>) -> Result<()> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        if let Some(version_id) = Self::find_version_id(&inner, library, version) {
            inner.pages.retain(|_, p| p.record.version_id != version_id);
        }
        Ok(())
    }
}

fn ensure_version_locked(inner: &mut Inner, library_id: i64, version: Option<&str>) -> Result<i64> {
    let name = version.unwrap_or("").trim().to_lowercase();
    if let Some(v) = inner
        .versions
        .values()
        .find(|v| v.library_id == library_id && v.name == name)
    {
        return Ok(v.id);
    }
    inner.next_version_id += 1;
    let id = inner.next_version_id;
    let now = Utc::now();
    inner.versions.insert(
        id,
        VersionRecord {
            id,
            library_id,
            name,
            status: VersionStatus::Queued,
            error_message: None,
            progress_pages: 0,
            progress_max_pages: 0,
            source_url: None,
            scraper_options: None,
            created_at: now,
            updated_at: now,
        },
    );
    Ok(id)
}
