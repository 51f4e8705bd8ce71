//! Local file-tree strategy.
//!
//! Directories yield their children as links (pure discovery, never
//! counted); files route through the content pipelines. Links found
//! inside file content are never followed.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::super::{ProcessedItem, ScraperStrategy};
use crate::error::{IngestError, Result};
use crate::fetcher::{FetchConfig, FetchOptions, Fetcher, FileFetcher};
use crate::models::{FetchStatus, QueueItem, ScraperOptions};
use crate::pipelines::PipelineRouter;

pub struct LocalFileStrategy {
    fetcher: FileFetcher,
    router: PipelineRouter,
    fetch_config: FetchConfig,
}

impl LocalFileStrategy {
    pub fn new() -> Self {
        Self::with_config(FetchConfig::default())
    }

    pub fn with_config(fetch_config: FetchConfig) -> Self {
        Self {
            fetcher: FileFetcher::new(),
            router: PipelineRouter::new(),
            fetch_config,
        }
    }

    async fn list_directory(&self, item: &QueueItem) -> Result<ProcessedItem> {
        let path = FileFetcher::to_path(&item.url);
        let mut entries = tokio::fs::read_dir(&path)
            .await
            .map_err(|e| IngestError::fetch(&item.url, e.to_string()))?;

        let mut links = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| IngestError::fetch(&item.url, e.to_string()))?
        {
            if let Ok(url) = Url::from_file_path(entry.path()) {
                links.push(url.to_string());
            }
        }
        links.sort();

        Ok(ProcessedItem {
            url: item.url.clone(),
            links,
            status: FetchStatus::Success,
            ..Default::default()
        })
    }
}

impl Default for LocalFileStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScraperStrategy for LocalFileStrategy {
    fn can_handle(&self, url: &str) -> bool {
        url.starts_with("file://")
    }

    async fn process_item(
        &self,
        item: &QueueItem,
        options: &ScraperOptions,
        cancel: &CancellationToken,
    ) -> Result<ProcessedItem> {
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        let path = FileFetcher::to_path(&item.url);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => return self.list_directory(item).await,
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ProcessedItem {
                    url: item.url.clone(),
                    status: FetchStatus::NotFound,
                    ..Default::default()
                });
            }
            Err(e) => return Err(IngestError::fetch(&item.url, e.to_string())),
        }

        let raw = self
            .fetcher
            .fetch(
                &item.url,
                &FetchOptions {
                    etag: item.etag.clone(),
                    ..self.fetch_config.fetch_options(cancel)
                },
            )
            .await?;

        match raw.status {
            FetchStatus::NotModified | FetchStatus::NotFound => Ok(ProcessedItem {
                url: item.url.clone(),
                etag: raw.etag.clone(),
                status: raw.status,
                ..Default::default()
            }),
            FetchStatus::Success => {
                let pipeline = self
                    .router
                    .route(&raw.mime_type, &raw.content)
                    .ok_or_else(|| {
                        IngestError::Processing(format!(
                            "unsupported content type {} at {}",
                            raw.mime_type, raw.source
                        ))
                    })?;
                let result = pipeline.process(&raw, options, None, cancel).await?;

                Ok(ProcessedItem {
                    url: item.url.clone(),
                    title: result.title.clone(),
                    content_type: Some(result.content_type.clone()),
                    etag: raw.etag.clone(),
                    last_modified: raw.last_modified.clone(),
                    // In-content links are never followed for local trees.
                    links: Vec::new(),
                    content: Some(result),
                    status: FetchStatus::Success,
                })
            }
        }
    }

    async fn cleanup(&self) {
        self.router.close_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn directories_become_links_files_become_content() {
        let dir = tempfile::TempDir::new().unwrap();
        let sub = dir.path().join("guides");
        std::fs::create_dir(&sub).unwrap();
        let mut f = std::fs::File::create(dir.path().join("readme.md")).unwrap();
        writeln!(f, "# Docs").unwrap();
        drop(f);

        let strategy = LocalFileStrategy::new();
        let options = ScraperOptions::new(
            format!("file://{}", dir.path().display()),
            "lib",
            None,
        );
        let cancel = CancellationToken::new();

        let root = QueueItem::new(format!("file://{}", dir.path().display()), 0);
        let listed = strategy.process_item(&root, &options, &cancel).await.unwrap();
        assert!(listed.content.is_none());
        assert_eq!(listed.links.len(), 2);
        assert!(listed.links.iter().any(|l| l.ends_with("/guides")));

        let file_item = QueueItem::new(
            format!("file://{}/readme.md", dir.path().display()),
            1,
        );
        let processed = strategy
            .process_item(&file_item, &options, &cancel)
            .await
            .unwrap();
        assert!(processed.content.is_some());
        assert!(processed.links.is_empty());
        assert_eq!(processed.title.as_deref(), Some("Docs"));
    }

    #[tokio::test]
    async fn missing_path_is_not_found() {
        let strategy = LocalFileStrategy::new();
        let options = ScraperOptions::new("file:///nope", "lib", None);
        let item = QueueItem::new("file:///nope/missing.md", 0);
        let processed = strategy
            .process_item(&item, &options, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(processed.status, FetchStatus::NotFound);
    }
}
