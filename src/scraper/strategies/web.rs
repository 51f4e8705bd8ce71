//! Generic web strategy: HTTP fetch, pipeline routing, link discovery.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::super::{ProcessedItem, ScraperStrategy};
use crate::error::{IngestError, Result};
use crate::fetcher::{
    AutoFetcher, BrowserRenderer, FetchConfig, FetchOptions, Fetcher, FileFetcher, HttpFetcher,
};
use crate::models::{FetchStatus, QueueItem, ScraperOptions};
use crate::pipelines::PipelineRouter;

pub struct WebStrategy {
    fetcher: AutoFetcher,
    router: PipelineRouter,
    renderer: Option<Arc<dyn BrowserRenderer>>,
    fetch_config: FetchConfig,
}

impl WebStrategy {
    pub fn new(renderer: Option<Arc<dyn BrowserRenderer>>) -> Self {
        Self::with_config(renderer, FetchConfig::default())
    }

    pub fn with_config(
        renderer: Option<Arc<dyn BrowserRenderer>>,
        fetch_config: FetchConfig,
    ) -> Self {
        let http = match &fetch_config.user_agent {
            Some(agent) => HttpFetcher::with_user_agent(agent),
            None => HttpFetcher::new(),
        };
        Self {
            fetcher: AutoFetcher::with_fetchers(vec![
                Box::new(http),
                Box::new(FileFetcher::new()),
            ]),
            router: PipelineRouter::new(),
            renderer,
            fetch_config,
        }
    }

    fn fetch_options(
        &self,
        item: &QueueItem,
        options: &ScraperOptions,
        cancel: &CancellationToken,
    ) -> FetchOptions {
        FetchOptions {
            etag: item.etag.clone(),
            headers: options.headers.clone().unwrap_or_default(),
            follow_redirects: options.follow_redirects,
            ..self.fetch_config.fetch_options(cancel)
        }
    }
}

#[async_trait]
impl ScraperStrategy for WebStrategy {
    fn can_handle(&self, url: &str) -> bool {
        url.starts_with("http://") || url.starts_with("https://")
    }

    async fn process_item(
        &self,
        item: &QueueItem,
        options: &ScraperOptions,
        cancel: &CancellationToken,
    ) -> Result<ProcessedItem> {
        let raw = self
            .fetcher
            .fetch(&item.url, &self.fetch_options(item, options, cancel))
            .await?;

        match raw.status {
            FetchStatus::NotModified | FetchStatus::NotFound => Ok(ProcessedItem {
                url: raw.source.clone(),
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
                let result = pipeline
                    .process(&raw, options, self.renderer.as_deref(), cancel)
                    .await?;

                Ok(ProcessedItem {
                    url: raw.source.clone(),
                    title: result.title.clone(),
                    content_type: Some(result.content_type.clone()),
                    etag: raw.etag.clone(),
                    last_modified: raw.last_modified.clone(),
                    links: result.links.clone(),
                    content: Some(result),
                    status: FetchStatus::Success,
                })
            }
        }
    }

    async fn cleanup(&self) {
        self.router.close_all().await;
        if let Some(renderer) = &self.renderer {
            renderer.close().await;
        }
    }
}
