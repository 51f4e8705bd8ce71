//! Shared fixtures: a scripted strategy over an in-memory site graph.

// Each test binary uses a subset of these helpers.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use docdex::error::{IngestError, Result};
use docdex::pipelines::PipelineResult;
use docdex::scraper::{ProcessedItem, ScraperStrategy};
use docdex::{Chunk, ChunkType, FetchStatus, QueueItem, ScraperOptions, SectionInfo};

/// One scripted page.
#[derive(Clone, Default)]
pub struct MockPage {
    pub links: Vec<String>,
    pub status: FetchStatus,
    /// Whether the page yields chunkable content (counted pages).
    pub has_content: bool,
    /// Artificial processing latency.
    pub delay: Option<Duration>,
    /// Fail processing with this message.
    pub error: Option<String>,
}

impl MockPage {
    pub fn with_links(links: &[&str]) -> Self {
        Self {
            links: links.iter().map(|s| s.to_string()).collect(),
            has_content: true,
            ..Default::default()
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn status(mut self, status: FetchStatus) -> Self {
        self.status = status;
        self.has_content = false;
        self
    }

    pub fn discovery_only(mut self) -> Self {
        self.has_content = false;
        self
    }
}

/// Strategy driven by a url → page script. Records dispatch order.
#[derive(Default)]
pub struct MockStrategy {
    pages: HashMap<String, MockPage>,
    pub dispatched: Arc<Mutex<Vec<String>>>,
}

impl MockStrategy {
    pub fn new(pages: Vec<(&str, MockPage)>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|(url, page)| (url.to_string(), page))
                .collect(),
            dispatched: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn dispatch_order(&self) -> Vec<String> {
        self.dispatched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScraperStrategy for MockStrategy {
    fn can_handle(&self, _url: &str) -> bool {
        true
    }

    async fn process_item(
        &self,
        item: &QueueItem,
        _options: &ScraperOptions,
        cancel: &CancellationToken,
    ) -> Result<ProcessedItem> {
        self.dispatched.lock().unwrap().push(item.url.clone());

        let page = self.pages.get(&item.url).cloned().unwrap_or_else(|| MockPage {
            status: FetchStatus::NotFound,
            ..Default::default()
        });

        if let Some(delay) = page.delay {
            tokio::select! {
                _ = cancel.cancelled() => return Err(IngestError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        if let Some(message) = page.error {
            return Err(IngestError::Processing(message));
        }

        let content = if page.has_content && page.status == FetchStatus::Success {
            Some(PipelineResult {
                title: Some(format!("page {}", item.url)),
                content_type: "text/markdown".to_string(),
                text_content: format!("content of {}", item.url),
                links: page.links.clone(),
                errors: Vec::new(),
                chunks: vec![Chunk::new(
                    vec![ChunkType::Text],
                    format!("content of {}", item.url),
                    SectionInfo::root(),
                )],
            })
        } else {
            None
        };

        Ok(ProcessedItem {
            url: item.url.clone(),
            title: None,
            content_type: content.as_ref().map(|c| c.content_type.clone()),
            etag: None,
            last_modified: None,
            links: page.links,
            content,
            status: page.status,
        })
    }
}

/// Strategy whose pages block until cancellation (for P7-style tests).
pub struct BlockingStrategy {
    pub started: tokio::sync::mpsc::UnboundedSender<String>,
}

#[async_trait]
impl ScraperStrategy for BlockingStrategy {
    fn can_handle(&self, _url: &str) -> bool {
        true
    }

    async fn process_item(
        &self,
        item: &QueueItem,
        _options: &ScraperOptions,
        cancel: &CancellationToken,
    ) -> Result<ProcessedItem> {
        let _ = self.started.send(item.url.clone());
        tokio::select! {
            _ = cancel.cancelled() => Err(IngestError::Cancelled),
            _ = tokio::time::sleep(Duration::from_secs(60)) => {
                Err(IngestError::Processing("blocking page never finishes".into()))
            }
        }
    }
}
