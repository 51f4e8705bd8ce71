//! Scraper: per-source strategies around a shared BFS crawler.

pub mod crawler;
mod strategies;
pub mod urls;

pub use crawler::crawl;
pub use strategies::{
    GitHubStrategy, LocalFileStrategy, NpmStrategy, PypiStrategy, WebStrategy,
};
pub use urls::NormalizeOptions;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Result;
use crate::fetcher::{BrowserRenderer, FetchConfig};
use crate::models::{FetchStatus, ProgressSnapshot, QueueItem, ScraperOptions};
use crate::pipelines::PipelineResult;

/// Outcome of processing one frontier item.
#[derive(Debug, Default)]
pub struct ProcessedItem {
    /// Final URL after redirects; link-resolution base.
    pub url: String,
    pub title: Option<String>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// Present when the page produced chunkable content.
    pub content: Option<PipelineResult>,
    /// Outgoing candidate links (unfiltered; the crawler applies scope
    /// and pattern rules).
    pub links: Vec<String>,
    pub status: FetchStatus,
}

/// Async per-page callback; errors returned from it abort the scrape.
pub type ScrapeCallback =
    Arc<dyn Fn(ProgressSnapshot) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// One source-specific scraping strategy.
#[async_trait]
pub trait ScraperStrategy: Send + Sync {
    /// Whether this strategy owns the URL.
    fn can_handle(&self, url: &str) -> bool;

    /// URL normalization tuning for this source.
    fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions::default()
    }

    /// Optional veto applied on top of the default scope/pattern rules.
    /// `None` defers to the default decision.
    fn should_follow_link(
        &self,
        _base: &Url,
        _url: &Url,
        _options: &ScraperOptions,
    ) -> Option<bool> {
        None
    }

    /// Fetch and transform one frontier item.
    async fn process_item(
        &self,
        item: &QueueItem,
        options: &ScraperOptions,
        cancel: &CancellationToken,
    ) -> Result<ProcessedItem>;

    /// Release owned resources (pipelines, browser). Called once when
    /// the owning registry shuts down.
    async fn cleanup(&self) {}
}

/// Ordered strategy registry: the first `can_handle` match wins, so the
/// specific sources sit in front of the generic web strategy.
pub struct StrategyRegistry {
    strategies: Vec<Arc<dyn ScraperStrategy>>,
}

impl StrategyRegistry {
    pub fn new(renderer: Option<Arc<dyn BrowserRenderer>>) -> Self {
        Self::with_config(renderer, FetchConfig::default())
    }

    pub fn with_config(
        renderer: Option<Arc<dyn BrowserRenderer>>,
        fetch_config: FetchConfig,
    ) -> Self {
        Self {
            strategies: vec![
                Arc::new(GitHubStrategy::with_config(fetch_config.clone())),
                Arc::new(NpmStrategy::with_config(fetch_config.clone())),
                Arc::new(PypiStrategy::with_config(fetch_config.clone())),
                Arc::new(LocalFileStrategy::with_config(fetch_config.clone())),
                Arc::new(WebStrategy::with_config(renderer, fetch_config)),
            ],
        }
    }

    /// Registry with custom strategies, used by tests.
    pub fn with_strategies(strategies: Vec<Arc<dyn ScraperStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn find(&self, url: &str) -> Option<Arc<dyn ScraperStrategy>> {
        self.strategies
            .iter()
            .find(|s| s.can_handle(url))
            .cloned()
    }

    pub async fn cleanup_all(&self) {
        for strategy in &self.strategies {
            strategy.cleanup().await;
        }
    }
}
