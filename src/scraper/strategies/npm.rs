//! npm package-site strategy: the web strategy with normalizer options
//! tuned for npmjs.com (query strings are cache noise there).

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::super::{NormalizeOptions, ProcessedItem, ScraperStrategy};
use super::WebStrategy;
use crate::error::Result;
use crate::fetcher::FetchConfig;
use crate::models::{QueueItem, ScraperOptions};

pub struct NpmStrategy {
    inner: WebStrategy,
}

impl NpmStrategy {
    pub fn new() -> Self {
        Self::with_config(FetchConfig::default())
    }

    pub fn with_config(fetch_config: FetchConfig) -> Self {
        Self {
            inner: WebStrategy::with_config(None, fetch_config),
        }
    }
}

impl Default for NpmStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScraperStrategy for NpmStrategy {
    fn can_handle(&self, url: &str) -> bool {
        Url::parse(url).is_ok_and(|u| {
            matches!(u.host_str(), Some("www.npmjs.com") | Some("npmjs.com"))
                && u.path().starts_with("/package/")
        })
    }

    fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            remove_query: true,
            ..Default::default()
        }
    }

    async fn process_item(
        &self,
        item: &QueueItem,
        options: &ScraperOptions,
        cancel: &CancellationToken,
    ) -> Result<ProcessedItem> {
        self.inner.process_item(item, options, cancel).await
    }

    async fn cleanup(&self) {
        self.inner.cleanup().await;
    }
}
