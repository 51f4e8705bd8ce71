//! PyPI project-page strategy: the web strategy with normalizer options
//! tuned for pypi.org.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::super::{NormalizeOptions, ProcessedItem, ScraperStrategy};
use super::WebStrategy;
use crate::error::Result;
use crate::fetcher::FetchConfig;
use crate::models::{QueueItem, ScraperOptions};

pub struct PypiStrategy {
    inner: WebStrategy,
}

impl PypiStrategy {
    pub fn new() -> Self {
        Self::with_config(FetchConfig::default())
    }

    pub fn with_config(fetch_config: FetchConfig) -> Self {
        Self {
            inner: WebStrategy::with_config(None, fetch_config),
        }
    }
}

impl Default for PypiStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScraperStrategy for PypiStrategy {
    fn can_handle(&self, url: &str) -> bool {
        Url::parse(url).is_ok_and(|u| {
            matches!(u.host_str(), Some("pypi.org") | Some("www.pypi.org"))
                && u.path().starts_with("/project/")
        })
    }

    fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            remove_query: true,
            remove_trailing_slash: false,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_project_pages_only() {
        let strategy = PypiStrategy::new();
        assert!(strategy.can_handle("https://pypi.org/project/requests/"));
        assert!(!strategy.can_handle("https://pypi.org/search/?q=requests"));
        assert!(!strategy.can_handle("https://example.org/project/requests/"));
    }
}
