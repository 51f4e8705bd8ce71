//! Scheme-routing fetcher.

use async_trait::async_trait;

use super::{FetchOptions, Fetcher, FileFetcher, HttpFetcher};
use crate::error::{IngestError, Result};
use crate::models::RawContent;

/// Routes a fetch to the first fetcher that understands the source.
pub struct AutoFetcher {
    fetchers: Vec<Box<dyn Fetcher>>,
}

impl AutoFetcher {
    pub fn new() -> Self {
        Self {
            fetchers: vec![Box::new(HttpFetcher::new()), Box::new(FileFetcher::new())],
        }
    }

    pub fn with_fetchers(fetchers: Vec<Box<dyn Fetcher>>) -> Self {
        Self { fetchers }
    }
}

impl Default for AutoFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for AutoFetcher {
    fn can_fetch(&self, source: &str) -> bool {
        self.fetchers.iter().any(|f| f.can_fetch(source))
    }

    async fn fetch(&self, source: &str, options: &FetchOptions) -> Result<RawContent> {
        for fetcher in &self.fetchers {
            if fetcher.can_fetch(source) {
                return fetcher.fetch(source, options).await;
            }
        }
        Err(IngestError::fetch(source, "no fetcher accepts this source"))
    }
}
