//! Browser rendering backend contract.
//!
//! Rendering lives in a separate subsystem; the engine only depends on
//! this trait. The web strategy consults it when `scrape_mode` is
//! `playwright` (always render) or `auto` (render HTML when a backend is
//! configured).

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::RawContent;

/// Headless-browser rendering contract.
#[async_trait]
pub trait BrowserRenderer: Send + Sync {
    /// Navigate to `url`, wait for the page to settle, and return the
    /// rendered HTML. Implementations must honor the token and raise
    /// `IngestError::Cancelled` when it fires.
    async fn render(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<RawContent>;

    /// Tear down browser resources. Called once by the owning strategy.
    async fn close(&self);
}
