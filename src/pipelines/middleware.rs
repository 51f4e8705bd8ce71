//! Middleware chain shared by the content pipelines.
//!
//! Each stage receives the context and an owned `Next`; calling
//! `next.run(ctx)` hands control to the remainder of the chain. `Next`
//! is consumed by the call, so invoking it twice is a compile error
//! rather than a runtime chain fault. Stage failures are recorded in
//! `ctx.errors` and the chain keeps going.

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::fetcher::BrowserRenderer;
use crate::models::ScraperOptions;

/// Mutable state threaded through a pipeline's stages.
pub struct PipelineContext<'a> {
    /// Current textual content; stages rewrite it in place
    /// (HTML → sanitized HTML → markdown, …).
    pub content: String,
    pub content_type: String,
    /// Final URL the bytes came from; base for link resolution.
    pub source: Url,
    pub options: &'a ScraperOptions,
    pub title: Option<String>,
    pub links: Vec<String>,
    pub errors: Vec<String>,
    pub renderer: Option<&'a dyn BrowserRenderer>,
    pub cancel: &'a CancellationToken,
    /// Set when a stage observed cancellation; later stages skip and the
    /// owning pipeline surfaces `IngestError::Cancelled` unchanged.
    pub cancelled: bool,
}

impl PipelineContext<'_> {
    /// Record a stage failure without aborting the chain.
    pub fn record_error(&mut self, error: impl std::fmt::Display) {
        self.errors.push(error.to_string());
    }
}

/// A pipeline stage.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, ctx: &mut PipelineContext<'_>, next: Next<'_>);
}

/// Remainder of the chain. Consumed on use.
pub struct Next<'a> {
    stack: &'a [Box<dyn Middleware + 'a>],
}

impl<'a> Next<'a> {
    pub fn run<'c>(self, ctx: &'c mut PipelineContext<'_>) -> BoxFuture<'c, ()>
    where
        'a: 'c,
    {
        Box::pin(async move {
            if let Some((head, rest)) = self.stack.split_first() {
                head.handle(ctx, Next { stack: rest }).await;
            }
        })
    }
}

/// Run a full chain over the context.
pub async fn run_chain<'a>(
    middlewares: &'a [Box<dyn Middleware + 'a>],
    ctx: &mut PipelineContext<'_>,
) {
    Next { stack: middlewares }.run(ctx).await;
}
