//! Content pipelines: MIME detection and byte → chunk transformation.
//!
//! A pipeline accepts raw fetched bytes and produces a title, canonical
//! text, outgoing links and ordered chunks. Routing tries pipelines in a
//! stable order — JSON → SourceCode → HTML → Markdown → Text — and the
//! first `can_process` match wins. Text is the universal fallback for
//! non-binary content.

mod html;
mod json;
mod markdown;
pub mod middleware;
mod source_code;
mod text;

pub use html::HtmlPipeline;
pub use json::JsonPipeline;
pub use markdown::MarkdownPipeline;
pub use source_code::SourceCodePipeline;
pub use text::TextPipeline;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::fetcher::BrowserRenderer;
use crate::models::{Chunk, RawContent, ScraperOptions};
use crate::splitters::ChunkSizes;

/// Output of one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineResult {
    pub title: Option<String>,
    pub content_type: String,
    /// Canonical text form of the page (markdown for HTML input).
    pub text_content: String,
    pub links: Vec<String>,
    /// Non-fatal stage errors collected along the way.
    pub errors: Vec<String>,
    pub chunks: Vec<Chunk>,
}

/// One content transformation, long-lived until the owning strategy is
/// closed. Pipelines own their splitters and any heavyweight resources.
#[async_trait]
pub trait ContentPipeline: Send + Sync {
    /// Cheap routing check over MIME type and (optionally) leading bytes.
    fn can_process(&self, mime: &str, content: &[u8]) -> bool;

    async fn process(
        &self,
        raw: &RawContent,
        options: &ScraperOptions,
        renderer: Option<&dyn BrowserRenderer>,
        cancel: &CancellationToken,
    ) -> Result<PipelineResult>;

    /// Release owned resources. Default: nothing to do.
    async fn close(&self) {}
}

/// Stable-ordered pipeline registry.
pub struct PipelineRouter {
    pipelines: Vec<Box<dyn ContentPipeline>>,
}

impl PipelineRouter {
    /// Standard router with the default chunk sizing.
    pub fn new() -> Self {
        Self::with_sizes(ChunkSizes::default())
    }

    pub fn with_sizes(sizes: ChunkSizes) -> Self {
        Self {
            pipelines: vec![
                Box::new(JsonPipeline::new(sizes)),
                Box::new(SourceCodePipeline::new(sizes)),
                Box::new(HtmlPipeline::new(sizes)),
                Box::new(MarkdownPipeline::new(sizes)),
                Box::new(TextPipeline::new(sizes)),
            ],
        }
    }

    /// First pipeline accepting the content, in routing order.
    pub fn route(&self, mime: &str, content: &[u8]) -> Option<&dyn ContentPipeline> {
        self.pipelines
            .iter()
            .find(|p| p.can_process(mime, content))
            .map(|p| p.as_ref())
    }

    pub async fn close_all(&self) {
        for pipeline in &self.pipelines {
            pipeline.close().await;
        }
    }
}

impl Default for PipelineRouter {
    fn default() -> Self {
        Self::new()
    }
}
