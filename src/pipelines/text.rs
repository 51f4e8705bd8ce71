//! Plain-text pipeline, the universal fallback.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{ContentPipeline, PipelineResult};
use crate::error::{IngestError, Result};
use crate::fetcher::BrowserRenderer;
use crate::models::{RawContent, ScraperOptions};
use crate::splitters::{merge_chunks, ChunkSizes, TextSplitter};
use crate::utils::mime::{decode_text, is_binary, is_text_mime};

pub struct TextPipeline {
    sizes: ChunkSizes,
}

impl TextPipeline {
    pub fn new(sizes: ChunkSizes) -> Self {
        Self { sizes }
    }
}

#[async_trait]
impl ContentPipeline for TextPipeline {
    fn can_process(&self, mime: &str, content: &[u8]) -> bool {
        if is_binary(content) {
            return false;
        }
        let mime = mime.split(';').next().unwrap_or(mime).trim();
        mime.is_empty() || is_text_mime(mime)
    }

    async fn process(
        &self,
        raw: &RawContent,
        _options: &ScraperOptions,
        _renderer: Option<&dyn BrowserRenderer>,
        cancel: &CancellationToken,
    ) -> Result<PipelineResult> {
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        if is_binary(&raw.content) {
            return Err(IngestError::Processing(format!(
                "refusing binary content from {}",
                raw.source
            )));
        }

        let text = decode_text(&raw.content, raw.charset.as_deref());
        let splitter = TextSplitter::new(self.sizes);
        let chunks = merge_chunks(splitter.split(&text), self.sizes);

        Ok(PipelineResult {
            title: None,
            content_type: if raw.mime_type.is_empty() {
                "text/plain".to_string()
            } else {
                raw.mime_type.clone()
            },
            text_content: text,
            links: Vec::new(),
            errors: Vec::new(),
            chunks,
        })
    }
}
