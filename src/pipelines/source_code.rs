//! Source-code pipeline.
//!
//! Routes through the tree-sitter splitter, which preserves the
//! `{level, path}` hierarchy. No greedy merging: packing chunks across
//! declaration edges would blur the structural boundaries the splitter
//! just recovered.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{ContentPipeline, PipelineResult};
use crate::error::{IngestError, Result};
use crate::fetcher::BrowserRenderer;
use crate::models::{RawContent, ScraperOptions};
use crate::splitters::{ChunkSizes, SourceLanguage, TreesitterSourceSplitter};
use crate::utils::mime::decode_text;

pub struct SourceCodePipeline {
    splitter: TreesitterSourceSplitter,
}

impl SourceCodePipeline {
    pub fn new(sizes: ChunkSizes) -> Self {
        Self {
            splitter: TreesitterSourceSplitter::new(sizes),
        }
    }

    fn language_for(raw: &RawContent) -> Option<SourceLanguage> {
        SourceLanguage::from_mime(&raw.mime_type).or_else(|| SourceLanguage::from_path(&raw.source))
    }
}

#[async_trait]
impl ContentPipeline for SourceCodePipeline {
    fn can_process(&self, mime: &str, _content: &[u8]) -> bool {
        SourceLanguage::from_mime(mime).is_some()
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

        let language = Self::language_for(raw).ok_or_else(|| {
            IngestError::Processing(format!("no grammar for {}", raw.mime_type))
        })?;
        let source = decode_text(&raw.content, raw.charset.as_deref());
        let chunks = self.splitter.split(&source, language)?;

        let title = file_stem(&raw.source);

        Ok(PipelineResult {
            title,
            content_type: raw.mime_type.clone(),
            text_content: source,
            links: Vec::new(),
            errors: Vec::new(),
            chunks,
        })
    }
}

fn file_stem(source: &str) -> Option<String> {
    let path = source.split(['?', '#']).next().unwrap_or(source);
    let name = path.rsplit('/').next()?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
