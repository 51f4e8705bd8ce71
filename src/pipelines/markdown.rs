//! Markdown pipeline.

use async_trait::async_trait;
use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::middleware::{run_chain, Middleware, Next, PipelineContext};
use super::{ContentPipeline, PipelineResult};
use crate::error::{IngestError, Result};
use crate::fetcher::BrowserRenderer;
use crate::models::{RawContent, ScraperOptions};
use crate::splitters::{merge_chunks, ChunkSizes, SemanticMarkdownSplitter};
use crate::utils::mime::decode_text;

pub struct MarkdownPipeline {
    sizes: ChunkSizes,
}

impl MarkdownPipeline {
    pub fn new(sizes: ChunkSizes) -> Self {
        Self { sizes }
    }
}

#[async_trait]
impl ContentPipeline for MarkdownPipeline {
    fn can_process(&self, mime: &str, _content: &[u8]) -> bool {
        let mime = mime.split(';').next().unwrap_or(mime).trim();
        matches!(mime, "text/markdown" | "text/x-markdown")
    }

    async fn process(
        &self,
        raw: &RawContent,
        options: &ScraperOptions,
        _renderer: Option<&dyn BrowserRenderer>,
        cancel: &CancellationToken,
    ) -> Result<PipelineResult> {
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        let mut ctx = PipelineContext {
            content: decode_text(&raw.content, raw.charset.as_deref()),
            content_type: raw.mime_type.clone(),
            source: Url::parse(&raw.source)
                .unwrap_or_else(|_| Url::parse("file:///").expect("static URL parses")),
            options,
            title: None,
            links: Vec::new(),
            errors: Vec::new(),
            renderer: None,
            cancel,
            cancelled: false,
        };

        let chain: Vec<Box<dyn Middleware>> =
            vec![Box::new(ExtractMetadata), Box::new(ExtractLinks)];
        run_chain(&chain, &mut ctx).await;

        if ctx.cancelled || cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        let splitter = SemanticMarkdownSplitter::new(self.sizes);
        let chunks = merge_chunks(splitter.split(&ctx.content), self.sizes);

        Ok(PipelineResult {
            title: ctx.title,
            content_type: "text/markdown".to_string(),
            text_content: ctx.content,
            links: ctx.links,
            errors: ctx.errors,
            chunks,
        })
    }
}

/// Title = text of the first level-1 heading.
struct ExtractMetadata;

#[async_trait]
impl Middleware for ExtractMetadata {
    async fn handle(&self, ctx: &mut PipelineContext<'_>, next: Next<'_>) {
        if ctx.cancelled {
            return;
        }
        ctx.title = first_h1(&ctx.content);
        next.run(ctx).await;
    }
}

struct ExtractLinks;

#[async_trait]
impl Middleware for ExtractLinks {
    async fn handle(&self, ctx: &mut PipelineContext<'_>, next: Next<'_>) {
        if ctx.cancelled {
            return;
        }
        ctx.links = markdown_links(&ctx.content, &ctx.source);
        next.run(ctx).await;
    }
}

fn first_h1(markdown: &str) -> Option<String> {
    let mut in_h1 = false;
    let mut title = String::new();
    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::Heading {
                level: HeadingLevel::H1,
                ..
            }) => in_h1 = true,
            Event::End(TagEnd::Heading(HeadingLevel::H1)) => {
                let trimmed = title.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
                in_h1 = false;
            }
            Event::Text(t) | Event::Code(t) if in_h1 => title.push_str(&t),
            _ => {}
        }
    }
    None
}

fn markdown_links(markdown: &str, base: &Url) -> Vec<String> {
    let mut links = Vec::new();
    for event in Parser::new(markdown) {
        if let Event::Start(Tag::Link { dest_url, .. }) = event {
            let dest = dest_url.trim();
            if dest.is_empty() || dest.starts_with('#') {
                continue;
            }
            if let Ok(resolved) = base.join(dest) {
                if matches!(resolved.scheme(), "http" | "https" | "file") {
                    links.push(resolved.to_string());
                }
            }
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FetchStatus;

    fn raw(md: &str) -> RawContent {
        RawContent {
            content: md.as_bytes().to_vec(),
            mime_type: "text/markdown".to_string(),
            charset: None,
            source: "https://example.com/docs/readme".to_string(),
            etag: None,
            last_modified: None,
            status: FetchStatus::Success,
        }
    }

    #[tokio::test]
    async fn extracts_title_links_and_chunks() {
        let pipeline = MarkdownPipeline::new(ChunkSizes::default());
        let options = ScraperOptions::new("https://example.com/docs/", "lib", None);
        let cancel = CancellationToken::new();
        let md = "# Getting Started\n\nSee [the guide](./guide) and [api](https://example.com/api).\n";
        let result = pipeline
            .process(&raw(md), &options, None, &cancel)
            .await
            .unwrap();

        assert_eq!(result.title.as_deref(), Some("Getting Started"));
        assert_eq!(
            result.links,
            vec![
                "https://example.com/docs/guide".to_string(),
                "https://example.com/api".to_string(),
            ]
        );
        assert!(!result.chunks.is_empty());
        assert_eq!(result.content_type, "text/markdown");
    }

    #[tokio::test]
    async fn cancellation_propagates() {
        let pipeline = MarkdownPipeline::new(ChunkSizes::default());
        let options = ScraperOptions::new("https://example.com/", "lib", None);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = pipeline
            .process(&raw("# x"), &options, None, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
