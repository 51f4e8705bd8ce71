//! HTML pipeline: render → parse → extract → sanitize → normalize →
//! markdown → chunks.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use super::middleware::{run_chain, Middleware, Next, PipelineContext};
use super::{ContentPipeline, PipelineResult};
use crate::error::{IngestError, Result};
use crate::fetcher::BrowserRenderer;
use crate::models::{RawContent, ScrapeMode, ScraperOptions};
use crate::splitters::{merge_chunks, ChunkSizes, SemanticMarkdownSplitter};
use crate::utils::mime::decode_text;

/// Elements dropped wholesale before conversion.
const SANITIZE_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "iframe", "object", "embed", "head",
];

/// Tracking hosts whose images are stripped (substring match,
/// case-insensitive; `data:` URIs always survive).
const TRACKER_DOMAINS: &[&str] = &[
    "google-analytics.com",
    "googletagmanager.com",
    "doubleclick.net",
    "facebook.com/tr",
    "quantserve.com",
    "scorecardresearch.com",
    "hotjar.com",
    "mixpanel.com",
    "segment.io",
    "stats.wp.com",
    "pixel.wp.com",
];

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

pub struct HtmlPipeline {
    sizes: ChunkSizes,
}

impl HtmlPipeline {
    pub fn new(sizes: ChunkSizes) -> Self {
        Self { sizes }
    }
}

#[async_trait]
impl ContentPipeline for HtmlPipeline {
    fn can_process(&self, mime: &str, content: &[u8]) -> bool {
        let mime = mime.split(';').next().unwrap_or(mime).trim();
        if matches!(mime, "text/html" | "application/xhtml+xml") {
            return true;
        }
        // Sniff when the server lied or stayed silent.
        let head = String::from_utf8_lossy(&content[..content.len().min(512)]).to_lowercase();
        head.trim_start().starts_with("<!doctype html") || head.contains("<html")
    }

    async fn process(
        &self,
        raw: &RawContent,
        options: &ScraperOptions,
        renderer: Option<&dyn BrowserRenderer>,
        cancel: &CancellationToken,
    ) -> Result<PipelineResult> {
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        let source = Url::parse(&raw.source)?;
        let mut ctx = PipelineContext {
            content: decode_text(&raw.content, raw.charset.as_deref()),
            content_type: raw.mime_type.clone(),
            source,
            options,
            title: None,
            links: Vec::new(),
            errors: Vec::new(),
            renderer,
            cancel,
            cancelled: false,
        };

        let mut chain: Vec<Box<dyn Middleware>> = Vec::new();
        if renderer.is_some() && options.scrape_mode != ScrapeMode::Fetch {
            chain.push(Box::new(RenderStage));
        }
        chain.push(Box::new(ExtractMetadata));
        chain.push(Box::new(ExtractLinks));
        chain.push(Box::new(Sanitize));
        chain.push(Box::new(NormalizeDom));
        chain.push(Box::new(ConvertToMarkdown));
        run_chain(&chain, &mut ctx).await;

        if ctx.cancelled || cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        let splitter = SemanticMarkdownSplitter::new(self.sizes);
        let chunks = merge_chunks(splitter.split(&ctx.content), self.sizes);

        Ok(PipelineResult {
            title: ctx.title,
            content_type: raw.mime_type.clone(),
            text_content: ctx.content,
            links: ctx.links,
            errors: ctx.errors,
            chunks,
        })
    }
}

/// Optional browser-rendering stage, prepended when a backend is
/// configured and `scrape_mode` allows it.
struct RenderStage;

#[async_trait]
impl Middleware for RenderStage {
    async fn handle(&self, ctx: &mut PipelineContext<'_>, next: Next<'_>) {
        if ctx.cancelled {
            return;
        }
        let Some(renderer) = ctx.renderer else {
            next.run(ctx).await;
            return;
        };
        let headers = ctx.options.headers.clone().unwrap_or_default();
        match renderer.render(ctx.source.as_str(), &headers, ctx.cancel).await {
            Ok(rendered) => {
                ctx.content = decode_text(&rendered.content, rendered.charset.as_deref());
                if let Ok(final_url) = Url::parse(&rendered.source) {
                    ctx.source = final_url;
                }
            }
            Err(e) if e.is_cancelled() => {
                ctx.cancelled = true;
                return;
            }
            Err(e) => {
                // Fall back to the already-fetched HTML.
                debug!(url = %ctx.source, %e, "browser render failed, using fetched HTML");
                ctx.record_error(e);
            }
        }
        next.run(ctx).await;
    }
}

struct ExtractMetadata;

#[async_trait]
impl Middleware for ExtractMetadata {
    async fn handle(&self, ctx: &mut PipelineContext<'_>, next: Next<'_>) {
        if ctx.cancelled {
            return;
        }
        ctx.title = {
            let dom = Html::parse_document(&ctx.content);
            extract_title(&dom)
        };
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
        ctx.links = {
            let dom = Html::parse_document(&ctx.content);
            extract_links(&dom, &ctx.source)
        };
        next.run(ctx).await;
    }
}

/// Drops non-content elements from the DOM.
struct Sanitize;

#[async_trait]
impl Middleware for Sanitize {
    async fn handle(&self, ctx: &mut PipelineContext<'_>, next: Next<'_>) {
        if ctx.cancelled {
            return;
        }
        ctx.content = {
            let dom = Html::parse_document(&ctx.content);
            serialize_filtered(&dom, &|el| {
                if SANITIZE_TAGS.contains(&el.value().name()) {
                    ElementAction::Skip
                } else {
                    ElementAction::keep(el)
                }
            })
        };
        next.run(ctx).await;
    }
}

/// Applies the image and link normalization rules.
struct NormalizeDom;

#[async_trait]
impl Middleware for NormalizeDom {
    async fn handle(&self, ctx: &mut PipelineContext<'_>, next: Next<'_>) {
        if ctx.cancelled {
            return;
        }
        ctx.content = {
            let dom = Html::parse_document(&ctx.content);
            let base = ctx.source.clone();
            serialize_filtered(&dom, &|el| normalize_element(el, &base))
        };
        next.run(ctx).await;
    }
}

/// HTML → Markdown conversion.
struct ConvertToMarkdown;

#[async_trait]
impl Middleware for ConvertToMarkdown {
    async fn handle(&self, ctx: &mut PipelineContext<'_>, next: Next<'_>) {
        if ctx.cancelled {
            return;
        }
        let converted = {
            let converter = htmd::HtmlToMarkdown::builder()
                .skip_tags(vec!["script", "style"])
                .build();
            converter.convert(&ctx.content)
        };
        match converted {
            Ok(markdown) => ctx.content = markdown,
            Err(e) => ctx.record_error(format!("markdown conversion failed: {e}")),
        }
        next.run(ctx).await;
    }
}

fn extract_title(dom: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;
    if let Some(el) = dom.select(&title_selector).next() {
        let text: String = el.text().collect::<String>().trim().to_string();
        if !text.is_empty() {
            return Some(text);
        }
    }
    let og = Selector::parse(r#"meta[property="og:title"]"#).ok()?;
    if let Some(el) = dom.select(&og).next() {
        if let Some(content) = el.value().attr("content") {
            let content = content.trim();
            if !content.is_empty() {
                return Some(content.to_string());
            }
        }
    }
    let h1 = Selector::parse("h1").ok()?;
    dom.select(&h1)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

fn extract_links(dom: &Html, base: &Url) -> Vec<String> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let mut links = Vec::new();
    for el in dom.select(&selector) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') {
            continue;
        }
        if let Ok(resolved) = base.join(href) {
            if matches!(resolved.scheme(), "http" | "https") {
                links.push(resolved.to_string());
            }
        }
    }
    links
}

/// What serialization does with one element.
enum ElementAction {
    /// Drop the element and its subtree.
    Skip,
    /// Drop the tag but keep serializing its children.
    Unwrap,
    /// Emit with the given attribute list.
    Emit(Vec<(String, String)>),
}

impl ElementAction {
    fn keep(el: ElementRef<'_>) -> Self {
        Self::Emit(
            el.value()
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

fn is_tracker(url: &str) -> bool {
    let lower = url.to_lowercase();
    TRACKER_DOMAINS.iter().any(|d| lower.contains(d))
}

/// §-rules for `img` and `a`; everything else passes through.
fn normalize_element(el: ElementRef<'_>, base: &Url) -> ElementAction {
    match el.value().name() {
        "img" => {
            let Some(src) = el.value().attr("src").map(str::trim).filter(|s| !s.is_empty())
            else {
                return ElementAction::Skip;
            };
            if src.starts_with("data:") {
                return ElementAction::keep(el);
            }
            let Ok(resolved) = base.join(src) else {
                return ElementAction::Skip;
            };
            if is_tracker(resolved.as_str()) {
                return ElementAction::Skip;
            }
            let mut attrs: Vec<(String, String)> = el
                .value()
                .attrs()
                .filter(|(k, _)| *k != "src")
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            attrs.push(("src".to_string(), resolved.to_string()));
            ElementAction::Emit(attrs)
        }
        "a" => {
            let href = el.value().attr("href").map(str::trim).unwrap_or("");
            if href.is_empty() || href.starts_with('#') {
                return ElementAction::Unwrap;
            }
            let Ok(resolved) = base.join(href) else {
                return ElementAction::Unwrap;
            };
            if !matches!(resolved.scheme(), "http" | "https") {
                return ElementAction::Unwrap;
            }
            let mut attrs: Vec<(String, String)> = el
                .value()
                .attrs()
                .filter(|(k, _)| *k != "href")
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            attrs.push(("href".to_string(), resolved.to_string()));
            ElementAction::Emit(attrs)
        }
        _ => ElementAction::keep(el),
    }
}

/// Serialize the DOM back to HTML, consulting `decide` per element.
fn serialize_filtered(dom: &Html, decide: &dyn Fn(ElementRef<'_>) -> ElementAction) -> String {
    let mut out = String::with_capacity(1024);
    serialize_element(dom.root_element(), decide, &mut out);
    out
}

fn serialize_element(
    el: ElementRef<'_>,
    decide: &dyn Fn(ElementRef<'_>) -> ElementAction,
    out: &mut String,
) {
    let name = el.value().name();
    match decide(el) {
        ElementAction::Skip => {}
        ElementAction::Unwrap => serialize_children(el, decide, out),
        ElementAction::Emit(attrs) => {
            out.push('<');
            out.push_str(name);
            for (key, value) in &attrs {
                out.push(' ');
                out.push_str(key);
                out.push_str("=\"");
                out.push_str(&escape_attr(value));
                out.push('"');
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&name) {
                return;
            }
            serialize_children(el, decide, out);
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
    }
}

fn serialize_children(
    el: ElementRef<'_>,
    decide: &dyn Fn(ElementRef<'_>) -> ElementAction,
    out: &mut String,
) {
    for child in el.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            serialize_element(child_el, decide, out);
        } else if let scraper::Node::Text(text) = child.value() {
            out.push_str(&escape_text(text));
        }
    }
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FetchStatus;

    fn raw(html: &str, source: &str) -> RawContent {
        RawContent {
            content: html.as_bytes().to_vec(),
            mime_type: "text/html".to_string(),
            charset: Some("utf-8".to_string()),
            source: source.to_string(),
            etag: None,
            last_modified: None,
            status: FetchStatus::Success,
        }
    }

    async fn process(html: &str, source: &str) -> PipelineResult {
        let pipeline = HtmlPipeline::new(ChunkSizes::default());
        let options = ScraperOptions::new(source, "lib", None);
        let cancel = CancellationToken::new();
        pipeline
            .process(&raw(html, source), &options, None, &cancel)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn extracts_title_links_and_markdown() {
        let html = r#"<html><head><title>Guide</title></head><body>
            <h1>Install</h1>
            <p>Run the <a href="/docs/setup">setup</a> first.</p>
            <script>evil()</script>
        </body></html>"#;
        let result = process(html, "https://example.com/docs/").await;

        assert_eq!(result.title.as_deref(), Some("Guide"));
        assert_eq!(result.links, vec!["https://example.com/docs/setup"]);
        assert!(result.text_content.contains("# Install"));
        assert!(!result.text_content.contains("evil"));
        assert!(!result.chunks.is_empty());
    }

    #[tokio::test]
    async fn unwraps_fragment_and_non_http_links() {
        let html = r##"<body>
            <p><a href="#section">anchor text</a></p>
            <p><a href="mailto:x@y.z">mail text</a></p>
            <p><a href="https://example.com/ok">kept</a></p>
        </body>"##;
        let result = process(html, "https://example.com/").await;
        assert!(result.text_content.contains("anchor text"));
        assert!(!result.text_content.contains("#section"));
        assert!(result.text_content.contains("mail text"));
        assert!(!result.text_content.contains("mailto"));
        assert!(result.text_content.contains("https://example.com/ok"));
    }

    #[tokio::test]
    async fn strips_tracker_and_srcless_images_resolves_rest() {
        let html = r#"<body>
            <img alt="no source">
            <img src="https://www.google-analytics.com/collect?x=1">
            <img src="/logo.png" alt="logo">
            <img src="data:image/gif;base64,R0lGOD" alt="inline">
        </body>"#;
        let result = process(html, "https://example.com/docs/page").await;
        assert!(!result.text_content.contains("google-analytics"));
        assert!(result.text_content.contains("https://example.com/logo.png"));
        assert!(result.text_content.contains("data:image/gif"));
    }

    #[tokio::test]
    async fn sniffs_html_without_mime() {
        let pipeline = HtmlPipeline::new(ChunkSizes::default());
        assert!(pipeline.can_process("", b"<!DOCTYPE html><html></html>"));
        assert!(pipeline.can_process("text/html", b""));
        assert!(!pipeline.can_process("text/plain", b"just words"));
    }
}
