//! JSON pipeline: structure-aware chunking, never extracts links.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{ContentPipeline, PipelineResult};
use crate::error::{IngestError, Result};
use crate::fetcher::BrowserRenderer;
use crate::models::{Chunk, ChunkType, RawContent, ScraperOptions, SectionInfo};
use crate::splitters::{split_preserving, ChunkSizes};

pub struct JsonPipeline {
    sizes: ChunkSizes,
}

impl JsonPipeline {
    pub fn new(sizes: ChunkSizes) -> Self {
        Self { sizes }
    }

    /// Emit the value whole when it fits, otherwise descend into its
    /// children, extending the section path with the key or index.
    fn chunk_value(&self, value: &Value, path: &[String], out: &mut Vec<Chunk>) {
        let serialized = pretty(value);
        if serialized.len() <= self.sizes.max {
            out.push(Chunk::new(
                vec![ChunkType::Code],
                serialized,
                SectionInfo::new(path.len(), path.to_vec()),
            ));
            return;
        }

        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    let mut child_path = path.to_vec();
                    child_path.push(key.clone());
                    self.chunk_value(child, &child_path, out);
                }
            }
            Value::Array(items) => {
                for (index, child) in items.iter().enumerate() {
                    let mut child_path = path.to_vec();
                    child_path.push(index.to_string());
                    self.chunk_value(child, &child_path, out);
                }
            }
            _ => {
                // A scalar too large for one chunk (giant string): hard cut.
                for piece in split_preserving(&serialized, self.sizes.max) {
                    out.push(Chunk::new(
                        vec![ChunkType::Code],
                        piece,
                        SectionInfo::new(path.len(), path.to_vec()),
                    ));
                }
            }
        }
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[async_trait]
impl ContentPipeline for JsonPipeline {
    fn can_process(&self, mime: &str, content: &[u8]) -> bool {
        let mime = mime.split(';').next().unwrap_or(mime).trim();
        if mime == "application/json" || mime.ends_with("+json") {
            return true;
        }
        // Sniff bare JSON served with a generic type.
        if matches!(mime, "" | "text/plain" | "application/octet-stream") {
            let head = String::from_utf8_lossy(&content[..content.len().min(64)]);
            let head = head.trim_start();
            return (head.starts_with('{') || head.starts_with('['))
                && serde_json::from_slice::<Value>(content).is_ok();
        }
        false
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

        let value: Value = serde_json::from_slice(&raw.content)
            .map_err(|e| IngestError::Processing(format!("invalid JSON: {e}")))?;
        let text_content = pretty(&value);

        let mut chunks = Vec::new();
        self.chunk_value(&value, &[], &mut chunks);

        Ok(PipelineResult {
            title: None,
            content_type: "application/json".to_string(),
            text_content,
            links: Vec::new(),
            errors: Vec::new(),
            chunks,
        })
    }
}
