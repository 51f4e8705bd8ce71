//! Local filesystem fetcher.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{FetchOptions, Fetcher};
use crate::error::{IngestError, Result};
use crate::models::{FetchStatus, RawContent};
use crate::utils::mime::{is_binary, mime_from_path, sniff_mime};

/// Fetcher for `file://` URLs and bare paths.
///
/// The etag is a hash of the file's mtime and size, so an unchanged file
/// answers `NotModified` to a conditional refetch without being read.
pub struct FileFetcher;

impl FileFetcher {
    pub fn new() -> Self {
        Self
    }

    /// Convert a source string to a filesystem path.
    pub fn to_path(source: &str) -> PathBuf {
        if let Some(rest) = source.strip_prefix("file://") {
            // Tolerate both file:///abs/path and file://abs/path forms.
            let decoded = urlencoding::decode(rest).map(|c| c.into_owned());
            return PathBuf::from(decoded.unwrap_or_else(|_| rest.to_string()));
        }
        PathBuf::from(source)
    }

    fn mtime_etag(meta: &std::fs::Metadata) -> String {
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let mut hasher = Sha256::new();
        hasher.update(format!("{mtime}-{}", meta.len()));
        hex::encode(&hasher.finalize()[..16])
    }
}

impl Default for FileFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for FileFetcher {
    fn can_fetch(&self, source: &str) -> bool {
        source.starts_with("file://") || Path::new(source).is_absolute()
    }

    async fn fetch(&self, source: &str, options: &FetchOptions) -> Result<RawContent> {
        if options.cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        let path = Self::to_path(source);
        let meta = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(RawContent::not_found(source));
            }
            Err(e) => return Err(IngestError::fetch(source, e.to_string())),
        };

        if meta.is_dir() {
            return Err(IngestError::fetch(
                source,
                "is a directory; directories are enumerated by the local strategy",
            ));
        }

        let etag = Self::mtime_etag(&meta);
        if options.etag.as_deref() == Some(etag.as_str()) {
            return Ok(RawContent::not_modified(source, Some(etag)));
        }

        let content = tokio::fs::read(&path)
            .await
            .map_err(|e| IngestError::fetch(source, e.to_string()))?;

        let path_str = path.to_string_lossy();
        let mime_type = if is_binary(&content) {
            sniff_mime(&content, &path_str)
        } else {
            mime_from_path(&path_str)
        };

        Ok(RawContent {
            content,
            mime_type,
            charset: None,
            source: source.to_string(),
            etag: Some(etag),
            last_modified: None,
            status: FetchStatus::Success,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn path_conversion() {
        assert_eq!(
            FileFetcher::to_path("file:///tmp/docs/readme.md"),
            PathBuf::from("/tmp/docs/readme.md")
        );
        assert_eq!(
            FileFetcher::to_path("file:///tmp/with%20space.md"),
            PathBuf::from("/tmp/with space.md")
        );
        assert_eq!(FileFetcher::to_path("/abs/path"), PathBuf::from("/abs/path"));
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let fetcher = FileFetcher::new();
        let raw = fetcher
            .fetch("file:///definitely/not/here.md", &FetchOptions::default())
            .await
            .unwrap();
        assert_eq!(raw.status, FetchStatus::NotFound);
    }

    #[tokio::test]
    async fn etag_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("doc.md");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "# hello").unwrap();
        drop(f);

        let fetcher = FileFetcher::new();
        let url = format!("file://{}", path.display());

        let first = fetcher.fetch(&url, &FetchOptions::default()).await.unwrap();
        assert_eq!(first.status, FetchStatus::Success);
        assert_eq!(first.mime_type, "text/markdown");
        let etag = first.etag.clone().unwrap();

        let second = fetcher
            .fetch(
                &url,
                &FetchOptions {
                    etag: Some(etag),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(second.status, FetchStatus::NotModified);
        assert!(second.content.is_empty());
    }
}
