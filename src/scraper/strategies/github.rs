//! GitHub strategy: repository trees, blobs and wikis.
//!
//! Depth 0 discovers: a repo URL expands (via the Git tree API) into
//! blob URLs for every text file, plus the wiki when the repo has one.
//! Deeper items fetch raw file contents or wiki pages and route them
//! through the content pipelines. A blob given as the root URL is
//! strict single-file scoping: only that file is ingested.

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use super::super::{ProcessedItem, ScraperStrategy};
use crate::error::{IngestError, Result};
use crate::fetcher::{FetchConfig, FetchOptions, Fetcher, HttpFetcher};
use crate::models::{FetchStatus, QueueItem, RawContent, ScraperOptions};
use crate::pipelines::PipelineRouter;
use crate::utils::mime::mime_from_path;

/// Extensions accepted from repository trees without further checks.
const TEXT_EXTENSIONS: &[&str] = &[
    "md", "mdx", "markdown", "rst", "adoc", "txt", "rs", "py", "pyi", "js", "jsx", "mjs",
    "cjs", "ts", "mts", "tsx", "go", "java", "c", "h", "cpp", "hpp", "cc", "cs", "rb", "php",
    "swift", "kt", "scala", "sh", "bash", "toml", "yaml", "yml", "json", "html", "htm", "css",
    "scss", "xml", "sql", "proto", "graphql", "gql", "ini", "cfg", "conf",
];

/// Extensionless files worth ingesting.
const TEXT_BASENAMES: &[&str] = &["readme", "makefile", "dockerfile", "justfile"];

#[derive(Debug, PartialEq)]
enum GitHubUrl {
    Repo {
        owner: String,
        repo: String,
        branch: Option<String>,
        sub_path: Option<String>,
    },
    Blob {
        owner: String,
        repo: String,
        branch: String,
        path: String,
    },
    Wiki {
        owner: String,
        repo: String,
    },
    /// Pre-rename scheme from old installs; answered with `NotFound` so
    /// refresh jobs delete the stale pages.
    Legacy,
}

fn parse_github_url(url: &str) -> Option<GitHubUrl> {
    if url.starts_with("github-file://") {
        return Some(GitHubUrl::Legacy);
    }
    let parsed = Url::parse(url).ok()?;
    if parsed.host_str()? != "github.com" {
        return None;
    }
    let segments: Vec<&str> = parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .collect();
    let (owner, repo) = match (segments.first(), segments.get(1)) {
        (Some(owner), Some(repo)) => (owner.to_string(), repo.to_string()),
        _ => return None,
    };

    match segments.get(2).copied() {
        None => Some(GitHubUrl::Repo {
            owner,
            repo,
            branch: None,
            sub_path: None,
        }),
        Some("tree") => {
            let branch = segments.get(3)?.to_string();
            let sub_path = if segments.len() > 4 {
                Some(segments[4..].join("/"))
            } else {
                None
            };
            Some(GitHubUrl::Repo {
                owner,
                repo,
                branch: Some(branch),
                sub_path,
            })
        }
        Some("blob") => {
            let branch = segments.get(3)?.to_string();
            if segments.len() < 5 {
                return None;
            }
            Some(GitHubUrl::Blob {
                owner,
                repo,
                branch,
                path: segments[4..].join("/"),
            })
        }
        Some("wiki") => Some(GitHubUrl::Wiki { owner, repo }),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    default_branch: String,
    #[serde(default)]
    has_wiki: bool,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

fn is_text_path(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path).to_lowercase();
    match name.rsplit_once('.') {
        Some((_, ext)) => {
            TEXT_EXTENSIONS.contains(&ext)
                || mime_guess::from_path(path)
                    .first_raw()
                    .is_some_and(|m| m.starts_with("text/"))
        }
        None => TEXT_BASENAMES.contains(&name.as_str()),
    }
}

pub struct GitHubStrategy {
    fetcher: HttpFetcher,
    router: PipelineRouter,
    fetch_config: FetchConfig,
}

impl GitHubStrategy {
    pub fn new() -> Self {
        Self::with_config(FetchConfig::default())
    }

    pub fn with_config(fetch_config: FetchConfig) -> Self {
        let fetcher = match &fetch_config.user_agent {
            Some(agent) => HttpFetcher::with_user_agent(agent),
            None => HttpFetcher::new(),
        };
        Self {
            fetcher,
            router: PipelineRouter::new(),
            fetch_config,
        }
    }

    fn api_fetch_options(
        &self,
        options: &ScraperOptions,
        cancel: &CancellationToken,
    ) -> FetchOptions {
        let mut headers = options.headers.clone().unwrap_or_default();
        headers
            .entry("Accept".to_string())
            .or_insert_with(|| "application/vnd.github+json".to_string());
        FetchOptions {
            headers,
            ..self.fetch_config.fetch_options(cancel)
        }
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        options: &ScraperOptions,
        cancel: &CancellationToken,
    ) -> Result<T> {
        let raw = self
            .fetcher
            .fetch(url, &self.api_fetch_options(options, cancel))
            .await?;
        if raw.status != FetchStatus::Success {
            return Err(IngestError::NotFound(format!("GitHub API: {url}")));
        }
        serde_json::from_slice(&raw.content)
            .map_err(|e| IngestError::Processing(format!("GitHub API response from {url}: {e}")))
    }

    /// Depth-0 repository expansion: wiki + one blob URL per text file.
    async fn discover_repo(
        &self,
        item: &QueueItem,
        owner: &str,
        repo: &str,
        branch: Option<&str>,
        sub_path: Option<&str>,
        options: &ScraperOptions,
        cancel: &CancellationToken,
    ) -> Result<ProcessedItem> {
        let info: RepoInfo = self
            .fetch_json(
                &format!("https://api.github.com/repos/{owner}/{repo}"),
                options,
                cancel,
            )
            .await?;
        let branch = branch.unwrap_or(&info.default_branch);

        let tree: TreeResponse = self
            .fetch_json(
                &format!(
                    "https://api.github.com/repos/{owner}/{repo}/git/trees/{branch}?recursive=1"
                ),
                options,
                cancel,
            )
            .await?;
        if tree.truncated {
            debug!(owner, repo, "GitHub tree listing truncated; large repository");
        }

        let prefix = sub_path.map(|p| format!("{}/", p.trim_matches('/')));
        let mut links: Vec<String> = Vec::new();
        if info.has_wiki && sub_path.is_none() {
            links.push(format!("https://github.com/{owner}/{repo}/wiki"));
        }
        for entry in &tree.tree {
            if entry.kind != "blob" {
                continue;
            }
            if let Some(prefix) = &prefix {
                if !entry.path.starts_with(prefix.as_str()) {
                    continue;
                }
            }
            if !is_text_path(&entry.path) {
                continue;
            }
            links.push(format!(
                "https://github.com/{owner}/{repo}/blob/{branch}/{}",
                entry.path
            ));
        }

        Ok(ProcessedItem {
            url: item.url.clone(),
            links,
            status: FetchStatus::Success,
            ..Default::default()
        })
    }

    /// Fetch one file's raw contents and chunk it.
    async fn process_blob(
        &self,
        item: &QueueItem,
        owner: &str,
        repo: &str,
        branch: &str,
        path: &str,
        options: &ScraperOptions,
        cancel: &CancellationToken,
    ) -> Result<ProcessedItem> {
        let raw_url = format!("https://raw.githubusercontent.com/{owner}/{repo}/{branch}/{path}");
        let raw = self
            .fetcher
            .fetch(
                &raw_url,
                &FetchOptions {
                    etag: item.etag.clone(),
                    headers: options.headers.clone().unwrap_or_default(),
                    ..self.fetch_config.fetch_options(cancel)
                },
            )
            .await?;

        match raw.status {
            FetchStatus::NotModified | FetchStatus::NotFound => Ok(ProcessedItem {
                url: item.url.clone(),
                etag: raw.etag.clone(),
                status: raw.status,
                ..Default::default()
            }),
            FetchStatus::Success => {
                // raw.githubusercontent serves everything as text/plain;
                // derive the real type from the path.
                let mime_type = match raw.mime_type.as_str() {
                    "" | "text/plain" | "application/octet-stream" => mime_from_path(path),
                    other => other.to_string(),
                };
                let raw = RawContent {
                    mime_type,
                    ..raw
                };

                let pipeline = self
                    .router
                    .route(&raw.mime_type, &raw.content)
                    .ok_or_else(|| {
                        IngestError::Processing(format!(
                            "unsupported content type {} at {}",
                            raw.mime_type, item.url
                        ))
                    })?;
                let result = pipeline.process(&raw, options, None, cancel).await?;

                Ok(ProcessedItem {
                    // Pages keep their blob URL identity, not the raw host.
                    url: item.url.clone(),
                    title: result.title.clone().or_else(|| {
                        path.rsplit('/').next().map(str::to_string)
                    }),
                    content_type: Some(result.content_type.clone()),
                    etag: raw.etag.clone(),
                    last_modified: raw.last_modified.clone(),
                    links: Vec::new(),
                    content: Some(result),
                    status: FetchStatus::Success,
                })
            }
        }
    }

    /// Fetch one wiki page and keep only same-wiki links.
    async fn process_wiki(
        &self,
        item: &QueueItem,
        owner: &str,
        repo: &str,
        options: &ScraperOptions,
        cancel: &CancellationToken,
    ) -> Result<ProcessedItem> {
        let raw = self
            .fetcher
            .fetch(
                &item.url,
                &FetchOptions {
                    etag: item.etag.clone(),
                    headers: options.headers.clone().unwrap_or_default(),
                    ..self.fetch_config.fetch_options(cancel)
                },
            )
            .await?;

        match raw.status {
            FetchStatus::NotModified | FetchStatus::NotFound => Ok(ProcessedItem {
                url: item.url.clone(),
                etag: raw.etag.clone(),
                status: raw.status,
                ..Default::default()
            }),
            FetchStatus::Success => {
                let pipeline = self
                    .router
                    .route(&raw.mime_type, &raw.content)
                    .ok_or_else(|| {
                        IngestError::Processing(format!(
                            "unsupported content type {} at {}",
                            raw.mime_type, item.url
                        ))
                    })?;
                let result = pipeline.process(&raw, options, None, cancel).await?;

                let wiki_prefix = format!("https://github.com/{owner}/{repo}/wiki");
                let links: Vec<String> = result
                    .links
                    .iter()
                    .filter(|l| l.starts_with(&wiki_prefix))
                    .cloned()
                    .collect();

                Ok(ProcessedItem {
                    url: raw.source.clone(),
                    title: result.title.clone(),
                    content_type: Some(result.content_type.clone()),
                    etag: raw.etag.clone(),
                    last_modified: raw.last_modified.clone(),
                    links,
                    content: Some(result),
                    status: FetchStatus::Success,
                })
            }
        }
    }
}

impl Default for GitHubStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScraperStrategy for GitHubStrategy {
    fn can_handle(&self, url: &str) -> bool {
        parse_github_url(url).is_some()
    }

    fn should_follow_link(
        &self,
        _base: &Url,
        url: &Url,
        _options: &ScraperOptions,
    ) -> Option<bool> {
        // Blob and wiki URLs emitted by discovery are always in scope;
        // anything else on github.com (issues, PRs, other repos) is not.
        match parse_github_url(url.as_str()) {
            Some(GitHubUrl::Blob { .. }) | Some(GitHubUrl::Wiki { .. }) => None,
            _ => Some(false),
        }
    }

    async fn process_item(
        &self,
        item: &QueueItem,
        options: &ScraperOptions,
        cancel: &CancellationToken,
    ) -> Result<ProcessedItem> {
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        match parse_github_url(&item.url) {
            Some(GitHubUrl::Legacy) => Ok(ProcessedItem {
                url: item.url.clone(),
                status: FetchStatus::NotFound,
                ..Default::default()
            }),
            Some(GitHubUrl::Repo {
                owner,
                repo,
                branch,
                sub_path,
            }) => {
                self.discover_repo(
                    item,
                    &owner,
                    &repo,
                    branch.as_deref(),
                    sub_path.as_deref(),
                    options,
                    cancel,
                )
                .await
            }
            Some(GitHubUrl::Blob {
                owner,
                repo,
                branch,
                path,
            }) => {
                self.process_blob(item, &owner, &repo, &branch, &path, options, cancel)
                    .await
            }
            Some(GitHubUrl::Wiki { owner, repo }) => {
                self.process_wiki(item, &owner, &repo, options, cancel).await
            }
            None => Err(IngestError::Validation(format!(
                "not a GitHub URL: {}",
                item.url
            ))),
        }
    }

    async fn cleanup(&self) {
        self.router.close_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_forms() {
        assert_eq!(
            parse_github_url("https://github.com/rust-lang/cargo"),
            Some(GitHubUrl::Repo {
                owner: "rust-lang".into(),
                repo: "cargo".into(),
                branch: None,
                sub_path: None,
            })
        );
        assert_eq!(
            parse_github_url("https://github.com/rust-lang/cargo/tree/master/src/doc"),
            Some(GitHubUrl::Repo {
                owner: "rust-lang".into(),
                repo: "cargo".into(),
                branch: Some("master".into()),
                sub_path: Some("src/doc".into()),
            })
        );
        assert_eq!(
            parse_github_url("https://github.com/rust-lang/cargo/blob/master/README.md"),
            Some(GitHubUrl::Blob {
                owner: "rust-lang".into(),
                repo: "cargo".into(),
                branch: "master".into(),
                path: "README.md".into(),
            })
        );
        assert_eq!(
            parse_github_url("https://github.com/rust-lang/cargo/wiki"),
            Some(GitHubUrl::Wiki {
                owner: "rust-lang".into(),
                repo: "cargo".into(),
            })
        );
        assert_eq!(
            parse_github_url("github-file://old/style"),
            Some(GitHubUrl::Legacy)
        );
        assert_eq!(parse_github_url("https://example.com/a/b"), None);
        assert_eq!(
            parse_github_url("https://github.com/rust-lang/cargo/issues/1"),
            None
        );
    }

    #[test]
    fn text_path_whitelist() {
        assert!(is_text_path("docs/guide.md"));
        assert!(is_text_path("src/lib.rs"));
        assert!(is_text_path("README"));
        assert!(is_text_path("Makefile"));
        assert!(!is_text_path("assets/logo.png"));
        assert!(!is_text_path("dist/bundle.wasm"));
    }

    #[tokio::test]
    async fn legacy_urls_report_not_found() {
        let strategy = GitHubStrategy::new();
        let options = ScraperOptions::new("github-file://x/y", "lib", None);
        let item = QueueItem::new("github-file://x/y", 0);
        let processed = strategy
            .process_item(&item, &options, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(processed.status, FetchStatus::NotFound);
    }
}
