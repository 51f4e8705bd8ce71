//! Breadth-first crawl shared by every strategy.
//!
//! Single source of truth for frontier management: visited-set dedup,
//! depth limits, the page budget, scope/pattern filtering, progress
//! counting and cancellation. Strategies only implement `process_item`.

use std::collections::{HashSet, VecDeque};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use super::urls::{normalize_url, should_process_url, UrlPatternFilter};
use super::{ProcessedItem, ScrapeCallback, ScraperStrategy};
use crate::error::{IngestError, Result};
use crate::models::{FetchStatus, ProgressSnapshot, QueueItem, ScrapeResult, ScraperOptions};

/// Crawl one source to completion (or budget/cancellation).
pub async fn crawl(
    strategy: &dyn ScraperStrategy,
    options: &ScraperOptions,
    callback: &ScrapeCallback,
    cancel: &CancellationToken,
) -> Result<()> {
    let normalize = strategy.normalize_options();
    let filter = UrlPatternFilter::from_options(options);
    let mut canonical_base = Url::parse(&options.url)?;

    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<QueueItem> = VecDeque::new();

    // Seed: refresh items first, then the root unless already present.
    for item in &options.initial_queue {
        if visited.insert(normalize_url(&item.url, &normalize)) {
            queue.push_back(item.clone());
        }
    }
    let root_key = normalize_url(&options.url, &normalize);
    if visited.insert(root_key) {
        queue.push_front(QueueItem::new(options.url.clone(), 0));
    }

    let mut pages_scraped = 0usize;
    let mut total_discovered = queue.len();
    let mut effective_total = queue.len();

    while !queue.is_empty() && options.max_pages.map_or(true, |max| pages_scraped < max) {
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        let remaining = options
            .max_pages
            .map_or(usize::MAX, |max| max - pages_scraped);
        let batch_size = options
            .max_concurrency
            .max(1)
            .min(remaining)
            .min(queue.len());
        let batch: Vec<QueueItem> = queue.drain(..batch_size).collect();

        let results = join_all(batch.iter().map(|item| async {
            if item.depth > options.max_depth {
                debug!(url = %item.url, depth = item.depth, "dropping item beyond max depth");
                return None;
            }
            Some(strategy.process_item(item, options, cancel).await)
        }))
        .await;

        let mut discovered: Vec<QueueItem> = Vec::new();

        for (item, result) in batch.iter().zip(results) {
            let Some(result) = result else {
                continue;
            };
            let processed = match result {
                Ok(processed) => processed,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    if options.ignore_errors {
                        warn!(url = %item.url, %e, "page failed, continuing");
                        continue;
                    }
                    return Err(e);
                }
            };

            // Counting rule: only items with a persistent identity or
            // fresh content count against the budget.
            let counted = item.page_id.is_some() || processed.content.is_some();

            match processed.status {
                FetchStatus::NotModified => {
                    if counted {
                        pages_scraped += 1;
                        emit(
                            callback,
                            cancel,
                            snapshot(
                                item,
                                &processed,
                                pages_scraped,
                                effective_total,
                                total_discovered,
                                options,
                                false,
                                None,
                            ),
                        )
                        .await?;
                    }
                }
                FetchStatus::NotFound => {
                    if counted {
                        pages_scraped += 1;
                        emit(
                            callback,
                            cancel,
                            snapshot(
                                item,
                                &processed,
                                pages_scraped,
                                effective_total,
                                total_discovered,
                                options,
                                true,
                                None,
                            ),
                        )
                        .await?;
                    }
                }
                FetchStatus::Success => {
                    let link_base = Url::parse(&processed.url)
                        .unwrap_or_else(|_| canonical_base.clone());
                    if item.depth == 0 {
                        // Redirected roots move the scope anchor.
                        canonical_base = link_base.clone();
                    }

                    if counted {
                        pages_scraped += 1;
                        let result = build_scrape_result(&processed);
                        emit(
                            callback,
                            cancel,
                            snapshot(
                                item,
                                &processed,
                                pages_scraped,
                                effective_total,
                                total_discovered,
                                options,
                                false,
                                Some(result),
                            ),
                        )
                        .await?;
                    }

                    for link in &processed.links {
                        let Ok(resolved) = link_base.join(link) else {
                            continue;
                        };
                        let follow = strategy
                            .should_follow_link(&canonical_base, &resolved, options)
                            .unwrap_or_else(|| {
                                should_process_url(&resolved, &canonical_base, options, &filter)
                            });
                        if follow {
                            discovered.push(QueueItem::new(resolved.to_string(), item.depth + 1));
                        }
                    }
                }
            }
        }

        // Deduplicate once per batch so concurrent discoveries of the
        // same URL cannot double-queue.
        for candidate in discovered {
            let key = normalize_url(&candidate.url, &normalize);
            if visited.insert(key) {
                total_discovered += 1;
                if options.max_pages.map_or(true, |max| effective_total < max) {
                    effective_total += 1;
                }
                queue.push_back(candidate);
            }
        }
    }

    Ok(())
}

async fn emit(
    callback: &ScrapeCallback,
    cancel: &CancellationToken,
    progress: ProgressSnapshot,
) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(IngestError::Cancelled);
    }
    callback(progress).await
}

#[allow(clippy::too_many_arguments)]
fn snapshot(
    item: &QueueItem,
    processed: &ProcessedItem,
    pages_scraped: usize,
    effective_total: usize,
    total_discovered: usize,
    options: &ScraperOptions,
    deleted: bool,
    result: Option<ScrapeResult>,
) -> ProgressSnapshot {
    ProgressSnapshot {
        pages_scraped,
        total_pages: effective_total,
        total_discovered,
        current_url: if processed.url.is_empty() {
            item.url.clone()
        } else {
            processed.url.clone()
        },
        depth: item.depth,
        max_depth: options.max_depth,
        page_id: item.page_id,
        deleted,
        result,
    }
}

/// Assemble the persistable result from a processed item.
fn build_scrape_result(processed: &ProcessedItem) -> ScrapeResult {
    let content = processed.content.as_ref();
    ScrapeResult {
        url: processed.url.clone(),
        title: processed
            .title
            .clone()
            .or_else(|| content.and_then(|c| c.title.clone()))
            .unwrap_or_else(|| title_from_url(&processed.url)),
        content_type: processed
            .content_type
            .clone()
            .or_else(|| content.map(|c| c.content_type.clone()))
            .unwrap_or_default(),
        text_content: content.map(|c| c.text_content.clone()).unwrap_or_default(),
        etag: processed.etag.clone(),
        last_modified: processed.last_modified.clone(),
        links: processed.links.clone(),
        errors: content.map(|c| c.errors.clone()).unwrap_or_default(),
        chunks: content.map(|c| c.chunks.clone()).unwrap_or_default(),
    }
}

/// Last path segment, cleaned up for display; host-only URLs fall back
/// to the URL itself.
pub fn title_from_url(url: &str) -> String {
    if let Ok(parsed) = Url::parse(url) {
        if let Some(name) = parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        {
            return name.replace(['_', '-'], " ");
        }
    }
    url.to_string()
}
