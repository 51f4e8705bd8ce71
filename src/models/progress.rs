//! Per-page progress reporting.

use serde::{Deserialize, Serialize};

use super::ScrapeResult;

/// Snapshot emitted once per processed page, in completion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    /// Pages counted so far (only pages with a persistent identity or
    /// content count; pure discovery visits do not).
    pub pages_scraped: usize,
    /// Effective page budget for this run.
    pub total_pages: usize,
    /// Every URL ever added to the frontier, including beyond budget.
    pub total_discovered: usize,
    pub current_url: String,
    pub depth: usize,
    pub max_depth: usize,
    /// Persisted page row, present for refresh items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_id: Option<i64>,
    /// The page disappeared upstream and should be deleted.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
    /// Full result when fresh content was produced; `None` for 304/404.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ScrapeResult>,
}
