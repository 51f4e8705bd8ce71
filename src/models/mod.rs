//! Data models for docdex.

mod chunk;
mod content;
mod job;
mod options;
mod progress;

pub use chunk::{Chunk, ChunkType, SectionInfo};
pub use content::{FetchStatus, QueueItem, RawContent, ScrapeResult};
pub use job::{normalize_identity, Job, JobStatus};
pub use options::{ScopeMode, ScrapeMode, ScraperOptions};
pub use progress::ProgressSnapshot;
