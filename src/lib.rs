//! docdex — documentation ingestion engine.
//!
//! Crawls documentation from web sites, local trees, GitHub, npm and
//! PyPI, splits it into hierarchical chunks suitable for embedding, and
//! persists results per `(library, version)` identity under a
//! concurrent, cancellable, restart-safe job manager.

pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod jobs;
pub mod models;
pub mod pipelines;
pub mod scraper;
pub mod splitters;
pub mod store;
pub mod utils;

pub use error::{IngestError, Result};
pub use events::{Event, EventBus, EventType};
pub use jobs::{JobManager, ManagerCallbacks};
pub use models::{
    Chunk, ChunkType, FetchStatus, Job, JobStatus, ProgressSnapshot, QueueItem, RawContent,
    ScopeMode, ScrapeMode, ScrapeResult, ScraperOptions, SectionInfo,
};
pub use scraper::{ScraperStrategy, StrategyRegistry};
pub use store::{DocumentStore, MemoryStore};
