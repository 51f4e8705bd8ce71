//! CLI command handlers.
//!
//! Each handler wires up an in-process engine: in-memory reference
//! store, strategy registry, event bus, job manager. Progress renders
//! through indicatif fed by bus subscriptions.

use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};

use crate::events::{Event, EventBus, EventType};
use crate::jobs::JobManager;
use crate::models::{JobStatus, ScraperOptions};
use crate::scraper::StrategyRegistry;
use crate::store::MemoryStore;

struct Engine {
    manager: Arc<JobManager>,
    bus: Arc<EventBus>,
}

async fn engine() -> anyhow::Result<Engine> {
    let config = crate::config::AppConfig::load();
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(StrategyRegistry::with_config(None, config.fetch_config()));
    let bus = Arc::new(EventBus::new());
    let manager = JobManager::with_concurrency(
        store,
        registry,
        bus.clone(),
        config.job_concurrency,
    );
    manager.start().await?;
    Ok(Engine { manager, bus })
}

fn progress_bar(bus: &EventBus) -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner} [{bar:30.cyan/blue}] {pos}/{len} pages {wide_msg}",
        )
        .expect("static template parses")
        .progress_chars("=> "),
    );

    {
        let bar = bar.clone();
        bus.on(EventType::JobProgress, move |event| {
            if let Event::JobProgress { progress, .. } = event {
                bar.set_length(progress.total_pages as u64);
                bar.set_position(progress.pages_scraped as u64);
                bar.set_message(progress.current_url.clone());
            }
        });
    }
    bar
}

pub async fn scrape(
    library: &str,
    version: Option<&str>,
    options: ScraperOptions,
) -> anyhow::Result<()> {
    let engine = engine().await?;
    let bar = progress_bar(&engine.bus);

    let job_id = engine
        .manager
        .enqueue_scrape_job(library, version, options)
        .await?;
    let outcome = engine.manager.wait_for_job_completion(job_id).await;
    bar.finish_and_clear();

    match outcome {
        Ok(()) => {
            let job = engine.manager.get_job(job_id);
            let pages = job
                .and_then(|j| j.progress.map(|p| p.pages_scraped))
                .unwrap_or(0);
            println!("Scraped {pages} pages for {library}");
            engine.manager.stop().await?;
            engine.bus.shutdown();
            Ok(())
        }
        Err(e) => {
            engine.manager.stop().await?;
            engine.bus.shutdown();
            Err(e.into())
        }
    }
}

pub async fn refresh(library: &str, version: Option<&str>) -> anyhow::Result<()> {
    let engine = engine().await?;
    let bar = progress_bar(&engine.bus);

    let job_id = engine.manager.enqueue_refresh_job(library, version).await?;
    let outcome = engine.manager.wait_for_job_completion(job_id).await;
    bar.finish_and_clear();

    engine.manager.stop().await?;
    engine.bus.shutdown();
    outcome?;
    println!("Refreshed {library}");
    Ok(())
}

pub async fn jobs(status: Option<&str>) -> anyhow::Result<()> {
    let engine = engine().await?;
    let filter = match status {
        Some("queued") => Some(JobStatus::Queued),
        Some("running") => Some(JobStatus::Running),
        Some("completed") => Some(JobStatus::Completed),
        Some("failed") => Some(JobStatus::Failed),
        Some("cancelled") => Some(JobStatus::Cancelled),
        Some(other) => anyhow::bail!("unsupported status filter: {other}"),
        None => None,
    };

    let jobs = engine.manager.get_jobs(filter);
    if jobs.is_empty() {
        println!("No jobs");
    }
    for job in jobs {
        println!(
            "{}  {:10}  {}  {}",
            job.id,
            job.status.to_string(),
            job.label(),
            job.source_url
        );
    }
    engine.manager.stop().await?;
    Ok(())
}
