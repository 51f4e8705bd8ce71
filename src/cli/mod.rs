//! Command-line interface.

mod commands;

use clap::{Parser, Subcommand};

use crate::models::{ScopeMode, ScrapeMode};

#[derive(Parser)]
#[command(name = "docdex", version, about = "Documentation ingestion engine")]
pub struct Cli {
    /// Increase log verbosity.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

#[derive(Subcommand)]
enum Command {
    /// Scrape a documentation source into chunked pages.
    Scrape {
        /// Library name the pages are stored under.
        library: String,
        /// Root URL (https://, file://, GitHub, npm, PyPI).
        url: String,
        /// Version identity; omit for unversioned docs.
        #[arg(long)]
        version: Option<String>,
        /// Page budget (0 = unlimited).
        #[arg(long, default_value_t = 1000)]
        max_pages: usize,
        #[arg(long, default_value_t = 3)]
        max_depth: usize,
        /// Parallel page fetches within the job.
        #[arg(long, default_value_t = 3)]
        concurrency: usize,
        /// Crawl scope: subpages, hostname or domain.
        #[arg(long, value_enum, default_value = "subpages")]
        scope: ScopeArg,
        /// Retrieval mode: fetch, playwright or auto.
        #[arg(long, value_enum, default_value = "auto")]
        mode: ModeArg,
        /// Glob or /regex/ patterns; may repeat.
        #[arg(long = "include")]
        include_patterns: Vec<String>,
        #[arg(long = "exclude")]
        exclude_patterns: Vec<String>,
        /// Abort the job on the first page error.
        #[arg(long)]
        fail_fast: bool,
        #[arg(long)]
        no_follow_redirects: bool,
    },
    /// Re-ingest a previously scraped version using conditional fetches.
    Refresh {
        library: String,
        #[arg(long)]
        version: Option<String>,
    },
    /// List jobs tracked by this process.
    Jobs {
        /// Filter: queued, running, completed, failed, cancelled.
        #[arg(long)]
        status: Option<String>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ScopeArg {
    Subpages,
    Hostname,
    Domain,
}

impl From<ScopeArg> for ScopeMode {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::Subpages => ScopeMode::Subpages,
            ScopeArg::Hostname => ScopeMode::Hostname,
            ScopeArg::Domain => ScopeMode::Domain,
        }
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ModeArg {
    Fetch,
    Playwright,
    Auto,
}

impl From<ModeArg> for ScrapeMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Fetch => ScrapeMode::Fetch,
            ModeArg::Playwright => ScrapeMode::Playwright,
            ModeArg::Auto => ScrapeMode::Auto,
        }
    }
}

/// Dispatch the parsed command.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Scrape {
            library,
            url,
            version,
            max_pages,
            max_depth,
            concurrency,
            scope,
            mode,
            include_patterns,
            exclude_patterns,
            fail_fast,
            no_follow_redirects,
        } => {
            let mut options =
                crate::models::ScraperOptions::new(url, library.clone(), version.clone());
            options.max_pages = if max_pages == 0 { None } else { Some(max_pages) };
            options.max_depth = max_depth;
            options.max_concurrency = concurrency;
            options.scope = scope.into();
            options.scrape_mode = mode.into();
            options.ignore_errors = !fail_fast;
            options.follow_redirects = !no_follow_redirects;
            if !include_patterns.is_empty() {
                options.include_patterns = Some(include_patterns);
            }
            if !exclude_patterns.is_empty() {
                options.exclude_patterns = Some(exclude_patterns);
            }
            commands::scrape(&library, version.as_deref(), options).await
        }
        Command::Refresh { library, version } => {
            commands::refresh(&library, version.as_deref()).await
        }
        Command::Jobs { status } => commands::jobs(status.as_deref()).await,
    }
}
