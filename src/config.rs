//! Application configuration.
//!
//! Loaded from an optional TOML file (`~/.config/docdex/config.toml` or
//! the path in `DOCDEX_CONFIG`), with environment variables taking
//! precedence. Everything has a sensible default so a bare `docdex`
//! invocation works.

use std::path::PathBuf;
use std::time::Duration;

use crate::fetcher::FetchConfig;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::jobs::DEFAULT_JOB_CONCURRENCY;

fn default_concurrency() -> usize {
    DEFAULT_JOB_CONCURRENCY
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> usize {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Bound on concurrently running jobs.
    #[serde(rename = "concurrency")]
    pub job_concurrency: usize,
    pub fetch_timeout_secs: u64,
    pub max_retries: usize,
    pub user_agent: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            job_concurrency: default_concurrency(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_retries: default_max_retries(),
            user_agent: None,
        }
    }
}

impl AppConfig {
    /// File → env → defaults.
    pub fn load() -> Self {
        let mut config = Self::from_file().unwrap_or_default();
        config.apply_env();
        config
    }

    fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("DOCDEX_CONFIG") {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("docdex").join("config.toml"))
    }

    fn from_file() -> Option<Self> {
        let path = Self::config_path()?;
        let raw = std::fs::read_to_string(&path).ok()?;
        match toml::from_str(&raw) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!(path = %path.display(), %e, "ignoring malformed config file");
                None
            }
        }
    }

    fn apply_env(&mut self) {
        if let Ok(value) = std::env::var("DOCDEX_CONCURRENCY") {
            match value.parse() {
                Ok(parsed) => self.job_concurrency = parsed,
                Err(_) => warn!(value, "ignoring invalid DOCDEX_CONCURRENCY"),
            }
        }
        if let Ok(value) = std::env::var("DOCDEX_FETCH_TIMEOUT_SECS") {
            match value.parse() {
                Ok(parsed) => self.fetch_timeout_secs = parsed,
                Err(_) => warn!(value, "ignoring invalid DOCDEX_FETCH_TIMEOUT_SECS"),
            }
        }
        if let Ok(value) = std::env::var("DOCDEX_USER_AGENT") {
            self.user_agent = Some(value);
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            timeout: self.fetch_timeout(),
            max_retries: self.max_retries,
            user_agent: self.user_agent.clone(),
        }
    }
}
