use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{FilerError, Result};

/// Program configuration.
///
/// Every knob has a default suitable for local runs; env vars override
/// individual fields and a TOML file can replace the whole set.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Annual report filing start page.
    pub portal_url: String,
    /// Directory for screenshot artifacts (served statically by the product).
    pub artifacts_dir: String,
    /// SQLite database path for filings, artifacts and settings.
    pub db_path: String,
    /// Bounded wait for a selector to render.
    pub selector_timeout_ms: u64,
    /// Bounded wait for a post-submit navigation.
    pub navigation_timeout_ms: u64,
    /// Settle delay after clicks and before the proof screenshot.
    pub settle_delay_ms: u64,
    /// Wall-clock budget for one filing run; a hung remote page must never
    /// wedge the worker.
    pub job_timeout_secs: u64,
    /// Maximum filing attempts before the job is abandoned.
    pub max_attempts: u32,
    /// Base delay for exponential retry backoff.
    pub retry_base_delay_ms: u64,
    /// Backoff multiplier per attempt.
    pub retry_multiplier: f64,
    /// Interval between scans for newly pending filings.
    pub poll_interval_ms: u64,
    /// Age after which a PROCESSING filing is considered orphaned and swept
    /// to FAILED.
    pub stale_processing_secs: u64,
    /// Notification endpoint; empty disables outbound notification.
    pub notify_api_url: String,
    pub notify_api_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            portal_url: "https://services.sunbiz.org/Filings/AnnualReport/FilingStart".to_string(),
            artifacts_dir: "artifacts".to_string(),
            db_path: "filings.db".to_string(),
            selector_timeout_ms: 10_000,
            navigation_timeout_ms: 10_000,
            settle_delay_ms: 2_000,
            job_timeout_secs: 300,
            max_attempts: 3,
            retry_base_delay_ms: 1_000,
            retry_multiplier: 2.0,
            poll_interval_ms: 5_000,
            stale_processing_secs: 1_800,
            notify_api_url: String::new(),
            notify_api_key: String::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            portal_url: std::env::var("PORTAL_URL").unwrap_or(default.portal_url),
            artifacts_dir: std::env::var("ARTIFACTS_DIR").unwrap_or(default.artifacts_dir),
            db_path: std::env::var("DB_PATH").unwrap_or(default.db_path),
            selector_timeout_ms: env_parse("SELECTOR_TIMEOUT_MS", default.selector_timeout_ms),
            navigation_timeout_ms: env_parse("NAVIGATION_TIMEOUT_MS", default.navigation_timeout_ms),
            settle_delay_ms: env_parse("SETTLE_DELAY_MS", default.settle_delay_ms),
            job_timeout_secs: env_parse("JOB_TIMEOUT_SECS", default.job_timeout_secs),
            max_attempts: env_parse("MAX_ATTEMPTS", default.max_attempts),
            retry_base_delay_ms: env_parse("RETRY_BASE_DELAY_MS", default.retry_base_delay_ms),
            retry_multiplier: env_parse("RETRY_MULTIPLIER", default.retry_multiplier),
            poll_interval_ms: env_parse("POLL_INTERVAL_MS", default.poll_interval_ms),
            stale_processing_secs: env_parse("STALE_PROCESSING_SECS", default.stale_processing_secs),
            notify_api_url: std::env::var("NOTIFY_API_URL").unwrap_or(default.notify_api_url),
            notify_api_key: std::env::var("NOTIFY_API_KEY").unwrap_or(default.notify_api_key),
        }
    }

    /// Load configuration from a TOML file. Missing keys fall back to defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|e| FilerError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn selector_timeout(&self) -> Duration {
        Duration::from_millis(self.selector_timeout_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
