//! Configuration infrastructure
//!
//! Loads and manages the crawl configuration from a JSON file. On first run
//! a default config is written next to the database so operators have a
//! template to edit; an unreadable or invalid file is a hard error (the
//! process exits with code 2 rather than crawling with surprise settings).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::info;

/// Robots.txt handling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RobotsMode {
    /// Disallowed domains get status BLOCKED_ROBOTS and are not fetched.
    Respect,
    /// Crawl anyway, but record the disallow reason in the result.
    Ignore,
}

/// Export row filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportProfile {
    /// Only rows whose mandatory field set is complete.
    Strict,
    /// All rows, missing fields left empty.
    Permissive,
}

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Worker pool and queue settings
    pub crawl: CrawlConfig,

    /// Page acquisition settings (politeness, retries, budgets)
    pub fetch: FetchConfig,

    /// Error-budget circuit breaker
    pub breaker: BreakerConfig,

    /// Export settings
    pub export: ExportConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// SQLite database location, e.g. `sqlite:data/legal_certis.db`
    pub database_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Number of concurrent workers
    pub workers: usize,

    /// Lease TTL in seconds; a crashed worker's lease resurfaces after this
    pub lease_ttl_seconds: u64,

    /// Hard deadline per queue entry in seconds
    pub per_entry_deadline_seconds: u64,

    /// Worker backoff when the queue is empty (jittered)
    pub queue_poll_ms: u64,

    /// Graceful stop when this file exists
    pub stop_sentinel_path: PathBuf,

    /// Blacklist patterns: exact host, `.suffix`, or keyword substring
    pub blacklist: Vec<String>,

    /// robots.txt policy
    pub respect_robots: RobotsMode,

    /// robots.txt cache TTL in seconds
    pub robots_ttl_seconds: u64,

    /// DNS resolution timeout in seconds
    pub dns_timeout_seconds: u64,

    /// Extra legal-form tokens for the generic extractor
    pub country_pattern_set: Vec<String>,

    /// Verify email domains resolve before accepting addresses
    pub mx_check: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Politeness floor between requests to one host, in milliseconds
    pub min_delay_ms: u64,

    /// Random jitter added on top of min_delay, in milliseconds
    pub jitter_ms: u64,

    /// Retry attempts through the proxy tier
    pub max_retries: u32,

    /// Exponential backoff base in milliseconds
    pub backoff_base_ms: u64,

    /// Backoff multiplier per attempt
    pub backoff_factor: u32,

    /// Backoff ceiling in milliseconds
    pub backoff_cap_ms: u64,

    /// Reject responses larger than this
    pub max_body_bytes: usize,

    /// Acceptable Content-Type prefixes
    pub allowed_content_types: Vec<String>,

    /// Per-request timeout in seconds
    pub request_timeout_seconds: u64,

    /// Redirect hop cap
    pub max_redirects: usize,

    /// Global request-rate ceiling across all hosts
    pub max_requests_per_second: u32,

    /// Proxy endpoints; empty disables the proxy tier
    pub proxy_pool: Vec<String>,

    /// Consecutive failures before a proxy is quarantined
    pub proxy_quarantine_after: u32,

    /// Proxy quarantine cooldown in seconds
    pub proxy_cooldown_seconds: u64,

    /// Fall back to an archived snapshot when live fetching fails
    pub archive_fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Sliding window length in seconds
    pub failure_window_seconds: u64,

    /// Minimum outcomes in the window before the rate is meaningful
    pub min_samples: usize,

    /// Failure rate in [0,1] that trips the breaker
    pub failure_rate_threshold: f64,

    /// Global pause after a trip, in seconds
    pub pause_seconds: u64,

    /// Concurrency while half-open
    pub half_open_permits: usize,

    /// Trips beyond this abort the run (exit code 4)
    pub max_trips: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    pub profile: ExportProfile,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (`info`, `debug`, ...)
    pub level: String,

    /// Also write to a rotating file in `dir`
    pub file_enabled: bool,
    pub dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            crawl: CrawlConfig::default(),
            fetch: FetchConfig::default(),
            breaker: BreakerConfig::default(),
            export: ExportConfig::default(),
            logging: LoggingConfig::default(),
            database_url: "sqlite:data/legal_certis.db".to_string(),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            lease_ttl_seconds: 300,
            per_entry_deadline_seconds: 120,
            queue_poll_ms: 2_000,
            stop_sentinel_path: PathBuf::from("STOP"),
            blacklist: Vec::new(),
            respect_robots: RobotsMode::Respect,
            robots_ttl_seconds: 3_600,
            dns_timeout_seconds: 5,
            country_pattern_set: Vec::new(),
            mx_check: false,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 1_000,
            jitter_ms: 500,
            max_retries: 3,
            backoff_base_ms: 1_000,
            backoff_factor: 2,
            backoff_cap_ms: 30_000,
            max_body_bytes: 2 * 1024 * 1024,
            allowed_content_types: vec![
                "text/html".to_string(),
                "application/xhtml+xml".to_string(),
                "text/plain".to_string(),
            ],
            request_timeout_seconds: 30,
            max_redirects: 10,
            max_requests_per_second: 5,
            proxy_pool: Vec::new(),
            proxy_quarantine_after: 3,
            proxy_cooldown_seconds: 300,
            archive_fallback: true,
        }
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_window_seconds: 60,
            min_samples: 10,
            failure_rate_threshold: 0.8,
            pause_seconds: 30,
            half_open_permits: 2,
            max_trips: 5,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            profile: ExportProfile::Strict,
            output_dir: PathBuf::from("data"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_enabled: true,
            dir: PathBuf::from("logs"),
        }
    }
}

impl AppConfig {
    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.crawl.lease_ttl_seconds)
    }

    pub fn per_entry_deadline(&self) -> Duration {
        Duration::from_secs(self.crawl.per_entry_deadline_seconds)
    }

    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.fetch.min_delay_ms)
    }

    /// Sanity checks that cannot be expressed in the type system.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.crawl.workers > 0, "workers must be at least 1");
        anyhow::ensure!(self.crawl.lease_ttl_seconds > 0, "lease_ttl_seconds must be positive");
        anyhow::ensure!(
            self.crawl.per_entry_deadline_seconds > 0,
            "per_entry_deadline_seconds must be positive"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.breaker.failure_rate_threshold),
            "failure_rate_threshold must be within [0, 1]"
        );
        anyhow::ensure!(
            self.fetch.max_requests_per_second > 0,
            "max_requests_per_second must be positive"
        );
        Ok(())
    }
}

/// Loads the configuration file, creating a default one on first run.
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self { config_path: config_path.into() }
    }

    /// Load the config, writing the default file first if none exists.
    pub async fn load_or_init(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("Configuration file not found, creating default: {:?}", self.config_path);
            self.write_default().await?;
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .with_context(|| format!("Failed to read config file: {:?}", self.config_path))?;

        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file: {:?}", self.config_path))?;
        config.validate()?;

        info!("📋 Loaded configuration from: {:?}", self.config_path);
        Ok(config)
    }

    async fn write_default(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(&AppConfig::default())?;
        fs::write(&self.config_path, json)
            .await
            .with_context(|| format!("Failed to write default config: {:?}", self.config_path))?;
        Ok(())
    }
}

/// Default config file location relative to the working directory.
pub fn default_config_path() -> &'static Path {
    Path::new("legal_certis_config.json")
}
