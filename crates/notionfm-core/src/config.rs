//! Configuration module for notionfm.
//!
//! One struct per YAML section, each with defaults, so a partial file is
//! enough. [`Config::validate`] reports every bad field at once.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::retry::RetryPolicy;
use crate::domain::upload::PartLimits;

const MIB: u64 = 1024 * 1024;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for notionfm.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub upload: UploadConfig,
    pub rate_limiting: RateLimitingConfig,
    pub listing_cache: ListingCacheConfig,
    pub logging: LoggingConfig,
}

/// Remote API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the Notion REST API.
    pub base_url: String,
    /// Value sent in the `Notion-Version` header.
    pub notion_version: String,
    /// Integration token. Usually supplied through `NOTION_TOKEN` instead.
    pub token: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

/// Upload engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Number of files uploaded at the same time.
    pub concurrency: u32,
    /// Files at or below this size (MiB) are sent in a single request.
    pub single_part_threshold_mb: u64,
    /// Lower bound for the size of one part (MiB).
    pub min_part_size_mb: u64,
    /// Provider ceiling on the number of parts of one upload.
    pub max_parts: u32,
    /// Files above this size (MiB) are rejected before any request is made.
    pub max_file_size_mb: u64,
    /// First backoff delay after a failed step (milliseconds).
    pub retry_base_delay_ms: u64,
    /// Upper bound for the backoff delay (milliseconds).
    pub retry_max_delay_ms: u64,
    /// Attempts per network step before giving up. `None` retries forever.
    pub max_part_attempts: Option<u32>,
    /// Session replacements allowed per file. `None` means unlimited.
    pub max_session_recoveries: Option<u32>,
    /// Pause before creating a replacement session (milliseconds).
    pub session_recovery_delay_ms: u64,
    /// Ask the remote whether a suspect session is still usable before replacing it.
    pub check_session_status: bool,
}

/// Outbound request throttling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitingConfig {
    /// Sustained request rate (tokens per second).
    pub requests_per_second: f64,
    /// Bucket capacity, i.e. the largest burst allowed after idling.
    pub burst: u32,
    /// Retries of one logical request on transient failures.
    pub max_retries: u32,
    /// First backoff delay for connection errors and 5xx (milliseconds).
    pub base_delay_ms: u64,
    /// Upper bound for the backoff delay (milliseconds).
    pub max_delay_ms: u64,
    /// Base wait after an HTTP 429, multiplied by the attempt number (milliseconds).
    pub rate_limit_delay_ms: u64,
}

/// Page listing cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingCacheConfig {
    /// Age (minutes) after which a cached listing is refetched.
    pub ttl_minutes: u64,
    /// Age (minutes) after which callers are warned that URLs expire soon.
    pub stale_warning_minutes: u64,
    /// Number of blocks requested per listing page.
    pub page_size: u32,
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when neither `-v` nor `RUST_LOG` is given (`info`, `debug`, ...).
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Reads and parses the YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Write the configuration as YAML to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// `<config dir>/notionfm/config.yaml`.
    ///
    /// Typically `$XDG_CONFIG_HOME/notionfm/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("notionfm")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.notion.com/v1".to_string(),
            notion_version: "2022-06-28".to_string(),
            token: None,
            timeout_secs: 60,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            single_part_threshold_mb: 20,
            min_part_size_mb: 10,
            max_parts: 990,
            max_file_size_mb: 5 * 1024,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 60_000,
            max_part_attempts: None,
            max_session_recoveries: None,
            session_recovery_delay_ms: 3_000,
            check_session_status: true,
        }
    }
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 2.8,
            burst: 3,
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            rate_limit_delay_ms: 5_000,
        }
    }
}

impl Default for ListingCacheConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: 40,
            stale_warning_minutes: 30,
            page_size: 25,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Derived runtime values
// ---------------------------------------------------------------------------

impl UploadConfig {
    /// Size limits handed to the chunk planner.
    pub fn part_limits(&self) -> PartLimits {
        PartLimits {
            single_part_threshold: self.single_part_threshold_mb * MIB,
            min_part_size: self.min_part_size_mb * MIB,
            max_parts: self.max_parts,
            max_file_size: self.max_file_size_mb * MIB,
        }
    }

    /// Retry policy applied to every network step of an upload session.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_part_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
        )
    }

    pub fn session_recovery_delay(&self) -> Duration {
        Duration::from_millis(self.session_recovery_delay_ms)
    }
}

impl RateLimitingConfig {
    /// Bounded retry policy used by the HTTP client for transient failures.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::bounded(
            self.max_retries + 1,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }
}

impl ListingCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes * 60)
    }

    pub fn stale_warning(&self) -> Duration {
        Duration::from_secs(self.stale_warning_minutes * 60)
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// One invalid field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"upload.concurrency"`.
    pub field: String,
    /// What is wrong with the value.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Accepted `logging.level` values.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError {
            field: field.into(),
            message: "must be greater than 0".into(),
        });
    }
}

impl Config {
    /// Checks every field and collects the problems.
    ///
    /// Empty when the configuration is usable.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- api ---
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            errors.push(ValidationError {
                field: "api.base_url".into(),
                message: format!("not an http(s) URL: {}", self.api.base_url),
            });
        }
        if self.api.notion_version.trim().is_empty() {
            errors.push(ValidationError {
                field: "api.notion_version".into(),
                message: "must not be empty".into(),
            });
        }
        positive(&mut errors, "api.timeout_secs", self.api.timeout_secs);

        // --- upload ---
        let up = &self.upload;
        positive(&mut errors, "upload.concurrency", up.concurrency as u64);
        positive(&mut errors, "upload.min_part_size_mb", up.min_part_size_mb);
        positive(&mut errors, "upload.max_parts", up.max_parts as u64);
        positive(&mut errors, "upload.max_file_size_mb", up.max_file_size_mb);
        positive(&mut errors, "upload.retry_base_delay_ms", up.retry_base_delay_ms);
        if up.retry_max_delay_ms < up.retry_base_delay_ms {
            errors.push(ValidationError {
                field: "upload.retry_max_delay_ms".into(),
                message: format!(
                    "retry_max_delay_ms ({}) must not be below retry_base_delay_ms ({})",
                    up.retry_max_delay_ms, up.retry_base_delay_ms
                ),
            });
        }
        if up.max_part_attempts == Some(0) {
            errors.push(ValidationError {
                field: "upload.max_part_attempts".into(),
                message: "must be greater than 0 when set".into(),
            });
        }
        if up.single_part_threshold_mb > up.max_file_size_mb {
            errors.push(ValidationError {
                field: "upload.single_part_threshold_mb".into(),
                message: format!(
                    "single_part_threshold_mb ({}) must not exceed max_file_size_mb ({})",
                    up.single_part_threshold_mb, up.max_file_size_mb
                ),
            });
        }

        // --- rate_limiting ---
        let rl = &self.rate_limiting;
        if !(rl.requests_per_second > 0.0 && rl.requests_per_second.is_finite()) {
            errors.push(ValidationError {
                field: "rate_limiting.requests_per_second".into(),
                message: "must be a positive number".into(),
            });
        }
        positive(&mut errors, "rate_limiting.burst", rl.burst as u64);
        if rl.max_delay_ms < rl.base_delay_ms {
            errors.push(ValidationError {
                field: "rate_limiting.max_delay_ms".into(),
                message: format!(
                    "max_delay_ms ({}) must not be below base_delay_ms ({})",
                    rl.max_delay_ms, rl.base_delay_ms
                ),
            });
        }

        // --- listing_cache ---
        let lc = &self.listing_cache;
        positive(&mut errors, "listing_cache.ttl_minutes", lc.ttl_minutes);
        if lc.stale_warning_minutes > lc.ttl_minutes {
            errors.push(ValidationError {
                field: "listing_cache.stale_warning_minutes".into(),
                message: format!(
                    "stale_warning_minutes ({}) must not exceed ttl_minutes ({})",
                    lc.stale_warning_minutes, lc.ttl_minutes
                ),
            });
        }
        if lc.page_size == 0 || lc.page_size > 100 {
            errors.push(ValidationError {
                field: "listing_cache.page_size".into(),
                message: "must be in range 1..=100".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}
