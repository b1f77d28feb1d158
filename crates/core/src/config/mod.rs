//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SHEETNEWS_*)
//! 2. TOML config file (if SHEETNEWS_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;

mod validation;

pub use validation::ConfigError;

/// Default spreadsheet values endpoint.
pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Default cell range read from the sheet.
pub const DEFAULT_RANGE: &str = "Sheet1!A:Z";

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SHEETNEWS_*)
/// 2. TOML config file (if SHEETNEWS_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the spreadsheet values API.
    ///
    /// Set via SHEETNEWS_API_KEY environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Identifier of the spreadsheet holding the weekly content.
    ///
    /// Set via SHEETNEWS_SHEET_ID environment variable.
    #[serde(default)]
    pub sheet_id: Option<String>,

    /// Cell range to read (A1 notation).
    #[serde(default = "default_range")]
    pub range: String,

    /// Base URL of the values API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Time-to-live of cached content in milliseconds.
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    /// Maximum number of attempts for transport failures and manual retries.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between retry attempts in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via SHEETNEWS_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum number of entries held by the cache.
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    /// Interval of the background expiry sweep in milliseconds.
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,

    /// Whether fetched content is cached at all.
    #[serde(default = "default_true")]
    pub enable_cache: bool,

    /// Path to the SQLite file mirroring the cache.
    ///
    /// Persistence is disabled when unset.
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Prefix of persisted cache records.
    #[serde(default = "default_storage_prefix")]
    pub storage_prefix: String,

    /// Fetch once as soon as the content slot is created.
    #[serde(default)]
    pub auto_fetch: bool,

    /// Header substrings identifying the content column.
    #[serde(default = "default_content_columns")]
    pub content_columns: Vec<String>,

    /// Minimum length of the extracted content in characters.
    #[serde(default = "default_min_content_length")]
    pub min_content_length: usize,

    /// Require a header row plus at least one data row.
    #[serde(default = "default_true")]
    pub require_headers: bool,
}

fn default_range() -> String {
    DEFAULT_RANGE.into()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}

fn default_user_agent() -> String {
    "sheetnews/0.1".into()
}

fn default_cache_ttl_ms() -> u64 {
    300_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_cache_max_entries() -> usize {
    100
}

fn default_cleanup_interval_ms() -> u64 {
    60_000
}

fn default_storage_prefix() -> String {
    "api_cache_".into()
}

fn default_content_columns() -> Vec<String> {
    ["content", "summary", "digest", "text", "description"].into_iter().map(String::from).collect()
}

fn default_min_content_length() -> usize {
    20
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            sheet_id: None,
            range: default_range(),
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            cache_ttl_ms: default_cache_ttl_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_ms: default_timeout_ms(),
            cache_max_entries: default_cache_max_entries(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
            enable_cache: true,
            db_path: None,
            storage_prefix: default_storage_prefix(),
            auto_fetch: false,
            content_columns: default_content_columns(),
            min_content_length: default_min_content_length(),
            require_headers: true,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Cache settings derived from this configuration.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_entries: self.cache_max_entries,
            default_ttl: self.cache_ttl(),
            cleanup_interval: Duration::from_millis(self.cleanup_interval_ms),
            storage_prefix: self.storage_prefix.clone(),
        }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SHEETNEWS_`
    /// 2. TOML file from `SHEETNEWS_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SHEETNEWS_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SHEETNEWS_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Check that the API key is available (for deferred validation).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the API key is not set.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key.as_deref().filter(|k| !k.is_empty()).ok_or_else(|| ConfigError::Missing {
            field: "api_key".into(),
            hint: "Set SHEETNEWS_API_KEY environment variable".into(),
        })
    }

    /// Check that the sheet identifier is available.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the sheet id is not set.
    pub fn require_sheet_id(&self) -> Result<&str, ConfigError> {
        self.sheet_id.as_deref().filter(|id| !id.is_empty()).ok_or_else(|| ConfigError::Missing {
            field: "sheet_id".into(),
            hint: "Set SHEETNEWS_SHEET_ID environment variable".into(),
        })
    }
}
