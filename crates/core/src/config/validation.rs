//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `max_retries` is 0 or exceeds 10
    /// - `cache_ttl_ms`, `cache_max_entries` or `cleanup_interval_ms` is 0
    /// - `range`, `base_url`, `user_agent` or `storage_prefix` is empty
    /// - `content_columns` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.max_retries == 0 {
            return Err(invalid("max_retries", "must be at least 1"));
        }
        if self.max_retries > 10 {
            return Err(invalid("max_retries", "must not exceed 10"));
        }

        if self.cache_ttl_ms == 0 {
            return Err(invalid("cache_ttl_ms", "must be greater than 0"));
        }
        if self.cache_max_entries == 0 {
            return Err(invalid("cache_max_entries", "must be greater than 0"));
        }
        if self.cleanup_interval_ms == 0 {
            return Err(invalid("cleanup_interval_ms", "must be greater than 0"));
        }

        if self.range.trim().is_empty() {
            return Err(invalid("range", "must not be empty"));
        }
        if self.base_url.is_empty() {
            return Err(invalid("base_url", "must not be empty"));
        }
        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }
        if self.storage_prefix.is_empty() {
            return Err(invalid("storage_prefix", "must not be empty"));
        }
        if self.content_columns.is_empty() {
            return Err(invalid("content_columns", "must name at least one header substring"));
        }

        if self.db_path.is_some() && !self.enable_cache {
            tracing::warn!("db_path is set but enable_cache is false; persisted records will never be written");
        }

        Ok(())
    }
}
