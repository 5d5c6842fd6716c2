//! Configuration types for Strata
//!
//! Static, process-wide settings for the cache, the recycler, the registry
//! refresher and placement. Every section has defaults so a partial file is
//! enough.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the placement core
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data cache configuration
    pub cache: CacheConfig,
    /// Recycler configuration
    pub recycle: RecycleConfig,
    /// Cluster registry configuration
    pub registry: RegistryConfig,
    /// Placement configuration
    pub placement: PlacementConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.cache.enabled && self.cache.max_entry_size > self.cache.max_bytes {
            return Err(Error::configuration(format!(
                "cache.max_entry_size ({}) exceeds cache.max_bytes ({})",
                self.cache.max_entry_size, self.cache.max_bytes
            )));
        }
        if self.recycle.workers_per_cluster == 0 {
            return Err(Error::configuration("recycle.workers_per_cluster must be at least 1"));
        }
        if self.recycle.dead_letter_capacity == 0 {
            return Err(Error::configuration("recycle.dead_letter_capacity must be at least 1"));
        }
        if self.recycle.call_timeout_ms == 0 {
            return Err(Error::configuration("recycle.call_timeout_ms must be positive"));
        }
        if self.recycle.base_backoff_ms > self.recycle.max_backoff_ms {
            return Err(Error::configuration(
                "recycle.base_backoff_ms must not exceed recycle.max_backoff_ms",
            ));
        }
        if self.registry.refresh_interval_secs == 0 {
            return Err(Error::configuration("registry.refresh_interval_secs must be positive"));
        }
        match self.logging.format.as_str() {
            "text" | "json" => Ok(()),
            other => Err(Error::configuration(format!("unknown logging.format: {other}"))),
        }
    }
}

/// Read-side data cache configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Disable to bypass the cache entirely
    pub enabled: bool,
    /// Aggregate payload bound in bytes
    pub max_bytes: u64,
    /// Largest payload that will be cached
    pub max_entry_size: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_bytes: 256 * 1024 * 1024,  // 256 MB
            max_entry_size: 1024 * 1024,   // 1 MB
        }
    }
}

/// Recycler configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecycleConfig {
    /// Concurrent reclaim calls allowed per cluster
    pub workers_per_cluster: usize,
    /// Retries after the first failed reclaim call; a task is dead-lettered
    /// once it fails `max_retries + 1` calls
    pub max_retries: u32,
    /// Backoff after the first failure (milliseconds)
    pub base_backoff_ms: u64,
    /// Backoff ceiling (milliseconds)
    pub max_backoff_ms: u64,
    /// Deadline for a single backend delete call (milliseconds)
    pub call_timeout_ms: u64,
    /// Dead-letter records kept before the oldest are dropped
    pub dead_letter_capacity: usize,
}

impl RecycleConfig {
    #[must_use]
    pub const fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    #[must_use]
    pub const fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

impl Default for RecycleConfig {
    fn default() -> Self {
        Self {
            workers_per_cluster: 4,
            max_retries: 4,
            base_backoff_ms: 500,
            max_backoff_ms: 60_000,
            call_timeout_ms: 30_000,
            dead_letter_capacity: 10_000,
        }
    }
}

/// Cluster registry configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Interval between metadata refreshes (seconds)
    pub refresh_interval_secs: u64,
}

impl RegistryConfig {
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 30,
        }
    }
}

/// Placement configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Normal objects below this size go to small-object pools
    pub small_object_threshold: u64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            small_object_threshold: 128 * 1024, // 128 KB
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (overridden by `RUST_LOG`)
    pub level: String,
    /// Output format: "text" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.cache.enabled);
        assert_eq!(config.recycle.workers_per_cluster, 4);
        assert_eq!(config.placement.small_object_threshold, 131_072);
        assert_eq!(config.registry.refresh_interval(), Duration::from_secs(30));
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [cache]
            enabled = false

            [recycle]
            max_retries = 0
            "#,
        )
        .unwrap();
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.max_bytes, CacheConfig::default().max_bytes);
        assert_eq!(config.recycle.max_retries, 0);
        assert_eq!(config.recycle.dead_letter_capacity, 10_000);
        // Zero retries is a valid budget: one call, then dead-letter
        config.validate().unwrap();
        assert_eq!(config.recycle.workers_per_cluster, 4);
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.recycle.workers_per_cluster = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.cache.max_entry_size = config.cache.max_bytes + 1;
        assert!(config.validate().is_err());

        // Entry size is irrelevant when the cache is off
        config.cache.enabled = false;
        config.validate().unwrap();

        let mut config = Config::default();
        config.recycle.dead_letter_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }
}
