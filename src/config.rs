//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::DEFAULT_CAPACITY;
use crate::error::{CacheError, Result};

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory holding one file per cache entry
    pub storage_root: PathBuf,
    /// Maximum number of entries kept after eviction
    pub capacity: usize,
    /// Background maintenance interval in seconds
    pub sweep_interval: u64,
    /// Age in seconds after which a leftover temp file is considered debris
    pub temp_max_age: u64,
}

impl CacheConfig {
    /// Creates a config for the given root and capacity, other fields defaulted.
    pub fn new(storage_root: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            storage_root: storage_root.into(),
            capacity,
            ..Self::default()
        }
    }

    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MEMO_CACHE_DIR` - Storage root (default: `lru_cache_dir`)
    /// - `MEMO_CACHE_CAPACITY` - Maximum entries (default: 4096)
    /// - `MEMO_SWEEP_INTERVAL` - Maintenance interval in seconds (default: 60)
    /// - `MEMO_TEMP_MAX_AGE` - Temp file debris age in seconds (default: 3600)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            storage_root: env::var("MEMO_CACHE_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_root),
            capacity: env::var("MEMO_CACHE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.capacity),
            sweep_interval: env::var("MEMO_SWEEP_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.sweep_interval),
            temp_max_age: env::var("MEMO_TEMP_MAX_AGE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.temp_max_age),
        }
    }

    /// Rejects configurations the store cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(CacheError::InvalidConfig(
                "capacity must be a positive integer".to_string(),
            ));
        }
        if self.sweep_interval == 0 {
            return Err(CacheError::InvalidConfig(
                "sweep interval must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn temp_max_age(&self) -> Duration {
        Duration::from_secs(self.temp_max_age)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("lru_cache_dir"),
            capacity: DEFAULT_CAPACITY,
            sweep_interval: 60,
            temp_max_age: 3600,
        }
    }
}
