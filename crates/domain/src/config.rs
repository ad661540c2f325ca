//! Configuration structures
//!
//! Every section implements `Default` and deserializes with
//! `#[serde(default)]`, so a config file only needs the fields it overrides.
//! Durations are plain millisecond integers (`*_ms`).

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BREAKER_HALF_OPEN_THRESHOLD, DEFAULT_BREAKER_MAX_FAILURES,
    DEFAULT_BREAKER_RESET_TIMEOUT_MS, DEFAULT_CACHE_MAX_SIZE, DEFAULT_LOG_LEVEL,
    DEFAULT_QUERIES_TTL_MS, DEFAULT_RECORDS_TTL_MS, DEFAULT_SWEEP_INTERVAL_MS,
};
use crate::errors::{RampartError, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RampartConfig {
    /// TTLs and capacity of the per-schema namespaces
    pub cache: CacheSettings,
    pub breaker: BreakerSettings,
    pub storage: StorageSettings,
    pub logging: LoggingConfig,
}

impl RampartConfig {
    /// Check cross-field invariants.
    ///
    /// # Errors
    /// Returns `RampartError::Config` naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let invalid =
            |message: &str| -> Result<()> { Err(RampartError::Config(message.to_string())) };
        if self.breaker.max_failures == 0 {
            return invalid("breaker.max_failures must be at least 1");
        }
        if self.breaker.half_open_threshold == 0 {
            return invalid("breaker.half_open_threshold must be at least 1");
        }
        if self.cache.sweep_interval_ms == Some(0) {
            return invalid("cache.sweep_interval_ms must be positive when set");
        }
        if self.storage.backend == StorageBackend::File && self.storage.path.is_none() {
            return invalid("storage.path is required for the file backend");
        }
        Ok(())
    }
}

/// Cache defaults applied to the namespaces the facade declares
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// TTL of `"<schema>:records"` entries (`None` = never expire)
    pub records_ttl_ms: Option<u64>,
    /// TTL of `"<schema>:queries"` entries (`None` = never expire)
    pub queries_ttl_ms: Option<u64>,
    /// Soft capacity per namespace (`None` = unbounded)
    pub max_size: Option<usize>,
    /// Background sweep period (`None` = lazy expiry only)
    pub sweep_interval_ms: Option<u64>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            records_ttl_ms: Some(DEFAULT_RECORDS_TTL_MS),
            queries_ttl_ms: Some(DEFAULT_QUERIES_TTL_MS),
            max_size: Some(DEFAULT_CACHE_MAX_SIZE),
            sweep_interval_ms: Some(DEFAULT_SWEEP_INTERVAL_MS),
        }
    }
}

/// How persisted breaker state is applied at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestorePolicy {
    /// Restore state and counters from storage
    #[default]
    Persisted,
    /// Re-register known services but start every breaker `Closed`
    Closed,
}

/// Default breaker configuration for registered services
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    /// Consecutive failures that open a closed breaker
    pub max_failures: u32,
    /// Time an open breaker waits before admitting trial calls
    pub reset_timeout_ms: u64,
    /// Trial successes that close a half-open breaker
    pub half_open_threshold: u32,
    /// `false` lets calls pass through unrecorded
    pub enabled: bool,
    /// How persisted breakers are brought back at startup
    pub restore_policy: RestorePolicy,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            max_failures: DEFAULT_BREAKER_MAX_FAILURES,
            reset_timeout_ms: DEFAULT_BREAKER_RESET_TIMEOUT_MS,
            half_open_threshold: DEFAULT_BREAKER_HALF_OPEN_THRESHOLD,
            enabled: true,
            restore_policy: RestorePolicy::default(),
        }
    }
}

/// Breaker state persistence backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Memory,
    /// One JSON file per service under `StorageSettings::path`
    File,
}

/// Where breaker state is persisted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    /// Snapshot directory; required by the file backend
    pub path: Option<String>,
}

/// Logging output configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: DEFAULT_LOG_LEVEL.to_string(), json: false }
    }
}
