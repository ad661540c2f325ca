//! Application constants
//!
//! Centralized defaults shared by the configuration types and the loader.

// Cache
pub const DEFAULT_RECORDS_TTL_MS: u64 = 300_000;
pub const DEFAULT_QUERIES_TTL_MS: u64 = 60_000;
pub const DEFAULT_CACHE_MAX_SIZE: usize = 10_000;
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60_000;

/// Suffix of the namespace holding single records of a schema
pub const RECORDS_NAMESPACE_SUFFIX: &str = "records";
/// Suffix of the namespace holding query results of a schema
pub const QUERIES_NAMESPACE_SUFFIX: &str = "queries";

// Circuit breaker
pub const DEFAULT_BREAKER_MAX_FAILURES: u32 = 5;
pub const DEFAULT_BREAKER_RESET_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_BREAKER_HALF_OPEN_THRESHOLD: u32 = 2;

// Logging
pub const DEFAULT_LOG_LEVEL: &str = "info";

// Configuration sources
pub const ENV_PREFIX: &str = "RAMPART_";
pub const CONFIG_FILE_STEMS: [&str; 2] = ["rampart", "config"];
