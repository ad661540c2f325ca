//! Configuration loader
//!
//! Loads [`RampartConfig`] from a config file and environment variables.
//!
//! ## Loading Strategy
//! 1. Read a `.env` file into the process environment, if one exists
//! 2. Start from defaults, or from the first config file found
//! 3. Apply `RAMPART_*` environment overrides on top
//! 4. Validate the result
//!
//! ## Environment Variables
//! - `RAMPART_CONFIG_PATH`: Explicit config file path (skips probing)
//! - `RAMPART_CACHE_RECORDS_TTL_MS`: Records TTL (`none` = never expire)
//! - `RAMPART_CACHE_QUERIES_TTL_MS`: Queries TTL (`none` = never expire)
//! - `RAMPART_CACHE_MAX_SIZE`: Per-namespace capacity (`none` = unbounded)
//! - `RAMPART_CACHE_SWEEP_INTERVAL_MS`: Sweep period (`none` = lazy expiry)
//! - `RAMPART_BREAKER_MAX_FAILURES`
//! - `RAMPART_BREAKER_RESET_TIMEOUT_MS`
//! - `RAMPART_BREAKER_HALF_OPEN_THRESHOLD`
//! - `RAMPART_BREAKER_ENABLED`: true/false
//! - `RAMPART_BREAKER_RESTORE_POLICY`: `persisted` or `closed`
//! - `RAMPART_STORAGE_BACKEND`: `memory` or `file`
//! - `RAMPART_STORAGE_PATH`: Directory for the file backend
//! - `RAMPART_LOG_LEVEL`: Default `EnvFilter` directive
//! - `RAMPART_LOG_JSON`: true/false
//!
//! ## File Locations
//! The loader searches `rampart.{toml,json}` then `config.{toml,json}` in:
//! 1. The current working directory
//! 2. Its parent and grandparent directories
//! 3. The executable's directory

use std::path::{Path, PathBuf};
use std::str::FromStr;

use rampart_domain::constants::{CONFIG_FILE_STEMS, ENV_PREFIX};
use rampart_domain::{RampartConfig, RampartError, RestorePolicy, Result, StorageBackend};

const CONFIG_FILE_EXTENSIONS: [&str; 2] = ["toml", "json"];

/// Load configuration with the layered strategy described above
///
/// # Errors
/// Returns `RampartError::Config` if:
/// - The config file cannot be read or parsed
/// - An environment override has an invalid value
/// - The merged configuration fails validation
pub fn load() -> Result<RampartConfig> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }

    let explicit = std::env::var(env_key("CONFIG_PATH")).ok().map(PathBuf::from);
    let mut config = match explicit.or_else(search_config_paths) {
        Some(path) => parse_file(&path)?,
        None => {
            tracing::debug!("No config file found, starting from defaults");
            RampartConfig::default()
        }
    };

    let overridden = apply_env_overrides(&mut config)?;
    config.validate()?;
    tracing::info!(env_overrides = overridden, "Configuration loaded");
    Ok(config)
}

/// Load configuration from defaults plus environment variables only
///
/// # Errors
/// Returns `RampartError::Config` if a variable has an invalid value or the
/// result fails validation.
pub fn load_from_env() -> Result<RampartConfig> {
    let mut config = RampartConfig::default();
    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, searches the standard locations. Format is detected by
/// extension (`.toml` or `.json`); missing fields keep their defaults.
///
/// # Errors
/// Returns `RampartError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - The configuration fails validation
pub fn load_from_file(path: Option<PathBuf>) -> Result<RampartConfig> {
    let config_path = match path {
        Some(p) => p,
        None => search_config_paths().ok_or_else(|| {
            RampartError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    let config = parse_file(&config_path)?;
    config.validate()?;
    Ok(config)
}

fn parse_file(path: &Path) -> Result<RampartConfig> {
    if !path.exists() {
        return Err(RampartError::Config(format!("Config file not found: {}", path.display())));
    }

    tracing::info!(path = %path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(path)
        .map_err(|e| RampartError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<RampartConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| RampartError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| RampartError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(RampartError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Search the standard locations for a config file
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn search_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.extend([cwd.clone(), cwd.join(".."), cwd.join("../..")]);
    }
    if let Some(exe_dir) =
        std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        dirs.push(exe_dir);
    }

    dirs.iter()
        .flat_map(|dir| {
            CONFIG_FILE_STEMS.iter().flat_map(move |stem| {
                CONFIG_FILE_EXTENSIONS
                    .iter()
                    .map(move |extension| dir.join(format!("{stem}.{extension}")))
            })
        })
        .find(|path| path.exists())
}

/// Apply every `RAMPART_*` override that is set; returns how many were applied
fn apply_env_overrides(config: &mut RampartConfig) -> Result<usize> {
    let mut applied = 0;
    let mut count = |hit: bool| applied += usize::from(hit);

    count(env_optional("CACHE_RECORDS_TTL_MS", &mut config.cache.records_ttl_ms)?);
    count(env_optional("CACHE_QUERIES_TTL_MS", &mut config.cache.queries_ttl_ms)?);
    count(env_optional("CACHE_MAX_SIZE", &mut config.cache.max_size)?);
    count(env_optional("CACHE_SWEEP_INTERVAL_MS", &mut config.cache.sweep_interval_ms)?);

    count(env_parsed("BREAKER_MAX_FAILURES", &mut config.breaker.max_failures)?);
    count(env_parsed("BREAKER_RESET_TIMEOUT_MS", &mut config.breaker.reset_timeout_ms)?);
    count(env_parsed("BREAKER_HALF_OPEN_THRESHOLD", &mut config.breaker.half_open_threshold)?);
    count(env_bool("BREAKER_ENABLED", &mut config.breaker.enabled));
    if let Some(policy) = env_value("BREAKER_RESTORE_POLICY") {
        config.breaker.restore_policy = match policy.to_ascii_lowercase().as_str() {
            "persisted" => RestorePolicy::Persisted,
            "closed" => RestorePolicy::Closed,
            other => return Err(invalid("BREAKER_RESTORE_POLICY", other)),
        };
        count(true);
    }

    if let Some(backend) = env_value("STORAGE_BACKEND") {
        config.storage.backend = match backend.to_ascii_lowercase().as_str() {
            "memory" => StorageBackend::Memory,
            "file" => StorageBackend::File,
            other => return Err(invalid("STORAGE_BACKEND", other)),
        };
        count(true);
    }
    if let Some(path) = env_value("STORAGE_PATH") {
        config.storage.path = Some(path);
        count(true);
    }

    if let Some(level) = env_value("LOG_LEVEL") {
        config.logging.level = level;
        count(true);
    }
    count(env_bool("LOG_JSON", &mut config.logging.json));

    Ok(applied)
}

fn env_key(suffix: &str) -> String {
    format!("{ENV_PREFIX}{suffix}")
}

/// Non-empty value of `RAMPART_<suffix>`
fn env_value(suffix: &str) -> Option<String> {
    std::env::var(env_key(suffix))
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn invalid(suffix: &str, value: &str) -> RampartError {
    RampartError::Config(format!("Invalid value for {}: {value}", env_key(suffix)))
}

fn env_parsed<T: FromStr>(suffix: &str, target: &mut T) -> Result<bool> {
    match env_value(suffix) {
        Some(raw) => {
            *target = raw.parse().map_err(|_| invalid(suffix, &raw))?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Like [`env_parsed`], with `none` clearing the value
fn env_optional<T: FromStr>(suffix: &str, target: &mut Option<T>) -> Result<bool> {
    match env_value(suffix) {
        Some(raw) if raw.eq_ignore_ascii_case("none") => {
            *target = None;
            Ok(true)
        }
        Some(raw) => {
            *target = Some(raw.parse().map_err(|_| invalid(suffix, &raw))?);
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Parse a boolean override
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(suffix: &str, target: &mut bool) -> bool {
    match env_value(suffix) {
        Some(raw) => {
            *target = matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use once_cell::sync::Lazy;

    use super::*;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const ALL_VARS: [&str; 13] = [
        "RAMPART_CACHE_RECORDS_TTL_MS",
        "RAMPART_CACHE_QUERIES_TTL_MS",
        "RAMPART_CACHE_MAX_SIZE",
        "RAMPART_CACHE_SWEEP_INTERVAL_MS",
        "RAMPART_BREAKER_MAX_FAILURES",
        "RAMPART_BREAKER_RESET_TIMEOUT_MS",
        "RAMPART_BREAKER_HALF_OPEN_THRESHOLD",
        "RAMPART_BREAKER_ENABLED",
        "RAMPART_BREAKER_RESTORE_POLICY",
        "RAMPART_STORAGE_BACKEND",
        "RAMPART_STORAGE_PATH",
        "RAMPART_LOG_LEVEL",
        "RAMPART_LOG_JSON",
    ];

    fn clear_env() {
        for var in ALL_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_env_bool_parsing() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        let cases = [("1", true), ("TRUE", true), ("on", true), ("no", false), ("0", false)];
        for (raw, expected) in cases {
            std::env::set_var("RAMPART_LOG_JSON", raw);
            let mut value = !expected;
            assert!(env_bool("LOG_JSON", &mut value));
            assert_eq!(value, expected, "raw value {raw}");
        }

        std::env::remove_var("RAMPART_LOG_JSON");
        let mut untouched = true;
        assert!(!env_bool("LOG_JSON", &mut untouched));
        assert!(untouched);
    }

    #[test]
    fn test_load_from_env_overrides_defaults() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();
        std::env::set_var("RAMPART_BREAKER_MAX_FAILURES", "3");
        std::env::set_var("RAMPART_BREAKER_RESTORE_POLICY", "Closed");
        std::env::set_var("RAMPART_CACHE_QUERIES_TTL_MS", "none");
        std::env::set_var("RAMPART_STORAGE_BACKEND", "file");
        std::env::set_var("RAMPART_STORAGE_PATH", "/var/lib/rampart");
        std::env::set_var("RAMPART_LOG_LEVEL", "debug");

        let config = load_from_env().expect("valid env config");

        assert_eq!(config.breaker.max_failures, 3);
        assert_eq!(config.breaker.reset_timeout_ms, 30_000);
        assert_eq!(config.breaker.restore_policy, RestorePolicy::Closed);
        assert_eq!(config.cache.queries_ttl_ms, None);
        assert_eq!(config.cache.records_ttl_ms, Some(300_000));
        assert_eq!(config.storage.backend, StorageBackend::File);
        assert_eq!(config.logging.level, "debug");

        clear_env();
    }

    #[test]
    fn test_load_from_env_invalid_number() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();
        std::env::set_var("RAMPART_BREAKER_RESET_TIMEOUT_MS", "soon");

        let result = load_from_env();

        assert!(matches!(
            result,
            Err(RampartError::Config(ref message))
                if message.contains("RAMPART_BREAKER_RESET_TIMEOUT_MS")
        ));
        clear_env();
    }

    #[test]
    fn test_load_from_env_rejects_invalid_config() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();
        std::env::set_var("RAMPART_BREAKER_HALF_OPEN_THRESHOLD", "0");

        assert!(matches!(load_from_env(), Err(RampartError::Config(_))));
        clear_env();
    }

    #[test]
    fn test_load_from_env_unknown_enum() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();
        std::env::set_var("RAMPART_STORAGE_BACKEND", "redis");

        assert!(matches!(load_from_env(), Err(RampartError::Config(_))));
        clear_env();
    }

    #[test]
    fn test_parse_config_json() {
        let content = r#"{"breaker": {"max_failures": 2}, "cache": {"max_size": 50}}"#;

        let config = parse_config(content, Path::new("rampart.json")).expect("valid json");

        assert_eq!(config.breaker.max_failures, 2);
        assert_eq!(config.cache.max_size, Some(50));
    }

    #[test]
    fn test_parse_config_toml() {
        let content = r#"
[breaker]
reset_timeout_ms = 5000
restore_policy = "closed"

[logging]
json = true
"#;

        let config = parse_config(content, Path::new("rampart.toml")).expect("valid toml");

        assert_eq!(config.breaker.reset_timeout_ms, 5000);
        assert_eq!(config.breaker.restore_policy, RestorePolicy::Closed);
        assert!(config.logging.json);
        assert_eq!(config.breaker.max_failures, 5);
    }

    #[test]
    fn test_parse_config_unsupported_format() {
        let result = parse_config("breaker: {}", Path::new("rampart.yaml"));
        assert!(matches!(result, Err(RampartError::Config(_))));
    }

    #[test]
    fn test_load_from_file_not_found() {
        let result = load_from_file(Some(PathBuf::from("/nonexistent/rampart.toml")));
        assert!(matches!(
            result,
            Err(RampartError::Config(ref message)) if message.contains("not found")
        ));
    }
}
