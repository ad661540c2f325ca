//! Integration tests for configuration loader
//!
//! Tests the end-to-end behavior of loading configuration from files.

use std::fs;
use std::path::PathBuf;

use rampart_domain::{RampartError, RestorePolicy, StorageBackend};
use rampart_infra::config;
use tempfile::TempDir;

fn write_config(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("Failed to write config file");
    path
}

#[test]
fn test_load_config_from_json_file() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = write_config(
        &dir,
        "rampart.json",
        r#"{
            "cache": {
                "records_ttl_ms": 120000,
                "queries_ttl_ms": null,
                "max_size": 250
            },
            "breaker": {
                "max_failures": 3,
                "reset_timeout_ms": 10000,
                "half_open_threshold": 2
            },
            "storage": {
                "backend": "file",
                "path": "/var/lib/rampart/breakers"
            }
        }"#,
    );

    let config = config::load_from_file(Some(path)).expect("Failed to load config from JSON file");

    assert_eq!(config.cache.records_ttl_ms, Some(120_000));
    assert_eq!(config.cache.queries_ttl_ms, None);
    assert_eq!(config.cache.max_size, Some(250));
    assert_eq!(config.breaker.max_failures, 3);
    assert_eq!(config.breaker.reset_timeout_ms, 10_000);
    assert_eq!(config.breaker.half_open_threshold, 2);
    assert!(config.breaker.enabled);
    assert_eq!(config.storage.backend, StorageBackend::File);
    assert_eq!(config.storage.path.as_deref(), Some("/var/lib/rampart/breakers"));
}

#[test]
fn test_load_config_from_toml_file() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = write_config(
        &dir,
        "config.toml",
        r#"
[breaker]
enabled = false
restore_policy = "closed"

[logging]
level = "rampart=debug"
json = true
"#,
    );

    let config = config::load_from_file(Some(path)).expect("Failed to load config from TOML file");

    assert!(!config.breaker.enabled);
    assert_eq!(config.breaker.restore_policy, RestorePolicy::Closed);
    assert_eq!(config.logging.level, "rampart=debug");
    assert!(config.logging.json);

    // Unspecified sections keep their defaults
    assert_eq!(config.breaker.max_failures, 5);
    assert_eq!(config.cache.records_ttl_ms, Some(300_000));
    assert_eq!(config.storage.backend, StorageBackend::Memory);
}

#[test]
fn test_load_config_invalid_format() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = write_config(&dir, "rampart.json", r#"{"breaker": {"max_failures": "many"}}"#);

    let result = config::load_from_file(Some(path));

    assert!(matches!(
        result,
        Err(RampartError::Config(ref message)) if message.contains("Invalid JSON")
    ));
}

#[test]
fn test_load_config_fails_validation() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = write_config(&dir, "rampart.toml", "[storage]\nbackend = \"file\"\n");

    let result = config::load_from_file(Some(path));

    assert!(matches!(
        result,
        Err(RampartError::Config(ref message)) if message.contains("storage.path")
    ));
}

#[test]
fn test_load_config_file_not_found() {
    let dir = TempDir::new().expect("Failed to create temp dir");

    let result = config::load_from_file(Some(dir.path().join("missing.toml")));

    assert!(matches!(result, Err(RampartError::Config(_))));
}
