//! Conversions from loaded configuration to runtime configs

use std::time::Duration;

use rampart_common::cache::NamespaceConfig;
use rampart_common::resilience::{BreakerConfig, ConfigResult};
use rampart_domain::{BreakerSettings, CacheSettings};

/// Build a validated breaker config from the `[breaker]` section
///
/// # Errors
/// Returns `ConfigError::Invalid` when the settings violate breaker invariants.
pub fn breaker_config(settings: &BreakerSettings) -> ConfigResult<BreakerConfig> {
    BreakerConfig::builder()
        .max_failures(settings.max_failures)
        .reset_timeout_ms(settings.reset_timeout_ms)
        .half_open_threshold(settings.half_open_threshold)
        .enabled(settings.enabled)
        .build()
}

/// Namespace configs for the two namespaces declared per schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchemaNamespaces {
    pub records: NamespaceConfig,
    pub queries: NamespaceConfig,
}

impl SchemaNamespaces {
    /// Derive both namespace configs from the cache settings
    pub fn from_settings(settings: &CacheSettings) -> Self {
        let namespace = |ttl_ms: Option<u64>| NamespaceConfig {
            default_ttl: ttl_ms.map(Duration::from_millis),
            max_size: settings.max_size,
            ..NamespaceConfig::default()
        };
        Self {
            records: namespace(settings.records_ttl_ms),
            queries: namespace(settings.queries_ttl_ms),
        }
    }
}

impl From<&CacheSettings> for SchemaNamespaces {
    fn from(settings: &CacheSettings) -> Self {
        Self::from_settings(settings)
    }
}
