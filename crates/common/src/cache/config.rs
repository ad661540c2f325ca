//! Namespace configuration and eviction policies

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::utils::duration_millis;

/// Policy applied when a namespace exceeds its soft `max_size`.
///
/// Expired entries are always purged first; the policy only picks among live
/// entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Least recently read or written
    Lru,
    /// Fewest reads, oldest first on ties
    Lfu,
    /// Oldest insertion
    #[default]
    Fifo,
    /// Never evict; `max_size` is informational only
    None,
}

/// Per-namespace defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceConfig {
    /// TTL applied by `put` when no explicit TTL is given (`None` = never expires)
    #[serde(rename = "default_ttl_ms", with = "duration_millis::option")]
    pub default_ttl: Option<Duration>,

    /// Soft capacity (`None` = unbounded)
    pub max_size: Option<usize>,

    /// Victim selection once `max_size` is reached
    pub eviction_policy: EvictionPolicy,
}

impl NamespaceConfig {
    /// Create a new configuration builder
    pub fn builder() -> NamespaceConfigBuilder {
        NamespaceConfigBuilder::default()
    }

    /// TTL and capacity with the default eviction policy
    pub fn new(default_ttl: Option<Duration>, max_size: Option<usize>) -> Self {
        Self { default_ttl, max_size, eviction_policy: EvictionPolicy::default() }
    }

    /// Quick preset: entries expire after `ttl`, no capacity limit
    pub fn ttl(ttl: Duration) -> Self {
        Self { default_ttl: Some(ttl), ..Self::default() }
    }
}

/// Builder for [`NamespaceConfig`]
#[derive(Debug, Default)]
pub struct NamespaceConfigBuilder {
    config: NamespaceConfig,
}

impl NamespaceConfigBuilder {
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.config.default_ttl = Some(ttl);
        self
    }

    pub fn default_ttl_ms(self, millis: u64) -> Self {
        self.default_ttl(Duration::from_millis(millis))
    }

    pub fn max_size(mut self, size: usize) -> Self {
        self.config.max_size = Some(size);
        self
    }

    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.config.eviction_policy = policy;
        self
    }

    pub fn build(self) -> NamespaceConfig {
        self.config
    }
}
