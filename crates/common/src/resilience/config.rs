//! Circuit breaker configuration and builder

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{ConfigError, ConfigResult};
use crate::utils::duration_millis;

/// Default number of consecutive failures that opens a breaker
pub const DEFAULT_MAX_FAILURES: u32 = 5;
/// Default time an open breaker waits before allowing a trial call
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(30);
/// Default number of half-open successes needed to close a breaker
pub const DEFAULT_HALF_OPEN_THRESHOLD: u32 = 2;

/// Configuration for a single circuit breaker.
///
/// Updates applied through the registry take effect on the next evaluated
/// call; counters already accumulated are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures in `Closed` that open the circuit (>= 1)
    pub max_failures: u32,
    /// Time an `Open` breaker waits before admitting a trial call
    #[serde(rename = "reset_timeout_ms", with = "duration_millis")]
    pub reset_timeout: Duration,
    /// Successes in `HalfOpen` required to close the circuit (>= 1)
    pub half_open_threshold: u32,
    /// When false the breaker is bypassed and never changes state
    pub enabled: bool,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: DEFAULT_MAX_FAILURES,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
            half_open_threshold: DEFAULT_HALF_OPEN_THRESHOLD,
            enabled: true,
        }
    }
}

impl BreakerConfig {
    /// Create a configuration builder
    pub fn builder() -> BreakerConfigBuilder {
        BreakerConfigBuilder::new()
    }

    /// A configuration that bypasses the breaker entirely.
    pub fn disabled() -> Self {
        Self { enabled: false, ..Self::default() }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_failures == 0 {
            return Err(ConfigError::Invalid {
                message: "max_failures must be greater than 0".to_string(),
            });
        }

        if self.half_open_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "half_open_threshold must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Builder for [`BreakerConfig`]
#[derive(Debug, Default)]
pub struct BreakerConfigBuilder {
    config: BreakerConfig,
}

impl BreakerConfigBuilder {
    pub fn new() -> Self {
        Self { config: BreakerConfig::default() }
    }

    pub fn max_failures(mut self, max_failures: u32) -> Self {
        self.config.max_failures = max_failures;
        self
    }

    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.config.reset_timeout = timeout;
        self
    }

    pub fn reset_timeout_ms(self, millis: u64) -> Self {
        self.reset_timeout(Duration::from_millis(millis))
    }

    pub fn half_open_threshold(mut self, threshold: u32) -> Self {
        self.config.half_open_threshold = threshold;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    pub fn build(self) -> ConfigResult<BreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
