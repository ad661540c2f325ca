//! Circuit breaking for calls to unreliable resources
//!
//! - **[`CircuitBreaker`]**: the per-service `Closed`/`Open`/`HalfOpen` state
//!   machine, generic over the operation's error type
//! - **[`BreakerConfig`]**: thresholds and timeouts, validated on build
//! - **[`BreakerStateStorage`]**: pluggable persistence of breaker snapshots,
//!   with an in-memory default
//! - **[`Clock`]**: time source shared with the cache; [`MockClock`] makes
//!   recovery timeouts testable without sleeping
//!
//! Registry and call-runner layers live in `rampart-core`.

pub mod circuit_breaker;
pub mod clock;
pub mod config;
pub mod error;
pub mod storage;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerRecord, CircuitState};
pub use clock::{Clock, MockClock, SystemClock};
pub use config::{
    BreakerConfig, BreakerConfigBuilder, DEFAULT_HALF_OPEN_THRESHOLD, DEFAULT_MAX_FAILURES,
    DEFAULT_RESET_TIMEOUT,
};
pub use error::{ConfigError, ConfigResult, ResilienceError, ResilienceResult};
pub use storage::{
    BreakerStateStorage, InMemoryBreakerStorage, StateMetadata, StorageError, StorageResult,
    StoredBreakerState,
};
