//! Building blocks of the Rampart data-access shield.
//!
//! - [`cache`]: namespaced TTL store with stats and deterministic query keys
//! - [`resilience`]: per-service circuit breaker, its configuration, and
//!   pluggable state persistence
//! - [`observability`]: metrics and event traits plus ready-made sinks
//! - [`utils`]: serde helpers
//!
//! # Features
//!
//! - `foundation`: [`utils`] and the serde/error stack
//! - `observability`: `foundation` plus `tracing`
//! - `runtime`: [`cache`], [`resilience`] and [`observability`]
//! - `test-utils`: `runtime` plus recording mocks for downstream tests

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// ---------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod utils;

// Runtime tier
// ---------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod cache;
#[cfg(feature = "runtime")]
pub mod observability;
#[cfg(feature = "runtime")]
pub mod resilience;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(any(feature = "test-utils", all(test, feature = "runtime")))]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "runtime")]
pub use cache::{generate_query_key, CacheStats, CacheStore, EvictionPolicy, NamespaceConfig};
#[cfg(feature = "runtime")]
pub use observability::{CallStatus, EventSink, MetricsCollector, RampartEvent};
#[cfg(feature = "runtime")]
pub use resilience::{
    BreakerConfig, BreakerStateStorage, CircuitBreaker, CircuitBreakerRecord, CircuitState, Clock,
    InMemoryBreakerStorage, MockClock, ResilienceError, ResilienceResult, SystemClock,
};
#[cfg(feature = "foundation")]
pub use utils::serde::duration_millis;
