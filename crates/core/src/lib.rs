//! # Rampart Core
//!
//! Service layer of the data-access shield.
//!
//! This crate contains:
//! - The circuit breaker registry
//! - The protected call runner (auto-registration, fallbacks, metrics, events)
//! - The schema facade (read-through caching, invalidation, status)
//!
//! ## Architecture Principles
//! - Depends only on `rampart-common` and `rampart-domain`
//! - Storage, metrics, and events arrive as trait objects
//! - No config loading, file I/O, or subscriber setup

pub mod facade;
pub mod registry;
pub mod runner;
pub mod settings;

pub use facade::{
    queries_namespace, records_namespace, BreakerStatus, CacheStatus, ResilienceFacade,
    SchemaStatus,
};
pub use registry::{CircuitBreakerRegistry, RegistryError, RegistryResult};
pub use runner::{CallOptions, ProtectedCallRunner};
pub use settings::{breaker_config, SchemaNamespaces};
