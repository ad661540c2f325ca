//! # Rampart Infrastructure
//!
//! Infrastructure implementations of the shield's ports.
//!
//! This crate contains:
//! - Config loading from files and `RAMPART_*` environment variables
//! - File-backed breaker state storage
//! - Prometheus metrics collection and tracing subscriber setup
//! - [`Rampart`], which wires every component from a config
//!
//! ## Architecture
//! - Implements traits defined in `rampart-common`
//! - Depends on `rampart-domain` and `rampart-core`
//! - Contains all "impure" code (file I/O, environment, global subscriber)

pub mod bootstrap;
pub mod config;
pub mod observability;
pub mod storage;

pub use bootstrap::Rampart;
pub use observability::{init_tracing, MetricsError, MetricsResult, PrometheusMetricsCollector};
pub use storage::FileBreakerStorage;
