//! # Rampart Domain
//!
//! Plain configuration types, the shared error type, and constants.
//!
//! ## Architecture
//! - No dependencies on other Rampart crates
//! - Only external dependencies allowed

pub mod config;
pub mod constants;
pub mod errors;

// Re-export commonly used items
pub use config::{
    BreakerSettings, CacheSettings, LoggingConfig, RampartConfig, RestorePolicy, StorageBackend,
    StorageSettings,
};
pub use errors::{RampartError, Result};
