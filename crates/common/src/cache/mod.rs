//! Namespaced TTL cache
//!
//! - **Namespaces**: independent partitions (`"users:records"`,
//!   `"users:queries"`) that can be cleared without touching each other
//! - **TTL**: per-entry expiry, checked lazily on read and optionally swept
//!   by a background task
//! - **Stats**: per-namespace hit/miss counters updated atomically
//! - **Query keys**: order-independent hashing of query conditions and options
//! - **Testable**: clock abstraction for deterministic expiry tests
//!
//! # Example
//! ```
//! use std::time::Duration;
//!
//! use rampart_common::cache::{generate_query_key, CacheStore, NamespaceConfig};
//! use serde_json::json;
//!
//! let store: CacheStore<Vec<u64>> = CacheStore::new(NamespaceConfig::default());
//! store.create_namespace("users:queries", NamespaceConfig::ttl(Duration::from_secs(60)));
//!
//! let key = generate_query_key(&json!({"active": true}), &json!({"limit": 20}));
//! store.put("users:queries", key.clone(), vec![1, 2, 3]);
//! assert_eq!(store.get("users:queries", &key), Some(vec![1, 2, 3]));
//!
//! store.clear("users:queries");
//! assert_eq!(store.get("users:queries", &key), None);
//! ```

mod config;
mod core;
mod query_key;
mod stats;

pub use config::{EvictionPolicy, NamespaceConfig, NamespaceConfigBuilder};
pub use core::{spawn_sweeper, CacheStore};
pub use query_key::{generate_query_key, QUERY_KEY_PREFIX};
pub use stats::CacheStats;
