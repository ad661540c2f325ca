//! Configuration loading
//!
//! Builds a [`rampart_domain::RampartConfig`] from config files and
//! `RAMPART_*` environment variables.

pub mod loader;

pub use loader::{load, load_from_env, load_from_file, search_config_paths};
