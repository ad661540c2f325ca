//! Breaker state storage backends
//!
//! The in-memory backend lives in `rampart-common`; this module adds the
//! backends that touch the filesystem.

pub mod file;

pub use file::FileBreakerStorage;
