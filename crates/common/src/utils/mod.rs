//! Shared helpers
//!
//! - **[`serde`]**: millisecond encodings for `Duration` fields

pub mod serde;

pub use self::serde::duration_millis;
