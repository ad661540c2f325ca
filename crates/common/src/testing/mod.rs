//! Testing utilities and helpers
//!
//! - **[`mocks`]**: recording sinks and collectors, failing storage (all
//!   services or one), a simple operation error type
//! - **[`async_utils`]**: polling helpers for background work
//!
//! `MockClock` lives in [`crate::resilience`] and is re-exported here.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use rampart_common::observability::{EventSink, RampartEvent};
//! use rampart_common::testing::RecordingEventSink;
//!
//! let sink = Arc::new(RecordingEventSink::new());
//! sink.emit(&RampartEvent::CacheMiss { namespace: "ns".into(), key: "k".into() });
//! assert_eq!(sink.len(), 1);
//! ```

pub mod async_utils;
pub mod mocks;

pub use async_utils::poll_until;
pub use mocks::{
    FailingBreakerStorage, FailingServiceStorage, MockError, RecordingEventSink,
    RecordingMetricsCollector,
};

pub use crate::resilience::MockClock;
