//! Observability primitives - metrics, events, and logging sinks
//!
//! - Trait abstractions for metrics and events (traits/)
//! - The event vocabulary of the resilience layer (events/)
//! - Ready-made sinks: tracing, bounded channel, fan-out, metrics bridge (sinks/)

pub mod events;
pub mod sinks;
pub mod traits;

pub use events::{CallStatus, RampartEvent};
pub use sinks::{ChannelEventSink, FanoutEventSink, MetricsEventSink, TracingEventSink};
pub use traits::{EventSink, MetricsCollector, NoOpEventSink, NoOpMetricsCollector};

/// Metric names emitted by the resilience layer
pub mod metric_names {
    /// Counter labelled `service_name`, `status`
    pub const CALLS_TOTAL: &str = "rampart_circuit_breaker_calls_total";
    /// Histogram (milliseconds) labelled `service_name`
    pub const CALL_DURATION_MS: &str = "rampart_circuit_breaker_call_duration_ms";
    /// Counter labelled `service_name`, `from`, `to`
    pub const TRANSITIONS_TOTAL: &str = "rampart_circuit_breaker_transitions_total";
    /// Counter labelled `namespace`
    pub const CACHE_HITS_TOTAL: &str = "rampart_cache_hits_total";
    /// Counter labelled `namespace`
    pub const CACHE_MISSES_TOTAL: &str = "rampart_cache_misses_total";
}
