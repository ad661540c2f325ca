//! Trait abstractions for observability components
//!
//! Components emit metrics and events through these traits so they never
//! depend on a concrete backend. Both traits are synchronous and are invoked
//! inline after each call completes; implementations must not block.

use std::fmt::Debug;

use super::events::RampartEvent;

// ============================================================================
// Metrics Collection Traits
// ============================================================================

/// Trait for metrics collection implementations
///
/// Allows components to emit metrics without depending on a specific
/// metrics collection system.
pub trait MetricsCollector: Send + Sync + Debug {
    /// Record a counter metric
    fn increment_counter(&self, name: &str, labels: &[(&str, &str)]);

    /// Record a gauge metric
    fn record_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]);

    /// Record a histogram metric
    fn record_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]);

    /// Record timing metric (in milliseconds)
    #[allow(clippy::cast_precision_loss)]
    fn record_timing(&self, name: &str, duration_ms: u64, labels: &[(&str, &str)]) {
        self.record_histogram(name, duration_ms as f64, labels);
    }
}

// ============================================================================
// Event Publication Traits
// ============================================================================

/// Observer for [`RampartEvent`]s.
///
/// The resilience layer does not depend on any subscriber being present;
/// events are dropped when nobody listens.
pub trait EventSink: Send + Sync + Debug {
    /// Receive one event
    fn emit(&self, event: &RampartEvent);
}

// ============================================================================
// No-Op Implementations
// ============================================================================

/// No-op metrics collector for testing or when metrics are disabled
#[derive(Debug, Clone, Default)]
pub struct NoOpMetricsCollector;

impl MetricsCollector for NoOpMetricsCollector {
    fn increment_counter(&self, _name: &str, _labels: &[(&str, &str)]) {}

    fn record_gauge(&self, _name: &str, _value: f64, _labels: &[(&str, &str)]) {}

    fn record_histogram(&self, _name: &str, _value: f64, _labels: &[(&str, &str)]) {}
}

/// Event sink that discards everything
#[derive(Debug, Clone, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event: &RampartEvent) {}
}
