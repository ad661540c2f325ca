//! Concrete [`EventSink`] implementations

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info};

use super::events::RampartEvent;
use super::metric_names;
use super::traits::{EventSink, MetricsCollector};

/// Logs every event through `tracing`.
///
/// State changes are logged at `info`, calls and cache accesses at `debug`.
#[derive(Debug, Clone, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &RampartEvent) {
        match event {
            RampartEvent::BreakerCall { service_name, status, duration_ms } => {
                debug!(
                    event = event.name(),
                    service_name = %service_name,
                    status = %status,
                    duration_ms = *duration_ms,
                    "Protected call completed"
                );
            }
            RampartEvent::BreakerStateChanged { service_name, from, to } => {
                info!(
                    event = event.name(),
                    service_name = %service_name,
                    from = %from,
                    to = %to,
                    "Circuit breaker state changed"
                );
            }
            RampartEvent::CacheHit { namespace, key }
            | RampartEvent::CacheMiss { namespace, key } => {
                debug!(event = event.name(), namespace = %namespace, key = %key, "Cache access");
            }
        }
    }
}

/// Forwards events into a bounded channel for an out-of-band consumer.
///
/// Uses `try_send`: when the channel is full (or the receiver is gone) the
/// event is dropped and counted, so a slow consumer never stalls a call.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: mpsc::Sender<RampartEvent>,
    dropped: Arc<AtomicU64>,
}

impl ChannelEventSink {
    /// Create a sink and the receiver that drains it
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<RampartEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender, dropped: Arc::new(AtomicU64::new(0)) }, receiver)
    }

    /// Events discarded because of backpressure or a closed receiver
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: &RampartEvent) {
        match self.sender.try_send(event.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Delivers each event to several sinks in order
#[derive(Debug, Clone, Default)]
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    /// Deliver to `sinks` in the given order
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    /// Append `sink` after the existing ones
    #[must_use]
    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanoutEventSink {
    fn emit(&self, event: &RampartEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

/// Turns transition and cache events into counters.
///
/// Call events are ignored here because the call runner records them
/// directly (counter plus duration histogram).
#[derive(Debug, Clone)]
pub struct MetricsEventSink {
    collector: Arc<dyn MetricsCollector>,
}

impl MetricsEventSink {
    /// Record into `collector`
    pub fn new(collector: Arc<dyn MetricsCollector>) -> Self {
        Self { collector }
    }
}

impl EventSink for MetricsEventSink {
    fn emit(&self, event: &RampartEvent) {
        match event {
            RampartEvent::BreakerCall { .. } => {}
            RampartEvent::BreakerStateChanged { service_name, from, to } => {
                self.collector.increment_counter(
                    metric_names::TRANSITIONS_TOTAL,
                    &[
                        ("service_name", service_name.as_str()),
                        ("from", from.as_str()),
                        ("to", to.as_str()),
                    ],
                );
            }
            RampartEvent::CacheHit { namespace, .. } => {
                self.collector.increment_counter(
                    metric_names::CACHE_HITS_TOTAL,
                    &[("namespace", namespace.as_str())],
                );
            }
            RampartEvent::CacheMiss { namespace, .. } => {
                self.collector.increment_counter(
                    metric_names::CACHE_MISSES_TOTAL,
                    &[("namespace", namespace.as_str())],
                );
            }
        }
    }
}
