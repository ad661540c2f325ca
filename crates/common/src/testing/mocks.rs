//! Mock implementations of the observability and storage traits
//!
//! Recording mocks keep everything they receive so tests can assert on the
//! exact events and metrics a component produced.

// Test mocks: errors are clearly indicated by their return types
#![allow(clippy::missing_errors_doc)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use thiserror::Error;

use crate::observability::{EventSink, MetricsCollector, RampartEvent};
use crate::resilience::{
    BreakerStateStorage, CircuitState, InMemoryBreakerStorage, StateMetadata, StorageError,
    StorageResult, StoredBreakerState,
};

/// Error type for operations in tests
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct MockError(pub String);

impl MockError {
    /// Create an error carrying `message`
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Event sink that keeps every event in order
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<RampartEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every event received so far
    #[must_use]
    pub fn events(&self) -> Vec<RampartEvent> {
        self.events.lock().clone()
    }

    /// Events whose dotted name equals `name`
    #[must_use]
    pub fn events_named(&self, name: &str) -> Vec<RampartEvent> {
        self.events.lock().iter().filter(|event| event.name() == name).cloned().collect()
    }

    /// Number of events received
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Forget every event received so far
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: &RampartEvent) {
        self.events.lock().push(event.clone());
    }
}

type SeriesKey = (String, Vec<(String, String)>);

fn series_key(name: &str, labels: &[(&str, &str)]) -> SeriesKey {
    let mut labels: Vec<(String, String)> =
        labels.iter().map(|(key, value)| ((*key).to_string(), (*value).to_string())).collect();
    labels.sort();
    (name.to_string(), labels)
}

/// Metrics collector that stores counters, gauges, and histogram samples.
///
/// Label order does not matter when querying.
#[derive(Debug, Default)]
pub struct RecordingMetricsCollector {
    counters: Mutex<HashMap<SeriesKey, u64>>,
    gauges: Mutex<HashMap<SeriesKey, f64>>,
    histograms: Mutex<HashMap<SeriesKey, Vec<f64>>>,
}

impl RecordingMetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter series (0 when never incremented)
    #[must_use]
    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.counters.lock().get(&series_key(name, labels)).copied().unwrap_or(0)
    }

    /// Sum of a counter across every label set
    #[must_use]
    pub fn counter_total(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .iter()
            .filter(|((series, _), _)| series == name)
            .map(|(_, value)| value)
            .sum()
    }

    /// Last value set on a gauge series
    #[must_use]
    pub fn gauge(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        self.gauges.lock().get(&series_key(name, labels)).copied()
    }

    /// Samples observed by a histogram series, in order
    #[must_use]
    pub fn histogram(&self, name: &str, labels: &[(&str, &str)]) -> Vec<f64> {
        self.histograms.lock().get(&series_key(name, labels)).cloned().unwrap_or_default()
    }
}

impl MetricsCollector for RecordingMetricsCollector {
    fn increment_counter(&self, name: &str, labels: &[(&str, &str)]) {
        *self.counters.lock().entry(series_key(name, labels)).or_insert(0) += 1;
    }

    fn record_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        self.gauges.lock().insert(series_key(name, labels), value);
    }

    fn record_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        self.histograms.lock().entry(series_key(name, labels)).or_default().push(value);
    }
}

/// Storage backend whose every operation fails.
///
/// Used to check that persistence errors never surface through protected
/// calls.
#[derive(Debug, Default)]
pub struct FailingBreakerStorage {
    save_attempts: AtomicU64,
}

impl FailingBreakerStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save_state` calls received
    pub fn save_attempts(&self) -> u64 {
        self.save_attempts.load(Ordering::SeqCst)
    }

    fn unavailable() -> StorageError {
        StorageError::Backend("storage unavailable".to_string())
    }
}

impl BreakerStateStorage for FailingBreakerStorage {
    fn initialize(&self) -> StorageResult<()> {
        Err(Self::unavailable())
    }

    fn save_state(
        &self,
        _service_name: &str,
        _state: CircuitState,
        _metadata: &StateMetadata,
    ) -> StorageResult<()> {
        self.save_attempts.fetch_add(1, Ordering::SeqCst);
        Err(Self::unavailable())
    }

    fn load_state(&self, _service_name: &str) -> StorageResult<StoredBreakerState> {
        Err(Self::unavailable())
    }

    fn delete_state(&self, _service_name: &str) -> StorageResult<()> {
        Err(Self::unavailable())
    }

    fn list_all(&self) -> StorageResult<Vec<String>> {
        Err(Self::unavailable())
    }
}

/// Storage that fails every operation for one service and keeps the rest in
/// memory.
///
/// `list_all` reports the failing service too, so startup restoration tries
/// (and fails) to load it.
#[derive(Debug)]
pub struct FailingServiceStorage {
    failing_service: String,
    inner: InMemoryBreakerStorage,
    failed_operations: AtomicU64,
}

impl FailingServiceStorage {
    /// Fail every operation that names `failing_service`
    pub fn new(failing_service: impl Into<String>) -> Self {
        Self {
            failing_service: failing_service.into(),
            inner: InMemoryBreakerStorage::new(),
            failed_operations: AtomicU64::new(0),
        }
    }

    /// Number of operations rejected for the failing service
    pub fn failed_operations(&self) -> u64 {
        self.failed_operations.load(Ordering::SeqCst)
    }

    fn check(&self, service_name: &str) -> StorageResult<()> {
        if service_name == self.failing_service {
            self.failed_operations.fetch_add(1, Ordering::SeqCst);
            return Err(StorageError::Backend(format!("'{service_name}' shard unavailable")));
        }
        Ok(())
    }
}

impl BreakerStateStorage for FailingServiceStorage {
    fn save_state(
        &self,
        service_name: &str,
        state: CircuitState,
        metadata: &StateMetadata,
    ) -> StorageResult<()> {
        self.check(service_name)?;
        self.inner.save_state(service_name, state, metadata)
    }

    fn load_state(&self, service_name: &str) -> StorageResult<StoredBreakerState> {
        self.check(service_name)?;
        self.inner.load_state(service_name)
    }

    fn delete_state(&self, service_name: &str) -> StorageResult<()> {
        self.check(service_name)?;
        self.inner.delete_state(service_name)
    }

    fn list_all(&self) -> StorageResult<Vec<String>> {
        let mut names = self.inner.list_all()?;
        names.push(self.failing_service.clone());
        names.sort();
        Ok(names)
    }
}
