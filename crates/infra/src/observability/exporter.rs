//! Prometheus metrics collector
//!
//! Metric families are created on first use, keyed by name, with the label
//! names of that first call. Later calls must use the same label names (in
//! any order); mismatches are logged and dropped.

use std::collections::HashMap;

use parking_lot::RwLock;
use prometheus::core::Collector;
use prometheus::proto::MetricFamily;
use prometheus::{CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use rampart_common::observability::metric_names::{
    CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL, CALLS_TOTAL, CALL_DURATION_MS, TRANSITIONS_TOTAL,
};
use rampart_common::observability::MetricsCollector;

use super::{MetricsError, MetricsResult};

/// Histogram buckets for call durations in milliseconds
const DURATION_BUCKETS_MS: [f64; 12] =
    [1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10_000.0];

fn help_text(name: &str) -> &str {
    match name {
        CALLS_TOTAL => "Protected calls by service and outcome",
        CALL_DURATION_MS => "Protected call duration in milliseconds",
        TRANSITIONS_TOTAL => "Circuit breaker state transitions",
        CACHE_HITS_TOTAL => "Cache hits by namespace",
        CACHE_MISSES_TOTAL => "Cache misses by namespace",
        other => other,
    }
}

/// [`MetricsCollector`] backed by a private Prometheus [`Registry`]
pub struct PrometheusMetricsCollector {
    registry: Registry,
    counters: RwLock<HashMap<String, CounterVec>>,
    gauges: RwLock<HashMap<String, GaugeVec>>,
    histograms: RwLock<HashMap<String, HistogramVec>>,
}

impl std::fmt::Debug for PrometheusMetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusMetricsCollector")
            .field("counters", &self.counters.read().len())
            .field("gauges", &self.gauges.read().len())
            .field("histograms", &self.histograms.read().len())
            .finish_non_exhaustive()
    }
}

impl Default for PrometheusMetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl PrometheusMetricsCollector {
    pub fn new() -> Self {
        Self::with_registry(Registry::new())
    }

    /// Register families into an existing registry, e.g. one already served
    /// by an HTTP exporter
    pub fn with_registry(registry: Registry) -> Self {
        Self {
            registry,
            counters: RwLock::new(HashMap::new()),
            gauges: RwLock::new(HashMap::new()),
            histograms: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Snapshot of every registered family
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Prometheus text exposition of every registered family
    ///
    /// # Errors
    /// Returns `MetricsError::Encode` if encoding fails.
    pub fn render(&self) -> MetricsResult<String> {
        TextEncoder::new()
            .encode_to_string(&self.gather())
            .map_err(|e| MetricsError::Encode(e.to_string()))
    }

    /// Increment a counter series
    ///
    /// # Errors
    /// Returns `MetricsError` if the family cannot be registered or the
    /// labels do not match it.
    pub fn try_increment_counter(&self, name: &str, labels: &[(&str, &str)]) -> MetricsResult<()> {
        let family = family(&self.registry, &self.counters, name, || {
            CounterVec::new(Opts::new(name, help_text(name)), &label_names(labels))
        })?;
        family
            .get_metric_with(&label_map(labels))
            .map_err(|source| labels_error(name, source))?
            .inc();
        Ok(())
    }

    /// Set a gauge series
    ///
    /// # Errors
    /// Same as [`PrometheusMetricsCollector::try_increment_counter`].
    pub fn try_record_gauge(
        &self,
        name: &str,
        value: f64,
        labels: &[(&str, &str)],
    ) -> MetricsResult<()> {
        let family = family(&self.registry, &self.gauges, name, || {
            GaugeVec::new(Opts::new(name, help_text(name)), &label_names(labels))
        })?;
        family
            .get_metric_with(&label_map(labels))
            .map_err(|source| labels_error(name, source))?
            .set(value);
        Ok(())
    }

    /// Observe a histogram sample
    ///
    /// # Errors
    /// Same as [`PrometheusMetricsCollector::try_increment_counter`].
    pub fn try_record_histogram(
        &self,
        name: &str,
        value: f64,
        labels: &[(&str, &str)],
    ) -> MetricsResult<()> {
        let family = family(&self.registry, &self.histograms, name, || {
            let opts =
                HistogramOpts::new(name, help_text(name)).buckets(DURATION_BUCKETS_MS.to_vec());
            HistogramVec::new(opts, &label_names(labels))
        })?;
        family
            .get_metric_with(&label_map(labels))
            .map_err(|source| labels_error(name, source))?
            .observe(value);
        Ok(())
    }

    /// Current value of a counter series, if it exists
    pub fn counter_value(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        let counters = self.counters.read();
        counters.get(name)?.get_metric_with(&label_map(labels)).ok().map(|counter| counter.get())
    }

    /// Number of samples observed by a histogram series, if it exists
    pub fn histogram_count(&self, name: &str, labels: &[(&str, &str)]) -> Option<u64> {
        let histograms = self.histograms.read();
        histograms
            .get(name)?
            .get_metric_with(&label_map(labels))
            .ok()
            .map(|histogram| histogram.get_sample_count())
    }
}

impl MetricsCollector for PrometheusMetricsCollector {
    fn increment_counter(&self, name: &str, labels: &[(&str, &str)]) {
        if let Err(err) = self.try_increment_counter(name, labels) {
            tracing::warn!(error = %err, "Dropping counter increment");
        }
    }

    fn record_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        if let Err(err) = self.try_record_gauge(name, value, labels) {
            tracing::warn!(error = %err, "Dropping gauge sample");
        }
    }

    fn record_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        if let Err(err) = self.try_record_histogram(name, value, labels) {
            tracing::warn!(error = %err, "Dropping histogram sample");
        }
    }
}

/// Look up the family for `name`, creating and registering it on first use
fn family<M>(
    registry: &Registry,
    families: &RwLock<HashMap<String, M>>,
    name: &str,
    create: impl FnOnce() -> prometheus::Result<M>,
) -> MetricsResult<M>
where
    M: Collector + Clone + 'static,
{
    if let Some(existing) = families.read().get(name) {
        return Ok(existing.clone());
    }

    let mut families = families.write();
    if let Some(existing) = families.get(name) {
        return Ok(existing.clone());
    }

    let registration = |source| MetricsError::Registration { metric: name.to_string(), source };
    let created = create().map_err(registration)?;
    registry.register(Box::new(created.clone())).map_err(registration)?;
    families.insert(name.to_string(), created.clone());
    tracing::debug!(metric = name, "Registered Prometheus metric family");
    Ok(created)
}

fn label_names<'a>(labels: &[(&'a str, &str)]) -> Vec<&'a str> {
    labels.iter().map(|(key, _)| *key).collect()
}

fn label_map<'a>(labels: &[(&'a str, &'a str)]) -> HashMap<&'a str, &'a str> {
    labels.iter().copied().collect()
}

fn labels_error(name: &str, source: prometheus::Error) -> MetricsError {
    MetricsError::Labels { metric: name.to_string(), source }
}
