//! Observability infrastructure for metrics and logging
//!
//! - Prometheus-backed [`MetricsCollector`](rampart_common::observability::MetricsCollector)
//!   with text exposition (exporter/)
//! - `tracing-subscriber` initialisation from [`LoggingConfig`](rampart_domain::LoggingConfig)
//!   (logging/)
//!
//! Recording never fails from the caller's point of view: a metric that
//! cannot be registered or labelled is logged at `warn` and dropped.

pub mod logging;
pub mod exporter;

pub use self::logging::init_tracing;
pub use self::exporter::PrometheusMetricsCollector;

/// Errors raised while registering or exporting metrics
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// A collector could not be created or registered
    #[error("Failed to register metric '{metric}': {source}")]
    Registration {
        /// Metric name
        metric: String,
        #[source]
        source: prometheus::Error,
    },

    /// The label set does not match the one the metric was registered with
    #[error("Label mismatch for metric '{metric}': {source}")]
    Labels {
        /// Metric name
        metric: String,
        #[source]
        source: prometheus::Error,
    },

    /// Text exposition failed
    #[error("Failed to encode metrics: {0}")]
    Encode(String),
}

/// Result type for metrics operations
pub type MetricsResult<T> = Result<T, MetricsError>;

impl From<MetricsError> for rampart_domain::RampartError {
    fn from(err: MetricsError) -> Self {
        Self::Metrics(err.to_string())
    }
}
