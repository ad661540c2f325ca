//! Explicit wiring of the whole shield from a [`RampartConfig`]
//!
//! [`Rampart::initialize`] builds every component once and hands back a
//! single owner. Nothing is stored in globals; two instances built from
//! different configs are fully independent.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rampart_common::cache::{spawn_sweeper, CacheStore, NamespaceConfig};
use rampart_common::observability::{
    EventSink, FanoutEventSink, MetricsCollector, MetricsEventSink, TracingEventSink,
};
use rampart_common::resilience::{BreakerStateStorage, CircuitBreakerRecord, InMemoryBreakerStorage};
use rampart_core::{
    breaker_config, CircuitBreakerRegistry, ProtectedCallRunner, ResilienceFacade, SchemaNamespaces,
};
use rampart_domain::{RampartConfig, RampartError, Result, StorageBackend};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::observability::PrometheusMetricsCollector;
use crate::storage::FileBreakerStorage;

/// Owner of every shield component
pub struct Rampart {
    config: RampartConfig,
    storage: Arc<dyn BreakerStateStorage>,
    registry: Arc<CircuitBreakerRegistry>,
    runner: Arc<ProtectedCallRunner>,
    cache: Arc<CacheStore<Value>>,
    facade: ResilienceFacade<Value>,
    metrics: Arc<PrometheusMetricsCollector>,
    sweeper: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Rampart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rampart")
            .field("config", &self.config)
            .field("storage", &self.storage)
            .field("registry", &self.registry)
            .field("sweeper", &self.sweeper.is_some())
            .finish_non_exhaustive()
    }
}

impl Rampart {
    /// Load configuration with [`crate::config::load`] and initialize
    ///
    /// # Errors
    /// Returns `RampartError::Config` or `RampartError::Storage` as
    /// [`Rampart::initialize`] does.
    pub fn load() -> Result<Self> {
        Self::initialize(crate::config::load()?)
    }

    /// Build storage, registry, cache, runner, and facade from `config`.
    ///
    /// Persisted breaker state is restored according to
    /// `config.breaker.restore_policy`. The cache sweeper is started only
    /// when called inside a tokio runtime.
    ///
    /// # Errors
    /// Returns `RampartError::Config` for invalid configuration and
    /// `RampartError::Storage` when the storage backend cannot be prepared.
    pub fn initialize(config: RampartConfig) -> Result<Self> {
        Self::initialize_with_sink(config, None)
    }

    /// Like [`Rampart::initialize`], additionally publishing every event to
    /// `sink` (e.g. a `ChannelEventSink`)
    ///
    /// # Errors
    /// Same as [`Rampart::initialize`].
    pub fn initialize_with_sink(
        config: RampartConfig,
        sink: Option<Arc<dyn EventSink>>,
    ) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(PrometheusMetricsCollector::new());
        let collector: Arc<dyn MetricsCollector> = metrics.clone();
        let mut sinks: Vec<Arc<dyn EventSink>> = vec![
            Arc::new(TracingEventSink),
            Arc::new(MetricsEventSink::new(Arc::clone(&collector))),
        ];
        sinks.extend(sink);
        let events: Arc<dyn EventSink> = Arc::new(FanoutEventSink::new(sinks));

        let storage = build_storage(&config)?;

        let default_breaker =
            breaker_config(&config.breaker).map_err(|e| RampartError::Config(e.to_string()))?;
        let registry = Arc::new(
            CircuitBreakerRegistry::new(Arc::clone(&storage), default_breaker)
                .map_err(|e| RampartError::Config(e.to_string()))?
                .with_event_sink(Arc::clone(&events)),
        );
        let restored = registry.restore(config.breaker.restore_policy);

        let runner = Arc::new(
            ProtectedCallRunner::new(Arc::clone(&registry))
                .with_metrics(collector)
                .with_event_sink(Arc::clone(&events)),
        );

        let fallback_namespace =
            NamespaceConfig { max_size: config.cache.max_size, ..NamespaceConfig::default() };
        let cache = Arc::new(CacheStore::new(fallback_namespace).with_event_sink(events));
        let sweeper = start_sweeper(&cache, config.cache.sweep_interval_ms);

        let namespaces = SchemaNamespaces::from(&config.cache);
        let facade = ResilienceFacade::new(Arc::clone(&cache), Arc::clone(&runner), namespaces);

        info!(
            backend = ?config.storage.backend,
            restored,
            sweeper = sweeper.is_some(),
            "Rampart initialized"
        );

        Ok(Self { config, storage, registry, runner, cache, facade, metrics, sweeper })
    }

    pub fn config(&self) -> &RampartConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn BreakerStateStorage> {
        &self.storage
    }

    pub fn registry(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.registry
    }

    pub fn runner(&self) -> &Arc<ProtectedCallRunner> {
        &self.runner
    }

    pub fn cache(&self) -> &Arc<CacheStore<Value>> {
        &self.cache
    }

    pub fn facade(&self) -> &ResilienceFacade<Value> {
        &self.facade
    }

    pub fn metrics(&self) -> &Arc<PrometheusMetricsCollector> {
        &self.metrics
    }

    /// Snapshots of every registered breaker
    pub fn breakers(&self) -> Vec<CircuitBreakerRecord> {
        self.registry.records()
    }

    /// Prometheus text exposition of the shield's metrics
    ///
    /// # Errors
    /// Returns `RampartError::Metrics` if encoding fails.
    pub fn render_metrics(&self) -> Result<String> {
        Ok(self.metrics.render()?)
    }

    /// Stop the background sweeper. Breaker state is persisted on every
    /// change, so nothing else needs flushing.
    pub fn shutdown(mut self) {
        self.stop_sweeper();
        info!("Rampart shut down");
    }

    fn stop_sweeper(&mut self) {
        if let Some(handle) = self.sweeper.take() {
            handle.abort();
            debug!("Cache sweeper stopped");
        }
    }
}

impl Drop for Rampart {
    fn drop(&mut self) {
        self.stop_sweeper();
    }
}

fn build_storage(config: &RampartConfig) -> Result<Arc<dyn BreakerStateStorage>> {
    let storage: Arc<dyn BreakerStateStorage> = match config.storage.backend {
        StorageBackend::Memory => Arc::new(InMemoryBreakerStorage::new()),
        StorageBackend::File => {
            let dir = config.storage.path.as_deref().map(PathBuf::from).ok_or_else(|| {
                RampartError::Config("storage.path is required for the file backend".to_string())
            })?;
            Arc::new(FileBreakerStorage::new(dir))
        }
    };
    storage.initialize().map_err(|e| RampartError::Storage(e.to_string()))?;
    Ok(storage)
}

fn start_sweeper(
    cache: &Arc<CacheStore<Value>>,
    interval_ms: Option<u64>,
) -> Option<JoinHandle<()>> {
    let interval = Duration::from_millis(interval_ms?);
    if tokio::runtime::Handle::try_current().is_err() {
        debug!("No tokio runtime, cache entries expire lazily only");
        return None;
    }
    Some(spawn_sweeper(cache, interval))
}
