//! Directory of circuit breakers keyed by service name
//!
//! The registry owns the name -> breaker table and the shared collaborators
//! (clock, storage, event sink) handed to every breaker it creates. It never
//! mutates breaker state itself; resets and config updates are delegated to
//! the breaker, which is the single writer of its own record.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rampart_common::observability::{EventSink, NoOpEventSink};
use rampart_common::resilience::{
    BreakerConfig, BreakerStateStorage, CircuitBreaker, CircuitBreakerRecord, CircuitState, Clock,
    ConfigError, StorageError, SystemClock,
};
use rampart_domain::RestorePolicy;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors returned by registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("No circuit breaker registered for '{service}'")]
    NotFound { service: String },

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Concurrent table of per-service circuit breakers
pub struct CircuitBreakerRegistry<C: Clock + Clone = SystemClock> {
    breakers: DashMap<String, Arc<CircuitBreaker<C>>>,
    default_config: BreakerConfig,
    clock: C,
    storage: Arc<dyn BreakerStateStorage>,
    events: Arc<dyn EventSink>,
}

impl<C: Clock + Clone> std::fmt::Debug for CircuitBreakerRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("services", &self.breakers.len())
            .field("default_config", &self.default_config)
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

impl CircuitBreakerRegistry<SystemClock> {
    /// Create a registry using the system clock
    ///
    /// # Errors
    /// Returns `RegistryError::InvalidConfig` if `default_config` is invalid.
    pub fn new(
        storage: Arc<dyn BreakerStateStorage>,
        default_config: BreakerConfig,
    ) -> RegistryResult<Self> {
        Self::with_clock(storage, default_config, SystemClock)
    }
}

impl<C: Clock + Clone> CircuitBreakerRegistry<C> {
    /// Create a registry with a custom clock shared by every breaker
    ///
    /// # Errors
    /// Returns `RegistryError::InvalidConfig` if `default_config` is invalid.
    pub fn with_clock(
        storage: Arc<dyn BreakerStateStorage>,
        default_config: BreakerConfig,
        clock: C,
    ) -> RegistryResult<Self> {
        default_config.validate()?;
        Ok(Self {
            breakers: DashMap::new(),
            default_config,
            clock,
            storage,
            events: Arc::new(NoOpEventSink),
        })
    }

    /// Publish state changes of every breaker created from now on to `events`
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Config applied to services registered without one, and on restore
    pub fn default_config(&self) -> BreakerConfig {
        self.default_config
    }

    /// Clock shared by every breaker in the registry
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Register `service_name`, or update the config of an existing breaker.
    ///
    /// # Errors
    /// Returns `RegistryError::InvalidConfig` if `config` is invalid.
    pub fn register(
        &self,
        service_name: &str,
        config: BreakerConfig,
    ) -> RegistryResult<Arc<CircuitBreaker<C>>> {
        let breaker = self.register_if_absent(service_name, config)?;
        if breaker.config() != config {
            breaker.update_config(config)?;
        }
        Ok(breaker)
    }

    /// Return the existing breaker, or register one with `config` (the
    /// registry default when `None`). An existing breaker keeps its config.
    ///
    /// # Errors
    /// Returns `RegistryError::InvalidConfig` if a new breaker's config is invalid.
    pub fn get_or_register(
        &self,
        service_name: &str,
        config: Option<BreakerConfig>,
    ) -> RegistryResult<Arc<CircuitBreaker<C>>> {
        match self.get(service_name) {
            Some(breaker) => Ok(breaker),
            None => self.register_if_absent(service_name, config.unwrap_or(self.default_config)),
        }
    }

    /// The breaker registered for `service_name`, if any
    pub fn get(&self, service_name: &str) -> Option<Arc<CircuitBreaker<C>>> {
        self.breakers.get(service_name).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether `service_name` has a registered breaker
    pub fn contains(&self, service_name: &str) -> bool {
        self.breakers.contains_key(service_name)
    }

    /// Current state of a service's breaker
    ///
    /// # Errors
    /// Returns `RegistryError::NotFound` for unknown services.
    pub fn state(&self, service_name: &str) -> RegistryResult<CircuitState> {
        Ok(self.require(service_name)?.state())
    }

    /// Snapshot of a service's breaker
    ///
    /// # Errors
    /// Returns `RegistryError::NotFound` for unknown services.
    pub fn record(&self, service_name: &str) -> RegistryResult<CircuitBreakerRecord> {
        Ok(self.require(service_name)?.record())
    }

    /// Force a breaker back to `Closed` with zero counters
    ///
    /// # Errors
    /// Returns `RegistryError::NotFound` for unknown services.
    pub fn reset(&self, service_name: &str) -> RegistryResult<()> {
        self.require(service_name)?.reset();
        Ok(())
    }

    /// Replace a breaker's config; applies from its next evaluated call
    ///
    /// # Errors
    /// Returns `RegistryError::NotFound` for unknown services and
    /// `RegistryError::InvalidConfig` for invalid configs.
    pub fn update_config(&self, service_name: &str, config: BreakerConfig) -> RegistryResult<()> {
        self.require(service_name)?.update_config(config)?;
        Ok(())
    }

    /// Every registered service and its state, sorted by name
    pub fn list_all(&self) -> Vec<(String, CircuitState)> {
        let mut services: Vec<(String, CircuitState)> = self
            .breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().state()))
            .collect();
        services.sort_by(|a, b| a.0.cmp(&b.0));
        services
    }

    /// Snapshots of every breaker, sorted by service name
    pub fn records(&self) -> Vec<CircuitBreakerRecord> {
        let breakers: Vec<Arc<CircuitBreaker<C>>> =
            self.breakers.iter().map(|entry| Arc::clone(entry.value())).collect();
        let mut records: Vec<CircuitBreakerRecord> =
            breakers.iter().map(|breaker| breaker.record()).collect();
        records.sort_by(|a, b| a.service_name.cmp(&b.service_name));
        records
    }

    /// Unregister a service and delete its persisted state
    ///
    /// # Errors
    /// Returns `RegistryError::NotFound` for unknown services.
    pub fn remove(&self, service_name: &str) -> RegistryResult<()> {
        if self.breakers.remove(service_name).is_none() {
            return Err(RegistryError::NotFound { service: service_name.to_string() });
        }
        if let Err(err) = self.storage.delete_state(service_name) {
            warn!(
                service = service_name,
                error = %err,
                "Failed to delete persisted circuit breaker state"
            );
        }
        info!(service = service_name, "Circuit breaker removed");
        Ok(())
    }

    /// Number of registered services
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Whether no service is registered
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Re-register every service known to storage with the default config.
    ///
    /// With [`RestorePolicy::Persisted`] the persisted state and counters are
    /// applied; with [`RestorePolicy::Closed`] every breaker starts `Closed`.
    /// Storage failures are logged and treated as "no prior state". Returns
    /// the number of services restored.
    pub fn restore(&self, policy: RestorePolicy) -> usize {
        let services = match self.storage.list_all() {
            Ok(services) => services,
            Err(err) => {
                warn!(error = %err, "Failed to list persisted circuit breakers, starting empty");
                return 0;
            }
        };

        let mut restored = 0;
        for service in services {
            let stored = match policy {
                RestorePolicy::Closed => None,
                RestorePolicy::Persisted => match self.storage.load_state(&service) {
                    Ok(stored) => Some(stored),
                    Err(StorageError::NotFound { .. }) => None,
                    Err(err) => {
                        warn!(
                            service = %service,
                            error = %err,
                            "Failed to load circuit breaker state, starting closed"
                        );
                        None
                    }
                },
            };

            match self.register_if_absent(&service, self.default_config) {
                Ok(breaker) => {
                    if let Some(stored) = stored {
                        breaker.restore(&stored);
                        breaker.persist();
                    }
                    debug!(
                        service = %service,
                        state = %breaker.state(),
                        "Circuit breaker restored"
                    );
                    restored += 1;
                }
                Err(err) => {
                    warn!(service = %service, error = %err, "Failed to restore circuit breaker");
                }
            }
        }

        info!(restored, ?policy, "Circuit breaker registry restored from storage");
        restored
    }

    fn register_if_absent(
        &self,
        service_name: &str,
        config: BreakerConfig,
    ) -> RegistryResult<Arc<CircuitBreaker<C>>> {
        config.validate()?;
        let (breaker, created) = match self.breakers.entry(service_name.to_string()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                let breaker = Arc::new(self.build(service_name, config)?);
                entry.insert(Arc::clone(&breaker));
                (breaker, true)
            }
        };
        if created {
            breaker.persist();
            info!(service = service_name, ?config, "Circuit breaker registered");
        }
        Ok(breaker)
    }

    fn build(
        &self,
        service_name: &str,
        config: BreakerConfig,
    ) -> RegistryResult<CircuitBreaker<C>> {
        Ok(CircuitBreaker::with_clock(service_name, config, self.clock.clone())?
            .with_storage(Arc::clone(&self.storage))
            .with_event_sink(Arc::clone(&self.events)))
    }

    fn require(&self, service_name: &str) -> RegistryResult<Arc<CircuitBreaker<C>>> {
        self.get(service_name)
            .ok_or_else(|| RegistryError::NotFound { service: service_name.to_string() })
    }
}
