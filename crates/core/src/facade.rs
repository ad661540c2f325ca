//! Schema-level read-through caching behind circuit breakers
//!
//! Every schema gets one breaker (named after the schema) and two cache
//! namespaces: `"<schema>:records"` for single records and
//! `"<schema>:queries"` for query results keyed by [`generate_query_key`].
//! A cache hit never touches the breaker; a miss runs the fetch through the
//! breaker and stores the value only when it succeeds.

use std::future::Future;
use std::sync::Arc;

use rampart_common::cache::{generate_query_key, CacheStore};
use rampart_common::resilience::{CircuitState, Clock, ResilienceResult, SystemClock};
use rampart_domain::constants::{QUERIES_NAMESPACE_SUFFIX, RECORDS_NAMESPACE_SUFFIX};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::registry::RegistryResult;
use crate::runner::{CallOptions, ProtectedCallRunner};
use crate::settings::SchemaNamespaces;

/// Cache namespace holding single records of `schema`
pub fn records_namespace(schema: &str) -> String {
    format!("{schema}:{RECORDS_NAMESPACE_SUFFIX}")
}

/// Cache namespace holding query results of `schema`
pub fn queries_namespace(schema: &str) -> String {
    format!("{schema}:{QUERIES_NAMESPACE_SUFFIX}")
}

/// Operational snapshot of one schema
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaStatus {
    /// Breaker guarding the schema's backend
    pub circuit_breaker: BreakerStatus,
    /// Live entries held for the schema
    pub cache: CacheStatus,
}

/// Breaker part of a [`SchemaStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerStatus {
    pub state: CircuitState,
}

/// Cache part of a [`SchemaStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    /// Live entries in `<schema>:records`
    pub records_count: usize,
    /// Live entries in `<schema>:queries`
    pub queries_count: usize,
    /// Sum of both namespaces
    pub total: usize,
}

/// Read-through cache plus breaker per schema
pub struct ResilienceFacade<V, C: Clock + Clone = SystemClock> {
    cache: Arc<CacheStore<V, C>>,
    runner: Arc<ProtectedCallRunner<C>>,
    namespaces: SchemaNamespaces,
    call_options: CallOptions,
}

impl<V, C: Clock + Clone> std::fmt::Debug for ResilienceFacade<V, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceFacade")
            .field("cache", &self.cache)
            .field("runner", &self.runner)
            .field("namespaces", &self.namespaces)
            .field("call_options", &self.call_options)
            .finish()
    }
}

impl<V, C> ResilienceFacade<V, C>
where
    V: Clone + Send + Sync + 'static,
    C: Clock + Clone,
{
    pub fn new(
        cache: Arc<CacheStore<V, C>>,
        runner: Arc<ProtectedCallRunner<C>>,
        namespaces: SchemaNamespaces,
    ) -> Self {
        Self { cache, runner, namespaces, call_options: CallOptions::default() }
    }

    /// Options applied to every fetch and write routed through the facade
    #[must_use]
    pub fn with_call_options(mut self, options: CallOptions) -> Self {
        self.call_options = options;
        self
    }

    pub fn cache(&self) -> &Arc<CacheStore<V, C>> {
        &self.cache
    }

    pub fn runner(&self) -> &Arc<ProtectedCallRunner<C>> {
        &self.runner
    }

    /// Declare the namespaces and breaker of each schema.
    ///
    /// Idempotent: existing breakers keep their state and config, existing
    /// namespaces keep their entries.
    ///
    /// # Errors
    /// Returns `RegistryError::InvalidConfig` if the registry default config
    /// is rejected.
    pub fn setup<S: AsRef<str>>(&self, schemas: &[S]) -> RegistryResult<()> {
        let registry = self.runner.registry();
        for schema in schemas {
            let schema = schema.as_ref();
            self.cache.create_namespace(&records_namespace(schema), self.namespaces.records);
            self.cache.create_namespace(&queries_namespace(schema), self.namespaces.queries);
            registry.get_or_register(schema, None)?;
        }
        info!(schemas = schemas.len(), "Resilience facade configured");
        Ok(())
    }

    /// Return the cached record for `key`, or fetch it under the schema's
    /// breaker and cache the result.
    ///
    /// # Errors
    /// Propagates the breaker outcome of the fetch; nothing is cached then.
    pub async fn read_through<F, Fut, E>(
        &self,
        schema: &str,
        key: &str,
        fetch: F,
    ) -> ResilienceResult<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.load(&records_namespace(schema), schema, key, fetch).await
    }

    /// Query-result counterpart of [`ResilienceFacade::read_through`], keyed
    /// by the normalised `conditions` and `options`.
    ///
    /// # Errors
    /// Propagates the breaker outcome of the fetch; nothing is cached then.
    pub async fn read_query_through<F, Fut, E>(
        &self,
        schema: &str,
        conditions: &Value,
        options: &Value,
        fetch: F,
    ) -> ResilienceResult<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let key = generate_query_key(conditions, options);
        self.load(&queries_namespace(schema), schema, &key, fetch).await
    }

    /// Run a write under the schema's breaker, then invalidate.
    ///
    /// On success the record at `key` (or every record when `None`) and all
    /// cached queries of the schema are dropped. A failed write leaves the
    /// cache untouched.
    ///
    /// # Errors
    /// Propagates the breaker outcome of the write.
    pub async fn write_through<F, Fut, T, E>(
        &self,
        schema: &str,
        key: Option<&str>,
        write: F,
    ) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let written = self.runner.run(schema, write, &self.call_options).await?;
        match key {
            Some(key) => {
                self.cache.delete(&records_namespace(schema), key);
                self.cache.clear(&queries_namespace(schema));
            }
            None => self.invalidate(schema, None),
        }
        Ok(written)
    }

    /// Drop one record (`Some(key)`) or every cached entry of the schema
    pub fn invalidate(&self, schema: &str, key: Option<&str>) {
        match key {
            Some(key) => {
                self.cache.delete(&records_namespace(schema), key);
                debug!(schema, key, "Cached record invalidated");
            }
            None => {
                self.cache.invalidate_namespace(&records_namespace(schema));
                self.cache.invalidate_namespace(&queries_namespace(schema));
                debug!(schema, "Schema cache invalidated");
            }
        }
    }

    /// Breaker state and live cache sizes for `schema`
    ///
    /// # Errors
    /// Returns `RegistryError::NotFound` when the schema has no breaker.
    pub fn status(&self, schema: &str) -> RegistryResult<SchemaStatus> {
        let state = self.runner.registry().state(schema)?;
        let records_count = self.cache.len(&records_namespace(schema));
        let queries_count = self.cache.len(&queries_namespace(schema));
        Ok(SchemaStatus {
            circuit_breaker: BreakerStatus { state },
            cache: CacheStatus {
                records_count,
                queries_count,
                total: records_count + queries_count,
            },
        })
    }

    async fn load<F, Fut, E>(
        &self,
        namespace: &str,
        schema: &str,
        key: &str,
        fetch: F,
    ) -> ResilienceResult<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        if let Some(cached) = self.cache.get(namespace, key) {
            return Ok(cached);
        }
        let value = self.runner.run(schema, fetch, &self.call_options).await?;
        self.cache.put(namespace, key, value.clone());
        Ok(value)
    }
}
