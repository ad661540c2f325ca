//! Protected call execution
//!
//! [`ProtectedCallRunner`] resolves the breaker for a service (registering it
//! on first use unless told otherwise), runs the operation through it, and
//! reports the outcome to metrics and the event sink. A caller-supplied
//! fallback sees every error, including breaker rejections.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rampart_common::observability::metric_names::{CALLS_TOTAL, CALL_DURATION_MS};
use rampart_common::observability::{
    CallStatus, EventSink, MetricsCollector, NoOpEventSink, NoOpMetricsCollector, RampartEvent,
};
use rampart_common::resilience::{
    BreakerConfig, CircuitBreaker, Clock, ResilienceError, ResilienceResult, SystemClock,
};
use tracing::{debug, instrument, warn};

use crate::registry::{CircuitBreakerRegistry, RegistryError};

/// Per-call options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallOptions {
    /// Register a breaker for unknown services instead of failing
    pub auto_register: bool,
    /// Config for an auto-registered breaker (registry default when `None`)
    pub config: Option<BreakerConfig>,
    /// Classify calls that return later than this as failures
    pub call_timeout: Option<Duration>,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self { auto_register: true, config: None, call_timeout: None }
    }
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn auto_register(mut self, enabled: bool) -> Self {
        self.auto_register = enabled;
        self
    }

    #[must_use]
    pub fn config(mut self, config: BreakerConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn call_timeout_ms(self, timeout_ms: u64) -> Self {
        self.call_timeout(Duration::from_millis(timeout_ms))
    }
}

type NoFallback<T, E> = fn(ResilienceError<E>) -> ResilienceResult<T, E>;

/// Runs operations through per-service circuit breakers
pub struct ProtectedCallRunner<C: Clock + Clone = SystemClock> {
    registry: Arc<CircuitBreakerRegistry<C>>,
    metrics: Arc<dyn MetricsCollector>,
    events: Arc<dyn EventSink>,
}

impl<C: Clock + Clone> std::fmt::Debug for ProtectedCallRunner<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtectedCallRunner")
            .field("registry", &self.registry)
            .field("metrics", &self.metrics)
            .field("events", &self.events)
            .finish()
    }
}

impl<C: Clock + Clone> ProtectedCallRunner<C> {
    /// Run calls through breakers taken from `registry`
    pub fn new(registry: Arc<CircuitBreakerRegistry<C>>) -> Self {
        Self { registry, metrics: Arc::new(NoOpMetricsCollector), events: Arc::new(NoOpEventSink) }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn registry(&self) -> &Arc<CircuitBreakerRegistry<C>> {
        &self.registry
    }

    /// Run an async operation under the breaker for `service_name`.
    ///
    /// # Errors
    /// Returns `CircuitOpen` when the breaker rejects the call,
    /// `NotRegistered` when the service is unknown and auto-registration is
    /// off, and the classified operation failure otherwise.
    #[instrument(skip_all, fields(service_name = %service_name))]
    pub async fn run<F, Fut, T, E>(
        &self,
        service_name: &str,
        operation: F,
        options: &CallOptions,
    ) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.run_inner(service_name, operation, None::<NoFallback<T, E>>, options).await
    }

    /// Like [`ProtectedCallRunner::run`], but every error is handed to
    /// `fallback` and its result is returned instead.
    ///
    /// Metrics and events still report the primary outcome.
    ///
    /// # Errors
    /// Returns whatever `fallback` returns for a failed call.
    #[instrument(skip_all, fields(service_name = %service_name))]
    pub async fn run_with_fallback<F, Fut, FB, T, E>(
        &self,
        service_name: &str,
        operation: F,
        fallback: FB,
        options: &CallOptions,
    ) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce(ResilienceError<E>) -> ResilienceResult<T, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.run_inner(service_name, operation, Some(fallback), options).await
    }

    /// Synchronous counterpart of [`ProtectedCallRunner::run`]
    ///
    /// # Errors
    /// Same as [`ProtectedCallRunner::run`].
    pub fn run_sync<F, T, E>(
        &self,
        service_name: &str,
        operation: F,
        options: &CallOptions,
    ) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.run_sync_with_fallback(service_name, operation, None::<NoFallback<T, E>>, options)
    }

    /// Synchronous counterpart of [`ProtectedCallRunner::run_with_fallback`]
    ///
    /// # Errors
    /// Same as [`ProtectedCallRunner::run_with_fallback`].
    pub fn run_sync_with_fallback<F, FB, T, E>(
        &self,
        service_name: &str,
        operation: F,
        fallback: Option<FB>,
        options: &CallOptions,
    ) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        FB: FnOnce(ResilienceError<E>) -> ResilienceResult<T, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let started = self.registry.clock().now();
        let result = match self.resolve(service_name, options) {
            Ok(breaker) => breaker.call_with_timeout(operation, options.call_timeout),
            Err(err) => Err(err),
        };
        self.report(service_name, &result, started);
        apply_fallback(service_name, result, fallback)
    }

    async fn run_inner<F, Fut, FB, T, E>(
        &self,
        service_name: &str,
        operation: F,
        fallback: Option<FB>,
        options: &CallOptions,
    ) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce(ResilienceError<E>) -> ResilienceResult<T, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let started = self.registry.clock().now();
        let result = match self.resolve(service_name, options) {
            Ok(breaker) => breaker.execute_with_timeout(operation, options.call_timeout).await,
            Err(err) => Err(err),
        };
        self.report(service_name, &result, started);
        apply_fallback(service_name, result, fallback)
    }

    fn resolve<E>(
        &self,
        service_name: &str,
        options: &CallOptions,
    ) -> ResilienceResult<Arc<CircuitBreaker<C>>, E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        if let Some(breaker) = self.registry.get(service_name) {
            return Ok(breaker);
        }
        if !options.auto_register {
            return Err(ResilienceError::NotRegistered { service: service_name.to_string() });
        }
        self.registry.get_or_register(service_name, options.config).map_err(|err| match err {
            RegistryError::InvalidConfig(config_err) => {
                ResilienceError::InvalidConfiguration { message: config_err.to_string() }
            }
            RegistryError::NotFound { service } => ResilienceError::NotRegistered { service },
        })
    }

    fn report<T, E>(
        &self,
        service_name: &str,
        result: &ResilienceResult<T, E>,
        started: std::time::Instant,
    ) where
        E: std::error::Error + Send + Sync + 'static,
    {
        let elapsed = self.registry.clock().now().saturating_duration_since(started);
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let status = match result {
            Ok(_) => CallStatus::Success,
            Err(err) if err.is_circuit_open() => CallStatus::CircuitOpen,
            Err(_) => CallStatus::Error,
        };

        let labels = [("service_name", service_name)];
        self.metrics.increment_counter(CALLS_TOTAL, &[labels[0], ("status", status.as_str())]);
        self.metrics.record_timing(CALL_DURATION_MS, duration_ms, &labels);
        self.events.emit(&RampartEvent::BreakerCall {
            service_name: service_name.to_string(),
            status,
            duration_ms,
        });

        match result {
            Err(err) if !err.is_circuit_open() => {
                warn!(service = service_name, error = %err, duration_ms, "Protected call failed");
            }
            _ => debug!(service = service_name, %status, duration_ms, "Protected call completed"),
        }
    }
}

fn apply_fallback<T, E, FB>(
    service_name: &str,
    result: ResilienceResult<T, E>,
    fallback: Option<FB>,
) -> ResilienceResult<T, E>
where
    FB: FnOnce(ResilienceError<E>) -> ResilienceResult<T, E>,
    E: std::error::Error + Send + Sync + 'static,
{
    match (result, fallback) {
        (Err(err), Some(fallback)) => {
            debug!(service = service_name, reason = err.status_label(), "Invoking fallback");
            fallback(err)
        }
        (result, _) => result,
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the protected call runner.
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rampart_common::resilience::{CircuitState, InMemoryBreakerStorage, MockClock};
    use rampart_common::testing::{MockError, RecordingEventSink, RecordingMetricsCollector};

    use super::*;

    struct Harness {
        runner: ProtectedCallRunner<MockClock>,
        metrics: Arc<RecordingMetricsCollector>,
        events: Arc<RecordingEventSink>,
        clock: MockClock,
    }

    fn harness() -> Harness {
        let clock = MockClock::new();
        let default = BreakerConfig::builder()
            .max_failures(2)
            .reset_timeout_ms(1000)
            .half_open_threshold(1)
            .build()
            .expect("valid");
        let metrics = Arc::new(RecordingMetricsCollector::new());
        let events = Arc::new(RecordingEventSink::new());
        let storage = Arc::new(InMemoryBreakerStorage::new());
        let registry = Arc::new(
            CircuitBreakerRegistry::with_clock(storage, default, clock.clone())
                .expect("valid")
                .with_event_sink(events.clone()),
        );
        let runner = ProtectedCallRunner::new(registry)
            .with_metrics(metrics.clone())
            .with_event_sink(events.clone());
        Harness { runner, metrics, events, clock }
    }

    impl Harness {
        fn calls(&self, service_name: &str, status: &str) -> u64 {
            self.metrics.counter(CALLS_TOTAL, &[("service_name", service_name), ("status", status)])
        }
    }

    /// Validates that the first call auto-registers the service.
    ///
    /// Assertions:
    /// - Confirms the breaker exists afterwards with the registry default.
    /// - Confirms a success counter and one call event are recorded.
    #[tokio::test]
    async fn test_run_auto_registers() {
        let h = harness();

        let options = CallOptions::default();
        let value = h.runner.run("users", || async { Ok::<_, MockError>(42) }, &options).await;

        assert_eq!(value.expect("success"), 42);
        assert_eq!(h.runner.registry().state("users").expect("registered"), CircuitState::Closed);
        assert_eq!(h.calls("users", "success"), 1);
        assert_eq!(h.events.events_named("circuit_breaker.call").len(), 1);
    }

    /// Validates that auto-registration uses the per-call config.
    #[tokio::test]
    async fn test_run_auto_registers_with_call_config() {
        let h = harness();
        let config = BreakerConfig::builder().max_failures(7).build().expect("valid");

        let options = CallOptions::new().config(config);
        let _ = h.runner.run("users", || async { Ok::<_, MockError>(()) }, &options).await;

        assert_eq!(h.runner.registry().record("users").expect("registered").config, config);
    }

    /// Validates `NotRegistered` without auto-registration.
    ///
    /// Assertions:
    /// - Confirms the operation is never invoked.
    /// - Confirms the failure is reported with status `error`.
    #[tokio::test]
    async fn test_run_without_auto_register() {
        let h = harness();
        let invoked = AtomicUsize::new(0);

        let result = h
            .runner
            .run(
                "users",
                || async {
                    invoked.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, MockError>(())
                },
                &CallOptions::new().auto_register(false),
            )
            .await;

        assert!(matches!(result, Err(ResilienceError::NotRegistered { .. })));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert!(!h.runner.registry().contains("users"));
        assert_eq!(h.calls("users", "error"), 1);
    }

    /// Validates that an invalid per-call config is reported, not panicked on.
    #[tokio::test]
    async fn test_run_invalid_call_config() {
        let h = harness();
        let invalid = BreakerConfig { max_failures: 0, ..BreakerConfig::default() };

        let options = CallOptions::new().config(invalid);
        let result = h.runner.run("users", || async { Ok::<_, MockError>(()) }, &options).await;

        assert!(matches!(result, Err(ResilienceError::InvalidConfiguration { .. })));
    }

    /// Validates status labels across failures and rejection.
    ///
    /// Assertions:
    /// - Confirms two failures trip the breaker (`max_failures = 2`).
    /// - Confirms the third call is rejected and labelled `circuit_open`.
    /// - Confirms the state change is published before the tripping call's event.
    #[tokio::test]
    async fn test_run_reports_error_and_circuit_open() {
        let h = harness();
        let options = CallOptions::default();

        for _ in 0..2 {
            let result = h
                .runner
                .run("orders", || async { Err::<(), _>(MockError::new("db down")) }, &options)
                .await;
            assert!(matches!(result, Err(ResilienceError::OperationFailed { .. })));
        }
        let rejected = h.runner.run("orders", || async { Ok::<_, MockError>(()) }, &options).await;

        assert!(matches!(rejected, Err(ResilienceError::CircuitOpen { .. })));
        assert_eq!(h.calls("orders", "error"), 2);
        assert_eq!(h.calls("orders", "circuit_open"), 1);
        assert_eq!(h.metrics.histogram(CALL_DURATION_MS, &[("service_name", "orders")]).len(), 3);

        let names: Vec<&str> = h.events.events().iter().map(RampartEvent::name).collect();
        assert_eq!(
            names,
            vec![
                "circuit_breaker.call",
                "circuit_breaker.state_changed",
                "circuit_breaker.call",
                "circuit_breaker.call",
            ]
        );
    }

    /// Validates that the fallback receives rejections and failures.
    ///
    /// Assertions:
    /// - Confirms the fallback result replaces the error.
    /// - Confirms the reported status is the primary outcome.
    #[tokio::test]
    async fn test_run_with_fallback() {
        let h = harness();
        let options = CallOptions::default();
        let config = BreakerConfig::builder().max_failures(1).build().expect("valid");
        h.runner.registry().register("search", config).expect("register");

        let first = h
            .runner
            .run_with_fallback(
                "search",
                || async { Err::<&str, _>(MockError::new("timeout")) },
                |err| {
                    assert!(err.is_operation_failure());
                    Ok("stale")
                },
                &options,
            )
            .await;
        let second = h
            .runner
            .run_with_fallback(
                "search",
                || async { Ok::<_, MockError>("fresh") },
                |err| {
                    assert!(err.is_circuit_open());
                    Ok("cached")
                },
                &options,
            )
            .await;

        assert_eq!(first.expect("fallback"), "stale");
        assert_eq!(second.expect("fallback"), "cached");
        assert_eq!(h.calls("search", "error"), 1);
        assert_eq!(h.calls("search", "circuit_open"), 1);
    }

    /// Validates that a fallback is not consulted on success.
    #[tokio::test]
    async fn test_fallback_skipped_on_success() {
        let h = harness();

        let result = h
            .runner
            .run_with_fallback(
                "users",
                || async { Ok::<_, MockError>(1) },
                |_err| -> ResilienceResult<i32, MockError> { panic!("fallback must not run") },
                &CallOptions::default(),
            )
            .await;

        assert_eq!(result.expect("success"), 1);
    }

    /// Validates call timeouts measured by the registry clock.
    ///
    /// Assertions:
    /// - Confirms a slow success is reported as `Timeout` with status `error`.
    /// - Confirms the recorded duration matches the elapsed mock time.
    #[tokio::test]
    async fn test_run_call_timeout() {
        let h = harness();
        let clock = h.clock.clone();

        let result = h
            .runner
            .run(
                "reports",
                || async move {
                    clock.advance_millis(250);
                    Ok::<_, MockError>(())
                },
                &CallOptions::new().call_timeout_ms(100),
            )
            .await;

        assert!(matches!(result, Err(ResilienceError::Timeout { .. })));
        assert_eq!(h.calls("reports", "error"), 1);
        let durations = h.metrics.histogram(CALL_DURATION_MS, &[("service_name", "reports")]);
        assert_eq!(durations, vec![250.0]);
        assert_eq!(
            h.events.events_named("circuit_breaker.call"),
            vec![RampartEvent::BreakerCall {
                service_name: "reports".to_string(),
                status: CallStatus::Error,
                duration_ms: 250,
            }]
        );
    }

    /// Validates the synchronous path including fallback.
    #[test]
    fn test_run_sync() {
        let h = harness();
        let options = CallOptions::default();

        let ok = h.runner.run_sync("users", || Ok::<_, MockError>("row"), &options);
        let failed = h.runner.run_sync_with_fallback(
            "users",
            || Err::<&str, _>(MockError::new("boom")),
            Some(|_err: ResilienceError<MockError>| Ok("default")),
            &options,
        );

        assert_eq!(ok.expect("success"), "row");
        assert_eq!(failed.expect("fallback"), "default");
        assert_eq!(h.metrics.counter_total(CALLS_TOTAL), 2);
    }

    /// Validates that a panicking operation is contained and reported.
    #[test]
    fn test_run_sync_panic_contained() {
        let h = harness();

        let result = h.runner.run_sync(
            "users",
            || -> Result<(), MockError> { panic!("driver crashed") },
            &CallOptions::default(),
        );

        assert!(matches!(
            result,
            Err(ResilienceError::Panicked { ref message }) if message.contains("driver crashed")
        ));
        assert_eq!(h.runner.registry().record("users").expect("registered").failure_count, 1);
    }
}
