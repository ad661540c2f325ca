//! Per-service circuit breaker state machine
//!
//! A [`CircuitBreaker`] guards one named service. It owns its state and
//! counters behind a single mutex, so every state transition for a service is
//! serialized through that breaker while breakers for different services never
//! contend with each other. The lock is held only while deciding whether to
//! admit a call and while recording its outcome. The operation itself, storage
//! writes, and event emission all run after the lock is released.
//!
//! ```text
//! Closed ──[max_failures consecutive failures]──> Open
//!   ▲                                               │
//!   │                                               │ [reset_timeout elapsed,
//!   │                                               ▼  next call is a trial]
//!   └──[half_open_threshold successes]──────── HalfOpen
//!                 [any failure] ──────────────────> Open
//! ```
//!
//! While `HalfOpen`, at most `half_open_threshold` trial calls are in flight
//! at once; further callers are rejected as if the circuit were open.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::config::BreakerConfig;
use super::error::{ConfigResult, ResilienceError, ResilienceResult};
use super::storage::{
    BreakerStateStorage, PendingSnapshot, SnapshotWriter, StateMetadata, StoredBreakerState,
};
use crate::observability::{EventSink, NoOpEventSink, RampartEvent};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through
    Closed,
    /// Calls are rejected without invoking the operation
    Open,
    /// A limited number of trial calls test whether the service recovered
    HalfOpen,
}

impl CircuitState {
    /// Lowercase name used in logs, metrics labels and serialized snapshots
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a breaker, as returned by status queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerRecord {
    /// Name of the guarded service
    pub service_name: String,
    /// Current state
    pub state: CircuitState,
    /// Configuration in force
    pub config: BreakerConfig,
    /// Consecutive failures counted in `Closed`
    pub failure_count: u32,
    /// Successful trial calls counted in `HalfOpen`
    pub success_count: u32,
    /// Wall-clock milliseconds since the epoch of the last transition
    pub last_state_change_at_ms: u64,
    /// Wall-clock milliseconds since the epoch of the last recorded failure
    pub last_failure_at_ms: Option<u64>,
    /// Calls admitted through the breaker (bypassed calls excluded)
    pub total_calls: u64,
    /// Calls rejected while open or while the half-open trial limit was reached
    pub rejected_calls: u64,
}

/// Mutable state guarded by the breaker's mutex
#[derive(Debug)]
struct BreakerCore {
    config: BreakerConfig,
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    state_changed_at: Instant,
    last_state_change_at_ms: u64,
    last_failure_at_ms: Option<u64>,
    total_calls: u64,
    rejected_calls: u64,
    /// Trial calls admitted in the current half-open period and not yet settled
    trials_in_flight: u32,
    /// Incremented on every transition
    epoch: u64,
    /// Incremented on every persisted mutation
    revision: u64,
}

/// How an admitted call is accounted for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Permit {
    /// Outcome updates the state machine
    Tracked,
    /// Half-open trial; holds a trial slot of the given epoch
    Trial { epoch: u64 },
    /// Breaker disabled; outcome is not recorded
    Bypass,
}

/// Admitted call. Releases its half-open trial slot when dropped, including
/// when an async caller abandons the call mid-flight.
struct PermitGuard<'a, C: Clock> {
    breaker: &'a CircuitBreaker<C>,
    permit: Permit,
}

impl<C: Clock> Drop for PermitGuard<'_, C> {
    fn drop(&mut self) {
        if let Permit::Trial { epoch } = self.permit {
            let mut core = self.breaker.core.lock();
            if core.epoch == epoch {
                core.trials_in_flight = core.trials_in_flight.saturating_sub(1);
            }
        }
    }
}

/// A state change that must be announced once the lock is released
#[derive(Debug, Clone, Copy)]
struct Transition {
    from: CircuitState,
    to: CircuitState,
}

/// Work left over from a locked section
#[derive(Debug, Default)]
struct Effects {
    transition: Option<Transition>,
    snapshot: Option<PendingSnapshot>,
}

/// Circuit breaker guarding a single named service
pub struct CircuitBreaker<C: Clock = SystemClock> {
    service_name: Arc<str>,
    core: Mutex<BreakerCore>,
    clock: C,
    writer: Option<SnapshotWriter>,
    events: Arc<dyn EventSink>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.core.lock();
        f.debug_struct("CircuitBreaker")
            .field("service_name", &self.service_name)
            .field("state", &core.state)
            .field("failure_count", &core.failure_count)
            .field("success_count", &core.success_count)
            .field("config", &core.config)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a breaker using the system clock
    pub fn new(service_name: impl Into<Arc<str>>, config: BreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(service_name, config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a breaker with a custom clock (useful for testing)
    pub fn with_clock(
        service_name: impl Into<Arc<str>>,
        config: BreakerConfig,
        clock: C,
    ) -> ConfigResult<Self> {
        config.validate()?;

        let core = BreakerCore {
            config,
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            state_changed_at: clock.now(),
            last_state_change_at_ms: clock.millis_since_epoch(),
            last_failure_at_ms: None,
            total_calls: 0,
            rejected_calls: 0,
            trials_in_flight: 0,
            epoch: 0,
            revision: 0,
        };

        Ok(Self {
            service_name: service_name.into(),
            core: Mutex::new(core),
            clock,
            writer: None,
            events: Arc::new(NoOpEventSink),
        })
    }

    /// Persist every state mutation through `storage`
    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn BreakerStateStorage>) -> Self {
        self.writer = Some(SnapshotWriter::new(storage));
        self
    }

    /// Publish state changes to `events`
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Name of the guarded service
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Current state. Does not evaluate the reset timeout.
    pub fn state(&self) -> CircuitState {
        self.core.lock().state
    }

    /// Configuration in force
    pub fn config(&self) -> BreakerConfig {
        self.core.lock().config
    }

    /// Whether a call made now would be admitted, without changing state
    pub fn is_available(&self) -> bool {
        let core = self.core.lock();
        !core.config.enabled
            || match core.state {
                CircuitState::Closed => true,
                CircuitState::HalfOpen => core.trials_in_flight < core.config.half_open_threshold,
                CircuitState::Open => self.reset_timeout_elapsed(&core),
            }
    }

    /// Snapshot of state, counters and configuration
    pub fn record(&self) -> CircuitBreakerRecord {
        let core = self.core.lock();
        CircuitBreakerRecord {
            service_name: self.service_name.to_string(),
            state: core.state,
            config: core.config,
            failure_count: core.failure_count,
            success_count: core.success_count,
            last_state_change_at_ms: core.last_state_change_at_ms,
            last_failure_at_ms: core.last_failure_at_ms,
            total_calls: core.total_calls,
            rejected_calls: core.rejected_calls,
        }
    }

    /// Execute an async operation with circuit breaker protection
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.execute_with_timeout(operation, None).await
    }

    /// Execute an async operation, classifying it as a failure when it returns
    /// after `call_timeout`.
    ///
    /// The operation is never interrupted; the deadline only decides how the
    /// result is classified once it returns. A panic inside the operation is
    /// caught and counted as a failure.
    pub async fn execute_with_timeout<F, Fut, T, E>(
        &self,
        operation: F,
        call_timeout: Option<Duration>,
    ) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let guard = self.acquire()?;

        let started = self.clock.now();
        let outcome = AssertUnwindSafe(async move { operation().await }).catch_unwind().await;
        let elapsed = self.clock.now().saturating_duration_since(started);

        let result = classify(outcome, elapsed, call_timeout);
        self.settle(guard.permit, &result);
        result
    }

    /// Execute a synchronous operation with circuit breaker protection
    pub fn call<F, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.call_with_timeout(operation, None)
    }

    /// Synchronous counterpart of [`CircuitBreaker::execute_with_timeout`]
    pub fn call_with_timeout<F, T, E>(
        &self,
        operation: F,
        call_timeout: Option<Duration>,
    ) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let guard = self.acquire()?;

        let started = self.clock.now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(operation));
        let elapsed = self.clock.now().saturating_duration_since(started);

        let result = classify(outcome, elapsed, call_timeout);
        self.settle(guard.permit, &result);
        result
    }

    /// Record a successful operation. No-op while the breaker is disabled.
    pub fn record_success(&self) {
        let effects = {
            let mut core = self.core.lock();
            if !core.config.enabled {
                return;
            }

            match core.state {
                CircuitState::Closed => {
                    if core.failure_count == 0 {
                        return;
                    }
                    core.failure_count = 0;
                    self.changed(&mut core, None)
                }
                CircuitState::HalfOpen => {
                    if core.success_count + 1 >= core.config.half_open_threshold {
                        info!(
                            service = %self.service_name,
                            successes = core.success_count + 1,
                            "Circuit breaker closed after successful trial calls"
                        );
                        let transition = self.transition_locked(&mut core, CircuitState::Closed);
                        self.changed(&mut core, Some(transition))
                    } else {
                        core.success_count += 1;
                        self.changed(&mut core, None)
                    }
                }
                CircuitState::Open => {
                    // A call admitted before the circuit opened finished late.
                    debug!(service = %self.service_name, "Ignoring success while circuit is open");
                    return;
                }
            }
        };

        self.apply(effects);
    }

    /// Record a failed operation. No-op while the breaker is disabled.
    pub fn record_failure(&self) {
        let effects = {
            let mut core = self.core.lock();
            if !core.config.enabled {
                return;
            }
            core.last_failure_at_ms = Some(self.clock.millis_since_epoch());

            let transition = match core.state {
                CircuitState::Closed => {
                    if core.failure_count + 1 >= core.config.max_failures {
                        warn!(
                            service = %self.service_name,
                            failures = core.failure_count + 1,
                            "Circuit breaker opened after consecutive failures"
                        );
                        Some(self.transition_locked(&mut core, CircuitState::Open))
                    } else {
                        core.failure_count += 1;
                        None
                    }
                }
                CircuitState::HalfOpen => {
                    warn!(
                        service = %self.service_name,
                        "Circuit breaker re-opened by failed trial call"
                    );
                    Some(self.transition_locked(&mut core, CircuitState::Open))
                }
                CircuitState::Open => None,
            };
            self.changed(&mut core, transition)
        };

        self.apply(effects);
    }

    /// Replace the configuration; applies from the next evaluated call
    pub fn update_config(&self, config: BreakerConfig) -> ConfigResult<()> {
        config.validate()?;
        let effects = {
            let mut core = self.core.lock();
            core.config = config;
            self.changed(&mut core, None)
        };
        self.apply(effects);
        debug!(service = %self.service_name, ?config, "Circuit breaker configuration updated");
        Ok(())
    }

    /// Force the breaker back to `Closed` with zeroed counters
    pub fn reset(&self) {
        let effects = {
            let mut core = self.core.lock();
            core.last_failure_at_ms = None;
            let transition = if core.state == CircuitState::Closed {
                core.failure_count = 0;
                core.success_count = 0;
                None
            } else {
                Some(self.transition_locked(&mut core, CircuitState::Closed))
            };
            self.changed(&mut core, transition)
        };

        info!(service = %self.service_name, "Circuit breaker manually reset to closed state");
        self.apply(effects);
    }

    /// Write the current snapshot to storage
    pub fn persist(&self) {
        let effects = {
            let mut core = self.core.lock();
            self.changed(&mut core, None)
        };
        self.apply(effects);
    }

    /// Adopt a persisted snapshot (state, counters, timestamps).
    ///
    /// The configuration is left untouched. For an `Open` snapshot the time
    /// already spent open, measured by wall clock, counts towards the reset
    /// timeout.
    pub fn restore(&self, stored: &StoredBreakerState) {
        let mut core = self.core.lock();
        let now = self.clock.now();
        let age = Duration::from_millis(
            self.clock
                .millis_since_epoch()
                .saturating_sub(stored.metadata.last_state_change_at_ms),
        );

        core.state = stored.state;
        core.failure_count = stored.metadata.failure_count;
        core.success_count = stored.metadata.success_count;
        core.last_state_change_at_ms = stored.metadata.last_state_change_at_ms;
        core.last_failure_at_ms = stored.metadata.last_failure_at_ms;
        core.state_changed_at = now.checked_sub(age).unwrap_or(now);
        core.trials_in_flight = 0;
        core.epoch += 1;

        debug!(
            service = %self.service_name,
            state = %core.state,
            age_ms = u64::try_from(age.as_millis()).unwrap_or(u64::MAX),
            "Circuit breaker state restored"
        );
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Decide whether to admit a call, moving `Open` to `HalfOpen` once the
    /// reset timeout has elapsed.
    fn acquire<E>(&self) -> ResilienceResult<PermitGuard<'_, C>, E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let (permit, effects) = {
            let mut core = self.core.lock();
            if !core.config.enabled {
                return Ok(PermitGuard { breaker: self, permit: Permit::Bypass });
            }

            match core.state {
                CircuitState::Closed => {
                    core.total_calls += 1;
                    (Permit::Tracked, Effects::default())
                }
                CircuitState::HalfOpen
                    if core.trials_in_flight < core.config.half_open_threshold =>
                {
                    core.total_calls += 1;
                    core.trials_in_flight += 1;
                    (Permit::Trial { epoch: core.epoch }, Effects::default())
                }
                CircuitState::Open if self.reset_timeout_elapsed(&core) => {
                    info!(
                        service = %self.service_name,
                        "Circuit breaker half-open, admitting trial call"
                    );
                    let transition = self.transition_locked(&mut core, CircuitState::HalfOpen);
                    core.total_calls += 1;
                    core.trials_in_flight = 1;
                    let permit = Permit::Trial { epoch: core.epoch };
                    (permit, self.changed(&mut core, Some(transition)))
                }
                CircuitState::HalfOpen | CircuitState::Open => {
                    core.rejected_calls += 1;
                    debug!(
                        service = %self.service_name,
                        state = %core.state,
                        "Circuit breaker rejecting call"
                    );
                    return Err(ResilienceError::CircuitOpen {
                        service: self.service_name.to_string(),
                    });
                }
            }
        };

        self.apply(effects);
        Ok(PermitGuard { breaker: self, permit })
    }

    fn settle<T, E>(&self, permit: Permit, result: &ResilienceResult<T, E>)
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        if permit == Permit::Bypass {
            return;
        }
        match result {
            Ok(_) => self.record_success(),
            Err(err) => {
                debug!(service = %self.service_name, error = %err, "Protected operation failed");
                self.record_failure();
            }
        }
    }

    fn reset_timeout_elapsed(&self, core: &BreakerCore) -> bool {
        let open_for = self.clock.now().saturating_duration_since(core.state_changed_at);
        open_for >= core.config.reset_timeout
    }

    /// Move to `to` and zero the counters. Caller holds the lock.
    fn transition_locked(&self, core: &mut BreakerCore, to: CircuitState) -> Transition {
        let from = core.state;
        core.state = to;
        core.failure_count = 0;
        core.success_count = 0;
        core.trials_in_flight = 0;
        core.epoch += 1;
        core.state_changed_at = self.clock.now();
        core.last_state_change_at_ms = self.clock.millis_since_epoch();
        Transition { from, to }
    }

    /// Snapshot the mutated core for persisting after the lock is released
    fn changed(&self, core: &mut BreakerCore, transition: Option<Transition>) -> Effects {
        let snapshot = self.writer.as_ref().map(|_| {
            core.revision += 1;
            PendingSnapshot {
                revision: core.revision,
                state: core.state,
                metadata: StateMetadata {
                    failure_count: core.failure_count,
                    success_count: core.success_count,
                    last_state_change_at_ms: core.last_state_change_at_ms,
                    last_failure_at_ms: core.last_failure_at_ms,
                    config: core.config,
                },
            }
        });
        Effects { transition, snapshot }
    }

    /// Persist, then announce. Must be called without holding the lock.
    fn apply(&self, effects: Effects) {
        if let (Some(writer), Some(snapshot)) = (&self.writer, effects.snapshot) {
            writer.submit(&self.service_name, snapshot);
        }
        if let Some(Transition { from, to }) = effects.transition {
            self.events.emit(&RampartEvent::BreakerStateChanged {
                service_name: self.service_name.to_string(),
                from,
                to,
            });
        }
    }
}

fn classify<T, E>(
    outcome: Result<Result<T, E>, Box<dyn Any + Send>>,
    elapsed: Duration,
    call_timeout: Option<Duration>,
) -> ResilienceResult<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    match outcome {
        Err(payload) => {
            Err(ResilienceError::Panicked { message: panic_message(payload.as_ref()) })
        }
        Ok(Err(source)) => Err(ResilienceError::OperationFailed { source }),
        Ok(Ok(_)) if call_timeout.is_some_and(|timeout| elapsed > timeout) => {
            Err(ResilienceError::Timeout { timeout: call_timeout.unwrap_or_default(), elapsed })
        }
        Ok(Ok(value)) => Ok(value),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}
