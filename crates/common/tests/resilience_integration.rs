//! Integration tests for the resilience module
//!
//! Exercises the breaker through its public API: trip and recovery under a
//! mock clock, persistence through the storage trait, event publication over
//! a channel, and per-service isolation under concurrency.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rampart_common::observability::{ChannelEventSink, RampartEvent};
use rampart_common::resilience::{
    BreakerConfig, BreakerStateStorage, CircuitBreaker, CircuitState, InMemoryBreakerStorage,
    MockClock, ResilienceError,
};

/// Custom error type for testing
#[derive(Debug, Clone)]
struct QueryError {
    message: String,
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for QueryError {}

fn query_error() -> QueryError {
    QueryError { message: "connection refused".to_string() }
}

fn config(max_failures: u32, reset_ms: u64, half_open: u32) -> BreakerConfig {
    BreakerConfig::builder()
        .max_failures(max_failures)
        .reset_timeout_ms(reset_ms)
        .half_open_threshold(half_open)
        .build()
        .expect("valid breaker config")
}

/// Validates the full Closed -> Open -> HalfOpen -> Closed cycle.
///
/// # Test Steps
/// 1. Fail `max_failures` times and confirm the operation is no longer invoked
/// 2. Advance the mock clock past the reset timeout
/// 3. Succeed `half_open_threshold` times and confirm the breaker closed
/// 4. Confirm the operation error is passed through unchanged
#[tokio::test]
async fn test_breaker_full_cycle() {
    let clock = MockClock::new();
    let breaker = CircuitBreaker::with_clock("orders", config(3, 1000, 2), clock.clone())
        .expect("valid breaker");
    let invocations = Arc::new(AtomicU32::new(0));

    for _ in 0..3 {
        let counter = Arc::clone(&invocations);
        let result = breaker
            .execute(|| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(query_error())
            })
            .await;
        let err = result.expect_err("operation fails");
        assert_eq!(err.operation_error().map(|e| e.message.as_str()), Some("connection refused"));
    }

    let counter = Arc::clone(&invocations);
    let rejected = breaker
        .execute(|| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, QueryError>(())
        })
        .await;
    assert!(rejected.expect_err("circuit is open").is_circuit_open());
    assert_eq!(invocations.load(Ordering::SeqCst), 3);

    clock.advance(Duration::from_millis(1000));
    for expected in [CircuitState::HalfOpen, CircuitState::Closed] {
        breaker.execute(|| async { Ok::<_, QueryError>(()) }).await.expect("trial call succeeds");
        assert_eq!(breaker.state(), expected);
    }

    let record = breaker.record();
    assert_eq!(record.failure_count, 0);
    assert_eq!(record.rejected_calls, 1);
}

/// Validates that every mutation reaches the storage backend and that a
/// fresh breaker restored from it continues where the old one stopped.
#[test]
fn test_breaker_state_survives_restart() {
    let storage = Arc::new(InMemoryBreakerStorage::new());
    let clock = MockClock::with_epoch_millis(1_700_000_000_000);

    let breaker = CircuitBreaker::with_clock("users", config(2, 5000, 1), clock.clone())
        .expect("valid breaker")
        .with_storage(storage.clone());
    for _ in 0..2 {
        let _ = breaker.call(|| Err::<(), _>(query_error()));
    }
    assert_eq!(breaker.state(), CircuitState::Open);
    drop(breaker);

    assert_eq!(storage.list_all().expect("list"), vec!["users".to_string()]);
    let stored = storage.load_state("users").expect("snapshot persisted");
    assert_eq!(stored.state, CircuitState::Open);
    assert_eq!(stored.metadata.last_state_change_at_ms, 1_700_000_000_000);

    clock.advance(Duration::from_millis(3000));
    let restored = CircuitBreaker::with_clock("users", config(2, 5000, 1), clock.clone())
        .expect("valid breaker");
    restored.restore(&stored);

    let rejected = restored.call(|| Ok::<_, QueryError>(()));
    assert!(matches!(rejected, Err(ResilienceError::CircuitOpen { .. })));

    clock.advance(Duration::from_millis(2000));
    assert!(restored.call(|| Ok::<_, QueryError>(())).is_ok());
    assert_eq!(restored.state(), CircuitState::Closed);
}

/// Validates that state changes are published in order on a channel sink.
#[tokio::test]
async fn test_state_changes_published_to_channel() {
    let (sink, mut receiver) = ChannelEventSink::new(16);
    let clock = MockClock::new();
    let breaker = CircuitBreaker::with_clock("billing", config(1, 100, 1), clock.clone())
        .expect("valid breaker")
        .with_event_sink(Arc::new(sink));

    let _ = breaker.call(|| Err::<(), _>(query_error()));
    clock.advance(Duration::from_millis(100));
    let _ = breaker.call(|| Err::<(), _>(query_error()));

    let mut transitions = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        if let RampartEvent::BreakerStateChanged { service_name, from, to } = event {
            assert_eq!(service_name, "billing");
            transitions.push((from, to));
        }
    }
    assert_eq!(
        transitions,
        vec![
            (CircuitState::Closed, CircuitState::Open),
            (CircuitState::Open, CircuitState::HalfOpen),
            (CircuitState::HalfOpen, CircuitState::Open),
        ]
    );
}

/// Validates that breakers for different services do not affect each other
/// while both are hammered concurrently.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_services_are_isolated_under_concurrency() {
    let failing = Arc::new(CircuitBreaker::new("failing", config(10, 60_000, 1)).expect("valid"));
    let healthy = Arc::new(CircuitBreaker::new("healthy", config(10, 60_000, 1)).expect("valid"));

    let mut handles = Vec::new();
    for _ in 0..50 {
        let failing = Arc::clone(&failing);
        let healthy = Arc::clone(&healthy);
        handles.push(tokio::spawn(async move {
            let _ = failing.execute(|| async { Err::<(), _>(query_error()) }).await;
            healthy.execute(|| async { Ok::<_, QueryError>(()) }).await.expect("healthy service");
        }));
    }
    for handle in handles {
        handle.await.expect("task completed");
    }

    assert_eq!(failing.state(), CircuitState::Open);
    assert_eq!(healthy.state(), CircuitState::Closed);
    assert_eq!(healthy.record().total_calls, 50);
}
