//! Integration tests for [`Rampart`] wiring
//!
//! Builds the whole shield from configuration and checks that breaker state
//! survives a restart through the file backend, and that events reach both
//! an external sink and the Prometheus collector.

use std::sync::Arc;

use rampart_common::observability::metric_names::{CACHE_HITS_TOTAL, CALLS_TOTAL};
use rampart_common::observability::{ChannelEventSink, EventSink};
use rampart_common::resilience::CircuitState;
use rampart_common::testing::MockError;
use rampart_domain::{RampartConfig, RestorePolicy, StorageBackend};
use rampart_infra::Rampart;
use serde_json::{json, Value};
use tempfile::TempDir;

fn file_config(dir: &TempDir, restore_policy: RestorePolicy) -> RampartConfig {
    let mut config = RampartConfig::default();
    config.breaker.max_failures = 2;
    config.breaker.reset_timeout_ms = 60_000;
    config.breaker.restore_policy = restore_policy;
    config.storage.backend = StorageBackend::File;
    config.storage.path = Some(dir.path().join("breakers").display().to_string());
    config
}

async fn trip(rampart: &Rampart, schema: &str) {
    for id in 0..2 {
        let down = || async { Err::<Value, _>(MockError::new("db down")) };
        let result = rampart.facade().read_through(schema, &id.to_string(), down).await;
        assert!(result.is_err());
    }
}

/// Validates that an open breaker is still open after a restart.
///
/// # Test Steps
/// 1. Start with the file backend and trip the `users` breaker
/// 2. Shut down and start a new instance on the same directory
/// 3. Confirm `users` is restored `Open` and `orders` stays `Closed`
#[tokio::test]
async fn test_file_backend_restores_open_breaker() -> anyhow::Result<()> {
    let dir = TempDir::new()?;

    let first = Rampart::initialize(file_config(&dir, RestorePolicy::Persisted))?;
    first.facade().setup(&["users", "orders"])?;
    trip(&first, "users").await;
    assert_eq!(first.registry().state("users")?, CircuitState::Open);
    first.shutdown();

    let second = Rampart::initialize(file_config(&dir, RestorePolicy::Persisted))?;

    assert_eq!(second.registry().state("users")?, CircuitState::Open);
    assert_eq!(second.registry().state("orders")?, CircuitState::Closed);
    let rejected = second
        .facade()
        .read_through("users", "9", || async { Ok::<_, MockError>(json!(9)) })
        .await;
    assert!(matches!(rejected, Err(ref err) if err.is_circuit_open()));
    Ok(())
}

/// Validates that the `closed` restore policy keeps services but resets state.
#[tokio::test]
async fn test_closed_restore_policy() -> anyhow::Result<()> {
    let dir = TempDir::new()?;

    let first = Rampart::initialize(file_config(&dir, RestorePolicy::Persisted))?;
    first.facade().setup(&["users"])?;
    trip(&first, "users").await;
    first.shutdown();

    let second = Rampart::initialize(file_config(&dir, RestorePolicy::Closed))?;

    assert_eq!(second.breakers().len(), 1);
    assert_eq!(second.registry().state("users")?, CircuitState::Closed);
    Ok(())
}

/// Validates event delivery to an external sink and the metrics exporter.
///
/// # Test Steps
/// 1. Initialize with a channel sink
/// 2. Read the same record twice (miss, then hit)
/// 3. Confirm the event sequence and the rendered Prometheus series
#[tokio::test]
async fn test_events_reach_sink_and_metrics() -> anyhow::Result<()> {
    let (channel, mut receiver) = ChannelEventSink::new(16);
    let sink: Arc<dyn EventSink> = Arc::new(channel);
    let rampart = Rampart::initialize_with_sink(RampartConfig::default(), Some(sink))?;
    rampart.facade().setup(&["users"])?;

    for _ in 0..2 {
        let value = rampart
            .facade()
            .read_through("users", "1", || async { Ok::<_, MockError>(json!({"id": 1})) })
            .await
            .expect("read succeeds");
        assert_eq!(value, json!({"id": 1}));
    }

    let mut names = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        names.push(event.name());
    }
    assert_eq!(names, ["cache.miss", "circuit_breaker.call", "cache.hit"]);

    let metrics = rampart.metrics();
    let success = [("service_name", "users"), ("status", "success")];
    assert_eq!(metrics.counter_value(CALLS_TOTAL, &success), Some(1.0));
    let records = [("namespace", "users:records")];
    assert_eq!(metrics.counter_value(CACHE_HITS_TOTAL, &records), Some(1.0));

    let text = rampart.render_metrics()?;
    assert!(text.contains("rampart_cache_misses_total"));
    assert!(text.contains("rampart_circuit_breaker_call_duration_ms_bucket"));
    Ok(())
}
