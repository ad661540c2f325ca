//! Integration tests for the cache module
//!
//! Covers the cache-aside contract from the outside: round trips, lazy expiry,
//! namespace-scoped invalidation, stats, query keys, concurrent access, and
//! the background sweeper.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rampart_common::cache::{generate_query_key, spawn_sweeper, CacheStore, NamespaceConfig};
use rampart_common::observability::{ChannelEventSink, RampartEvent};
use rampart_common::resilience::MockClock;
use serde_json::json;

const RECORDS: &str = "repository:User:records";
const QUERIES: &str = "repository:User:queries";

fn user_store(clock: MockClock) -> CacheStore<serde_json::Value, MockClock> {
    let store = CacheStore::with_clock(NamespaceConfig::default(), clock);
    store.create_namespace(RECORDS, NamespaceConfig::ttl(Duration::from_secs(300)));
    store.create_namespace(QUERIES, NamespaceConfig::ttl(Duration::from_secs(60)));
    store
}

/// Validates per-namespace default TTLs against a mock clock.
///
/// # Test Steps
/// 1. Put one record and one query result with namespace defaults
/// 2. Advance past the query TTL only and confirm the query expired
/// 3. Advance past the record TTL and confirm the record expired
#[test]
fn test_namespace_default_ttls() {
    let clock = MockClock::new();
    let store = user_store(clock.clone());
    let query_key = generate_query_key(&json!({"active": true}), &json!({}));

    store.put(RECORDS, "7", json!({"id": 7, "name": "Grace"}));
    store.put(QUERIES, query_key.clone(), json!([7]));

    clock.advance(Duration::from_secs(60));
    assert!(store.get(QUERIES, &query_key).is_none());
    assert_eq!(store.get(RECORDS, "7"), Some(json!({"id": 7, "name": "Grace"})));

    clock.advance(Duration::from_secs(240));
    assert!(store.get(RECORDS, "7").is_none());
}

/// Validates stats accounting: `h` hits and `m` misses give `h / (h + m)`.
#[test]
fn test_stats_accounting() {
    let store = user_store(MockClock::new());
    store.put(RECORDS, "1", json!(1));

    for _ in 0..6 {
        assert!(store.get(RECORDS, "1").is_some());
    }
    for missing in ["2", "3"] {
        assert!(store.get(RECORDS, missing).is_none());
    }

    let stats = store.stats(RECORDS);
    assert_eq!(stats.hits, 6);
    assert_eq!(stats.misses, 2);
    assert!((stats.hit_rate - 0.75).abs() < 1e-10);
    assert_eq!(stats.size, 1);
    assert_eq!(store.stats(QUERIES).hit_rate, 0.0);
}

/// Validates that invalidating one namespace leaves the other untouched.
#[test]
fn test_invalidate_namespace_is_scoped() {
    let store = user_store(MockClock::new());
    for id in 0..10 {
        store.put(RECORDS, id.to_string(), json!(id));
        store.put(QUERIES, format!("q{id}"), json!([id]));
    }

    store.invalidate_namespace(QUERIES);

    for id in 0..10 {
        assert!(store.get(QUERIES, &format!("q{id}")).is_none());
        assert_eq!(store.get(RECORDS, &id.to_string()), Some(json!(id)));
    }
}

/// Validates that hits and misses are published as events.
#[test]
fn test_cache_access_events() {
    let (sink, mut receiver) = ChannelEventSink::new(8);
    let store = user_store(MockClock::new()).with_event_sink(Arc::new(sink));

    store.put(RECORDS, "1", json!(1));
    let _ = store.get(RECORDS, "1");
    let _ = store.get(RECORDS, "2");

    let names: Vec<&str> = std::iter::from_fn(|| receiver.try_recv().ok())
        .map(|event: RampartEvent| event.name())
        .collect();
    assert_eq!(names, vec!["cache.hit", "cache.miss"]);
}

/// Validates that concurrent readers and writers never lose stat increments.
///
/// # Test Steps
/// 1. Spawn 8 threads, each doing 200 gets on a present key and 100 on a
///    missing key
/// 2. Confirm hits == 1600 and misses == 800 exactly
#[test]
fn test_concurrent_access_counts_exactly() {
    let store = Arc::new(CacheStore::<u64>::new(NamespaceConfig::default()));
    store.put("hot", "present", 1);

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..200 {
                    assert_eq!(store.get("hot", "present"), Some(1));
                    if i % 2 == 0 {
                        assert!(store.get("hot", "absent").is_none());
                    }
                    store.put("hot", format!("w{worker}-{i}"), i);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker thread");
    }

    let stats = store.stats("hot");
    assert_eq!(stats.hits, 1600);
    assert_eq!(stats.misses, 800);
    assert_eq!(stats.size, 1 + 8 * 200);
}

/// Validates that query keys are stable across map orderings and usable as
/// cache keys.
#[test]
fn test_query_key_as_cache_key() {
    let store = user_store(MockClock::new());
    let conditions = json!({"role": "admin", "team": {"id": 4, "region": "eu"}});
    let reordered = json!({"team": {"region": "eu", "id": 4}, "role": "admin"});
    let options = json!({"limit": 25, "order": ["name", "asc"]});

    store.put(QUERIES, generate_query_key(&conditions, &options), json!([1, 2]));

    assert_eq!(store.get(QUERIES, &generate_query_key(&reordered, &options)), Some(json!([1, 2])));
    assert!(store.get(QUERIES, &generate_query_key(&conditions, &json!({"limit": 26}))).is_none());
}

/// Validates the background sweeper reclaims entries nobody reads.
#[tokio::test]
async fn test_sweeper_reclaims_unread_entries() {
    let store = Arc::new(CacheStore::<String>::new(NamespaceConfig::default()));
    for i in 0..5 {
        let ttl = Some(Duration::from_millis(1));
        store.put_with_ttl("sessions", format!("s{i}"), "token".to_string(), ttl);
    }
    let sweeper = spawn_sweeper(&store, Duration::from_millis(10));

    let mut reclaimed = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if store.stats("sessions").expirations == 5 {
            reclaimed = true;
            break;
        }
    }

    assert!(reclaimed, "sweeper should purge every expired entry");
    assert_eq!(store.stats("sessions").misses, 0, "sweeping is not a read");
    sweeper.abort();
}
