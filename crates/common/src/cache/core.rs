//! Namespaced TTL cache store
//!
//! Each namespace owns its own concurrent map and atomic counters, so
//! operations on one namespace never contend with another. Expiry is checked
//! lazily on every read; [`CacheStore::purge_expired`] and
//! [`spawn_sweeper`] additionally bound memory held by entries nobody reads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::config::{EvictionPolicy, NamespaceConfig};
use super::stats::{CacheStats, NamespaceStats};
use crate::observability::{EventSink, NoOpEventSink, RampartEvent};
use crate::resilience::{Clock, SystemClock};

/// Entry stored in a namespace with the metadata eviction needs
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Option<Duration>,
    expires_at: Option<Instant>,
    last_accessed: Instant,
    access_count: u64,
    /// Insertion order within the namespace
    sequence: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

/// Result of a lookup, computed while the entry guard is held
enum Lookup<V> {
    Hit(V),
    Expired,
    Missing,
}

#[derive(Debug)]
struct Namespace<V> {
    config: RwLock<NamespaceConfig>,
    entries: DashMap<String, CacheEntry<V>>,
    stats: NamespaceStats,
    sequence: AtomicU64,
}

impl<V> Namespace<V> {
    fn new(config: NamespaceConfig) -> Self {
        Self {
            config: RwLock::new(config),
            entries: DashMap::new(),
            stats: NamespaceStats::default(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Drop every expired entry, returning how many were removed
    fn purge_expired(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        self.stats.record_expirations(removed as u64);
        removed
    }

    fn live_len(&self, now: Instant) -> usize {
        self.entries.iter().filter(|entry| !entry.is_expired(now)).count()
    }

    /// Make room for one new entry under `max_size`
    fn make_room(&self, max_size: usize, policy: EvictionPolicy, now: Instant) {
        if self.entries.len() < max_size {
            return;
        }
        self.purge_expired(now);
        if policy == EvictionPolicy::None {
            return;
        }

        let mut evicted = 0_u64;
        while self.entries.len() >= max_size {
            let Some(victim) = self.pick_victim(policy) else {
                break;
            };
            if self.entries.remove(&victim).is_some() {
                evicted += 1;
            }
        }
        if evicted > 0 {
            self.stats.record_evictions(evicted);
        }
    }

    fn pick_victim(&self, policy: EvictionPolicy) -> Option<String> {
        let entries = self.entries.iter();
        let victim = match policy {
            EvictionPolicy::Lru => {
                entries.min_by_key(|entry| (entry.last_accessed, entry.sequence))
            }
            EvictionPolicy::Lfu => entries.min_by_key(|entry| (entry.access_count, entry.sequence)),
            EvictionPolicy::Fifo => entries.min_by_key(|entry| entry.sequence),
            EvictionPolicy::None => None,
        };
        victim.map(|entry| entry.key().clone())
    }
}

/// Namespaced key/value store with per-entry TTL and per-namespace stats.
///
/// Values are cloned out on read. Namespaces are declared with
/// [`CacheStore::create_namespace`]; a `put` into an undeclared namespace
/// declares it with the store's default [`NamespaceConfig`].
///
/// # Example
/// ```
/// use std::time::Duration;
///
/// use rampart_common::cache::{CacheStore, NamespaceConfig};
///
/// let store: CacheStore<String> = CacheStore::new(NamespaceConfig::default());
/// store.create_namespace("users:records", NamespaceConfig::ttl(Duration::from_secs(300)));
/// store.put("users:records", "42", "Ada".to_string());
/// assert_eq!(store.get("users:records", "42"), Some("Ada".to_string()));
/// ```
pub struct CacheStore<V, C = SystemClock>
where
    C: Clock,
{
    namespaces: DashMap<String, Arc<Namespace<V>>>,
    defaults: NamespaceConfig,
    clock: C,
    events: Arc<dyn EventSink>,
}

impl<V, C: Clock> std::fmt::Debug for CacheStore<V, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("namespaces", &self.namespaces.len())
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl<V: Clone> CacheStore<V, SystemClock> {
    /// Create a store using the system clock
    pub fn new(defaults: NamespaceConfig) -> Self {
        Self::with_clock(defaults, SystemClock)
    }
}

impl<V, C> CacheStore<V, C>
where
    V: Clone,
    C: Clock,
{
    /// Create a store with a custom clock (useful for testing)
    pub fn with_clock(defaults: NamespaceConfig, clock: C) -> Self {
        Self { namespaces: DashMap::new(), defaults, clock, events: Arc::new(NoOpEventSink) }
    }

    /// Publish `cache.hit` / `cache.miss` events to `events`
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Declare a namespace. Re-declaring keeps existing entries and replaces
    /// the configuration.
    pub fn create_namespace(&self, name: &str, config: NamespaceConfig) {
        match self.namespaces.get(name) {
            Some(namespace) => *namespace.config.write() = config,
            None => {
                self.namespaces
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::new(Namespace::new(config)));
                debug!(namespace = name, ?config, "Cache namespace created");
            }
        }
    }

    /// Insert or overwrite using the namespace's default TTL
    pub fn put(&self, namespace: &str, key: impl Into<String>, value: V) {
        let namespace = self.namespace_or_default(namespace);
        let ttl = namespace.config.read().default_ttl;
        self.insert(&namespace, key.into(), value, ttl);
    }

    /// Insert or overwrite with an explicit TTL (`None` = never expires)
    pub fn put_with_ttl(
        &self,
        namespace: &str,
        key: impl Into<String>,
        value: V,
        ttl: Option<Duration>,
    ) {
        let namespace = self.namespace_or_default(namespace);
        self.insert(&namespace, key.into(), value, ttl);
    }

    /// Look up a live entry.
    ///
    /// An expired entry is removed and counted as a miss. Unknown namespaces
    /// return `None`.
    pub fn get(&self, namespace: &str, key: &str) -> Option<V> {
        let Some(ns) = self.namespace(namespace) else {
            self.emit_miss(namespace, key);
            return None;
        };

        let now = self.clock.now();
        let lookup = match ns.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.last_accessed = now;
                entry.access_count += 1;
                Lookup::Hit(entry.value.clone())
            }
            Some(_) => Lookup::Expired,
            None => Lookup::Missing,
        };

        match lookup {
            Lookup::Hit(value) => {
                ns.stats.record_hit();
                self.events.emit(&RampartEvent::CacheHit {
                    namespace: namespace.to_string(),
                    key: key.to_string(),
                });
                Some(value)
            }
            Lookup::Expired => {
                // A concurrent put may have replaced the entry in between.
                if ns.entries.remove_if(key, |_, entry| entry.is_expired(now)).is_some() {
                    ns.stats.record_expirations(1);
                    trace!(namespace, key, "Expired cache entry evicted on read");
                }
                ns.stats.record_miss();
                self.emit_miss(namespace, key);
                None
            }
            Lookup::Missing => {
                ns.stats.record_miss();
                self.emit_miss(namespace, key);
                None
            }
        }
    }

    /// Remove one entry; returns whether it was present
    pub fn delete(&self, namespace: &str, key: &str) -> bool {
        self.namespace(namespace).is_some_and(|ns| ns.entries.remove(key).is_some())
    }

    /// Drop every entry in `namespace` and reset its statistics
    pub fn clear(&self, namespace: &str) {
        if let Some(ns) = self.namespace(namespace) {
            let dropped = ns.entries.len();
            ns.entries.clear();
            ns.stats.reset();
            debug!(namespace, dropped, "Cache namespace cleared");
        }
    }

    /// Schema-wide invalidation; same as [`CacheStore::clear`]
    pub fn invalidate_namespace(&self, namespace: &str) {
        self.clear(namespace);
    }

    /// Statistics for `namespace`; zeroed for unknown namespaces
    pub fn stats(&self, namespace: &str) -> CacheStats {
        match self.namespace(namespace) {
            Some(ns) => {
                let size = ns.live_len(self.clock.now());
                ns.stats.snapshot(size, ns.config.read().max_size)
            }
            None => CacheStats::default(),
        }
    }

    /// Live entries in `namespace`
    pub fn len(&self, namespace: &str) -> usize {
        self.namespace(namespace).map_or(0, |ns| ns.live_len(self.clock.now()))
    }

    /// Whether `key` holds a live entry in `namespace`
    pub fn contains(&self, namespace: &str, key: &str) -> bool {
        let now = self.clock.now();
        self.namespace(namespace)
            .is_some_and(|ns| ns.entries.get(key).is_some_and(|entry| !entry.is_expired(now)))
    }

    /// Declared namespace names, sorted
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.namespaces.iter().map(|ns| ns.key().clone()).collect();
        names.sort();
        names
    }

    /// Current config of `namespace`, if declared
    pub fn namespace_config(&self, namespace: &str) -> Option<NamespaceConfig> {
        self.namespace(namespace).map(|ns| *ns.config.read())
    }

    /// Remove expired entries from every namespace; returns the number removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let namespaces: Vec<Arc<Namespace<V>>> =
            self.namespaces.iter().map(|ns| Arc::clone(ns.value())).collect();
        let removed = namespaces.iter().map(|ns| ns.purge_expired(now)).sum();
        if removed > 0 {
            debug!(removed, "Expired cache entries purged");
        }
        removed
    }

    fn namespace(&self, name: &str) -> Option<Arc<Namespace<V>>> {
        self.namespaces.get(name).map(|ns| Arc::clone(ns.value()))
    }

    fn namespace_or_default(&self, name: &str) -> Arc<Namespace<V>> {
        if let Some(ns) = self.namespace(name) {
            return ns;
        }
        let ns = self
            .namespaces
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Namespace::new(self.defaults)));
        Arc::clone(ns.value())
    }

    fn insert(&self, ns: &Namespace<V>, key: String, value: V, ttl: Option<Duration>) {
        let now = self.clock.now();
        let config = *ns.config.read();

        if let Some(max_size) = config.max_size {
            if !ns.entries.contains_key(&key) {
                ns.make_room(max_size, config.eviction_policy, now);
            }
        }

        let entry = CacheEntry {
            value,
            inserted_at: now,
            ttl,
            expires_at: ttl.and_then(|ttl| now.checked_add(ttl)),
            last_accessed: now,
            access_count: 0,
            sequence: ns.sequence.fetch_add(1, Ordering::Relaxed),
        };
        trace!(
            key = %key,
            ttl_ms = ?entry.ttl.map(|ttl| ttl.as_millis()),
            inserted_at = ?entry.inserted_at,
            "Cache put"
        );
        ns.entries.insert(key, entry);
        ns.stats.record_insert();
    }

    fn emit_miss(&self, namespace: &str, key: &str) {
        self.events.emit(&RampartEvent::CacheMiss {
            namespace: namespace.to_string(),
            key: key.to_string(),
        });
    }
}

/// Periodically purge expired entries from `store`.
///
/// The task holds only a weak handle and exits once the store is dropped.
/// Must be called from within a tokio runtime.
pub fn spawn_sweeper<V, C>(store: &Arc<CacheStore<V, C>>, interval: Duration) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
    C: Clock,
{
    let weak: Weak<CacheStore<V, C>> = Arc::downgrade(store);
    let period = interval.max(Duration::from_millis(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(store) = weak.upgrade() else {
                debug!("Cache store dropped, sweeper exiting");
                break;
            };
            store.purge_expired();
        }
    })
}
