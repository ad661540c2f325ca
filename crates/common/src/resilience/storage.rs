//! Pluggable persistence for circuit breaker state
//!
//! A breaker writes a snapshot of its state through [`BreakerStateStorage`]
//! after every mutation, and the registry reads the snapshots back at startup.
//! Persistence is best-effort: callers log [`StorageError`]s and carry on.
//!
//! [`InMemoryBreakerStorage`] is the default backend. Other backends (files,
//! external key/value stores) implement the same trait.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::circuit_breaker::CircuitState;
use super::config::BreakerConfig;

/// Errors raised by a storage backend
#[derive(Debug, Error)]
pub enum StorageError {
    /// No snapshot exists for the service
    #[error("No persisted state for '{service}'")]
    NotFound { service: String },

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A snapshot could not be encoded or decoded
    #[error("Storage serialization error: {0}")]
    Serialization(String),

    /// Any other backend failure
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Counters and timestamps persisted alongside a breaker's state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMetadata {
    /// Consecutive failures counted in `Closed`
    pub failure_count: u32,
    /// Successful trial calls counted in `HalfOpen`
    pub success_count: u32,
    /// Wall-clock milliseconds since the epoch of the last transition
    pub last_state_change_at_ms: u64,
    /// Wall-clock milliseconds since the epoch of the last recorded failure
    pub last_failure_at_ms: Option<u64>,
    /// Configuration in force when the snapshot was taken
    pub config: BreakerConfig,
}

/// A persisted breaker snapshot as returned by [`BreakerStateStorage::load_state`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBreakerState {
    /// State at the time of the snapshot
    pub state: CircuitState,
    /// Counters, timestamps and config at the time of the snapshot
    pub metadata: StateMetadata,
}

/// Persistence adapter for breaker state.
///
/// Implementations must tolerate concurrent calls for distinct service names;
/// a failed write for one service must not affect reads of another.
pub trait BreakerStateStorage: Send + Sync + fmt::Debug {
    /// Prepare the backend (create tables, directories, ...). Called once at startup.
    fn initialize(&self) -> StorageResult<()> {
        Ok(())
    }

    /// Persist the current state of `service_name`, replacing any previous snapshot
    fn save_state(
        &self,
        service_name: &str,
        state: CircuitState,
        metadata: &StateMetadata,
    ) -> StorageResult<()>;

    /// Load the last snapshot, or [`StorageError::NotFound`]
    fn load_state(&self, service_name: &str) -> StorageResult<StoredBreakerState>;

    /// Remove a snapshot; removing an unknown service is not an error
    fn delete_state(&self, service_name: &str) -> StorageResult<()>;

    /// Names of every service with a persisted snapshot
    fn list_all(&self) -> StorageResult<Vec<String>>;
}

/// Concurrent in-memory storage backed by a sharded map
#[derive(Debug, Default)]
pub struct InMemoryBreakerStorage {
    states: DashMap<String, StoredBreakerState>,
}

impl InMemoryBreakerStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted snapshots
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether no snapshot has been persisted
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl BreakerStateStorage for InMemoryBreakerStorage {
    fn save_state(
        &self,
        service_name: &str,
        state: CircuitState,
        metadata: &StateMetadata,
    ) -> StorageResult<()> {
        self.states.insert(
            service_name.to_string(),
            StoredBreakerState { state, metadata: metadata.clone() },
        );
        Ok(())
    }

    fn load_state(&self, service_name: &str) -> StorageResult<StoredBreakerState> {
        self.states
            .get(service_name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::NotFound { service: service_name.to_string() })
    }

    fn delete_state(&self, service_name: &str) -> StorageResult<()> {
        self.states.remove(service_name);
        Ok(())
    }

    fn list_all(&self) -> StorageResult<Vec<String>> {
        let mut names: Vec<String> = self.states.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        Ok(names)
    }
}

/// A snapshot taken under a breaker's lock, written after the lock is released
#[derive(Debug, Clone)]
pub(crate) struct PendingSnapshot {
    /// Increases with every mutation of the breaker
    pub(crate) revision: u64,
    pub(crate) state: CircuitState,
    pub(crate) metadata: StateMetadata,
}

#[derive(Debug, Default)]
struct SnapshotQueue {
    next: Option<PendingSnapshot>,
    newest_revision: u64,
}

/// Writes one service's snapshots to storage in revision order.
///
/// At most one thread writes at a time. A thread that finds a write in
/// progress queues its snapshot and returns; the writing thread picks it up
/// before releasing. Only the newest queued snapshot is kept, and a snapshot
/// older than one already queued or written is dropped.
#[derive(Debug)]
pub(crate) struct SnapshotWriter {
    storage: Arc<dyn BreakerStateStorage>,
    queue: Mutex<SnapshotQueue>,
    writing: Mutex<()>,
}

impl SnapshotWriter {
    pub(crate) fn new(storage: Arc<dyn BreakerStateStorage>) -> Self {
        Self {
            storage,
            queue: Mutex::new(SnapshotQueue::default()),
            writing: Mutex::new(()),
        }
    }

    pub(crate) fn submit(&self, service_name: &str, snapshot: PendingSnapshot) {
        {
            let mut queue = self.queue.lock();
            if snapshot.revision <= queue.newest_revision {
                return;
            }
            queue.newest_revision = snapshot.revision;
            queue.next = Some(snapshot);
        }
        self.drain(service_name);
    }

    fn drain(&self, service_name: &str) {
        loop {
            let Some(writing) = self.writing.try_lock() else {
                return;
            };
            loop {
                let next = self.queue.lock().next.take();
                let Some(snapshot) = next else {
                    break;
                };
                if let Err(err) =
                    self.storage.save_state(service_name, snapshot.state, &snapshot.metadata)
                {
                    warn!(
                        service = service_name,
                        revision = snapshot.revision,
                        error = %err,
                        "Failed to persist circuit breaker state"
                    );
                }
            }
            drop(writing);

            // A snapshot queued between the last take and the unlock is ours to write.
            if self.queue.lock().next.is_none() {
                return;
            }
        }
    }
}
