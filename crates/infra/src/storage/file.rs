//! File-backed breaker state storage
//!
//! One JSON document per service under a directory. File names are the
//! hex-encoded service name, so any service name maps to a safe, reversible
//! file name. Writes go through a temporary file in the same directory and an
//! atomic rename, so readers never observe a partially written snapshot.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use rampart_common::resilience::{
    BreakerStateStorage, CircuitState, StateMetadata, StorageError, StorageResult,
    StoredBreakerState,
};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

const SNAPSHOT_EXTENSION: &str = "json";

/// On-disk snapshot layout
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    service_name: String,
    state: CircuitState,
    metadata: StateMetadata,
}

/// [`BreakerStateStorage`] writing one JSON file per service
#[derive(Debug, Clone)]
pub struct FileBreakerStorage {
    dir: PathBuf,
}

impl FileBreakerStorage {
    /// Store snapshots under `dir`; the directory is created by
    /// [`BreakerStateStorage::initialize`]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the snapshots
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_path(&self, service_name: &str) -> PathBuf {
        self.dir.join(format!("{}.{SNAPSHOT_EXTENSION}", hex::encode(service_name)))
    }
}

fn decode_service_name(path: &Path) -> Option<String> {
    if path.extension().and_then(|ext| ext.to_str()) != Some(SNAPSHOT_EXTENSION) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    String::from_utf8(hex::decode(stem).ok()?).ok()
}

fn serialization(err: impl std::fmt::Display) -> StorageError {
    StorageError::Serialization(err.to_string())
}

impl BreakerStateStorage for FileBreakerStorage {
    fn initialize(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.dir)?;
        tracing::debug!(dir = %self.dir.display(), "File breaker storage initialized");
        Ok(())
    }

    fn save_state(
        &self,
        service_name: &str,
        state: CircuitState,
        metadata: &StateMetadata,
    ) -> StorageResult<()> {
        let snapshot = SnapshotFile {
            service_name: service_name.to_string(),
            state,
            metadata: metadata.clone(),
        };
        let body = serde_json::to_vec_pretty(&snapshot).map_err(serialization)?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&body)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.snapshot_path(service_name)).map_err(|err| StorageError::Io(err.error))?;
        Ok(())
    }

    fn load_state(&self, service_name: &str) -> StorageResult<StoredBreakerState> {
        let body = match fs::read(self.snapshot_path(service_name)) {
            Ok(body) => body,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound { service: service_name.to_string() });
            }
            Err(err) => return Err(err.into()),
        };

        let snapshot: SnapshotFile = serde_json::from_slice(&body).map_err(serialization)?;
        if snapshot.service_name != service_name {
            return Err(StorageError::Serialization(format!(
                "snapshot for '{service_name}' names '{}'",
                snapshot.service_name
            )));
        }
        Ok(StoredBreakerState { state: snapshot.state, metadata: snapshot.metadata })
    }

    fn delete_state(&self, service_name: &str) -> StorageResult<()> {
        match fs::remove_file(self.snapshot_path(service_name)) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }

    fn list_all(&self) -> StorageResult<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            match decode_service_name(&path) {
                Some(name) => names.push(name),
                None => tracing::debug!(path = %path.display(), "Skipping non-snapshot file"),
            }
        }
        names.sort();
        Ok(names)
    }
}
