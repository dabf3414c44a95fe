// ABOUTME: Durable subscriber registry backed by a pretty-printed JSON array on disk
// ABOUTME: Every operation re-reads the file, mutates, and atomically rewrites it

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::metrics;

// =============================================================================
// Subscriber identity
// =============================================================================

/// Platform-assigned identifier of one recipient chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(pub i64);

impl SubscriberId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubscriberId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(SubscriberId)
    }
}

impl From<i64> for SubscriberId {
    fn from(id: i64) -> Self {
        SubscriberId(id)
    }
}

pub type SubscriberSet = BTreeSet<SubscriberId>;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read registry {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse registry {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode registry: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to write registry {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// =============================================================================
// RegistryStore - whole-file JSON persistence
// =============================================================================

/// Reads and writes the subscriber set as one JSON document.
///
/// `load` and `save` never fail from the caller's point of view: a missing or
/// corrupted file reads as the empty set, and a failed write is logged and
/// leaves the previous file in place. The `try_*` variants expose the error.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    path: PathBuf,
}

impl RegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn try_load(&self) -> Result<SubscriberSet, RegistryError> {
        if !self.path.exists() {
            return Ok(SubscriberSet::new());
        }

        let content = std::fs::read_to_string(&self.path).map_err(|source| RegistryError::Read {
            path: self.path.clone(),
            source,
        })?;

        serde_json::from_str::<SubscriberSet>(&content).map_err(|source| RegistryError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Load the subscriber set, treating any failure as an empty registry.
    pub fn load(&self) -> SubscriberSet {
        match self.try_load() {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to load subscriber registry, using empty set"
                );
                SubscriberSet::new()
            }
        }
    }

    pub fn try_save(&self, ids: &SubscriberSet) -> Result<(), RegistryError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| RegistryError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let mut content = serde_json::to_string_pretty(ids)?;
        content.push('\n');

        // Write beside the target and rename so readers never see a torn file
        let tmp_path = self.tmp_path();
        std::fs::write(&tmp_path, content).map_err(|source| RegistryError::Write {
            path: tmp_path.clone(),
            source,
        })?;

        if let Err(source) = std::fs::rename(&tmp_path, &self.path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(RegistryError::Write {
                path: self.path.clone(),
                source,
            });
        }

        metrics::set_subscriber_count(ids.len());
        Ok(())
    }

    /// Persist the subscriber set; failures are logged and swallowed.
    pub fn save(&self, ids: &SubscriberSet) {
        if let Err(e) = self.try_save(ids) {
            tracing::error!(
                path = %self.path.display(),
                error = %e,
                "Failed to save subscriber registry"
            );
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "registry".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

// =============================================================================
// SubscriberRegistry - load/mutate/save discipline
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Added,
    AlreadySubscribed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    Removed,
    NotSubscribed,
}

/// How a broadcast cycle writes back the registry after dropping recipients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PruneStrategy {
    /// Write `snapshot - removed`, replacing whatever is stored. A subscribe
    /// that landed while the cycle was running is lost.
    #[default]
    ReplaceWithSnapshot,
    /// Re-read the file and write `current - removed`.
    RecheckStored,
}

/// Orchestrates registry access: always load before reading, always save
/// after mutating. Holds no cached state, only the store location.
///
/// There is no locking. Two interleaved load-mutate-save sequences resolve as
/// last-writer-wins.
#[derive(Debug, Clone)]
pub struct SubscriberRegistry {
    store: RegistryStore,
}

impl SubscriberRegistry {
    pub fn new(store: RegistryStore) -> Self {
        Self { store }
    }

    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::new(RegistryStore::new(path))
    }

    pub fn store(&self) -> &RegistryStore {
        &self.store
    }

    pub fn snapshot(&self) -> SubscriberSet {
        self.store.load()
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.store.load().contains(&id)
    }

    pub fn subscribe(&self, id: SubscriberId) -> SubscribeOutcome {
        let mut ids = self.store.load();
        if ids.insert(id) {
            self.store.save(&ids);
            SubscribeOutcome::Added
        } else {
            SubscribeOutcome::AlreadySubscribed
        }
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> UnsubscribeOutcome {
        let mut ids = self.store.load();
        if ids.remove(&id) {
            self.store.save(&ids);
            UnsubscribeOutcome::Removed
        } else {
            UnsubscribeOutcome::NotSubscribed
        }
    }

    /// Drop `removed` from the registry after a broadcast cycle and return
    /// the set that was written.
    pub fn prune(
        &self,
        snapshot: &SubscriberSet,
        removed: &SubscriberSet,
        strategy: PruneStrategy,
    ) -> SubscriberSet {
        let base = match strategy {
            PruneStrategy::ReplaceWithSnapshot => snapshot.clone(),
            PruneStrategy::RecheckStored => self.store.load(),
        };
        let updated: SubscriberSet = base.difference(removed).copied().collect();
        self.store.save(&updated);
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[i64]) -> SubscriberSet {
        values.iter().copied().map(SubscriberId).collect()
    }

    #[test]
    fn test_subscriber_id_parse() {
        assert_eq!("42".parse::<SubscriberId>().unwrap(), SubscriberId(42));
        assert_eq!(" -100 ".parse::<SubscriberId>().unwrap(), SubscriberId(-100));
        assert!("abc".parse::<SubscriberId>().is_err());
    }

    #[test]
    fn test_subscriber_id_serializes_as_plain_integer() {
        let json = serde_json::to_string(&SubscriberId(7)).unwrap();
        assert_eq!(json, "7");
    }

    #[test]
    fn test_tmp_path_is_sibling() {
        let store = RegistryStore::new("/var/lib/herald/users.json");
        assert_eq!(
            store.tmp_path(),
            PathBuf::from("/var/lib/herald/users.json.tmp")
        );
    }

    #[test]
    fn test_save_writes_sorted_pretty_array() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::new(dir.path().join("users.json"));
        store.save(&ids(&[3, 1, 2]));

        let content = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(content, "[\n  1,\n  2,\n  3\n]\n");
        assert!(!dir.path().join("users.json.tmp").exists());
    }

    #[test]
    fn test_load_accepts_duplicates_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, "[5, 5, 6]").unwrap();
        assert_eq!(RegistryStore::new(&path).load(), ids(&[5, 6]));
    }

    #[test]
    fn test_try_load_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = RegistryStore::new(&path).try_load().unwrap_err();
        assert!(matches!(err, RegistryError::Parse { .. }));
    }

    #[test]
    fn test_prune_recheck_keeps_concurrent_subscribe() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SubscriberRegistry::open(dir.path().join("users.json"));
        registry.store().save(&ids(&[1, 2, 3]));
        let snapshot = registry.snapshot();

        // Subscriber 9 arrives while the cycle is running
        registry.subscribe(SubscriberId(9));

        let written = registry.prune(&snapshot, &ids(&[2]), PruneStrategy::RecheckStored);
        assert_eq!(written, ids(&[1, 3, 9]));
        assert_eq!(registry.snapshot(), ids(&[1, 3, 9]));
    }

    #[test]
    fn test_prune_replace_drops_concurrent_subscribe() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SubscriberRegistry::open(dir.path().join("users.json"));
        registry.store().save(&ids(&[1, 2, 3]));
        let snapshot = registry.snapshot();

        registry.subscribe(SubscriberId(9));

        let written = registry.prune(&snapshot, &ids(&[2]), PruneStrategy::ReplaceWithSnapshot);
        assert_eq!(written, ids(&[1, 3]));
    }
}
