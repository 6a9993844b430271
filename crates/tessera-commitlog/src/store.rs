//! Commit log storage — trait plus file-backed and in-memory implementations.
//!
//! The file store keeps one JSON file per log, organised by keyspace and
//! commit date. Post-processing reads them back, sweeps the keys they name,
//! and removes the logs it has handled.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::{CommitLog, CommitLogId};

/// Errors that can occur during commit log storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Commit log not found: {0}")]
    NotFound(CommitLogId),

    #[error("Integrity check failed for commit log {0}: stored hash does not match content")]
    IntegrityViolation(CommitLogId),

    #[error("Commit log has no content hash (not finalized)")]
    NotFinalized,

    #[error("Commit log store lock poisoned")]
    Poisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Query parameters for listing commit logs.
#[derive(Debug, Default)]
pub struct CommitLogQuery {
    /// Filter by keyspace.
    pub keyspace: Option<String>,
    /// Only include logs committed at or after this time.
    pub from: Option<DateTime<Utc>>,
    /// Only include logs committed at or before this time.
    pub to: Option<DateTime<Utc>>,
}

/// Trait for commit log persistence backends.
pub trait CommitLogStore: Send + Sync {
    /// Store a finalized log. Returns an error if the log has no content hash.
    fn save(&self, log: &CommitLog) -> Result<(), StoreError>;

    /// Retrieve a log by ID, verifying integrity.
    fn get(&self, id: CommitLogId) -> Result<CommitLog, StoreError>;

    /// List logs matching the query, oldest first.
    fn list(&self, query: &CommitLogQuery) -> Result<Vec<CommitLog>, StoreError>;

    /// Remove a log once its keys have been processed.
    fn remove(&self, id: CommitLogId) -> Result<(), StoreError>;
}

// ── File Store ───────────────────────────────────────────────────

/// File-system backed commit log store.
///
/// ```text
/// {root}/
///   {keyspace}/
///     2026/
///       10/
///         19/
///           {log_id}.json
/// ```
pub struct FileCommitLogStore {
    root: PathBuf,
}

impl FileCommitLogStore {
    /// Create a new store rooted at the given directory.
    /// Creates the directory if it doesn't exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn log_path(&self, log: &CommitLog) -> PathBuf {
        let date = log.committed_at.format("%Y/%m/%d");
        self.root
            .join(&log.keyspace)
            .join(format!("{}/{}.json", date, log.id.0))
    }

    fn find_path(&self, id: CommitLogId) -> Result<PathBuf, StoreError> {
        let filename = format!("{}.json", id.0);
        find_file_recursive(&self.root, &filename).ok_or(StoreError::NotFound(id))
    }
}

impl CommitLogStore for FileCommitLogStore {
    fn save(&self, log: &CommitLog) -> Result<(), StoreError> {
        if log.content_hash.is_none() {
            return Err(StoreError::NotFinalized);
        }

        let path = self.log_path(log);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(log)?;
        fs::write(&path, json)?;

        tracing::debug!(
            log_id = %log.id,
            keyspace = %log.keyspace,
            keys = log.key_count(),
            path = %path.display(),
            "Commit log saved"
        );

        Ok(())
    }

    fn get(&self, id: CommitLogId) -> Result<CommitLog, StoreError> {
        let path = self.find_path(id)?;
        let json = fs::read_to_string(&path)?;
        let log: CommitLog = serde_json::from_str(&json)?;

        if !log.verify_integrity() {
            return Err(StoreError::IntegrityViolation(id));
        }

        Ok(log)
    }

    fn list(&self, query: &CommitLogQuery) -> Result<Vec<CommitLog>, StoreError> {
        let mut results = Vec::new();
        collect_logs_recursive(&self.root, query, &mut results)?;
        results.sort_by(|a, b| a.committed_at.cmp(&b.committed_at));
        Ok(results)
    }

    fn remove(&self, id: CommitLogId) -> Result<(), StoreError> {
        let path = self.find_path(id)?;
        fs::remove_file(&path)?;
        tracing::debug!(log_id = %id, "Commit log removed");
        Ok(())
    }
}

/// Recursively find a file by name.
fn find_file_recursive(dir: &Path, filename: &str) -> Option<PathBuf> {
    if !dir.is_dir() {
        return None;
    }

    let entries = fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if let Some(found) = find_file_recursive(&path, filename) {
                return Some(found);
            }
        } else if path.file_name().and_then(|n| n.to_str()) == Some(filename) {
            return Some(path);
        }
    }

    None
}

/// Recursively collect logs matching a query. Logs that fail the integrity
/// check are skipped with a warning rather than failing the listing.
fn collect_logs_recursive(
    dir: &Path,
    query: &CommitLogQuery,
    results: &mut Vec<CommitLog>,
) -> Result<(), StoreError> {
    if !dir.is_dir() {
        return Ok(());
    }

    for entry in fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_logs_recursive(&path, query, results)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
            let json = fs::read_to_string(&path)?;
            let log: CommitLog = serde_json::from_str(&json)?;

            if !log.verify_integrity() {
                tracing::warn!(log_id = %log.id, path = %path.display(), "Commit log failed integrity check, skipped");
                continue;
            }
            if matches_query(&log, query) {
                results.push(log);
            }
        }
    }

    Ok(())
}

fn matches_query(log: &CommitLog, query: &CommitLogQuery) -> bool {
    if let Some(ks) = &query.keyspace {
        if &log.keyspace != ks {
            return false;
        }
    }
    if let Some(from) = &query.from {
        if &log.committed_at < from {
            return false;
        }
    }
    if let Some(to) = &query.to {
        if &log.committed_at > to {
            return false;
        }
    }
    true
}

// ── Memory Store ─────────────────────────────────────────────────

/// In-process store, used by in-memory keyspaces and tests.
#[derive(Debug, Default)]
pub struct MemoryCommitLogStore {
    logs: Mutex<BTreeMap<CommitLogId, CommitLog>>,
}

impl MemoryCommitLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.logs.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CommitLogStore for MemoryCommitLogStore {
    fn save(&self, log: &CommitLog) -> Result<(), StoreError> {
        if log.content_hash.is_none() {
            return Err(StoreError::NotFinalized);
        }
        self.logs
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .insert(log.id, log.clone());
        Ok(())
    }

    fn get(&self, id: CommitLogId) -> Result<CommitLog, StoreError> {
        let logs = self.logs.lock().map_err(|_| StoreError::Poisoned)?;
        let log = logs.get(&id).cloned().ok_or(StoreError::NotFound(id))?;
        if !log.verify_integrity() {
            return Err(StoreError::IntegrityViolation(id));
        }
        Ok(log)
    }

    fn list(&self, query: &CommitLogQuery) -> Result<Vec<CommitLog>, StoreError> {
        let logs = self.logs.lock().map_err(|_| StoreError::Poisoned)?;
        let mut results: Vec<CommitLog> = logs
            .values()
            .filter(|log| matches_query(log, query))
            .cloned()
            .collect();
        results.sort_by(|a, b| a.committed_at.cmp(&b.committed_at));
        Ok(results)
    }

    fn remove(&self, id: CommitLogId) -> Result<(), StoreError> {
        self.logs
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::CommitLogBuilder;

    fn create_test_log(keyspace: &str, key: &str) -> CommitLog {
        let mut builder = CommitLogBuilder::new(keyspace);
        builder.record_casting(key, 11);
        builder.record_casting(key, 12);
        builder.record_resource("resource-key", 20);
        builder.finalize()
    }

    #[test]
    fn save_and_retrieve() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCommitLogStore::new(dir.path()).unwrap();
        let log = create_test_log("genealogy", "casting-a");
        let id = log.id;

        store.save(&log).unwrap();
        let retrieved = store.get(id).unwrap();

        assert_eq!(retrieved, log);
        assert!(dir.path().join("genealogy").is_dir());
    }

    #[test]
    fn integrity_violation_detected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCommitLogStore::new(dir.path()).unwrap();
        let log = create_test_log("genealogy", "casting-a");
        let id = log.id;
        store.save(&log).unwrap();

        // Tamper with the file: drop a candidate id.
        let path = store.find_path(id).unwrap();
        let mut tampered: CommitLog =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        tampered.castings.get_mut("casting-a").unwrap().remove(&12);
        fs::write(&path, serde_json::to_string_pretty(&tampered).unwrap()).unwrap();

        assert!(matches!(
            store.get(id),
            Err(StoreError::IntegrityViolation(_))
        ));
        assert!(store.list(&CommitLogQuery::default()).unwrap().is_empty());
    }

    #[test]
    fn save_rejects_unfinalized() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCommitLogStore::new(dir.path()).unwrap();

        let log = CommitLog {
            id: CommitLogId::new(),
            keyspace: "ks".to_string(),
            castings: BTreeMap::new(),
            resources: BTreeMap::new(),
            committed_at: Utc::now(),
            content_hash: None,
        };

        assert!(matches!(store.save(&log), Err(StoreError::NotFinalized)));
        assert!(matches!(
            MemoryCommitLogStore::new().save(&log),
            Err(StoreError::NotFinalized)
        ));
    }

    #[test]
    fn list_filters_by_keyspace_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCommitLogStore::new(dir.path()).unwrap();

        let l1 = create_test_log("genealogy", "c1");
        let l2 = create_test_log("payroll", "c2");
        let l3 = create_test_log("genealogy", "c3");
        for log in [&l1, &l2, &l3] {
            store.save(log).unwrap();
        }

        let query = CommitLogQuery {
            keyspace: Some("genealogy".to_string()),
            ..Default::default()
        };
        let results = store.list(&query).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|l| l.keyspace == "genealogy"));

        store.remove(l1.id).unwrap();
        assert_eq!(store.list(&query).unwrap().len(), 1);
        assert!(matches!(store.remove(l1.id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryCommitLogStore::new();
        let log = create_test_log("ks", "c1");
        store.save(&log).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(log.id).unwrap(), log);
        store.remove(log.id).unwrap();
        assert!(store.is_empty());
    }
}
