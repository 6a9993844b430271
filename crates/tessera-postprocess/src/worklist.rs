//! Work list assembly.
//!
//! Keys reach the post-processor from two places: the keyspace's in-process
//! queue and commit logs persisted by writers. Both are merged here into one
//! entry per key. Each commit log remembers which keys it contributed so it
//! can be removed once all of them have been swept.

use std::collections::{BTreeMap, BTreeSet};

use tessera_commitlog::{CommitLog, CommitLogId};
use tessera_concept::{ConceptId, FixKind, PendingFix};

#[derive(Debug, Default)]
pub struct WorkList {
    entries: BTreeMap<String, PendingFix>,
    sources: BTreeMap<CommitLogId, BTreeSet<String>>,
}

impl WorkList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge every casting and resource key a commit log recorded.
    pub fn add_log(&mut self, log: &CommitLog) {
        let mut keys = BTreeSet::new();
        let sections = [(FixKind::Casting, &log.castings), (FixKind::Resource, &log.resources)];
        for (kind, section) in sections {
            for (key, ids) in section {
                self.merge(key, kind, ids.iter().copied().map(ConceptId));
                keys.insert(key.clone());
            }
        }
        self.sources.insert(log.id, keys);
    }

    pub fn add_fix(&mut self, fix: PendingFix) {
        let PendingFix {
            key,
            kind,
            candidates,
        } = fix;
        self.merge(&key, kind, candidates);
    }

    fn merge(&mut self, key: &str, kind: FixKind, ids: impl IntoIterator<Item = ConceptId>) {
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| PendingFix {
                key: key.to_string(),
                kind,
                candidates: BTreeSet::new(),
            });
        entry.candidates.extend(ids);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn log_count(&self) -> usize {
        self.sources.len()
    }

    /// Take up to `limit` entries in key order. Casting keys sort before
    /// resource keys, so casting fixes run first.
    pub fn take(&mut self, limit: usize) -> Vec<PendingFix> {
        let keys: Vec<String> = self.entries.keys().take(limit).cloned().collect();
        keys.iter()
            .filter_map(|key| self.entries.remove(key))
            .collect()
    }

    /// Entries not yet taken.
    pub fn remaining(&self) -> impl Iterator<Item = &PendingFix> {
        self.entries.values()
    }

    /// Logs whose every key is in `done`.
    pub fn completed_logs(&self, done: &BTreeSet<String>) -> Vec<CommitLogId> {
        self.sources
            .iter()
            .filter(|(_, keys)| keys.is_subset(done))
            .map(|(id, _)| *id)
            .collect()
    }
}
