//! Builder that collects a commit's keys before the commit log is sealed.
//!
//! ```no_run
//! # use tessera_commitlog::session::CommitLogBuilder;
//! let mut builder = CommitLogBuilder::new("genealogy");
//! builder.record_casting("casting-3f2a", 42);
//! builder.record_resource("resource-91bc", 57);
//! let log = builder.finalize();
//! assert!(log.content_hash.is_some());
//! ```

use std::collections::BTreeMap;

use chrono::Utc;

use crate::{CommitLog, CommitLogId};

/// Accumulates keys written by one commit.
#[derive(Debug)]
pub struct CommitLogBuilder {
    log: CommitLog,
}

impl CommitLogBuilder {
    pub fn new(keyspace: &str) -> Self {
        Self {
            log: CommitLog {
                id: CommitLogId::new(),
                keyspace: keyspace.to_string(),
                castings: BTreeMap::new(),
                resources: BTreeMap::new(),
                committed_at: Utc::now(),
                content_hash: None,
            },
        }
    }

    pub fn record_casting(&mut self, key: &str, id: u64) {
        self.log
            .castings
            .entry(key.to_string())
            .or_default()
            .insert(id);
    }

    pub fn record_resource(&mut self, key: &str, id: u64) {
        self.log
            .resources
            .entry(key.to_string())
            .or_default()
            .insert(id);
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// The log ID (available before finalization).
    pub fn id(&self) -> CommitLogId {
        self.log.id
    }

    /// Stamp the commit time and compute the content hash.
    pub fn finalize(mut self) -> CommitLog {
        self.log.committed_at = Utc::now();
        let hash = self.log.compute_hash();
        self.log.content_hash = Some(hash);
        self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_seals_log() {
        let mut builder = CommitLogBuilder::new("ks");
        builder.record_casting("c1", 4);
        builder.record_casting("c1", 9);
        builder.record_resource("r1", 5);
        let id = builder.id();

        let log = builder.finalize();
        assert_eq!(log.id, id);
        assert_eq!(log.castings["c1"].len(), 2);
        assert_eq!(log.key_count(), 2);
        assert!(log.verify_integrity());
    }

    #[test]
    fn edited_log_fails_integrity() {
        let mut builder = CommitLogBuilder::new("ks");
        builder.record_resource("r1", 5);
        let mut log = builder.finalize();
        log.resources.get_mut("r1").unwrap().insert(6);
        assert!(!log.verify_integrity());
    }

    #[test]
    fn empty_builder() {
        let builder = CommitLogBuilder::new("ks");
        assert!(builder.is_empty());
        assert!(builder.finalize().is_empty());
    }
}
