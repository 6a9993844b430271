//! Tessera Commit Log — per-commit record of content-addressed keys.
//!
//! Every successful commit that created or touched castings or resources
//! produces a commit log listing, per content-addressed key, the vertex ids
//! carrying that key. Post-processing merges these logs into a work list of
//! keys that may hold duplicates. Each log is content-hashed with BLAKE3 so a
//! modified log file is rejected on load.

pub mod hash;
pub mod session;
pub mod store;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Core Types ───────────────────────────────────────────────────

/// Unique identifier for a commit log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitLogId(pub Uuid);

impl CommitLogId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CommitLogId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CommitLogId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The keys one commit wrote, grouped by what they address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommitLog {
    pub id: CommitLogId,
    /// Keyspace the commit ran against.
    pub keyspace: String,
    /// Casting key -> casting vertex ids written under it.
    pub castings: BTreeMap<String, BTreeSet<u64>>,
    /// Resource key -> resource vertex ids written under it.
    pub resources: BTreeMap<String, BTreeSet<u64>>,
    pub committed_at: DateTime<Utc>,
    /// BLAKE3 content hash (hex), set on finalization.
    pub content_hash: Option<String>,
}

impl CommitLog {
    /// Compute the BLAKE3 hash of the log's content.
    /// The hash covers all fields except `content_hash` itself.
    pub fn compute_hash(&self) -> String {
        hash::compute_log_hash(self)
    }

    /// Verify that the stored content_hash matches a freshly computed hash.
    pub fn verify_integrity(&self) -> bool {
        match &self.content_hash {
            Some(stored) => stored == &self.compute_hash(),
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.castings.is_empty() && self.resources.is_empty()
    }

    pub fn key_count(&self) -> usize {
        self.castings.len() + self.resources.len()
    }
}
