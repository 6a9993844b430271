//! BLAKE3 content hashing for tamper evidence.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{CommitLog, CommitLogId};

/// Hashable view of a commit log (excludes content_hash).
#[derive(Serialize)]
struct HashableLog<'a> {
    id: &'a CommitLogId,
    keyspace: &'a str,
    castings: &'a BTreeMap<String, BTreeSet<u64>>,
    resources: &'a BTreeMap<String, BTreeSet<u64>>,
    committed_at: &'a DateTime<Utc>,
}

/// Serialize every field except `content_hash` to JSON and hash the bytes.
/// Returns the hex-encoded hash. BTree maps keep the encoding canonical.
pub fn compute_log_hash(log: &CommitLog) -> String {
    let hashable = HashableLog {
        id: &log.id,
        keyspace: &log.keyspace,
        castings: &log.castings,
        resources: &log.resources,
        committed_at: &log.committed_at,
    };

    let mut hasher = blake3::Hasher::new();
    // Maps with string keys and integer sets cannot fail to serialize.
    if let Ok(json) = serde_json::to_vec(&hashable) {
        hasher.update(&json);
    }
    hasher.finalize().to_hex().to_string()
}
