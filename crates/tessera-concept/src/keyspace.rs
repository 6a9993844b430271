//! Keyspaces: one graph store, its meta-schema, and the post-processing
//! queue fed by commits.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tessera_commitlog::store::{CommitLogStore, FileCommitLogStore};
use tessera_commitlog::CommitLog;
use tessera_core::{meta, EdgeLabel, EngineConfig, PropertyKey, Value};
use tessera_graph::GraphStore;

use crate::concept::ConceptId;
use crate::duplicates::FixOutcome;
use crate::error::{ConceptError, Result};
use crate::transaction::{Transaction, TxMode};

/// What a queued key addresses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FixKind {
    Casting,
    Resource,
}

/// A key seen with two or more live candidates at commit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingFix {
    pub key: String,
    pub kind: FixKind,
    pub candidates: BTreeSet<ConceptId>,
}

struct KeyspaceInner {
    config: EngineConfig,
    store: GraphStore,
    queue: Mutex<BTreeMap<String, PendingFix>>,
    commit_logs: RwLock<Option<Arc<dyn CommitLogStore>>>,
}

/// Shared handle to a keyspace. Clone is cheap; every clone sees the same
/// store and queue.
#[derive(Clone)]
pub struct Keyspace {
    inner: Arc<KeyspaceInner>,
}

impl std::fmt::Debug for Keyspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyspace")
            .field("name", &self.inner.config.keyspace)
            .finish_non_exhaustive()
    }
}

impl Keyspace {
    /// Open a keyspace as configured: restore the snapshot when one exists
    /// and persist commit logs when a directory is set.
    pub fn open(config: EngineConfig) -> Result<Self> {
        let store = match config.snapshot_path.as_deref() {
            Some(path) if Path::new(path).exists() => GraphStore::open_snapshot(path)?,
            _ => GraphStore::new(),
        };
        let commit_logs: Option<Arc<dyn CommitLogStore>> = match config.commit_log_dir.as_deref() {
            Some(dir) => Some(Arc::new(FileCommitLogStore::new(dir)?)),
            None => None,
        };
        Self::with_store(config, store, commit_logs)
    }

    pub fn in_memory(name: &str) -> Result<Self> {
        Self::with_store(EngineConfig::in_memory(name), GraphStore::new(), None)
    }

    /// Wrap an existing store, bootstrapping the meta-schema if it is
    /// missing.
    pub fn with_store(
        config: EngineConfig,
        store: GraphStore,
        commit_logs: Option<Arc<dyn CommitLogStore>>,
    ) -> Result<Self> {
        bootstrap(&store)?;
        tracing::info!(
            keyspace = %config.keyspace,
            vertices = store.vertex_count()?,
            commit_logs = commit_logs.is_some(),
            "Keyspace opened"
        );
        Ok(Self {
            inner: Arc::new(KeyspaceInner {
                config,
                store,
                queue: Mutex::new(BTreeMap::new()),
                commit_logs: RwLock::new(commit_logs),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.config.keyspace
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn graph(&self) -> &GraphStore {
        &self.inner.store
    }

    pub fn commit_log_store(&self) -> Result<Option<Arc<dyn CommitLogStore>>> {
        Ok(self
            .inner
            .commit_logs
            .read()
            .map_err(|_| ConceptError::Poisoned)?
            .clone())
    }

    pub fn set_commit_log_store(&self, store: Arc<dyn CommitLogStore>) -> Result<()> {
        *self
            .inner
            .commit_logs
            .write()
            .map_err(|_| ConceptError::Poisoned)? = Some(store);
        Ok(())
    }

    // ── Transactions ─────────────────────────────────────────────

    pub fn transaction(&self, mode: TxMode) -> Transaction {
        Transaction::new(self.clone(), mode, false)
    }

    /// A transaction for duplicate fixes: no validation, no commit log.
    pub fn resolver_transaction(&self) -> Transaction {
        Transaction::new(self.clone(), TxMode::Write, true)
    }

    // ── Post-processing ──────────────────────────────────────────

    /// Queue the keys of a committed log that now have two or more live
    /// candidates, then persist the log when a store is configured. Keys
    /// are queued first, so a failed save leaves them queued.
    pub(crate) fn submit(&self, log: CommitLog) -> Result<()> {
        let mut enqueued = 0;
        {
            let mut queue = self.inner.queue.lock().map_err(|_| ConceptError::Poisoned)?;
            let sections = [(FixKind::Casting, &log.castings), (FixKind::Resource, &log.resources)];
            for (kind, section) in sections {
                for (key, ids) in section {
                    let hits = self
                        .inner
                        .store
                        .lookup(PropertyKey::Index, &Value::from(key.as_str()))?;
                    if hits.len() < 2 {
                        continue;
                    }
                    let entry = queue.entry(key.clone()).or_insert_with(|| PendingFix {
                        key: key.clone(),
                        kind,
                        candidates: BTreeSet::new(),
                    });
                    entry.candidates.extend(hits.into_iter().map(ConceptId::from));
                    entry.candidates.extend(ids.iter().copied().map(ConceptId));
                    enqueued += 1;
                }
            }
        }

        if let Some(store) = self.commit_log_store()? {
            store.save(&log)?;
        }

        tracing::info!(
            keyspace = %self.name(),
            log_id = %log.id,
            castings = log.castings.len(),
            resources = log.resources.len(),
            enqueued,
            "Commit logged"
        );
        Ok(())
    }

    /// Queue a fix, merging its candidates into any entry already queued
    /// under the same key.
    pub fn enqueue(&self, fix: PendingFix) -> Result<()> {
        let mut queue = self.inner.queue.lock().map_err(|_| ConceptError::Poisoned)?;
        match queue.get_mut(&fix.key) {
            Some(entry) => entry.candidates.extend(fix.candidates),
            None => {
                queue.insert(fix.key.clone(), fix);
            }
        }
        Ok(())
    }

    /// Keys currently queued for post-processing.
    pub fn pending_post_processing(&self) -> Result<Vec<PendingFix>> {
        let queue = self.inner.queue.lock().map_err(|_| ConceptError::Poisoned)?;
        Ok(queue.values().cloned().collect())
    }

    /// Take every queued key, leaving the queue empty.
    pub fn drain_post_processing(&self) -> Result<Vec<PendingFix>> {
        let mut queue = self.inner.queue.lock().map_err(|_| ConceptError::Poisoned)?;
        Ok(std::mem::take(&mut *queue).into_values().collect())
    }

    /// Run one fix in its own resolver transaction and commit it.
    pub fn resolve(&self, fix: &PendingFix) -> Result<FixOutcome> {
        let mut tx = self.resolver_transaction();
        let outcome = match fix.kind {
            FixKind::Casting => tx.fix_duplicate_castings(&fix.key, &fix.candidates),
            FixKind::Resource => tx.fix_duplicate_resources(&fix.key, &fix.candidates),
        };
        match outcome {
            Ok(outcome) => {
                tx.commit()?;
                Ok(outcome)
            }
            Err(e) => {
                tx.close();
                Err(e)
            }
        }
    }

    /// Save the committed state to the configured snapshot path. A no-op
    /// when none is configured.
    pub fn save_snapshot(&self) -> Result<()> {
        if let Some(path) = self.inner.config.snapshot_path.as_deref() {
            self.inner.store.save_snapshot(path)?;
        }
        Ok(())
    }
}

/// Create the meta types in one committed substrate transaction unless they
/// already exist.
fn bootstrap(store: &GraphStore) -> Result<()> {
    if !store
        .lookup(PropertyKey::TypeLabel, &Value::from(meta::ENTITY))?
        .is_empty()
    {
        return Ok(());
    }

    let mut graph = store.begin();
    let mut ids = BTreeMap::new();
    for (label, kind) in meta::ALL {
        let v = graph.add_vertex(kind);
        graph.set_property(v, PropertyKey::TypeLabel, Value::from(label))?;
        ids.insert(label, v);
    }
    if let Some(&rule) = ids.get(meta::RULE) {
        for child in [meta::INFERENCE_RULE, meta::CONSTRAINT_RULE] {
            if let Some(&v) = ids.get(child) {
                graph.add_edge(EdgeLabel::Sub, v, rule)?;
            }
        }
    }
    graph.commit()?;
    tracing::info!(meta_types = ids.len(), "Meta schema bootstrapped");
    Ok(())
}
