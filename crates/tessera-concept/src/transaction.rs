//! Transactions: lifecycle, read-through lookups, and the commit pipeline.
//!
//! A transaction owns a substrate overlay and a [`TxCache`]. Mutations are
//! recorded in both; `commit` validates the cache's modified set, persists
//! the overlay if the validator is satisfied, clears the cache, and hands the
//! keys it wrote to the keyspace for post-processing.

use std::collections::BTreeMap;

use tessera_commitlog::session::CommitLogBuilder;
use tessera_commitlog::CommitLog;
use tessera_core::{meta, BaseType, PropertyKey, Value};
use tessera_graph::GraphTxn;
use uuid::Uuid;

use crate::cache::TxCache;
use crate::concept::{Concept, ConceptHandle, ConceptId};
use crate::error::{ConceptError, Result};
use crate::keys;
use crate::keyspace::Keyspace;
use crate::reader::ConceptReader;
use crate::validation::{self, ValidationContext, ValidationReport, Violation};

/// How a transaction treats schema mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    /// Schema and data may both change.
    Write,
    /// Schema mutations fail immediately; data writes proceed as usual.
    SchemaLocked,
}

pub struct Transaction {
    id: Uuid,
    keyspace: Keyspace,
    pub(crate) graph: GraphTxn,
    pub(crate) cache: TxCache,
    mode: TxMode,
    /// Post-processing commits skip validation and commit logs.
    resolver: bool,
    open: bool,
}

impl Transaction {
    pub(crate) fn new(keyspace: Keyspace, mode: TxMode, resolver: bool) -> Self {
        let graph = keyspace.graph().begin();
        let tx = Self {
            id: Uuid::new_v4(),
            keyspace,
            graph,
            cache: TxCache::new(),
            mode,
            resolver,
            open: true,
        };
        tracing::debug!(tx = %tx.id, mode = ?mode, resolver, "Transaction opened");
        tx
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> TxMode {
        self.mode
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    pub fn cache(&self) -> &TxCache {
        &self.cache
    }

    pub fn reader(&self) -> ConceptReader<'_> {
        ConceptReader::new(&self.graph)
    }

    // ── Guards ───────────────────────────────────────────────────

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(ConceptError::TransactionClosed)
        }
    }

    pub(crate) fn ensure_schema_mutable(&self) -> Result<()> {
        self.ensure_open()?;
        match self.mode {
            TxMode::Write => Ok(()),
            TxMode::SchemaLocked => Err(ConceptError::SchemaLocked),
        }
    }

    /// Check that a handle still names a live concept of its kind.
    pub(crate) fn require<T: ConceptHandle>(&self, handle: T) -> Result<T> {
        match self.reader().concept(handle.id())? {
            Some(c) if c.base_type == T::BASE => Ok(handle),
            Some(c) => Err(ConceptError::WrongKind {
                id: handle.id(),
                expected: T::BASE,
                actual: c.base_type,
            }),
            None => Err(ConceptError::ConceptNotFound(handle.id())),
        }
    }

    pub(crate) fn ensure_not_meta(&self, id: ConceptId) -> Result<()> {
        match self.reader().label(id)? {
            Some(label) if meta::is_meta_label(&label) => {
                Err(ConceptError::MetaTypeImmutable { label })
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn label_of(&self, id: ConceptId) -> Result<String> {
        self.reader().describe(id)
    }

    // ── Lookups ──────────────────────────────────────────────────

    /// Fetch any concept by id.
    pub fn get_concept(&mut self, id: ConceptId) -> Result<Option<Concept>> {
        self.ensure_open()?;
        if let Some(cached) = self.cache.get_cached_concept(id) {
            return Ok(Some(cached));
        }
        let found = self.reader().concept(id)?;
        if let Some(concept) = found {
            self.cache.cache_concept(concept);
        }
        Ok(found)
    }

    /// Fetch a type by label.
    pub fn get_type(&mut self, label: &str) -> Result<Option<Concept>> {
        self.ensure_open()?;
        let cache_types = self.keyspace.config().cache_types;
        if cache_types {
            if let Some(cached) = self.cache.get_cached_type(label) {
                return Ok(Some(cached));
            }
        }
        let found = self.reader().type_by_label(label)?;
        if let (Some(concept), true) = (found, cache_types) {
            self.cache.cache_type(label, concept);
        }
        Ok(found)
    }

    /// Every live concept of one kind, ordered by id.
    pub fn concepts_of_kind(&self, kind: BaseType) -> Result<Vec<Concept>> {
        self.ensure_open()?;
        let ids = self.graph.vertices_of_kind(kind)?;
        Ok(ids.into_iter().map(|v| Concept::new(v.into(), kind)).collect())
    }

    pub(crate) fn meta_type(&mut self, label: &str) -> Result<ConceptId> {
        self.get_type(label)?
            .map(|c| c.id)
            .ok_or_else(|| ConceptError::MissingMetaType(label.to_string()))
    }

    // ── Validation ───────────────────────────────────────────────

    /// Run every structural rule over the modified set without committing.
    pub fn validate(&self) -> Result<Vec<Violation>> {
        self.ensure_open()?;
        let ctx = ValidationContext::new(self.reader(), &self.cache);
        validation::validate(&ctx)
    }

    // ── Commit / Rollback ────────────────────────────────────────

    /// Validate, persist, clear the cache, and submit the written keys for
    /// post-processing. On any failure before the substrate commit nothing
    /// is persisted, the cache is cleared and the transaction is closed.
    /// Once the substrate commit succeeds, `commit` returns `Ok`: a commit
    /// log that cannot be saved is logged and its keys stay queued in
    /// process.
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;

        let log = match self.stage() {
            Ok(log) => log,
            Err(e) => {
                self.abort();
                return Err(e);
            }
        };

        let stats = match self.graph.commit() {
            Ok(stats) => stats,
            Err(e) => {
                self.abort();
                return Err(e.into());
            }
        };

        self.cache.clear();
        self.open = false;

        tracing::debug!(
            tx = %self.id,
            vertices_written = stats.vertices_written,
            vertices_deleted = stats.vertices_deleted,
            "Transaction committed"
        );

        if let Some(log) = log {
            let log_id = log.id;
            if let Err(e) = self.keyspace.submit(log) {
                tracing::warn!(
                    tx = %self.id,
                    log_id = %log_id,
                    error = %e,
                    "Commit persisted but its commit log was not written"
                );
            }
        }
        Ok(())
    }

    /// Everything that runs before the substrate commit: validation, then
    /// key stamping and counter flushes.
    fn stage(&mut self) -> Result<Option<CommitLog>> {
        if !self.resolver && self.keyspace.config().validate_on_commit {
            let violations = self.validate()?;
            if !violations.is_empty() {
                let report = ValidationReport::new(violations);
                tracing::info!(
                    tx = %self.id,
                    violations = report.violations.len(),
                    "Commit rejected by validation"
                );
                return Err(ConceptError::Validation(report));
            }
        }
        self.prepare_commit()
    }

    /// Discard every pending write.
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        tracing::debug!(tx = %self.id, "Transaction rolled back");
        self.abort();
        Ok(())
    }

    /// Close the transaction, discarding pending writes. Closing twice is a
    /// no-op.
    pub fn close(&mut self) {
        if self.open {
            self.abort();
        }
    }

    fn abort(&mut self) {
        self.graph.rollback();
        self.cache.clear();
        self.open = false;
    }

    /// Stamp relation keys, flush instance counts, and collect the commit
    /// log. Runs after validation, before the substrate commit.
    fn prepare_commit(&mut self) -> Result<Option<CommitLog>> {
        self.stamp_relation_keys()?;

        let deltas: BTreeMap<ConceptId, i64> = self.cache.instance_count_deltas().clone();
        for (type_id, delta) in deltas {
            self.graph.adjust_counter(&counter_name(type_id), delta);
        }

        if self.resolver {
            return Ok(None);
        }

        let mut builder = CommitLogBuilder::new(self.keyspace.name());
        let reader = self.reader();
        for casting in self.cache.modified_castings() {
            if let Some(key) = reader.index(*casting)? {
                builder.record_casting(&key, casting.0);
            }
        }
        for resource in self.cache.modified_resources() {
            if let Some(key) = reader.index(*resource)? {
                builder.record_resource(&key, resource.0);
            }
        }
        Ok((!builder.is_empty()).then(|| builder.finalize()))
    }

    /// Recompute the content key of every modified relation that still
    /// exists. Relations without role players carry no key.
    pub(crate) fn stamp_relation_keys(&mut self) -> Result<()> {
        let relations: Vec<ConceptId> = self.cache.modified_relations().keys().copied().collect();
        for relation in relations {
            if !self.reader().is_kind(relation, BaseType::Relation)? {
                continue;
            }
            match self.relation_key(relation)? {
                Some(key) => {
                    self.graph
                        .set_property(relation.vertex(), PropertyKey::Index, Value::from(key))?;
                }
                None => {
                    self.graph
                        .remove_property(relation.vertex(), PropertyKey::Index)?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn relation_key(&self, relation: ConceptId) -> Result<Option<String>> {
        let reader = self.reader();
        let Some(relation_type) = reader.type_of(relation)? else {
            return Ok(None);
        };
        let pairs = reader.role_players(relation)?;
        if pairs.is_empty() {
            return Ok(None);
        }
        Ok(Some(keys::relation_key(relation_type, &pairs)))
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.open && self.graph.is_dirty() {
            tracing::debug!(tx = %self.id, "Open transaction dropped, pending writes discarded");
        }
    }
}

/// Name of the substrate counter holding a type's instance count.
pub(crate) fn counter_name(type_id: ConceptId) -> String {
    format!("instances:{}", type_id.0)
}
