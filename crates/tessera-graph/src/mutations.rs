//! Write operations and commit.
//!
//! Every write lands in the transaction overlay. Commit applies the overlay
//! to the committed state under the store's write lock, record by record,
//! last writer wins.

use std::collections::BTreeMap;

use tessera_core::{BaseType, EdgeLabel, PropertyKey, Value};

use crate::client::{Direction, EdgeId, EdgeRecord, GraphError, GraphTxn, VertexId, VertexRecord};
use crate::Result;

/// What a commit applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitStats {
    pub vertices_written: usize,
    pub vertices_deleted: usize,
    pub edges_written: usize,
    pub edges_deleted: usize,
    /// Writes skipped because a concurrent commit removed their target.
    pub dropped: usize,
}

impl GraphTxn {
    // ── Vertices ─────────────────────────────────────────────────

    pub fn add_vertex(&mut self, kind: BaseType) -> VertexId {
        let id = VertexId(self.store.allocate_id());
        self.vertices.insert(
            id,
            Some(VertexRecord {
                id,
                kind,
                properties: BTreeMap::new(),
            }),
        );
        self.created.insert(id);
        id
    }

    pub fn set_property(&mut self, id: VertexId, key: PropertyKey, value: Value) -> Result<()> {
        self.staged_vertex(id)?.properties.insert(key, value);
        Ok(())
    }

    pub fn remove_property(&mut self, id: VertexId, key: PropertyKey) -> Result<Option<Value>> {
        Ok(self.staged_vertex(id)?.properties.remove(&key))
    }

    /// Delete a vertex together with every edge attached to it.
    pub fn delete_vertex(&mut self, id: VertexId) -> Result<()> {
        if !self.contains_vertex(id)? {
            return Err(GraphError::VertexNotFound(id));
        }
        for edge in self.edges(id, Direction::Both, None)? {
            self.edges.insert(edge.id, None);
        }
        self.vertices.insert(id, None);
        Ok(())
    }

    /// Copy a vertex into the overlay (if it is not there yet) and return it
    /// for modification.
    fn staged_vertex(&mut self, id: VertexId) -> Result<&mut VertexRecord> {
        if !self.vertices.contains_key(&id) {
            let committed = self.store.read()?.vertices.get(&id).cloned();
            match committed {
                Some(record) => {
                    self.vertices.insert(id, Some(record));
                }
                None => return Err(GraphError::VertexNotFound(id)),
            }
        }
        self.vertices
            .get_mut(&id)
            .and_then(Option::as_mut)
            .ok_or(GraphError::VertexNotFound(id))
    }

    // ── Edges ────────────────────────────────────────────────────

    pub fn add_edge(
        &mut self,
        label: EdgeLabel,
        source: VertexId,
        target: VertexId,
    ) -> Result<EdgeId> {
        for endpoint in [source, target] {
            if !self.contains_vertex(endpoint)? {
                return Err(GraphError::VertexNotFound(endpoint));
            }
        }
        let id = EdgeId(self.store.allocate_id());
        self.edges.insert(
            id,
            Some(EdgeRecord {
                id,
                label,
                source,
                target,
                properties: BTreeMap::new(),
            }),
        );
        Ok(id)
    }

    pub fn set_edge_property(&mut self, id: EdgeId, key: PropertyKey, value: Value) -> Result<()> {
        if !self.edges.contains_key(&id) {
            let committed = self.store.read()?.edges.get(&id).cloned();
            self.edges
                .insert(id, Some(committed.ok_or(GraphError::EdgeNotFound(id))?));
        }
        match self.edges.get_mut(&id).and_then(Option::as_mut) {
            Some(edge) => {
                edge.properties.insert(key, value);
                Ok(())
            }
            None => Err(GraphError::EdgeNotFound(id)),
        }
    }

    pub fn delete_edge(&mut self, id: EdgeId) -> Result<()> {
        if self.edge(id)?.is_none() {
            return Err(GraphError::EdgeNotFound(id));
        }
        self.edges.insert(id, None);
        Ok(())
    }

    // ── Counters ─────────────────────────────────────────────────

    /// Stage a delta for a shared counter. Deltas are added to the committed
    /// value at commit, never written over it.
    pub fn adjust_counter(&mut self, name: &str, delta: i64) {
        if delta == 0 {
            return;
        }
        *self.counters.entry(name.to_string()).or_insert(0) += delta;
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Discard everything staged.
    pub fn rollback(&mut self) {
        self.vertices.clear();
        self.edges.clear();
        self.created.clear();
        self.counters.clear();
    }

    /// Apply the overlay to the committed state and reset the overlay.
    ///
    /// Updates to vertices that a concurrent commit deleted are dropped, as
    /// are edges whose endpoints no longer exist.
    pub fn commit(&mut self) -> Result<CommitStats> {
        let vertices = std::mem::take(&mut self.vertices);
        let edges = std::mem::take(&mut self.edges);
        let created = std::mem::take(&mut self.created);
        let counters = std::mem::take(&mut self.counters);

        let mut stats = CommitStats::default();
        let mut state = self.store.write()?;

        let mut deletions = Vec::new();
        for (id, entry) in vertices {
            match entry {
                Some(record) => {
                    if !created.contains(&id) && !state.vertices.contains_key(&id) {
                        tracing::warn!(vertex = %id, "Vertex deleted by a concurrent commit, update dropped");
                        stats.dropped += 1;
                        continue;
                    }
                    state.put_vertex(record);
                    stats.vertices_written += 1;
                }
                None => deletions.push(id),
            }
        }

        for (id, entry) in edges {
            match entry {
                Some(edge) => {
                    if state.vertices.contains_key(&edge.source)
                        && state.vertices.contains_key(&edge.target)
                    {
                        state.put_edge(edge);
                        stats.edges_written += 1;
                    } else {
                        tracing::warn!(edge = %id, label = %edge.label, "Edge endpoint missing at commit, edge dropped");
                        stats.dropped += 1;
                    }
                }
                None => {
                    if state.remove_edge(id) {
                        stats.edges_deleted += 1;
                    }
                }
            }
        }

        for id in deletions {
            if state.vertices.contains_key(&id) {
                stats.edges_deleted += state.remove_vertex(id);
                stats.vertices_deleted += 1;
            }
        }

        for (name, delta) in counters {
            *state.counters.entry(name).or_insert(0) += delta;
        }

        tracing::debug!(
            vertices_written = stats.vertices_written,
            vertices_deleted = stats.vertices_deleted,
            edges_written = stats.edges_written,
            edges_deleted = stats.edges_deleted,
            dropped = stats.dropped,
            "Graph transaction committed"
        );

        Ok(stats)
    }
}
