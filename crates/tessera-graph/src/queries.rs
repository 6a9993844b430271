//! Read operations.
//!
//! Transaction reads merge committed state with the transaction's overlay.
//! Store reads see committed state only.

use std::collections::{BTreeMap, BTreeSet};

use tessera_core::{BaseType, EdgeLabel, PropertyKey, Value};

use crate::client::{Direction, EdgeId, EdgeRecord, GraphStore, GraphTxn, VertexId, VertexRecord};
use crate::Result;

impl GraphTxn {
    // ── Vertices ─────────────────────────────────────────────────

    pub fn vertex(&self, id: VertexId) -> Result<Option<VertexRecord>> {
        if let Some(entry) = self.vertices.get(&id) {
            return Ok(entry.clone());
        }
        Ok(self.store.read()?.vertices.get(&id).cloned())
    }

    pub fn contains_vertex(&self, id: VertexId) -> Result<bool> {
        if let Some(entry) = self.vertices.get(&id) {
            return Ok(entry.is_some());
        }
        Ok(self.store.read()?.vertices.contains_key(&id))
    }

    pub fn kind(&self, id: VertexId) -> Result<Option<BaseType>> {
        Ok(self.vertex(id)?.map(|v| v.kind))
    }

    pub fn property(&self, id: VertexId, key: PropertyKey) -> Result<Option<Value>> {
        if let Some(entry) = self.vertices.get(&id) {
            return Ok(entry.as_ref().and_then(|v| v.properties.get(&key).cloned()));
        }
        let state = self.store.read()?;
        Ok(state
            .vertices
            .get(&id)
            .and_then(|v| v.properties.get(&key).cloned()))
    }

    /// Vertices whose property `key` equals `value`. May return any number
    /// of matches: the index enforces no uniqueness.
    pub fn lookup(&self, key: PropertyKey, value: &Value) -> Result<Vec<VertexId>> {
        let mut hits = BTreeSet::new();
        {
            let state = self.store.read()?;
            if let Some(ids) = state.index.get(&(key, value.clone())) {
                hits.extend(ids.iter().filter(|id| !self.vertices.contains_key(*id)));
            }
        }
        for (id, entry) in &self.vertices {
            if let Some(record) = entry {
                if record.properties.get(&key) == Some(value) {
                    hits.insert(*id);
                }
            }
        }
        Ok(hits.into_iter().collect())
    }

    /// Every visible vertex of the given kind, ordered by id.
    pub fn vertices_of_kind(&self, kind: BaseType) -> Result<Vec<VertexId>> {
        let mut ids = BTreeSet::new();
        {
            let state = self.store.read()?;
            ids.extend(
                state
                    .vertices
                    .values()
                    .filter(|v| v.kind == kind && !self.vertices.contains_key(&v.id))
                    .map(|v| v.id),
            );
        }
        ids.extend(
            self.vertices
                .values()
                .flatten()
                .filter(|v| v.kind == kind)
                .map(|v| v.id),
        );
        Ok(ids.into_iter().collect())
    }

    // ── Edges ────────────────────────────────────────────────────

    pub fn edge(&self, id: EdgeId) -> Result<Option<EdgeRecord>> {
        if let Some(entry) = self.edges.get(&id) {
            return Ok(entry.clone());
        }
        Ok(self.store.read()?.edges.get(&id).cloned())
    }

    /// Edges incident to `vertex`, optionally restricted to one label,
    /// ordered by edge id.
    pub fn edges(
        &self,
        vertex: VertexId,
        direction: Direction,
        label: Option<EdgeLabel>,
    ) -> Result<Vec<EdgeRecord>> {
        let wanted = |e: &EdgeRecord| label.map_or(true, |l| e.label == l);
        let mut found: BTreeMap<EdgeId, EdgeRecord> = BTreeMap::new();

        {
            let state = self.store.read()?;
            let mut committed: Vec<&EdgeId> = Vec::new();
            if matches!(direction, Direction::Out | Direction::Both) {
                committed.extend(state.out_edges.get(&vertex).into_iter().flatten());
            }
            if matches!(direction, Direction::In | Direction::Both) {
                committed.extend(state.in_edges.get(&vertex).into_iter().flatten());
            }
            for id in committed {
                if self.edges.contains_key(id) {
                    continue;
                }
                if let Some(edge) = state.edges.get(id) {
                    if wanted(edge) && !self.is_deleted(edge.source) && !self.is_deleted(edge.target)
                    {
                        found.insert(edge.id, edge.clone());
                    }
                }
            }
        }

        for edge in self.edges.values().flatten() {
            if direction.matches(edge, vertex) && wanted(edge) {
                found.insert(edge.id, edge.clone());
            }
        }

        Ok(found.into_values().collect())
    }

    /// The vertices at the far end of the matching edges, in edge order.
    pub fn neighbours(
        &self,
        vertex: VertexId,
        direction: Direction,
        label: EdgeLabel,
    ) -> Result<Vec<VertexId>> {
        Ok(self
            .edges(vertex, direction, Some(label))?
            .iter()
            .map(|e| e.other(vertex))
            .collect())
    }

    /// Edges with `label` running from `source` to `target`.
    pub fn edges_between(
        &self,
        source: VertexId,
        target: VertexId,
        label: EdgeLabel,
    ) -> Result<Vec<EdgeRecord>> {
        Ok(self
            .edges(source, Direction::Out, Some(label))?
            .into_iter()
            .filter(|e| e.target == target)
            .collect())
    }

    // ── Counters ─────────────────────────────────────────────────

    /// Committed value of a counter plus this transaction's pending delta.
    pub fn counter(&self, name: &str) -> Result<i64> {
        let committed = self.store.counter(name)?;
        Ok(committed + self.counters.get(name).copied().unwrap_or(0))
    }
}

impl GraphStore {
    pub fn vertex_count(&self) -> Result<usize> {
        Ok(self.read()?.vertices.len())
    }

    pub fn edge_count(&self) -> Result<usize> {
        Ok(self.read()?.edges.len())
    }

    pub fn counter(&self, name: &str) -> Result<i64> {
        Ok(self.read()?.counters.get(name).copied().unwrap_or(0))
    }

    /// Committed vertices whose property `key` equals `value`.
    pub fn lookup(&self, key: PropertyKey, value: &Value) -> Result<Vec<VertexId>> {
        let state = self.read()?;
        Ok(state
            .index
            .get(&(key, value.clone()))
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default())
    }

    pub fn contains_vertex(&self, id: VertexId) -> Result<bool> {
        Ok(self.read()?.vertices.contains_key(&id))
    }
}
