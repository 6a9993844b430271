//! Graph store, transaction overlay, and snapshot persistence.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tessera_core::{BaseType, EdgeLabel, PropertyKey, Value};

use crate::Result;

/// Errors from graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Vertex not found: {0}")]
    VertexNotFound(VertexId),

    #[error("Edge not found: {0}")]
    EdgeNotFound(EdgeId),

    #[error("Graph state lock poisoned")]
    Poisoned,

    #[error("Snapshot IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ── Records ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(pub u64);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub u64);

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VertexRecord {
    pub id: VertexId,
    pub kind: BaseType,
    pub properties: BTreeMap<PropertyKey, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdgeRecord {
    pub id: EdgeId,
    pub label: EdgeLabel,
    pub source: VertexId,
    pub target: VertexId,
    pub properties: BTreeMap<PropertyKey, Value>,
}

impl EdgeRecord {
    /// The endpoint opposite `vertex`.
    pub fn other(&self, vertex: VertexId) -> VertexId {
        if self.source == vertex {
            self.target
        } else {
            self.source
        }
    }

    pub fn property(&self, key: PropertyKey) -> Option<&Value> {
        self.properties.get(&key)
    }
}

/// Which incident edges of a vertex to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
    Both,
}

impl Direction {
    pub(crate) fn matches(&self, edge: &EdgeRecord, vertex: VertexId) -> bool {
        match self {
            Self::Out => edge.source == vertex,
            Self::In => edge.target == vertex,
            Self::Both => edge.source == vertex || edge.target == vertex,
        }
    }
}

// ── Committed State ──────────────────────────────────────────────

/// Committed graph contents plus the adjacency lists and property index
/// derived from them.
#[derive(Debug, Default)]
pub(crate) struct GraphState {
    pub(crate) vertices: HashMap<VertexId, VertexRecord>,
    pub(crate) edges: HashMap<EdgeId, EdgeRecord>,
    pub(crate) out_edges: HashMap<VertexId, BTreeSet<EdgeId>>,
    pub(crate) in_edges: HashMap<VertexId, BTreeSet<EdgeId>>,
    pub(crate) index: HashMap<(PropertyKey, Value), BTreeSet<VertexId>>,
    pub(crate) counters: BTreeMap<String, i64>,
}

impl GraphState {
    pub(crate) fn put_vertex(&mut self, record: VertexRecord) {
        self.unindex(record.id);
        for (key, value) in &record.properties {
            self.index
                .entry((*key, value.clone()))
                .or_default()
                .insert(record.id);
        }
        self.vertices.insert(record.id, record);
    }

    /// Remove a vertex and every committed edge attached to it.
    pub(crate) fn remove_vertex(&mut self, id: VertexId) -> usize {
        self.unindex(id);
        self.vertices.remove(&id);

        let mut incident: BTreeSet<EdgeId> = self.out_edges.remove(&id).unwrap_or_default();
        incident.extend(self.in_edges.remove(&id).unwrap_or_default());
        let detached = incident.len();
        for edge in incident {
            self.remove_edge(edge);
        }
        detached
    }

    pub(crate) fn put_edge(&mut self, record: EdgeRecord) {
        self.out_edges
            .entry(record.source)
            .or_default()
            .insert(record.id);
        self.in_edges
            .entry(record.target)
            .or_default()
            .insert(record.id);
        self.edges.insert(record.id, record);
    }

    pub(crate) fn remove_edge(&mut self, id: EdgeId) -> bool {
        let Some(record) = self.edges.remove(&id) else {
            return false;
        };
        if let Some(out) = self.out_edges.get_mut(&record.source) {
            out.remove(&id);
        }
        if let Some(inc) = self.in_edges.get_mut(&record.target) {
            inc.remove(&id);
        }
        true
    }

    fn unindex(&mut self, id: VertexId) {
        let Some(old) = self.vertices.get(&id) else {
            return;
        };
        let keys: Vec<(PropertyKey, Value)> = old
            .properties
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect();
        for key in keys {
            if let Some(ids) = self.index.get_mut(&key) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.index.remove(&key);
                }
            }
        }
    }
}

// ── Store ────────────────────────────────────────────────────────

/// Serialized form of a whole store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub next_id: u64,
    pub vertices: Vec<VertexRecord>,
    pub edges: Vec<EdgeRecord>,
    pub counters: BTreeMap<String, i64>,
}

/// Thread-safe graph store holding the committed state.
///
/// Clone is cheap (inner Arc). Every transaction gets its own [`GraphTxn`]
/// from [`GraphStore::begin`]; the store itself is never written to
/// directly.
#[derive(Debug, Clone)]
pub struct GraphStore {
    state: Arc<RwLock<GraphState>>,
    next_id: Arc<AtomicU64>,
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(GraphState::default())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Begin a transaction scoped to the caller.
    pub fn begin(&self) -> GraphTxn {
        GraphTxn {
            store: self.clone(),
            vertices: HashMap::new(),
            edges: HashMap::new(),
            created: HashSet::new(),
            counters: HashMap::new(),
        }
    }

    /// Ids are shared by vertices and edges and only ever grow, so a smaller
    /// id always belongs to an older element.
    pub(crate) fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn read(&self) -> Result<RwLockReadGuard<'_, GraphState>> {
        self.state.read().map_err(|_| GraphError::Poisoned)
    }

    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, GraphState>> {
        self.state.write().map_err(|_| GraphError::Poisoned)
    }

    /// Capture the committed state.
    pub fn snapshot(&self) -> Result<Snapshot> {
        let state = self.read()?;
        let mut vertices: Vec<VertexRecord> = state.vertices.values().cloned().collect();
        vertices.sort_by_key(|v| v.id);
        let mut edges: Vec<EdgeRecord> = state.edges.values().cloned().collect();
        edges.sort_by_key(|e| e.id);
        Ok(Snapshot {
            next_id: self.next_id.load(Ordering::SeqCst),
            vertices,
            edges,
            counters: state.counters.clone(),
        })
    }

    /// Rebuild a store (adjacency and index included) from a snapshot.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut state = GraphState::default();
        for vertex in snapshot.vertices {
            state.put_vertex(vertex);
        }
        for edge in snapshot.edges {
            if state.vertices.contains_key(&edge.source) && state.vertices.contains_key(&edge.target)
            {
                state.put_edge(edge);
            } else {
                tracing::warn!(edge = %edge.id, "Snapshot edge has a missing endpoint, skipped");
            }
        }
        state.counters = snapshot.counters;

        Self {
            state: Arc::new(RwLock::new(state)),
            next_id: Arc::new(AtomicU64::new(snapshot.next_id.max(1))),
        }
    }

    /// Write the committed state to `path` as JSON.
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let snapshot = self.snapshot()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec(&snapshot)?)?;

        tracing::info!(
            path = %path.display(),
            vertices = snapshot.vertices.len(),
            edges = snapshot.edges.len(),
            "Snapshot saved"
        );
        Ok(())
    }

    /// Load a store from a JSON snapshot written by [`GraphStore::save_snapshot`].
    pub fn open_snapshot(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let snapshot: Snapshot = serde_json::from_slice(&fs::read(path)?)?;
        tracing::info!(
            path = %path.display(),
            vertices = snapshot.vertices.len(),
            "Snapshot loaded"
        );
        Ok(Self::from_snapshot(snapshot))
    }
}

// ── Transaction ──────────────────────────────────────────────────

/// One transaction's view of the graph: committed state plus a private
/// write overlay.
///
/// A `None` entry in the overlay marks a deletion. Nothing staged here is
/// visible to any other transaction until [`GraphTxn::commit`].
#[derive(Debug)]
pub struct GraphTxn {
    pub(crate) store: GraphStore,
    pub(crate) vertices: HashMap<VertexId, Option<VertexRecord>>,
    pub(crate) edges: HashMap<EdgeId, Option<EdgeRecord>>,
    pub(crate) created: HashSet<VertexId>,
    pub(crate) counters: HashMap<String, i64>,
}

impl GraphTxn {
    /// The store this transaction commits into.
    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    /// True if anything has been staged.
    pub fn is_dirty(&self) -> bool {
        !self.vertices.is_empty() || !self.edges.is_empty() || !self.counters.is_empty()
    }

    pub(crate) fn is_deleted(&self, id: VertexId) -> bool {
        matches!(self.vertices.get(&id), Some(None))
    }
}
