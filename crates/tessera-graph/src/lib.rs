//! Tessera Graph — the property graph substrate.
//!
//! Vertices carry a base kind and typed properties, edges carry a label and
//! typed properties. Every vertex property is indexed, and an index lookup may
//! return any number of vertices. Writes are staged in a per-transaction
//! overlay and applied at commit with last-writer-wins semantics; readers see
//! committed state merged with their own overlay and nothing else.

pub mod client;
pub mod mutations;
pub mod queries;

pub use client::{
    Direction, EdgeId, EdgeRecord, GraphError, GraphStore, GraphTxn, Snapshot, VertexId,
    VertexRecord,
};
pub use mutations::CommitStats;

pub type Result<T> = std::result::Result<T, GraphError>;
