//! Error types for the tessera-postprocess crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PostprocessError {
    #[error("Concept error: {0}")]
    Concept(#[from] tessera_concept::ConceptError),

    #[error("Graph error: {0}")]
    Graph(#[from] tessera_graph::GraphError),

    #[error("Commit log error: {0}")]
    CommitLog(#[from] tessera_commitlog::store::StoreError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Sweep task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, PostprocessError>;
