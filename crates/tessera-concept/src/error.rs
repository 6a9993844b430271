//! Error types for the tessera-concept crate.

use thiserror::Error;

use tessera_core::BaseType;

use crate::concept::ConceptId;
use crate::validation::ValidationReport;

#[derive(Error, Debug)]
pub enum ConceptError {
    #[error("Meta type [{label}] is immutable")]
    MetaTypeImmutable { label: String },

    #[error("Meta type [{label}] cannot have instances")]
    MetaTypeInstance { label: String },

    #[error("Label [{label}] is already used by a {existing} concept, cannot reuse it for a {requested}")]
    LabelTaken {
        label: String,
        existing: BaseType,
        requested: BaseType,
    },

    #[error("Type [{label}] has {property} [{existing}], cannot change it to [{requested}]")]
    ImmutableValue {
        label: String,
        property: &'static str,
        existing: String,
        requested: String,
    },

    #[error("Setting [{super_label}] as the super type of [{label}] would create a cycle")]
    CycleDetected { label: String, super_label: String },

    #[error("Type [{label}] cannot be deleted: it has {count} sub-type(s)")]
    TypeHasSubTypes { label: String, count: usize },

    #[error("Type [{label}] cannot be deleted: it has {count} direct instance(s)")]
    TypeHasInstances { label: String, count: usize },

    #[error("Type [{label}] cannot be abstract: it has {count} direct instance(s)")]
    AbstractTypeInstances { label: String, count: usize },

    #[error("Value [{value}] does not match data type [{expected}] of resource type [{label}]")]
    DataTypeMismatch {
        label: String,
        expected: String,
        value: String,
    },

    #[error("Resource [{value}] of unique type [{label}] is already owned by concept {owner}")]
    ResourceNotUnique {
        label: String,
        value: String,
        owner: ConceptId,
    },

    #[error("Resource type [{resource_type}] has not been attached to any owner type")]
    ResourceNotAttached { resource_type: String },

    #[error("Schema mutations are not permitted in a schema-locked transaction")]
    SchemaLocked,

    #[error("Transaction is closed")]
    TransactionClosed,

    #[error("{0}")]
    Validation(ValidationReport),

    #[error("Concept not found: {0}")]
    ConceptNotFound(ConceptId),

    #[error("Concept {id} is a {actual}, expected a {expected}")]
    WrongKind {
        id: ConceptId,
        expected: BaseType,
        actual: BaseType,
    },

    #[error("Keyspace is not bootstrapped: meta type [{0}] is missing")]
    MissingMetaType(String),

    #[error("Keyspace lock poisoned")]
    Poisoned,

    #[error("Graph error: {0}")]
    Graph(#[from] tessera_graph::GraphError),

    #[error("Commit log error: {0}")]
    CommitLog(#[from] tessera_commitlog::store::StoreError),
}

pub type Result<T> = std::result::Result<T, ConceptError>;
