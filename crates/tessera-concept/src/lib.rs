//! Tessera Concept — the typed concept model over the graph substrate.
//!
//! A [`Keyspace`] owns one graph store and hands out [`Transaction`]s.
//! Transactions create and link types and instances, track what they touched
//! in a [`TxCache`], and validate the touched set on commit. Castings and
//! resources are content-addressed; concurrent writers may still create
//! duplicates of them, which commits queue for the duplicate resolver.

pub mod cache;
pub mod concept;
pub mod duplicates;
pub mod error;
pub mod instance;
pub mod keys;
pub mod keyspace;
pub mod reader;
pub mod schema;
pub mod transaction;
pub mod validation;

pub use cache::TxCache;
pub use concept::{
    Casting, Concept, ConceptHandle, ConceptId, Entity, EntityType, PlayerType, Relation,
    RelationType, Resource, ResourceType, RoleType, Rule, RuleType, SchemaType, Thing,
};
pub use duplicates::FixOutcome;
pub use error::{ConceptError, Result};
pub use keyspace::{FixKind, Keyspace, PendingFix};
pub use reader::ConceptReader;
pub use transaction::{Transaction, TxMode};
pub use validation::{RuleKind, ValidationReport, Violation};
