//! tessera-core: Shared vocabulary, configuration, and error handling for Tessera.
//!
//! This crate provides the foundational types used across all Tessera crates:
//! - Base kinds for the vertices that back concepts
//! - Edge labels and property keys written onto the substrate
//! - Data types and literal values held by resources
//! - Meta-schema and implicit-type labels
//! - Engine configuration
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use config::EngineConfig;
pub use error::TesseraError;
pub use types::{implicit, meta, BaseType, DataType, EdgeLabel, PropertyKey, Value};
