//! tessera-postprocess: out-of-band duplicate resolution for Tessera keyspaces.
//!
//! Collects content-addressed keys that concurrent commits left with more
//! than one live candidate, from the keyspace queue and from persisted
//! commit logs, and merges the duplicates in periodic sweeps.

pub mod config;
pub mod error;
pub mod scheduler;
pub mod worklist;

pub use config::PostprocessConfig;
pub use error::{PostprocessError, Result};
pub use scheduler::{PostProcessor, SweepSummary};
pub use worklist::WorkList;
