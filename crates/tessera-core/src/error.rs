use thiserror::Error;

/// Top-level error type for the Tessera engine.
///
/// Only configuration loading fails at this layer; the graph, concept and
/// post-processing crates carry their own error enums.
#[derive(Error, Debug)]
pub enum TesseraError {
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for TesseraError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
