//! Configuration management for Tessera keyspaces.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (TESSERA_ENGINE__ prefix)
//! 2. Config file (tessera.toml, `[engine]` section)
//! 3. Defaults

use serde::Deserialize;

use crate::error::TesseraError;

/// Settings for one keyspace engine.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Keyspace name, recorded on every commit log.
    #[serde(default = "default_keyspace")]
    pub keyspace: String,

    /// Run the structural validator on commit. Disabling it is only
    /// meant for bulk loads that are validated elsewhere.
    #[serde(default = "default_true")]
    pub validate_on_commit: bool,

    /// Keep a per-transaction label -> type cache.
    #[serde(default = "default_true")]
    pub cache_types: bool,

    /// Directory for commit logs. No logs are persisted when unset.
    #[serde(default)]
    pub commit_log_dir: Option<String>,

    /// Snapshot file the keyspace is restored from and saved to.
    #[serde(default)]
    pub snapshot_path: Option<String>,
}

fn default_keyspace() -> String {
    "tessera".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            keyspace: default_keyspace(),
            validate_on_commit: true,
            cache_types: true,
            commit_log_dir: None,
            snapshot_path: None,
        }
    }
}

impl EngineConfig {
    /// Config for an in-memory keyspace with the given name.
    pub fn in_memory(keyspace: &str) -> Self {
        Self {
            keyspace: keyspace.to_string(),
            ..Default::default()
        }
    }

    /// Load the `[engine]` section from `{file_prefix}.toml` (optional) and
    /// `TESSERA_ENGINE__*` environment variables. A missing section yields
    /// the defaults.
    pub fn load(file_prefix: &str) -> Result<Self, TesseraError> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("TESSERA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        match cfg.get::<EngineConfig>("engine") {
            Ok(c) => Ok(c),
            Err(config::ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }
}
