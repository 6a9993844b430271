//! Configuration for the tessera-postprocess daemon.

use serde::Deserialize;

use crate::error::{PostprocessError, Result};

/// Top-level post-processing configuration.
///
/// Loaded from `tessera.toml` `[postprocess]` section or
/// `TESSERA_POSTPROCESS__` environment variables.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PostprocessConfig {
    /// Seconds between daemon sweeps.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Upper bound on keys fixed per sweep. Keys over the bound are
    /// requeued for the next sweep.
    #[serde(default = "default_max_keys")]
    pub max_keys_per_sweep: usize,

    /// Directory of commit logs written by the engine.
    #[serde(default)]
    pub commit_log_dir: Option<String>,

    /// Snapshot holding the keyspace to repair.
    #[serde(default)]
    pub snapshot_path: Option<String>,

    /// Seconds a commit log must age before its keys are swept.
    #[serde(default)]
    pub delay_secs: u64,
}

fn default_interval() -> u64 {
    60
}

fn default_max_keys() -> usize {
    1000
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            max_keys_per_sweep: default_max_keys(),
            commit_log_dir: None,
            snapshot_path: None,
            delay_secs: 0,
        }
    }
}

impl PostprocessConfig {
    pub fn load(file_prefix: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("TESSERA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| PostprocessError::Config(e.to_string()))?;

        match cfg.get::<PostprocessConfig>("postprocess") {
            Ok(c) => Ok(c),
            Err(config::ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(PostprocessError::Config(e.to_string())),
        }
    }
}
