//! CLI entry point for the tessera-postprocess daemon.
//!
//! The binary is an offline repair tool: it loads a keyspace snapshot into
//! its own process, sweeps it, and writes the snapshot back (after every
//! sweep in daemon mode). Nothing else may write the snapshot while it
//! runs. Writers that share a process with the keyspace use
//! `PostProcessor` directly instead.

use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::{fmt, EnvFilter};

use tessera_commitlog::store::FileCommitLogStore;
use tessera_concept::Keyspace;
use tessera_core::EngineConfig;

use tessera_postprocess::config::PostprocessConfig;
use tessera_postprocess::scheduler::PostProcessor;

#[derive(Parser)]
#[command(name = "tessera-postprocess")]
#[command(about = "Merge duplicate castings and resources in a Tessera keyspace snapshot")]
#[command(
    long_about = "Merge duplicate castings and resources in a Tessera keyspace snapshot.\n\nOffline repair tool: the snapshot is loaded once and overwritten after each sweep, so no other process may write it while this runs."
)]
struct Cli {
    /// Run a single sweep and exit.
    #[arg(long)]
    once: bool,

    /// Run as daemon with periodic sweeps.
    #[arg(long)]
    daemon: bool,

    /// Keyspace snapshot to repair (otherwise read from config).
    #[arg(long)]
    snapshot: Option<String>,

    /// Commit log directory (otherwise read from config).
    #[arg(long)]
    commit_log_dir: Option<String>,

    /// Config file prefix (default: tessera).
    #[arg(short, long, default_value = "tessera")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    if cli.once == cli.daemon {
        anyhow::bail!("Specify exactly one of --once (single sweep) or --daemon (periodic sweeps)");
    }

    let engine_config = EngineConfig::load(&cli.config)?;
    let pp_config = PostprocessConfig::load(&cli.config)?;

    let snapshot = cli
        .snapshot
        .clone()
        .or_else(|| pp_config.snapshot_path.clone())
        .or_else(|| engine_config.snapshot_path.clone())
        .ok_or_else(|| {
            anyhow::anyhow!("Snapshot required: set --snapshot or postprocess.snapshot_path in config")
        })?;
    let log_dir = cli
        .commit_log_dir
        .clone()
        .or_else(|| pp_config.commit_log_dir.clone())
        .or_else(|| engine_config.commit_log_dir.clone());

    // The resolver writes no commit logs, so the keyspace itself gets none.
    let keyspace = Keyspace::open(EngineConfig {
        snapshot_path: Some(snapshot.clone()),
        commit_log_dir: None,
        ..engine_config
    })?;
    tracing::info!(keyspace = %keyspace.name(), snapshot = %snapshot, "Keyspace loaded");

    let mut processor = PostProcessor::new(keyspace, pp_config);
    if let Some(dir) = log_dir {
        let store = FileCommitLogStore::new(&dir)?;
        tracing::info!(commit_log_dir = %dir, "Reading commit logs");
        processor = processor.with_commit_logs(Arc::new(store));
    }

    if cli.once {
        let summary = processor.run_once()?;
        processor.keyspace().save_snapshot()?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        let (stop, shutdown) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown requested");
                let _ = stop.send(true);
            }
        });
        Arc::new(processor).run_daemon(shutdown).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_help_marks_the_tool_offline() {
        let help = Cli::command().render_long_help().to_string();
        assert!(help.contains("Offline repair tool"));
    }

    #[test]
    fn test_parses_daemon_with_snapshot() {
        let cli = Cli::try_parse_from(["tessera-postprocess", "--daemon", "--snapshot", "ks.json"])
            .unwrap();
        assert!(cli.daemon);
        assert!(!cli.once);
        assert_eq!(cli.snapshot.as_deref(), Some("ks.json"));
        assert_eq!(cli.config, "tessera");
    }
}
