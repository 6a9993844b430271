//! Sweep scheduling.
//!
//! A sweep takes a batch of keys, re-reads each key's live candidates from
//! committed state and runs the matching duplicate fix in its own resolver
//! transaction. A failing key is logged, requeued and counted; the sweep
//! moves on. The daemon repeats sweeps on a tokio interval, running each
//! one on the blocking pool since transactions are synchronous.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{interval, Duration};

use tessera_commitlog::store::{CommitLogQuery, CommitLogStore};
use tessera_concept::{ConceptId, FixKind, Keyspace, PendingFix};
use tessera_core::{PropertyKey, Value};

use crate::config::PostprocessConfig;
use crate::error::{PostprocessError, Result};
use crate::worklist::WorkList;

/// Counts from one sweep.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SweepSummary {
    pub keys_examined: usize,
    /// Keys with fewer than two live candidates left.
    pub keys_skipped: usize,
    pub castings_merged: usize,
    pub resources_merged: usize,
    pub relations_removed: usize,
    pub relations_retargeted: usize,
    pub failures: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_keys: Vec<String>,
    /// Keys over the per-sweep bound, requeued.
    pub deferred: usize,
    pub logs_removed: usize,
    pub duration_ms: u64,
}

/// Runs duplicate fixes against one keyspace.
pub struct PostProcessor {
    keyspace: Keyspace,
    config: PostprocessConfig,
    commit_logs: Option<Arc<dyn CommitLogStore>>,
}

impl PostProcessor {
    pub fn new(keyspace: Keyspace, config: PostprocessConfig) -> Self {
        Self {
            keyspace,
            config,
            commit_logs: None,
        }
    }

    /// Also read work from persisted commit logs.
    pub fn with_commit_logs(mut self, store: Arc<dyn CommitLogStore>) -> Self {
        self.commit_logs = Some(store);
        self
    }

    pub fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    /// Drain the keyspace queue and read every commit log old enough to be
    /// eligible.
    pub fn collect(&self) -> Result<WorkList> {
        let mut work = WorkList::new();
        for fix in self.keyspace.drain_post_processing()? {
            work.add_fix(fix);
        }

        if let Some(store) = &self.commit_logs {
            let cutoff = self.cutoff()?;
            let query = CommitLogQuery {
                keyspace: Some(self.keyspace.name().to_string()),
                to: Some(cutoff),
                ..Default::default()
            };
            for log in store.list(&query)? {
                work.add_log(&log);
            }
        }
        Ok(work)
    }

    /// Newest commit time a log may have to be swept now.
    fn cutoff(&self) -> Result<chrono::DateTime<chrono::Utc>> {
        let delay = self.config.delay_secs;
        i64::try_from(delay)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|d| chrono::Utc::now().checked_sub_signed(d))
            .ok_or_else(|| PostprocessError::Config(format!("delay_secs {delay} is out of range")))
    }

    /// Fix every key in `work`. Never fails as a whole: per-key errors are
    /// counted in the summary and the key is requeued.
    pub fn sweep(&self, work: &[PendingFix]) -> SweepSummary {
        let started = Instant::now();
        let mut summary = SweepSummary::default();

        for fix in work {
            summary.keys_examined += 1;
            match self.fix_key(fix) {
                Ok(None) => summary.keys_skipped += 1,
                Ok(Some(outcome)) => {
                    match fix.kind {
                        FixKind::Casting => summary.castings_merged += outcome.merged,
                        FixKind::Resource => summary.resources_merged += outcome.merged,
                    }
                    summary.relations_removed += outcome.relations_merged;
                    summary.relations_retargeted += outcome.relations_retargeted;
                }
                Err(e) => {
                    tracing::warn!(key = %fix.key, kind = ?fix.kind, error = %e, "Duplicate fix failed");
                    summary.failures += 1;
                    summary.failed_keys.push(fix.key.clone());
                    if let Err(e) = self.keyspace.enqueue(fix.clone()) {
                        tracing::warn!(key = %fix.key, error = %e, "Failed to requeue key");
                    }
                }
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        summary
    }

    /// Returns `None` when the key no longer has duplicates.
    fn fix_key(&self, fix: &PendingFix) -> Result<Option<tessera_concept::FixOutcome>> {
        let live = self
            .keyspace
            .graph()
            .lookup(PropertyKey::Index, &Value::from(fix.key.as_str()))?;
        if live.len() < 2 {
            return Ok(None);
        }

        let mut candidates: BTreeSet<ConceptId> = fix.candidates.clone();
        candidates.extend(live.into_iter().map(ConceptId::from));
        let fix = PendingFix {
            candidates,
            ..fix.clone()
        };
        Ok(Some(self.keyspace.resolve(&fix)?))
    }

    /// One full pass: collect, sweep up to the per-sweep bound, requeue the
    /// rest, and remove commit logs whose keys were all handled.
    pub fn run_once(&self) -> Result<SweepSummary> {
        let mut work = self.collect()?;
        let batch = work.take(self.config.max_keys_per_sweep);

        let mut summary = self.sweep(&batch);

        for fix in work.remaining() {
            self.keyspace.enqueue(fix.clone())?;
            summary.deferred += 1;
        }

        if let Some(store) = &self.commit_logs {
            let failed: HashSet<&str> = summary.failed_keys.iter().map(String::as_str).collect();
            let done: BTreeSet<String> = batch
                .iter()
                .filter(|fix| !failed.contains(fix.key.as_str()))
                .map(|fix| fix.key.clone())
                .collect();
            for id in work.completed_logs(&done) {
                store.remove(id)?;
                summary.logs_removed += 1;
            }
        }

        tracing::info!(
            keyspace = %self.keyspace.name(),
            keys_examined = summary.keys_examined,
            keys_skipped = summary.keys_skipped,
            castings_merged = summary.castings_merged,
            resources_merged = summary.resources_merged,
            relations_removed = summary.relations_removed,
            failures = summary.failures,
            deferred = summary.deferred,
            duration_ms = summary.duration_ms,
            "Sweep complete"
        );
        Ok(summary)
    }

    /// Sweep on every tick until `shutdown` flips to true, saving the
    /// keyspace snapshot after each sweep.
    pub async fn run_daemon(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut ticker = interval(Duration::from_secs(self.config.interval_secs.max(1)));
        tracing::info!(
            keyspace = %self.keyspace.name(),
            interval_secs = self.config.interval_secs,
            "Post-processing daemon started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let processor = Arc::clone(&self);
            let swept = tokio::task::spawn_blocking(move || {
                let summary = processor.run_once()?;
                processor.keyspace.save_snapshot()?;
                Ok::<_, PostprocessError>(summary)
            })
            .await;

            match swept {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "Scheduled sweep failed"),
                Err(e) => tracing::error!(error = %e, "Sweep task panicked"),
            }
        }

        tracing::info!(keyspace = %self.keyspace.name(), "Post-processing daemon stopped");
        Ok(())
    }
}
