//! Migration orchestrators.
//!
//! One orchestrator run handles one concern: table data, primary keys,
//! foreign keys or indexes. Each run enumerates its units from the source
//! catalog, skips units its checkpoint lists as completed, processes the rest
//! strictly in order, and records every outcome in the checkpoint.
//!
//! Per-unit failures are recorded and the run continues. Errors for which
//! [`MigrateError::is_fatal`] holds end the run; the checkpoint is persisted
//! on every exit path.

mod constraints;
mod health;
mod indexes;
mod tables;
mod validate;

pub use health::HealthReport;
pub use validate::{CheckResult, CheckStatus, ValidationReport, ValidationSummary};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use crate::config::{Config, Credentials};
use crate::error::{MigrateError, Result};
use crate::schema::SchemaBuilder;
use crate::source::{CatalogReader, OdbcSource, RejectedEntry, SourceConnection};
use crate::state::{CheckpointStore, MigrationConcern};
use crate::target::{PgTarget, TargetConnection};
use crate::transfer::{TransferConfig, TransferEngine};

/// Coordinates one migration concern over a source and a target connection.
pub struct Orchestrator {
    config: Config,
    checkpoint_dir: PathBuf,
    source: Arc<dyn SourceConnection>,
    target: Arc<dyn TargetConnection>,
}

/// Result of one orchestrator run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Run identifier of the checkpoint file.
    pub run_id: String,

    pub concern: MigrationConcern,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,

    pub duration_seconds: f64,

    /// Units enumerated, including catalog rows that failed to decode.
    pub total: usize,

    /// Units processed successfully in this run.
    pub completed: usize,

    /// Units skipped because an earlier run completed them.
    pub skipped: usize,

    /// Units that failed in this run.
    pub failed: usize,

    /// Rows copied in this run (table data only).
    pub rows_transferred: i64,

    pub failures: Vec<UnitFailure>,
}

/// A unit that failed, with the driver-reported error text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitFailure {
    pub key: String,
    pub detail: String,
}

impl RunSummary {
    fn new(concern: MigrationConcern, run_id: &str) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.to_string(),
            concern,
            started_at: now,
            completed_at: now,
            duration_seconds: 0.0,
            total: 0,
            completed: 0,
            skipped: 0,
            failed: 0,
            rows_transferred: 0,
            failures: Vec::new(),
        }
    }

    fn record_failure(&mut self, key: &str, detail: impl Into<String>) {
        self.failed += 1;
        self.failures.push(UnitFailure {
            key: key.to_string(),
            detail: detail.into(),
        });
    }

    fn finish(&mut self, started: Instant) {
        self.completed_at = Utc::now();
        self.duration_seconds = started.elapsed().as_secs_f64();
    }

    /// Whether every processed unit succeeded.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Orchestrator {
    /// Open both connections. Credentials are checked by the caller before this.
    pub async fn connect(config: Config, credentials: &Credentials) -> Result<Self> {
        let source = OdbcSource::connect(&config.source, &credentials.source_password).await?;
        let target = match PgTarget::connect(&config.target, &credentials.target_password).await {
            Ok(target) => target,
            Err(e) => {
                source.close().await;
                return Err(e);
            }
        };
        Ok(Self::with_connections(config, Arc::new(source), Arc::new(target)))
    }

    /// Build an orchestrator over already open connections.
    pub fn with_connections(
        config: Config,
        source: Arc<dyn SourceConnection>,
        target: Arc<dyn TargetConnection>,
    ) -> Self {
        let checkpoint_dir = config.checkpoint_dir();
        Self {
            config,
            checkpoint_dir,
            source,
            target,
        }
    }

    /// Override the directory holding checkpoint files.
    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = dir.into();
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn checkpoint_dir(&self) -> &PathBuf {
        &self.checkpoint_dir
    }

    /// Close both connections.
    pub async fn close(&self) {
        self.source.close().await;
        self.target.close().await;
    }

    fn catalog(&self) -> CatalogReader<'_> {
        CatalogReader::new(self.source.as_ref())
    }

    fn schema_builder(&self) -> SchemaBuilder<'_> {
        SchemaBuilder::new(self.target.as_ref(), &self.config.target.schema)
    }

    fn transfer_engine(&self) -> TransferEngine<'_> {
        TransferEngine::new(
            self.source.as_ref(),
            self.target.as_ref(),
            &self.config.target.schema,
            TransferConfig {
                batch_size: self.config.migration.batch_size,
                reset_sequences: self.config.migration.reset_sequences,
            },
        )
    }

    fn open_checkpoint(&self, concern: MigrationConcern) -> Result<CheckpointStore> {
        CheckpointStore::load(
            &self.checkpoint_dir,
            concern,
            &self.config.hash(),
            self.config.migration.checkpoint_every,
        )
    }

    /// Open the concern's checkpoint and start a summary.
    fn begin_run(&self, concern: MigrationConcern) -> Result<(CheckpointStore, RunSummary)> {
        let store = self.open_checkpoint(concern)?;
        let summary = RunSummary::new(concern, &store.record().run_id);
        info!("Migrating {} (checkpoint {})", concern, store.path().display());
        Ok((store, summary))
    }
}

/// Persist the checkpoint whatever the outcome, then report the run.
fn finish_run(
    mut store: CheckpointStore,
    mut summary: RunSummary,
    started: Instant,
    outcome: Result<()>,
) -> Result<RunSummary> {
    let persisted = store.persist();
    summary.finish(started);

    outcome?;
    persisted?;
    log_summary(&summary);
    Ok(summary)
}

/// Record catalog rows that could not be decoded as failed units.
fn record_rejected(store: &mut CheckpointStore, summary: &mut RunSummary, rejected: &[RejectedEntry]) {
    for entry in rejected {
        error!("{}: skipped, catalog entry could not be decoded: {}", entry.key, entry.reason);
        store.mark_failed(&entry.key, &entry.reason);
        summary.record_failure(&entry.key, &entry.reason);
    }
}

/// Record a unit failure, or pass a fatal error through.
fn record_unit_error(
    store: &mut CheckpointStore,
    summary: &mut RunSummary,
    key: &str,
    e: MigrateError,
) -> Result<()> {
    if e.is_fatal() {
        error!("{}: {}", key, e);
        return Err(e);
    }
    let detail = e.driver_message();
    error!("{}: {}", key, detail);
    store.mark_failed(key, detail.clone());
    summary.record_failure(key, detail);
    Ok(())
}

/// Whether to log an `[i/n]` progress line for unit `i`.
fn progress_due(i: usize, n: usize) -> bool {
    i == 1 || i == n || i % 25 == 0
}

fn log_summary(summary: &RunSummary) {
    info!(
        "{}: {} total, {} completed, {} skipped, {} failed in {:.1}s",
        summary.concern,
        summary.total,
        summary.completed,
        summary.skipped,
        summary.failed,
        summary.duration_seconds
    );
    for failure in &summary.failures {
        error!("  FAILED {}: {}", failure.key, failure.detail);
    }
}
