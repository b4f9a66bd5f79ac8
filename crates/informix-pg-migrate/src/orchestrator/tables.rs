//! Table creation and data transfer.

use std::time::Instant;

use tracing::{info, warn};

use super::{finish_run, progress_due, record_rejected, record_unit_error, Orchestrator, RunSummary};
use crate::error::{MigrateError, Result};
use crate::source::{CatalogReader, TableEntry};
use crate::state::{CheckpointStore, MigrationConcern, UnitStats};
use crate::transfer::TransferStats;

impl Orchestrator {
    /// Create every selected table in the target and copy its rows.
    ///
    /// Tables run smallest first. A table is recorded as completed only after
    /// its recount matches the rows sent.
    pub async fn migrate_tables(&self) -> Result<RunSummary> {
        let started = Instant::now();
        let (mut store, mut summary) = self.begin_run(MigrationConcern::Tables)?;
        let outcome = self.run_tables(&mut store, &mut summary).await;
        finish_run(store, summary, started, outcome)
    }

    async fn run_tables(&self, store: &mut CheckpointStore, summary: &mut RunSummary) -> Result<()> {
        let catalog = self.catalog();
        let listing = catalog.list_tables().await?;

        let tables: Vec<&TableEntry> = listing
            .descriptors
            .iter()
            .filter(|t| self.config.migration.table_selected(&t.name))
            .collect();
        summary.total = tables.len() + listing.rejected.len();
        record_rejected(store, summary, &listing.rejected);
        info!("{} tables selected", tables.len());

        let count = tables.len();
        for (i, entry) in tables.into_iter().enumerate() {
            if store.is_completed(&entry.name) {
                if !self.config.migration.verify_completed_tables {
                    summary.skipped += 1;
                    continue;
                }
                if self.completed_table_matches(&catalog, entry).await? {
                    summary.skipped += 1;
                    continue;
                }
            }

            if progress_due(i + 1, count) {
                info!("[{}/{}] {}", i + 1, count, entry.name);
            }

            let unit_start = Instant::now();
            match self.migrate_table(&catalog, entry).await {
                Ok(stats) => {
                    store.mark_completed(
                        &entry.name,
                        UnitStats::new(Some(stats.rows), unit_start.elapsed().as_secs_f64()),
                    );
                    summary.completed += 1;
                    summary.rows_transferred += stats.rows;
                }
                Err(e) => record_unit_error(store, summary, &entry.name, e)?,
            }
            store.persist_if_due()?;
        }
        Ok(())
    }

    async fn migrate_table(&self, catalog: &CatalogReader<'_>, entry: &TableEntry) -> Result<TransferStats> {
        let table = catalog.describe_table(entry).await?;
        self.schema_builder().create_table(&table).await?;
        self.transfer_engine().transfer(&table).await
    }

    /// Recount a table a previous run completed; `false` means it is redone.
    async fn completed_table_matches(&self, catalog: &CatalogReader<'_>, entry: &TableEntry) -> Result<bool> {
        let source = catalog.count_rows(&entry.name).await;
        let target = self.transfer_engine().count_target_rows(&entry.name).await;
        match (source, target) {
            (Ok(s), Ok(t)) if s == t => Ok(true),
            (Ok(s), Ok(t)) => {
                warn!(
                    "{}: completed earlier but source has {} rows and target {}; redoing",
                    entry.name, s, t
                );
                Ok(false)
            }
            (Err(e), _) | (_, Err(e)) if e.is_fatal() => Err(e),
            (Err(e), _) | (_, Err(e)) => {
                warn!("{}: cannot recount completed table ({}); redoing", entry.name, e);
                Ok(false)
            }
        }
    }

    /// Truncate one existing target table and copy its rows again.
    ///
    /// Table DDL and checkpoints are left alone.
    pub async fn refresh_table(&self, name: &str) -> Result<RunSummary> {
        let started = Instant::now();
        let mut summary = RunSummary::new(MigrationConcern::Tables, "refresh");
        summary.total = 1;

        let catalog = self.catalog();
        let entry = catalog
            .find_table(name)
            .await?
            .ok_or_else(|| MigrateError::catalog(format!("table {} not found in source", name)))?;

        let schema = self.schema_builder();
        if !schema.table_exists(&entry.name).await? {
            return Err(MigrateError::transfer(
                &entry.name,
                format!(
                    "table does not exist in target schema {}; migrate tables first",
                    self.config.target.schema
                ),
            ));
        }

        let table = catalog.describe_table(&entry).await?;
        info!("Refreshing {}", table.name);
        schema.truncate_table(&table.name).await?;
        let stats = self.transfer_engine().transfer(&table).await?;

        summary.completed = 1;
        summary.rows_transferred = stats.rows;
        summary.finish(started);
        Ok(summary)
    }
}
