//! Primary key and foreign key reconstruction.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{info, warn};

use super::{finish_run, progress_due, record_rejected, record_unit_error, Orchestrator, RunSummary};
use crate::error::Result;
use crate::schema::ddl;
use crate::source::{ForeignKeyDescriptor, PrimaryKeyDescriptor};
use crate::state::{CheckpointStore, MigrationConcern, UnitStats};

impl Orchestrator {
    /// Add every selected table's primary key to the target.
    pub async fn migrate_primary_keys(&self) -> Result<RunSummary> {
        let started = Instant::now();
        let (mut store, mut summary) = self.begin_run(MigrationConcern::PrimaryKeys)?;
        let outcome = self.run_primary_keys(&mut store, &mut summary).await;
        finish_run(store, summary, started, outcome)
    }

    async fn run_primary_keys(&self, store: &mut CheckpointStore, summary: &mut RunSummary) -> Result<()> {
        let listing = self.catalog().primary_keys().await?;
        let keys: Vec<&PrimaryKeyDescriptor> = listing
            .descriptors
            .iter()
            .filter(|pk| self.config.migration.table_selected(&pk.table))
            .collect();
        summary.total = keys.len() + listing.rejected.len();
        record_rejected(store, summary, &listing.rejected);

        let count = keys.len();
        for (i, pk) in keys.into_iter().enumerate() {
            let key = pk.key();
            if store.is_completed(&key) {
                summary.skipped += 1;
                continue;
            }
            if progress_due(i + 1, count) {
                info!("[{}/{}] primary key {}", i + 1, count, key);
            }

            let unit_start = Instant::now();
            match self.create_primary_key(pk).await {
                Ok(()) => {
                    store.mark_completed(&key, UnitStats::new(None, unit_start.elapsed().as_secs_f64()));
                    summary.completed += 1;
                }
                Err(e) => record_unit_error(store, summary, &key, e)?,
            }
            store.persist_if_due()?;
        }
        Ok(())
    }

    async fn create_primary_key(&self, pk: &PrimaryKeyDescriptor) -> Result<()> {
        let columns = self
            .catalog()
            .resolve_columns(pk.tabid, &pk.table, &pk.columns)
            .await?;
        self.schema_builder().create_primary_key(pk, &columns).await
    }

    /// Add every foreign key whose child and parent tables are both selected.
    pub async fn migrate_foreign_keys(&self) -> Result<RunSummary> {
        let started = Instant::now();
        let (mut store, mut summary) = self.begin_run(MigrationConcern::ForeignKeys)?;
        let outcome = self.run_foreign_keys(&mut store, &mut summary).await;
        finish_run(store, summary, started, outcome)
    }

    async fn run_foreign_keys(&self, store: &mut CheckpointStore, summary: &mut RunSummary) -> Result<()> {
        let listing = self.catalog().foreign_keys().await?;
        let migration = &self.config.migration;
        let keys: Vec<&ForeignKeyDescriptor> = listing
            .descriptors
            .iter()
            .filter(|fk| migration.table_selected(&fk.table) && migration.table_selected(&fk.referenced_table))
            .collect();
        summary.total = keys.len() + listing.rejected.len();
        record_rejected(store, summary, &listing.rejected);
        warn_name_collisions(keys.iter().map(|fk| {
            (ddl::foreign_key_name(&fk.table, &fk.constraint_name), fk.key())
        }));

        let count = keys.len();
        for (i, fk) in keys.into_iter().enumerate() {
            let key = fk.key();
            if store.is_completed(&key) {
                summary.skipped += 1;
                continue;
            }
            if progress_due(i + 1, count) {
                info!("[{}/{}] foreign key {} -> {}", i + 1, count, key, fk.referenced_table);
            }

            let unit_start = Instant::now();
            match self.create_foreign_key(fk).await {
                Ok(()) => {
                    store.mark_completed(&key, UnitStats::new(None, unit_start.elapsed().as_secs_f64()));
                    summary.completed += 1;
                }
                Err(e) => record_unit_error(store, summary, &key, e)?,
            }
            store.persist_if_due()?;
        }
        Ok(())
    }

    async fn create_foreign_key(&self, fk: &ForeignKeyDescriptor) -> Result<()> {
        let catalog = self.catalog();
        let columns = catalog.resolve_columns(fk.tabid, &fk.table, &fk.columns).await?;
        let referenced = catalog
            .resolve_columns(fk.referenced_tabid, &fk.referenced_table, &fk.referenced_columns)
            .await?;
        self.schema_builder()
            .create_foreign_key(fk, &columns, &referenced)
            .await
    }
}

/// Warn about target names shared by several source objects.
///
/// The second object with a shared name fails to create and is recorded as a
/// failed unit; nothing is renamed.
pub(super) fn warn_name_collisions(names: impl Iterator<Item = (String, String)>) {
    let mut seen: HashMap<String, String> = HashMap::new();
    for (target_name, key) in names {
        if let Some(first) = seen.get(&target_name) {
            warn!(
                "{} and {} both map to target name {}; the later one will fail",
                first, key, target_name
            );
        } else {
            seen.insert(target_name, key);
        }
    }
}
