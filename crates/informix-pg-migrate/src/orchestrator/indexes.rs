//! Secondary index reconstruction.

use std::time::Instant;

use tracing::info;

use super::constraints::warn_name_collisions;
use super::{finish_run, progress_due, record_rejected, record_unit_error, Orchestrator, RunSummary};
use crate::error::Result;
use crate::schema::ddl;
use crate::source::IndexDescriptor;
use crate::state::{CheckpointStore, MigrationConcern, UnitStats};

impl Orchestrator {
    /// Create every selected table's secondary indexes in the target.
    pub async fn migrate_indexes(&self) -> Result<RunSummary> {
        let started = Instant::now();
        let (mut store, mut summary) = self.begin_run(MigrationConcern::Indexes)?;
        let outcome = self.run_indexes(&mut store, &mut summary).await;
        finish_run(store, summary, started, outcome)
    }

    async fn run_indexes(&self, store: &mut CheckpointStore, summary: &mut RunSummary) -> Result<()> {
        let listing = self.catalog().indexes().await?;
        let indexes: Vec<&IndexDescriptor> = listing
            .descriptors
            .iter()
            .filter(|idx| self.config.migration.table_selected(&idx.table))
            .collect();
        summary.total = indexes.len() + listing.rejected.len();
        record_rejected(store, summary, &listing.rejected);
        warn_name_collisions(indexes.iter().map(|idx| (ddl::index_name(idx), idx.key())));

        let count = indexes.len();
        for (i, index) in indexes.into_iter().enumerate() {
            let key = index.key();
            if store.is_completed(&key) {
                summary.skipped += 1;
                continue;
            }
            if progress_due(i + 1, count) {
                info!("[{}/{}] index {}", i + 1, count, key);
            }

            let unit_start = Instant::now();
            match self.create_index(index).await {
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

    async fn create_index(&self, index: &IndexDescriptor) -> Result<()> {
        let columns = self
            .catalog()
            .resolve_columns(index.tabid, &index.table, &index.columns)
            .await?;
        self.schema_builder().create_index(index, &columns).await
    }
}
