//! Batch transfer of table data.
//!
//! Rows are read through one forward cursor on the source, a batch at a time,
//! and written with one multi-row INSERT per batch. Each batch commits on its
//! own. Once the cursor is exhausted the target table is recounted and the
//! count compared with the number of rows sent.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::core::identifier::{escape_identifier, qualify};
use crate::core::value::{Row, SqlParam};
use crate::error::{MigrateError, Result};
use crate::source::{source_table_ref, SourceConnection, TableDescriptor};
use crate::target::{InsertStatement, TargetConnection};

/// Transfer engine configuration.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Rows per fetch and per INSERT.
    pub batch_size: usize,
    /// Set SERIAL sequences past the copied maximum after each table.
    pub reset_sequences: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            reset_sequences: true,
        }
    }
}

/// Statistics from one table transfer.
#[derive(Debug, Clone, Default)]
pub struct TransferStats {
    /// Rows sent and confirmed by the recount.
    pub rows: i64,

    /// Batches written.
    pub batches: usize,

    /// Time spent waiting for source batches.
    pub read_time: Duration,

    /// Time spent inserting and committing.
    pub write_time: Duration,

    /// Wall time including the recount.
    pub duration: Duration,
}

impl TransferStats {
    /// Rows per second over the whole transfer.
    pub fn rows_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.rows as f64 / secs
        } else {
            0.0
        }
    }
}

/// Moves rows of one table at a time from source to target.
pub struct TransferEngine<'a> {
    source: &'a dyn SourceConnection,
    target: &'a dyn TargetConnection,
    schema: &'a str,
    config: TransferConfig,
}

impl<'a> TransferEngine<'a> {
    pub fn new(
        source: &'a dyn SourceConnection,
        target: &'a dyn TargetConnection,
        schema: &'a str,
        config: TransferConfig,
    ) -> Self {
        Self {
            source,
            target,
            schema,
            config,
        }
    }

    /// Copy every row of `table` into the (existing, empty) target table.
    ///
    /// # Errors
    ///
    /// `Transfer` if a fetch or an insert fails (the failed batch is rolled
    /// back, earlier batches stay committed), `Verification` if the recount
    /// differs from the rows sent. Connection loss is returned unchanged.
    pub async fn transfer(&self, table: &TableDescriptor) -> Result<TransferStats> {
        let start = Instant::now();
        let insert = InsertStatement::for_table(self.schema, table);
        let width = table.columns.len();
        let mut stats = TransferStats::default();
        let mut progress = Progress::new(&table.name, table.estimated_rows);

        info!(
            "Transferring {} (~{} rows, batch size {})",
            table.name, table.estimated_rows, self.config.batch_size
        );

        // Catalog column order is colno order, which is SELECT * order.
        let sql = format!("SELECT * FROM {}", source_table_ref(&table.name));
        let mut batches = self
            .source
            .stream(&sql, self.config.batch_size)
            .await
            .map_err(|e| transfer_error(&table.name, "opening cursor", e))?;

        loop {
            let read_start = Instant::now();
            let Some(batch) = batches.recv().await else {
                break;
            };
            stats.read_time += read_start.elapsed();

            let rows = batch.map_err(|e| transfer_error(&table.name, "fetching rows", e))?;
            if rows.is_empty() {
                continue;
            }
            if let Some(row) = rows.iter().find(|r| r.len() != width) {
                return Err(MigrateError::transfer(
                    &table.name,
                    format!("fetched row has {} columns, expected {}", row.len(), width),
                ));
            }

            let write_start = Instant::now();
            let batch_number = stats.batches + 1;
            if let Err(e) = self.write_batch(&insert, &rows).await {
                if let Err(rollback) = self.target.rollback().await {
                    warn!("{}: rollback of batch {} failed: {}", table.name, batch_number, rollback);
                }
                return Err(transfer_error(
                    &table.name,
                    &format!("inserting batch {}", batch_number),
                    e,
                ));
            }
            stats.write_time += write_start.elapsed();
            stats.batches = batch_number;
            stats.rows += rows.len() as i64;
            progress.update(stats.rows);
        }
        drop(batches);

        let actual = self.count_target_rows(&table.name).await?;
        if actual != stats.rows {
            return Err(MigrateError::Verification {
                table: table.name.clone(),
                expected: stats.rows,
                actual,
            });
        }

        if self.config.reset_sequences {
            self.reset_sequences(table).await;
        }

        stats.duration = start.elapsed();
        info!(
            "{}: {} rows in {} batches, {:.1}s ({:.0} rows/s)",
            table.name,
            stats.rows,
            stats.batches,
            stats.duration.as_secs_f64(),
            stats.rows_per_second()
        );
        Ok(stats)
    }

    async fn write_batch(&self, insert: &InsertStatement, rows: &[Row]) -> Result<()> {
        let inserted = self.target.execute_batch(insert, rows).await?;
        if inserted != rows.len() as u64 {
            debug!(
                "{}: INSERT reported {} rows for a batch of {}",
                insert.table,
                inserted,
                rows.len()
            );
        }
        self.target.commit().await
    }

    /// Exact row count of the target table.
    pub async fn count_target_rows(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*)::bigint FROM {}", qualify(self.schema, table));
        self.target
            .query_i64(&sql, &[])
            .await
            .map_err(|e| transfer_error(table, "counting target rows", e))
            .map(|count| count.unwrap_or(0))
    }

    /// Move SERIAL sequences past the copied maximum. Failures only warn.
    async fn reset_sequences(&self, table: &TableDescriptor) {
        let qualified = qualify(self.schema, &table.name);
        for column in table.serial_columns() {
            let sql = format!(
                "SELECT setval(pg_get_serial_sequence($1::text, $2::text), \
                 COALESCE(MAX({}), 0) + 1, false) FROM {}",
                column.escaped_name, qualified
            );
            let params = [
                SqlParam::from(qualified.as_str()),
                SqlParam::from(column.name.as_str()),
            ];
            match self.target.query_i64(&sql, &params).await {
                Ok(next) => debug!(
                    "{}.{}: sequence reset, next value {}",
                    table.name,
                    column.name,
                    next.map_or_else(|| "unchanged".to_string(), |v| v.to_string())
                ),
                Err(e) => warn!(
                    "{}: failed to reset sequence of {}: {}",
                    table.name,
                    escape_identifier(&column.name),
                    e.driver_message()
                ),
            }
        }
    }
}

fn transfer_error(table: &str, stage: &str, e: MigrateError) -> MigrateError {
    if e.is_fatal() {
        e
    } else {
        MigrateError::transfer(table, format!("{}: {}", stage, e.driver_message()))
    }
}

/// Logs progress at every 10% of the estimated row count.
struct Progress<'t> {
    table: &'t str,
    estimated: i64,
    next_step: i64,
}

impl<'t> Progress<'t> {
    fn new(table: &'t str, estimated: i64) -> Self {
        Self {
            table,
            estimated,
            next_step: 10,
        }
    }

    fn update(&mut self, rows: i64) {
        if self.estimated <= 0 {
            debug!("{}: {} rows", self.table, rows);
            return;
        }
        let percent = rows.saturating_mul(100) / self.estimated;
        if percent >= self.next_step {
            info!(
                "{}: {} / ~{} rows ({}%)",
                self.table,
                rows,
                self.estimated,
                percent.min(100)
            );
            self.next_step = (percent / 10 + 1) * 10;
        } else {
            debug!("{}: {} rows", self.table, rows);
        }
    }
}
