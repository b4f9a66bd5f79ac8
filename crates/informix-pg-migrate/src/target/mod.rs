//! PostgreSQL target capability.
//!
//! Engine code talks to the target through [`TargetConnection`]. Statements run
//! inside an implicit transaction that the caller ends with `commit` or
//! `rollback`, so one DDL unit or one data batch is always atomic.

mod postgres;
mod tls;

pub use postgres::PgTarget;
pub use tls::{SslMode, TlsBuilder};

use crate::core::identifier::qualify;
use crate::core::value::{Row, SqlParam};
use crate::error::Result;
use crate::source::TableDescriptor;
use async_trait::async_trait;

/// PostgreSQL caps bind parameters per statement at 65535.
pub const MAX_BIND_PARAMS: usize = 65_535;

/// Trait for target database operations.
#[async_trait]
pub trait TargetConnection: Send + Sync {
    /// Execute one statement, returning the affected row count.
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64>;

    /// Insert rows with bound parameters, returning the number of rows inserted.
    async fn execute_batch(&self, insert: &InsertStatement, rows: &[Row]) -> Result<u64>;

    /// Run a query returning a single integer (`None` for no row or NULL).
    async fn query_i64(&self, sql: &str, params: &[SqlParam]) -> Result<Option<i64>>;

    /// Run a query whose columns are all text (cast in SQL where needed).
    async fn query_text(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>>;

    /// Commit the open transaction, if any.
    async fn commit(&self) -> Result<()>;

    /// Roll back the open transaction, if any.
    async fn rollback(&self) -> Result<()>;

    /// Close the connection.
    async fn close(&self);
}

/// Prepared shape of a table's INSERT: target name, columns and parameter casts.
///
/// Column order is the catalog's column order; rows are bound positionally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    /// Display name used in errors.
    pub table: String,
    /// Schema-qualified, escaped table name.
    pub qualified_table: String,
    /// Escaped column names.
    pub columns: Vec<String>,
    /// Cast applied to each text parameter.
    pub casts: Vec<&'static str>,
    /// Columns whose text is hex and needs the bytea `\x` prefix.
    pub binary: Vec<bool>,
}

impl InsertStatement {
    /// Build the INSERT shape for a table in the target schema.
    pub fn for_table(schema: &str, table: &TableDescriptor) -> Self {
        Self {
            table: table.name.clone(),
            qualified_table: qualify(schema, &table.name),
            columns: table.columns.iter().map(|c| c.escaped_name.clone()).collect(),
            casts: table
                .columns
                .iter()
                .map(|c| c.target_type.cast_type())
                .collect(),
            binary: table
                .columns
                .iter()
                .map(|c| c.target_type.is_binary())
                .collect(),
        }
    }

    /// Largest number of rows that fits in one statement.
    pub fn rows_per_statement(&self) -> usize {
        (MAX_BIND_PARAMS / self.columns.len().max(1)).max(1)
    }

    /// Multi-row `INSERT ... VALUES` with `$n::text::<cast>` placeholders.
    pub fn sql(&self, row_count: usize) -> String {
        let width = self.columns.len();
        let mut values = Vec::with_capacity(row_count);
        for r in 0..row_count {
            let placeholders: Vec<String> = self
                .casts
                .iter()
                .enumerate()
                .map(|(c, cast)| {
                    let n = r * width + c + 1;
                    if *cast == "text" {
                        format!("${}::text", n)
                    } else {
                        format!("${}::text::{}", n, cast)
                    }
                })
                .collect();
            values.push(format!("({})", placeholders.join(", ")));
        }
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.qualified_table,
            self.columns.join(", "),
            values.join(", ")
        )
    }

    /// Flatten rows into parameter values, adding the bytea prefix where needed.
    pub fn params(&self, rows: &[Row]) -> Vec<Option<String>> {
        let mut params = Vec::with_capacity(rows.len() * self.columns.len());
        for row in rows {
            for (value, &binary) in row.iter().zip(&self.binary) {
                params.push(match value {
                    Some(v) if binary && !v.starts_with("\\x") => Some(format!("\\x{}", v)),
                    other => other.clone(),
                });
            }
        }
        params
    }
}
