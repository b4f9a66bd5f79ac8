//! Target schema creation.
//!
//! Each DDL unit (one table, one key or one index) runs in its own
//! transaction. A failed unit is rolled back and reported as
//! [`MigrateError::Ddl`]; whether that aborts anything is the caller's call.

pub mod ddl;

use tracing::{debug, warn};

use crate::core::value::SqlParam;
use crate::error::{MigrateError, Result};
use crate::source::{
    ForeignKeyDescriptor, IndexDescriptor, PrimaryKeyDescriptor, ResolvedColumn, TableDescriptor,
};
use crate::target::TargetConnection;

/// Creates tables, keys and indexes in the target schema.
pub struct SchemaBuilder<'a> {
    target: &'a dyn TargetConnection,
    schema: &'a str,
}

impl<'a> SchemaBuilder<'a> {
    pub fn new(target: &'a dyn TargetConnection, schema: &'a str) -> Self {
        Self { target, schema }
    }

    /// Drop any same-named table and create it from the descriptor.
    pub async fn create_table(&self, table: &TableDescriptor) -> Result<()> {
        self.run_unit(
            &table.name,
            &[
                ddl::drop_table(self.schema, &table.name),
                ddl::create_table(self.schema, table),
            ],
        )
        .await?;
        debug!("Created table {}.{}", self.schema, table.name);
        Ok(())
    }

    /// Add a primary key over already resolved columns.
    pub async fn create_primary_key(
        &self,
        pk: &PrimaryKeyDescriptor,
        columns: &[ResolvedColumn],
    ) -> Result<()> {
        self.run_unit(
            &pk.key(),
            &[ddl::add_primary_key(self.schema, &pk.table, columns)],
        )
        .await?;
        debug!("Created primary key {} on {}", ddl::primary_key_name(&pk.table), pk.table);
        Ok(())
    }

    /// Add a foreign key. Child and parent columns pair up by position.
    pub async fn create_foreign_key(
        &self,
        fk: &ForeignKeyDescriptor,
        columns: &[ResolvedColumn],
        referenced: &[ResolvedColumn],
    ) -> Result<()> {
        if columns.len() != referenced.len() {
            return Err(MigrateError::ddl(
                fk.key(),
                format!(
                    "{} child columns but {} referenced columns",
                    columns.len(),
                    referenced.len()
                ),
            ));
        }
        self.run_unit(
            &fk.key(),
            &[ddl::add_foreign_key(self.schema, fk, columns, referenced)],
        )
        .await?;
        debug!(
            "Created foreign key {} on {}",
            ddl::foreign_key_name(&fk.table, &fk.constraint_name),
            fk.table
        );
        Ok(())
    }

    /// Create a secondary index under its normalized name.
    pub async fn create_index(&self, index: &IndexDescriptor, columns: &[ResolvedColumn]) -> Result<()> {
        self.run_unit(
            &index.key(),
            &[ddl::create_index(self.schema, index, columns)],
        )
        .await?;
        debug!("Created index {} on {}", ddl::index_name(index), index.table);
        Ok(())
    }

    /// Remove all rows from a table, keeping its definition.
    pub async fn truncate_table(&self, table: &str) -> Result<()> {
        self.run_unit(table, &[ddl::truncate_table(self.schema, table)])
            .await
    }

    /// Whether a table exists in the target schema.
    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let count = self
            .target
            .query_i64(
                "SELECT COUNT(*)::bigint FROM information_schema.tables \
                 WHERE table_schema = $1::text AND table_name = $2::text",
                &[SqlParam::from(self.schema), SqlParam::from(table)],
            )
            .await?;
        Ok(count.unwrap_or(0) > 0)
    }

    async fn run_unit(&self, object: &str, statements: &[String]) -> Result<()> {
        for sql in statements {
            if let Err(e) = self.target.execute(sql, &[]).await {
                if let Err(rollback) = self.target.rollback().await {
                    warn!("Rollback after failed DDL on {} failed: {}", object, rollback);
                }
                return Err(if e.is_fatal() {
                    e
                } else {
                    MigrateError::ddl(object, e.driver_message())
                });
            }
        }
        self.target.commit().await.map_err(|e| {
            if e.is_fatal() {
                e
            } else {
                MigrateError::ddl(object, e.driver_message())
            }
        })
    }
}
