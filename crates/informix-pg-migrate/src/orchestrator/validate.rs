//! Post-migration validation.
//!
//! Compares the target schema with the source catalog and inspects the
//! checkpoint files. Every check produces a [`CheckResult`]; any
//! [`CheckStatus::Fail`] makes the whole report fail.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::Orchestrator;
use crate::core::value::{cell_str, SqlParam};
use crate::error::{MigrateError, Result};
use crate::source::CatalogReader;
use crate::state::{CheckpointRecord, MigrationConcern};

/// Precision above which a NUMERIC column is reported as suspicious.
const MAX_SANE_NUMERIC_PRECISION: i64 = 1000;

/// Share of empty tables above which a warning is raised.
const EMPTY_TABLE_WARN_RATIO: f64 = 0.10;

/// Object counts compared between source and target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ObjectCounts {
    tables: i64,
    primary_keys: i64,
    foreign_keys: i64,
    indexes: i64,
}

/// Status of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CheckStatus::Pass => "PASS",
            CheckStatus::Warn => "WARN",
            CheckStatus::Fail => "FAIL",
        })
    }
}

/// One validation check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub category: String,
    pub name: String,
    pub status: CheckStatus,
    pub details: BTreeMap<String, String>,
}

impl CheckResult {
    fn new(category: &str, name: impl Into<String>, status: CheckStatus) -> Self {
        Self {
            category: category.to_string(),
            name: name.into(),
            status,
            details: BTreeMap::new(),
        }
    }

    fn detail(mut self, key: &str, value: impl ToString) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }
}

/// Counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ValidationSummary {
    pub total: usize,
    pub passed: usize,
    pub warnings: usize,
    pub failed: usize,
}

/// All checks of one validation run.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub generated_at: DateTime<Utc>,
    pub schema: String,
    pub checks: Vec<CheckResult>,
    pub summary: ValidationSummary,
}

impl ValidationReport {
    fn new(schema: &str) -> Self {
        Self {
            generated_at: Utc::now(),
            schema: schema.to_string(),
            checks: Vec::new(),
            summary: ValidationSummary::default(),
        }
    }

    fn push(&mut self, check: CheckResult) {
        self.summary.total += 1;
        match check.status {
            CheckStatus::Pass => self.summary.passed += 1,
            CheckStatus::Warn => self.summary.warnings += 1,
            CheckStatus::Fail => self.summary.failed += 1,
        }
        self.checks.push(check);
    }

    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Plain text listing grouped by category, in check order.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let mut categories: Vec<&str> = Vec::new();
        for check in &self.checks {
            if !categories.contains(&check.category.as_str()) {
                categories.push(&check.category);
            }
        }

        let _ = writeln!(out, "Validation of schema {} at {}", self.schema, self.generated_at.to_rfc3339());
        for category in categories {
            let _ = writeln!(out, "\n[{}]", category);
            for check in self.checks.iter().filter(|c| c.category == category) {
                let _ = write!(out, "  {} {}", check.status, check.name);
                if !check.details.is_empty() {
                    let details: Vec<String> = check
                        .details
                        .iter()
                        .map(|(k, v)| format!("{}={}", k, v))
                        .collect();
                    let _ = write!(out, " ({})", details.join(", "));
                }
                out.push('\n');
            }
        }
        let _ = writeln!(
            out,
            "\nSummary: {} checks, {} passed, {} warnings, {} failed",
            self.summary.total, self.summary.passed, self.summary.warnings, self.summary.failed
        );
        out
    }

    /// `Err(Validation)` when any check failed.
    pub fn into_result(self) -> Result<Self> {
        if self.has_failures() {
            Err(MigrateError::Validation(format!(
                "{} of {} checks failed",
                self.summary.failed, self.summary.total
            )))
        } else {
            Ok(self)
        }
    }
}

impl Orchestrator {
    /// Validate the target schema against the source catalog and checkpoints.
    pub async fn validate(&self) -> Result<ValidationReport> {
        let schema = self.config.target.schema.clone();
        let mut report = ValidationReport::new(&schema);
        let catalog = self.catalog();

        // Tables and row counts.
        let listing = catalog.list_tables().await?;
        let tables: Vec<String> = listing
            .descriptors
            .iter()
            .filter(|t| self.config.migration.table_selected(&t.name))
            .map(|t| t.name.clone())
            .collect();

        let target_counts = self.target_counts().await?;
        let target_tables = target_counts.tables;
        let status = if target_tables == tables.len() as i64 {
            CheckStatus::Pass
        } else {
            CheckStatus::Fail
        };
        report.push(
            CheckResult::new("tables", "table count", status)
                .detail("source", tables.len())
                .detail("target", target_tables),
        );

        let schema_builder = self.schema_builder();
        let engine = self.transfer_engine();
        let mut empty_tables = 0usize;
        for table in &tables {
            // Count failures are reported per table; only a lost link aborts.
            let source_rows = match catalog.count_rows(table).await {
                Ok(rows) => rows,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    report.push(count_error(table, "source", &e));
                    continue;
                }
            };
            if !schema_builder.table_exists(table).await? {
                report.push(
                    CheckResult::new("row_counts", table.as_str(), CheckStatus::Fail)
                        .detail("source", source_rows)
                        .detail("target", "missing"),
                );
                continue;
            }
            let target_rows = match engine.count_target_rows(table).await {
                Ok(rows) => rows,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    report.push(count_error(table, "target", &e));
                    continue;
                }
            };
            if target_rows == 0 {
                empty_tables += 1;
            }
            let status = if source_rows == target_rows {
                CheckStatus::Pass
            } else {
                CheckStatus::Fail
            };
            report.push(
                CheckResult::new("row_counts", table.as_str(), status)
                    .detail("source", source_rows)
                    .detail("target", target_rows),
            );
        }

        if !tables.is_empty() {
            let ratio = empty_tables as f64 / tables.len() as f64;
            let status = if ratio > EMPTY_TABLE_WARN_RATIO {
                CheckStatus::Warn
            } else {
                CheckStatus::Pass
            };
            report.push(
                CheckResult::new("row_counts", "empty tables", status)
                    .detail("empty", empty_tables)
                    .detail("percent", format!("{:.1}", ratio * 100.0)),
            );
        }

        // Column types.
        let oversized = self
            .target
            .query_text(
                "SELECT table_name::text, column_name::text, numeric_precision::text \
                 FROM information_schema.columns \
                 WHERE table_schema = $1::text AND data_type = 'numeric' AND numeric_precision > $2::bigint \
                 ORDER BY table_name, column_name",
                &[SqlParam::from(schema.as_str()), SqlParam::Int(MAX_SANE_NUMERIC_PRECISION)],
            )
            .await?;
        let mut check = CheckResult::new(
            "data_types",
            format!("numeric precision <= {}", MAX_SANE_NUMERIC_PRECISION),
            if oversized.is_empty() {
                CheckStatus::Pass
            } else {
                CheckStatus::Fail
            },
        );
        for row in &oversized {
            check = check.detail(
                &format!("{}.{}", cell_str(row, 0).unwrap_or("?"), cell_str(row, 1).unwrap_or("?")),
                cell_str(row, 2).unwrap_or("?"),
            );
        }
        report.push(check);

        // Constraints and indexes.
        let source_counts = self.source_counts(&catalog, tables.len()).await?;
        for (name, source, target) in [
            ("primary keys", source_counts.primary_keys, target_counts.primary_keys),
            ("foreign keys", source_counts.foreign_keys, target_counts.foreign_keys),
            ("indexes", source_counts.indexes, target_counts.indexes),
        ] {
            let status = if source == target {
                CheckStatus::Pass
            } else {
                CheckStatus::Warn
            };
            report.push(
                CheckResult::new("constraints", name, status)
                    .detail("source", source)
                    .detail("target", target),
            );
        }

        let without_pk = self
            .target
            .query_text(
                "SELECT t.table_name::text FROM information_schema.tables t \
                 WHERE t.table_schema = $1::text AND t.table_type = 'BASE TABLE' \
                 AND NOT EXISTS (SELECT 1 FROM information_schema.table_constraints c \
                     WHERE c.table_schema = t.table_schema AND c.table_name = t.table_name \
                     AND c.constraint_type = 'PRIMARY KEY') \
                 ORDER BY 1",
                &[SqlParam::from(schema.as_str())],
            )
            .await?;
        let names: Vec<&str> = without_pk.iter().filter_map(|r| cell_str(r, 0)).collect();
        let mut check = CheckResult::new(
            "constraints",
            "tables without primary key",
            if names.is_empty() {
                CheckStatus::Pass
            } else {
                CheckStatus::Warn
            },
        )
        .detail("count", names.len());
        if !names.is_empty() {
            check = check.detail("tables", names.join(" "));
        }
        report.push(check);

        // Checkpoints.
        for concern in MigrationConcern::ALL {
            report.push(self.checkpoint_check(concern)?);
        }

        if report.has_failures() {
            warn!(
                "Validation: {} of {} checks failed",
                report.summary.failed, report.summary.total
            );
        } else {
            info!(
                "Validation: {} checks passed, {} warnings",
                report.summary.passed, report.summary.warnings
            );
        }
        Ok(report)
    }

    fn checkpoint_check(&self, concern: MigrationConcern) -> Result<CheckResult> {
        let path = concern.path_in(&self.checkpoint_dir);
        let name = concern.file_name();
        let Some(record) = CheckpointRecord::read(&path)? else {
            return Ok(CheckResult::new("checkpoints", name, CheckStatus::Warn).detail("file", "missing"));
        };

        let status = if record.failed.is_empty() {
            CheckStatus::Pass
        } else {
            CheckStatus::Fail
        };
        let mut check = CheckResult::new("checkpoints", name, status)
            .detail("completed", record.completed.len())
            .detail("failed", record.failed.len());
        for failure in &record.failed {
            check = check.detail(&failure.key, &failure.detail);
        }
        Ok(check)
    }

    async fn target_count(&self, sql: &str) -> Result<i64> {
        Ok(self
            .target
            .query_i64(sql, &[SqlParam::from(self.config.target.schema.as_str())])
            .await?
            .unwrap_or(0))
    }

    /// Source objects the migration concerns would have created.
    ///
    /// Uses the same table selection as the migration runs, so excluded
    /// tables and their keys and indexes are not counted.
    async fn source_counts(&self, catalog: &CatalogReader<'_>, tables: usize) -> Result<ObjectCounts> {
        let migration = &self.config.migration;
        let primary_keys = catalog
            .primary_keys()
            .await?
            .descriptors
            .iter()
            .filter(|pk| migration.table_selected(&pk.table))
            .count();
        let foreign_keys = catalog
            .foreign_keys()
            .await?
            .descriptors
            .iter()
            .filter(|fk| migration.table_selected(&fk.table) && migration.table_selected(&fk.referenced_table))
            .count();
        let indexes = catalog
            .indexes()
            .await?
            .descriptors
            .iter()
            .filter(|idx| migration.table_selected(&idx.table))
            .count();

        Ok(ObjectCounts {
            tables: tables as i64,
            primary_keys: primary_keys as i64,
            foreign_keys: foreign_keys as i64,
            indexes: indexes as i64,
        })
    }

    async fn target_counts(&self) -> Result<ObjectCounts> {
        Ok(ObjectCounts {
            tables: self
                .target_count(
                    "SELECT COUNT(*)::bigint FROM information_schema.tables \
                     WHERE table_schema = $1::text AND table_type = 'BASE TABLE'",
                )
                .await?,
            primary_keys: self
                .target_count(
                    "SELECT COUNT(*)::bigint FROM information_schema.table_constraints \
                     WHERE table_schema = $1::text AND constraint_type = 'PRIMARY KEY'",
                )
                .await?,
            foreign_keys: self
                .target_count(
                    "SELECT COUNT(*)::bigint FROM information_schema.table_constraints \
                     WHERE table_schema = $1::text AND constraint_type = 'FOREIGN KEY'",
                )
                .await?,
            indexes: self
                .target_count(
                    "SELECT COUNT(*)::bigint FROM pg_catalog.pg_index x \
                     JOIN pg_catalog.pg_class c ON c.oid = x.indrelid \
                     JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
                     WHERE n.nspname = $1::text AND NOT x.indisprimary",
                )
                .await?,
        })
    }
}

fn count_error(table: &str, side: &str, e: &MigrateError) -> CheckResult {
    CheckResult::new("row_counts", table, CheckStatus::Fail)
        .detail(side, "error")
        .detail("error", e.driver_message())
}
