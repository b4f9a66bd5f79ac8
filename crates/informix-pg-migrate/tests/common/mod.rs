//! In-memory source and target connections for integration tests.
//!
//! `FakeSource` answers the catalog queries the crate issues by matching on
//! their SQL text and streams generated rows. `FakeTarget` records DDL, keeps
//! per-table row counts with commit/rollback semantics and can be told to fail
//! a given batch.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use informix_pg_migrate::core::value::{Batch, Row, SqlParam};
use informix_pg_migrate::target::InsertStatement;
use informix_pg_migrate::{Config, MigrateError, Orchestrator, Result, SourceConnection, TargetConnection};
use tokio::sync::mpsc;

/// SERIAL NOT NULL.
pub const SERIAL_NOT_NULL: i32 = 262;
/// INTEGER.
pub const INTEGER: i32 = 2;
/// VARCHAR; collength is the maximum length.
pub const VARCHAR: i32 = 13;

// =============================================================================
// Source
// =============================================================================

pub struct FakeTable {
    pub tabid: i64,
    pub name: String,
    /// (name, coltype, collength) in colno order.
    pub columns: Vec<(String, i32, i32)>,
    pub rows: Vec<Row>,
}

impl FakeTable {
    /// `id SERIAL NOT NULL, descr VARCHAR(40)` with `row_count` generated rows.
    pub fn numbered(tabid: i64, name: &str, row_count: usize) -> Self {
        let rows = (1..=row_count)
            .map(|i| vec![Some(i.to_string()), Some(format!("{} row {}", name, i))])
            .collect();
        Self {
            tabid,
            name: name.to_string(),
            columns: vec![
                ("id".to_string(), SERIAL_NOT_NULL, 4),
                ("descr".to_string(), VARCHAR, 40),
            ],
            rows,
        }
    }

    pub fn with_columns(tabid: i64, name: &str, columns: &[(&str, i32, i32)]) -> Self {
        Self {
            tabid,
            name: name.to_string(),
            columns: columns
                .iter()
                .map(|(n, t, l)| (n.to_string(), *t, *l))
                .collect(),
            rows: Vec::new(),
        }
    }
}

pub struct FakeIndex {
    pub tabid: i64,
    pub table: String,
    pub name: String,
    pub unique: bool,
    pub parts: Vec<i16>,
}

pub struct FakePrimaryKey {
    pub tabid: i64,
    pub table: String,
    pub constraint: String,
    /// Name of the backing index in `sysindexes`.
    pub index: String,
    pub parts: Vec<i16>,
}

pub struct FakeForeignKey {
    pub tabid: i64,
    pub table: String,
    pub constraint: String,
    pub parent_tabid: i64,
    pub parent_table: String,
    pub parts: Vec<i16>,
    pub parent_parts: Vec<i16>,
    /// `sysreferences.delrule`: C, R or blank.
    pub delete_rule: &'static str,
    pub update_rule: &'static str,
}

#[derive(Default)]
pub struct FakeSource {
    pub tables: Vec<FakeTable>,
    pub indexes: Vec<FakeIndex>,
    pub primary_keys: Vec<FakePrimaryKey>,
    pub foreign_keys: Vec<FakeForeignKey>,
    /// Tables whose COUNT(*) fails with a permission error.
    pub uncountable: Vec<String>,
    queries: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn new(tables: Vec<FakeTable>) -> Self {
        Self {
            tables,
            ..Default::default()
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    fn table_by_id(&self, tabid: i64) -> Result<&FakeTable> {
        self.tables
            .iter()
            .find(|t| t.tabid == tabid)
            .ok_or_else(|| MigrateError::catalog(format!("no table with tabid {}", tabid)))
    }

    /// Accepts the name quoted or bare, as the crate writes it in SQL.
    fn table_by_name(&self, name: &str) -> Result<&FakeTable> {
        let name = name.trim();
        let name = name
            .strip_prefix('"')
            .and_then(|n| n.strip_suffix('"'))
            .unwrap_or(name);
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| MigrateError::catalog(format!("table {} not found", name)))
    }

    fn backs_primary_key(&self, idx: &FakeIndex) -> bool {
        self.primary_keys
            .iter()
            .any(|pk| pk.tabid == idx.tabid && pk.index == idx.name)
    }
}

fn int_param(params: &[SqlParam], idx: usize) -> i64 {
    match &params[idx] {
        SqlParam::Int(v) => *v,
        SqlParam::Text(s) => s.parse().unwrap(),
    }
}

fn text_param(params: &[SqlParam], idx: usize) -> String {
    match &params[idx] {
        SqlParam::Int(v) => v.to_string(),
        SqlParam::Text(s) => s.clone(),
    }
}

fn with_parts(mut row: Row, parts: &[i16]) -> Row {
    for i in 0..16 {
        row.push(parts.get(i).map(|p| p.to_string()));
    }
    row
}

#[async_trait]
impl SourceConnection for FakeSource {
    async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>> {
        self.queries.lock().unwrap().push(sql.to_string());

        if sql.starts_with("SELECT tabid FROM systables WHERE tabid = 1") {
            return Ok(vec![vec![Some("1".to_string())]]);
        }

        if sql.starts_with("SELECT t.tabid, t.tabname, t.nrows FROM systables") {
            let wanted = sql
                .contains("t.tabname = ?")
                .then(|| text_param(params, 0));
            return Ok(self
                .tables
                .iter()
                .filter(|t| wanted.as_ref().map_or(true, |w| &t.name == w))
                .map(|t| {
                    vec![
                        Some(t.tabid.to_string()),
                        Some(t.name.clone()),
                        // Newer catalogs store nrows as FLOAT.
                        Some(format!("{}.0", t.rows.len())),
                    ]
                })
                .collect());
        }

        if sql.starts_with("SELECT colno, colname, coltype, collength FROM syscolumns") {
            let table = self.table_by_id(int_param(params, 0))?;
            return Ok(table
                .columns
                .iter()
                .enumerate()
                .map(|(i, (name, coltype, length))| {
                    vec![
                        Some((i + 1).to_string()),
                        Some(name.clone()),
                        Some(coltype.to_string()),
                        Some(length.to_string()),
                    ]
                })
                .collect());
        }

        if sql.starts_with("SELECT colno, colname FROM syscolumns") {
            let table = self.table_by_id(int_param(params, 0))?;
            let wanted: Vec<i64> = (1..params.len()).map(|i| int_param(params, i)).collect();
            return Ok(table
                .columns
                .iter()
                .enumerate()
                .filter(|(i, _)| wanted.contains(&(*i as i64 + 1)))
                .map(|(i, (name, _, _))| vec![Some((i + 1).to_string()), Some(name.clone())])
                .collect());
        }

        if sql.starts_with("SELECT t.tabid, t.tabname, i.idxname, i.idxtype") {
            let skip_pk = sql.contains("NOT IN") && sql.contains("c.constrtype = 'P'");
            return Ok(self
                .indexes
                .iter()
                .filter(|idx| !(skip_pk && self.backs_primary_key(idx)))
                .map(|idx| {
                    with_parts(
                        vec![
                            Some(idx.tabid.to_string()),
                            Some(idx.table.clone()),
                            Some(idx.name.clone()),
                            Some(if idx.unique { "U" } else { "D" }.to_string()),
                        ],
                        &idx.parts,
                    )
                })
                .collect());
        }

        if sql.starts_with("SELECT t.tabid, t.tabname, c.constrname, c.idxname") {
            return Ok(self
                .primary_keys
                .iter()
                .map(|pk| {
                    with_parts(
                        vec![
                            Some(pk.tabid.to_string()),
                            Some(pk.table.clone()),
                            Some(pk.constraint.clone()),
                            Some(pk.index.clone()),
                        ],
                        &pk.parts,
                    )
                })
                .collect());
        }

        if sql.starts_with("SELECT ct.tabid, ct.tabname, cc.constrname, pt.tabid, pt.tabname") {
            return Ok(self
                .foreign_keys
                .iter()
                .map(|fk| {
                    let row = with_parts(
                        vec![
                            Some(fk.tabid.to_string()),
                            Some(fk.table.clone()),
                            Some(fk.constraint.clone()),
                            Some(fk.parent_tabid.to_string()),
                            Some(fk.parent_table.clone()),
                        ],
                        &fk.parts,
                    );
                    let mut row = with_parts(row, &fk.parent_parts);
                    row.push(Some(fk.delete_rule.to_string()));
                    row.push(Some(fk.update_rule.to_string()));
                    row
                })
                .collect());
        }

        if let Some(rest) = sql.strip_prefix("SELECT COUNT(*) FROM ") {
            let table = self.table_by_name(rest)?;
            if self.uncountable.contains(&table.name) {
                return Err(MigrateError::Source(odbc_api::Error::FailedReadingInput(
                    std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no select permission"),
                )));
            }
            return Ok(vec![vec![Some(table.rows.len().to_string())]]);
        }

        Err(MigrateError::catalog(format!("unexpected source query: {}", sql)))
    }

    async fn stream(&self, sql: &str, batch_size: usize) -> Result<mpsc::Receiver<Result<Batch>>> {
        self.queries.lock().unwrap().push(sql.to_string());
        let name = sql
            .strip_prefix("SELECT * FROM ")
            .ok_or_else(|| MigrateError::catalog(format!("unexpected stream: {}", sql)))?;
        let table = self.table_by_name(name)?;

        let batches: Vec<Batch> = table
            .rows
            .chunks(batch_size.max(1))
            .map(|chunk| chunk.to_vec())
            .collect();
        let (tx, rx) = mpsc::channel(batches.len().max(1));
        for batch in batches {
            tx.try_send(Ok(batch)).unwrap();
        }
        Ok(rx)
    }

    async fn close(&self) {}
}

/// Passes through to a [`FakeSource`] until `streams` tables have been read,
/// then reports a reset socket for every request.
pub struct DroppingSource {
    inner: Arc<FakeSource>,
    streams_left: Mutex<usize>,
}

impl DroppingSource {
    pub fn after_streams(inner: Arc<FakeSource>, streams: usize) -> Self {
        Self {
            inner,
            streams_left: Mutex::new(streams),
        }
    }

    fn dropped(&self) -> bool {
        *self.streams_left.lock().unwrap() == 0
    }

    fn reset() -> MigrateError {
        MigrateError::Source(odbc_api::Error::FailedReadingInput(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        )))
    }
}

#[async_trait]
impl SourceConnection for DroppingSource {
    async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>> {
        if self.dropped() {
            return Err(Self::reset());
        }
        self.inner.query(sql, params).await
    }

    async fn stream(&self, sql: &str, batch_size: usize) -> Result<mpsc::Receiver<Result<Batch>>> {
        {
            let mut left = self.streams_left.lock().unwrap();
            if *left == 0 {
                return Err(Self::reset());
            }
            *left -= 1;
        }
        self.inner.stream(sql, batch_size).await
    }

    async fn close(&self) {}
}

// =============================================================================
// Target
// =============================================================================

#[derive(Default)]
struct TargetState {
    statements: Vec<String>,
    committed: HashMap<String, i64>,
    pending: HashMap<String, i64>,
    batches: HashMap<String, usize>,
    fail_batch: Option<(String, usize)>,
    fatal_table: Option<String>,
    commits: usize,
}

#[derive(Default)]
pub struct FakeTarget {
    state: Mutex<TargetState>,
}

/// Unquoted table name following the `public.` qualifier.
fn table_in(sql: &str) -> Option<String> {
    let start = sql.find("public.")? + "public.".len();
    Some(
        sql[start..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect(),
    )
}

impl FakeTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `batch`-th INSERT into `table` with a data error.
    pub fn fail_on_batch(&self, table: &str, batch: usize) {
        self.state.lock().unwrap().fail_batch = Some((table.to_string(), batch));
    }

    /// Drop the "connection" on the first INSERT into `table`.
    pub fn fatal_on_table(&self, table: &str) {
        self.state.lock().unwrap().fatal_table = Some(table.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_batch = None;
        state.fatal_table = None;
    }

    /// Committed row count, `None` if the table does not exist.
    pub fn row_count(&self, table: &str) -> Option<i64> {
        self.state.lock().unwrap().committed.get(table).copied()
    }

    pub fn set_row_count(&self, table: &str, rows: i64) {
        self.state
            .lock()
            .unwrap()
            .committed
            .insert(table.to_string(), rows);
    }

    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }

    pub fn statements_starting_with(&self, prefix: &str) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|s| s.starts_with(prefix))
            .collect()
    }

    pub fn commits(&self) -> usize {
        self.state.lock().unwrap().commits
    }
}

#[async_trait]
impl TargetConnection for FakeTarget {
    async fn execute(&self, sql: &str, _params: &[SqlParam]) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        state.statements.push(sql.to_string());
        if let Some(table) = table_in(sql) {
            if sql.starts_with("DROP TABLE") {
                state.committed.remove(&table);
            } else if sql.starts_with("CREATE TABLE") || sql.starts_with("TRUNCATE TABLE") {
                state.committed.insert(table, 0);
            }
        }
        Ok(0)
    }

    async fn execute_batch(&self, insert: &InsertStatement, rows: &[Row]) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let number = {
            let counter = state.batches.entry(insert.table.clone()).or_insert(0);
            *counter += 1;
            *counter
        };

        if state.fatal_table.as_deref() == Some(insert.table.as_str()) {
            return Err(MigrateError::connection(
                "server closed the connection unexpectedly",
                "fake target",
            ));
        }
        if state
            .fail_batch
            .as_ref()
            .is_some_and(|(table, batch)| table == &insert.table && *batch == number)
        {
            return Err(MigrateError::transfer(
                &insert.table,
                "value too long for type character varying(40)",
            ));
        }

        *state.pending.entry(insert.table.clone()).or_insert(0) += rows.len() as i64;
        Ok(rows.len() as u64)
    }

    async fn query_i64(&self, sql: &str, params: &[SqlParam]) -> Result<Option<i64>> {
        let state = self.state.lock().unwrap();
        let created = |prefix: &str, marker: &str| {
            state
                .statements
                .iter()
                .filter(|s| s.starts_with(prefix) && s.contains(marker))
                .count() as i64
        };
        if sql.starts_with("SELECT COUNT(*)::bigint FROM information_schema.tables") {
            if sql.contains("table_type = 'BASE TABLE'") {
                return Ok(Some(state.committed.len() as i64));
            }
            let table = text_param(params, 1);
            return Ok(Some(state.committed.contains_key(&table) as i64));
        }
        if sql.starts_with("SELECT COUNT(*)::bigint FROM information_schema.table_constraints") {
            let count = if sql.contains("'PRIMARY KEY'") {
                created("ALTER TABLE", " PRIMARY KEY ")
            } else {
                created("ALTER TABLE", " FOREIGN KEY ")
            };
            return Ok(Some(count));
        }
        if sql.starts_with("SELECT COUNT(*)::bigint FROM pg_catalog.pg_index") {
            return Ok(Some(created("CREATE ", " INDEX ")));
        }
        if sql.starts_with("SELECT COUNT(*)::bigint FROM ") {
            let table = table_in(sql).unwrap_or_default();
            let committed = state.committed.get(&table).copied();
            let pending = state.pending.get(&table).copied();
            return match (committed, pending) {
                (None, None) => Err(MigrateError::transfer(
                    &table,
                    format!("relation \"public.{}\" does not exist", table),
                )),
                (c, p) => Ok(Some(c.unwrap_or(0) + p.unwrap_or(0))),
            };
        }
        if sql.starts_with("SELECT setval") || sql == "SELECT 1::bigint" {
            return Ok(Some(1));
        }
        Err(MigrateError::Validation(format!("unexpected target query: {}", sql)))
    }

    async fn query_text(&self, _sql: &str, _params: &[SqlParam]) -> Result<Vec<Row>> {
        Ok(Vec::new())
    }

    async fn commit(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let pending: Vec<(String, i64)> = state.pending.drain().collect();
        for (table, rows) in pending {
            *state.committed.entry(table).or_insert(0) += rows;
        }
        state.commits += 1;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.state.lock().unwrap().pending.clear();
        Ok(())
    }

    async fn close(&self) {}
}

// =============================================================================
// Helpers
// =============================================================================

pub fn test_config(batch_size: usize, verify_completed_tables: bool) -> Config {
    Config::from_yaml(&format!(
        r#"
source:
  host: ifx.test
  server: ol_test
  database: stores
target:
  host: pg.test
  database: warehouse
  user: loader
migration:
  batch_size: {}
  verify_completed_tables: {}
"#,
        batch_size, verify_completed_tables
    ))
    .unwrap()
}

pub fn orchestrator(
    config: Config,
    source: &Arc<FakeSource>,
    target: &Arc<FakeTarget>,
    checkpoint_dir: &Path,
) -> Orchestrator {
    Orchestrator::with_connections(config, source.clone(), target.clone())
        .with_checkpoint_dir(checkpoint_dir)
}
