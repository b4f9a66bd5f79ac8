//! Informix system catalog reader.
//!
//! Enumerates user tables (`tabid > 99`, `tabtype = 'T'`), their columns,
//! primary keys, foreign keys and secondary indexes, decoding the packed
//! encodings into descriptors:
//!
//! - `syscolumns.coltype`/`collength` through [`crate::typemap::map_type`]
//! - `sysindexes.part1..part16` through [`PartSlots`]
//! - `sysreferences.delrule`/`updrule` through [`ReferentialRule`]
//!
//! Enumeration queries fail as a whole only when the query itself fails. A
//! row that cannot be decoded becomes a [`RejectedEntry`] and the remaining
//! rows are still returned.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::parts::{part_columns, PartSlots, PART_SLOTS};
use super::types::*;
use super::SourceConnection;
use crate::core::identifier::escape_identifier;
use crate::core::value::{cell_i64, cell_str, Row, SqlParam};
use crate::error::{MigrateError, Result};
use crate::typemap::{is_not_null, map_type};

/// Reads descriptors from the Informix catalog.
pub struct CatalogReader<'a> {
    source: &'a dyn SourceConnection,
}

const USER_TABLE_FILTER: &str = "t.tabid > 99 AND t.tabtype = 'T'";

impl<'a> CatalogReader<'a> {
    pub fn new(source: &'a dyn SourceConnection) -> Self {
        Self { source }
    }

    /// List user tables, smallest first (by `nrows`, then name).
    pub async fn list_tables(&self) -> Result<CatalogBatch<TableEntry>> {
        let sql = format!(
            "SELECT t.tabid, t.tabname, t.nrows FROM systables t WHERE {} ORDER BY t.nrows, t.tabname",
            USER_TABLE_FILTER
        );
        let rows = self.catalog_query("list tables", &sql, &[]).await?;

        let mut batch = CatalogBatch::default();
        for row in rows {
            match decode_table_entry(&row) {
                Ok(entry) => batch.descriptors.push(entry),
                Err(reason) => batch.rejected.push(RejectedEntry {
                    key: cell_str(&row, 1).unwrap_or("?").to_string(),
                    reason,
                }),
            }
        }
        // nrows is a float in newer catalogs; re-sort on the parsed value.
        batch
            .descriptors
            .sort_by(|a, b| a.estimated_rows.cmp(&b.estimated_rows).then_with(|| a.name.cmp(&b.name)));

        debug!(
            "Catalog lists {} tables ({} rejected)",
            batch.descriptors.len(),
            batch.rejected.len()
        );
        Ok(batch)
    }

    /// Look up a single user table by name.
    pub async fn find_table(&self, name: &str) -> Result<Option<TableEntry>> {
        let sql = format!(
            "SELECT t.tabid, t.tabname, t.nrows FROM systables t WHERE {} AND t.tabname = ?",
            USER_TABLE_FILTER
        );
        let rows = self
            .catalog_query("find table", &sql, &[SqlParam::from(name)])
            .await?;
        rows.first()
            .map(|row| decode_table_entry(row).map_err(MigrateError::Catalog))
            .transpose()
    }

    /// Read a table's columns in `colno` order.
    ///
    /// Type mapping anomalies are logged as warnings and resolved by fallback.
    pub async fn describe_table(&self, entry: &TableEntry) -> Result<TableDescriptor> {
        let rows = self
            .catalog_query(
                &entry.name,
                "SELECT colno, colname, coltype, collength FROM syscolumns WHERE tabid = ? ORDER BY colno",
                &[SqlParam::Int(entry.tabid)],
            )
            .await?;

        if rows.is_empty() {
            return Err(MigrateError::catalog(format!(
                "table {} has no columns in syscolumns",
                entry.name
            )));
        }

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let column = decode_column(row)
                .map_err(|e| MigrateError::catalog(format!("{}: {}", entry.name, e)))?;
            columns.push(column);
        }

        for column in &columns {
            let mapped = map_type(column.raw_type, column.length);
            if let Some(anomaly) = mapped.anomaly {
                warn!("{}.{}: {}", entry.name, column.name, anomaly);
            }
        }

        Ok(TableDescriptor {
            name: entry.name.clone(),
            tabid: entry.tabid,
            columns,
            estimated_rows: entry.estimated_rows,
        })
    }

    /// Enumerate primary key constraints in catalog order.
    pub async fn primary_keys(&self) -> Result<CatalogBatch<PrimaryKeyDescriptor>> {
        let sql = format!(
            "SELECT t.tabid, t.tabname, c.constrname, c.idxname, {} \
             FROM sysconstraints c \
             JOIN systables t ON c.tabid = t.tabid \
             JOIN sysindexes i ON c.idxname = i.idxname AND c.tabid = i.tabid \
             WHERE c.constrtype = 'P' AND {} \
             ORDER BY t.tabname, c.constrname",
            part_columns("i"),
            USER_TABLE_FILTER
        );
        let rows = self.catalog_query("list primary keys", &sql, &[]).await?;

        let mut batch = CatalogBatch::default();
        for row in rows {
            let key = row_key(&row, 1, 2);
            match decode_primary_key(&row) {
                Ok(pk) => batch.descriptors.push(pk),
                Err(reason) => batch.rejected.push(RejectedEntry { key, reason }),
            }
        }
        Ok(batch)
    }

    /// Enumerate foreign key constraints with their referenced side.
    pub async fn foreign_keys(&self) -> Result<CatalogBatch<ForeignKeyDescriptor>> {
        let sql = format!(
            "SELECT ct.tabid, ct.tabname, cc.constrname, pt.tabid, pt.tabname, {}, {}, \
             r.delrule, r.updrule \
             FROM sysconstraints cc \
             JOIN systables ct ON cc.tabid = ct.tabid \
             JOIN sysreferences r ON cc.constrid = r.constrid \
             JOIN sysconstraints pc ON r.primary = pc.constrid \
             JOIN systables pt ON pc.tabid = pt.tabid \
             JOIN sysindexes ci ON cc.idxname = ci.idxname AND cc.tabid = ci.tabid \
             JOIN sysindexes pi ON pc.idxname = pi.idxname AND pc.tabid = pi.tabid \
             WHERE cc.constrtype = 'R' AND ct.tabid > 99 AND pt.tabid > 99 \
             ORDER BY ct.tabname, cc.constrname",
            part_columns("ci"),
            part_columns("pi")
        );
        let rows = self.catalog_query("list foreign keys", &sql, &[]).await?;

        let mut batch = CatalogBatch::default();
        for row in rows {
            let key = row_key(&row, 1, 2);
            match decode_foreign_key(&row) {
                Ok(fk) => batch.descriptors.push(fk),
                Err(reason) => batch.rejected.push(RejectedEntry { key, reason }),
            }
        }
        Ok(batch)
    }

    /// Enumerate secondary indexes, excluding those backing a primary key.
    pub async fn indexes(&self) -> Result<CatalogBatch<IndexDescriptor>> {
        let sql = format!(
            "SELECT t.tabid, t.tabname, i.idxname, i.idxtype, {} \
             FROM sysindexes i \
             JOIN systables t ON i.tabid = t.tabid \
             WHERE {} \
             AND i.idxname NOT IN ( \
                 SELECT c.idxname FROM sysconstraints c \
                 WHERE c.constrtype = 'P' AND c.tabid = i.tabid AND c.idxname IS NOT NULL) \
             ORDER BY t.tabname, i.idxname",
            part_columns("i"),
            USER_TABLE_FILTER
        );
        let rows = self.catalog_query("list indexes", &sql, &[]).await?;

        let mut batch = CatalogBatch::default();
        for row in rows {
            let key = row_key(&row, 1, 2);
            match decode_index(&row) {
                Ok(idx) => batch.descriptors.push(idx),
                Err(reason) => batch.rejected.push(RejectedEntry { key, reason }),
            }
        }
        Ok(batch)
    }

    /// Resolve key column ordinals to names against the owning table.
    ///
    /// Ordinals are table-local, so the lookup is per table and never cached.
    /// An ordinal with no matching column is an error for the owning object.
    pub async fn resolve_columns(
        &self,
        tabid: i64,
        table: &str,
        refs: &[KeyColumnRef],
    ) -> Result<Vec<ResolvedColumn>> {
        if refs.is_empty() {
            return Err(MigrateError::catalog(format!(
                "{}: key has no columns",
                table
            )));
        }

        let placeholders = vec!["?"; refs.len()].join(", ");
        let sql = format!(
            "SELECT colno, colname FROM syscolumns WHERE tabid = ? AND colno IN ({})",
            placeholders
        );
        let mut params = vec![SqlParam::Int(tabid)];
        params.extend(refs.iter().map(|r| SqlParam::Int(r.ordinal as i64)));

        let rows = self.catalog_query(table, &sql, &params).await?;
        let mut names: HashMap<i64, String> = HashMap::new();
        for row in &rows {
            let colno = cell_i64(row, 0)
                .map_err(MigrateError::Catalog)?
                .ok_or_else(|| MigrateError::catalog(format!("{}: NULL colno", table)))?;
            let name = cell_str(row, 1)
                .filter(|n| !n.is_empty())
                .ok_or_else(|| MigrateError::catalog(format!("{}: NULL colname", table)))?;
            names.insert(colno, name.to_string());
        }

        refs.iter()
            .map(|r| {
                names
                    .get(&(r.ordinal as i64))
                    .map(|name| ResolvedColumn {
                        name: name.clone(),
                        order: r.order,
                    })
                    .ok_or_else(|| {
                        MigrateError::catalog(format!(
                            "{}: column ordinal {} does not exist",
                            table, r.ordinal
                        ))
                    })
            })
            .collect()
    }

    /// Exact row count of a source table.
    pub async fn count_rows(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", source_table_ref(table));
        let rows = self.catalog_query(table, &sql, &[]).await?;
        rows.first()
            .map(|row| cell_i64(row, 0))
            .transpose()
            .map_err(MigrateError::Catalog)?
            .flatten()
            .ok_or_else(|| MigrateError::catalog(format!("{}: COUNT(*) returned no row", table)))
    }

    async fn catalog_query(&self, what: &str, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>> {
        self.source.query(sql, params).await.map_err(|e| {
            if e.is_fatal() {
                e
            } else {
                MigrateError::catalog(format!("{}: {}", what, e))
            }
        })
    }
}

/// Table name as written in source SQL.
///
/// Names that are not plain lower-case identifiers are double-quoted, which
/// Informix reads as a delimited identifier because the connection sets
/// DELIMIDENT.
pub fn source_table_ref(table: &str) -> String {
    escape_identifier(table)
}

fn row_key(row: &Row, table_idx: usize, name_idx: usize) -> String {
    format!(
        "{}.{}",
        cell_str(row, table_idx).unwrap_or("?"),
        cell_str(row, name_idx).unwrap_or("?")
    )
}

fn required_str(row: &Row, idx: usize, what: &str) -> std::result::Result<String, String> {
    cell_str(row, idx)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| format!("{} is NULL", what))
}

fn required_i64(row: &Row, idx: usize, what: &str) -> std::result::Result<i64, String> {
    cell_i64(row, idx)?.ok_or_else(|| format!("{} is NULL", what))
}

/// Parse `nrows`, which older catalogs store as INTEGER and newer ones as FLOAT.
fn parse_row_estimate(row: &Row, idx: usize) -> std::result::Result<i64, String> {
    match cell_str(row, idx) {
        None | Some("") => Ok(0),
        Some(s) => s
            .parse::<i64>()
            .or_else(|_| s.parse::<f64>().map(|f| f.max(0.0) as i64))
            .map_err(|_| format!("nrows is not numeric: {:?}", s)),
    }
}

fn decode_table_entry(row: &Row) -> std::result::Result<TableEntry, String> {
    Ok(TableEntry {
        tabid: required_i64(row, 0, "tabid")?,
        name: required_str(row, 1, "tabname")?,
        estimated_rows: parse_row_estimate(row, 2)?,
    })
}

fn decode_column(row: &Row) -> std::result::Result<ColumnDescriptor, String> {
    let ordinal = required_i64(row, 0, "colno")?;
    let name = required_str(row, 1, "colname")?;
    let raw_type = required_i64(row, 2, "coltype")?;
    let length = cell_i64(row, 3)?.unwrap_or(0);

    let ordinal = i16::try_from(ordinal).map_err(|_| format!("colno {} out of range", ordinal))?;
    let raw_type = i32::try_from(raw_type).map_err(|_| format!("coltype {} out of range", raw_type))?;
    let length = i32::try_from(length).map_err(|_| format!("collength {} out of range", length))?;

    let mapped = map_type(raw_type, length);
    Ok(ColumnDescriptor {
        escaped_name: escape_identifier(&name),
        name,
        ordinal,
        raw_type,
        source_type: mapped.source,
        length,
        target_type: mapped.target,
        nullable: !is_not_null(raw_type),
    })
}

fn decode_primary_key(row: &Row) -> std::result::Result<PrimaryKeyDescriptor, String> {
    let columns = PartSlots::from_row(row, 4)?.decode();
    if columns.is_empty() {
        return Err("primary key index has no columns".to_string());
    }
    Ok(PrimaryKeyDescriptor {
        tabid: required_i64(row, 0, "tabid")?,
        table: required_str(row, 1, "tabname")?,
        constraint_name: required_str(row, 2, "constrname")?,
        index_name: cell_str(row, 3).unwrap_or_default().to_string(),
        columns,
    })
}

fn decode_foreign_key(row: &Row) -> std::result::Result<ForeignKeyDescriptor, String> {
    let child_start = 5;
    let parent_start = child_start + PART_SLOTS;
    let rules_start = parent_start + PART_SLOTS;

    let columns = PartSlots::from_row(row, child_start)?.decode();
    let referenced_columns = PartSlots::from_row(row, parent_start)?.decode();
    if columns.is_empty() {
        return Err("foreign key index has no columns".to_string());
    }
    if columns.len() != referenced_columns.len() {
        return Err(format!(
            "foreign key has {} columns but referenced key has {}",
            columns.len(),
            referenced_columns.len()
        ));
    }

    Ok(ForeignKeyDescriptor {
        tabid: required_i64(row, 0, "tabid")?,
        table: required_str(row, 1, "tabname")?,
        constraint_name: required_str(row, 2, "constrname")?,
        referenced_tabid: required_i64(row, 3, "referenced tabid")?,
        referenced_table: required_str(row, 4, "referenced tabname")?,
        columns,
        referenced_columns,
        on_delete: ReferentialRule::from_code(cell_str(row, rules_start)),
        on_update: ReferentialRule::from_code(cell_str(row, rules_start + 1)),
    })
}

fn decode_index(row: &Row) -> std::result::Result<IndexDescriptor, String> {
    let columns = PartSlots::from_row(row, 4)?.decode();
    if columns.is_empty() {
        return Err("index has no columns".to_string());
    }
    Ok(IndexDescriptor {
        tabid: required_i64(row, 0, "tabid")?,
        table: required_str(row, 1, "tabname")?,
        // Trimmed like every catalog cell; normalize_index_name handles
        // the digit that system names then start with.
        name: cell_str(row, 2).unwrap_or_default().to_string(),
        unique: cell_str(row, 3).is_some_and(|t| t.eq_ignore_ascii_case("U")),
        columns,
    })
}
