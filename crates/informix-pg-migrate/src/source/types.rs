//! Catalog descriptors.
//!
//! Descriptors are immutable values built by the catalog reader and borrowed by
//! the schema builder and transfer engine. Key and index columns are stored as
//! table-local ordinals and resolved to names only when the owning object is
//! processed.

use std::fmt;

use crate::typemap::{SourceType, TargetType};

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Column name as stored in the catalog.
    pub name: String,

    /// Name as emitted in SQL (quoted when reserved or not a plain identifier).
    pub escaped_name: String,

    /// 1-based column number (`syscolumns.colno`).
    pub ordinal: i16,

    /// Raw `coltype`, including the NOT NULL flag.
    pub raw_type: i32,

    /// Decoded base type.
    pub source_type: SourceType,

    /// Raw `collength`.
    pub length: i32,

    /// Mapped PostgreSQL type.
    pub target_type: TargetType,

    pub nullable: bool,
}

impl ColumnDescriptor {
    /// Column definition for CREATE TABLE.
    pub fn definition(&self) -> String {
        if self.nullable {
            format!("{} {}", self.escaped_name, self.target_type)
        } else {
            format!("{} {} NOT NULL", self.escaped_name, self.target_type)
        }
    }
}

/// A user table as listed in `systables`, before its columns are read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub tabid: i64,
    pub name: String,
    /// `systables.nrows`, as of the last UPDATE STATISTICS.
    pub estimated_rows: i64,
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    /// Table name as stored in the catalog.
    pub name: String,

    /// `systables.tabid`.
    pub tabid: i64,

    /// Columns in `colno` order.
    pub columns: Vec<ColumnDescriptor>,

    /// `systables.nrows`, as of the last UPDATE STATISTICS. Progress only.
    pub estimated_rows: i64,
}

impl TableDescriptor {
    /// Look up a column by its 1-based ordinal.
    pub fn column(&self, ordinal: i16) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.ordinal == ordinal)
    }

    /// Columns that own a sequence in the target.
    pub fn serial_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.target_type.is_serial())
    }
}

/// Sort direction of a key or index column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Asc => f.write_str("ASC"),
            SortOrder::Desc => f.write_str("DESC"),
        }
    }
}

/// One decoded part slot: a table-local column ordinal and its direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyColumnRef {
    pub ordinal: i16,
    pub order: SortOrder,
}

/// A key column after ordinal lookup against the owning table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumn {
    pub name: String,
    pub order: SortOrder,
}

impl ResolvedColumn {
    /// Escaped name for DDL.
    pub fn escaped(&self) -> String {
        crate::core::identifier::escape_identifier(&self.name)
    }
}

/// Delete or update rule of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferentialRule {
    Cascade,
    Restrict,
    /// No explicit clause is rendered.
    #[default]
    NoAction,
}

impl ReferentialRule {
    /// Decode a `sysreferences.delrule`/`updrule` code.
    pub fn from_code(code: Option<&str>) -> Self {
        match code.map(str::trim) {
            Some("C") => ReferentialRule::Cascade,
            Some("R") => ReferentialRule::Restrict,
            _ => ReferentialRule::NoAction,
        }
    }

    /// SQL action keyword, or `None` when nothing should be rendered.
    pub fn action(&self) -> Option<&'static str> {
        match self {
            ReferentialRule::Cascade => Some("CASCADE"),
            ReferentialRule::Restrict => Some("RESTRICT"),
            ReferentialRule::NoAction => None,
        }
    }
}

/// Primary key constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKeyDescriptor {
    pub table: String,
    pub tabid: i64,
    pub constraint_name: String,
    pub index_name: String,
    pub columns: Vec<KeyColumnRef>,
}

impl PrimaryKeyDescriptor {
    /// Checkpoint key.
    pub fn key(&self) -> String {
        format!("{}.{}", self.table, self.constraint_name)
    }
}

/// Foreign key constraint with its referenced (parent) side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDescriptor {
    pub table: String,
    pub tabid: i64,
    pub constraint_name: String,
    pub columns: Vec<KeyColumnRef>,
    pub referenced_table: String,
    pub referenced_tabid: i64,
    pub referenced_columns: Vec<KeyColumnRef>,
    pub on_delete: ReferentialRule,
    pub on_update: ReferentialRule,
}

impl ForeignKeyDescriptor {
    /// Checkpoint key.
    pub fn key(&self) -> String {
        format!("{}.{}", self.table, self.constraint_name)
    }
}

/// Secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    pub table: String,
    pub tabid: i64,
    pub name: String,
    pub unique: bool,
    pub columns: Vec<KeyColumnRef>,
}

impl IndexDescriptor {
    /// Checkpoint key.
    pub fn key(&self) -> String {
        format!("{}.{}", self.table, self.name)
    }
}

/// A catalog row that could not be decoded into a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedEntry {
    /// Checkpoint-style key of the object, as far as it could be read.
    pub key: String,
    pub reason: String,
}

/// Descriptors from one enumeration, plus the rows that failed to decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogBatch<T> {
    pub descriptors: Vec<T>,
    pub rejected: Vec<RejectedEntry>,
}

impl<T> Default for CatalogBatch<T> {
    fn default() -> Self {
        Self {
            descriptors: Vec::new(),
            rejected: Vec::new(),
        }
    }
}
