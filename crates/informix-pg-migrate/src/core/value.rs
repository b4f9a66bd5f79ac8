//! Value types exchanged between the source and target connections.
//!
//! The source driver fetches every column as text (ODBC `SQL_C_CHAR`), so a
//! row is a vector of optional strings in catalog column order. The target
//! casts each text parameter to the column's type inside the INSERT, which
//! keeps the transfer path free of per-type conversions.

use std::fmt;

/// One fetched row. `None` is SQL NULL.
pub type Row = Vec<Option<String>>;

/// A batch of rows as produced by one cursor fetch.
pub type Batch = Vec<Row>;

/// Bound parameter for catalog and bookkeeping queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Int(i64),
    Text(String),
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        SqlParam::Int(v)
    }
}

impl From<i32> for SqlParam {
    fn from(v: i32) -> Self {
        SqlParam::Int(v as i64)
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        SqlParam::Text(v.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(v: String) -> Self {
        SqlParam::Text(v)
    }
}

impl fmt::Display for SqlParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlParam::Int(v) => write!(f, "{}", v),
            SqlParam::Text(v) => write!(f, "'{}'", v),
        }
    }
}

/// Read a text cell, trimmed. Informix pads CHAR catalog columns with spaces.
pub fn cell_str(row: &Row, idx: usize) -> Option<&str> {
    row.get(idx).and_then(|c| c.as_deref()).map(str::trim)
}

/// Read an integer cell. NULL and empty cells read as `None`.
pub fn cell_i64(row: &Row, idx: usize) -> Result<Option<i64>, String> {
    match cell_str(row, idx) {
        None | Some("") => Ok(None),
        Some(s) => s
            .parse::<i64>()
            .map(Some)
            .map_err(|_| format!("column {} is not an integer: {:?}", idx, s)),
    }
}
