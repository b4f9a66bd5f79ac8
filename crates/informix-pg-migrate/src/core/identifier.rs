//! Identifier normalization, escaping and quoting for PostgreSQL DDL.
//!
//! Identifiers (table, column, constraint and index names) cannot be passed as
//! bound parameters, so every statement that names an object interpolates it
//! into SQL text. All such names come from the Informix catalog and go through
//! this module first:
//!
//! - [`escape_identifier`] for table and column names, which are kept as-is
//!   and only quoted when PostgreSQL would misread them
//! - [`normalize_index_name`] for index names, which Informix allows to start
//!   with spaces or digits (system-generated names look like `" 101_3"`)
//! - [`truncate_identifier`] for synthesized constraint names
//!
//! Data values never go through here; they are always bound parameters.

use crate::error::{MigrateError, Result};

/// PostgreSQL's identifier length ceiling (NAMEDATALEN - 1).
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Prefix for index names that would otherwise start with a digit.
pub const INDEX_DIGIT_PREFIX: &str = "idx_";

/// Words that must be quoted when used as a table or column name.
///
/// PostgreSQL's reserved key words plus the type and function names that
/// Informix schemas commonly use as column names.
const RESERVED_WORDS: &[&str] = &[
    "all",
    "alter",
    "analyse",
    "analyze",
    "and",
    "any",
    "array",
    "as",
    "asc",
    "asymmetric",
    "authorization",
    "between",
    "binary",
    "both",
    "case",
    "cast",
    "check",
    "collate",
    "collation",
    "column",
    "concurrently",
    "constraint",
    "create",
    "cross",
    "current_catalog",
    "current_date",
    "current_role",
    "current_schema",
    "current_time",
    "current_timestamp",
    "current_user",
    "date",
    "default",
    "deferrable",
    "delete",
    "desc",
    "distinct",
    "do",
    "drop",
    "else",
    "end",
    "except",
    "exists",
    "extract",
    "false",
    "fetch",
    "for",
    "foreign",
    "freeze",
    "from",
    "full",
    "grant",
    "group",
    "having",
    "ilike",
    "in",
    "index",
    "initially",
    "inner",
    "insert",
    "intersect",
    "interval",
    "into",
    "is",
    "isnull",
    "join",
    "key",
    "lateral",
    "leading",
    "left",
    "like",
    "limit",
    "localtime",
    "localtimestamp",
    "natural",
    "not",
    "notnull",
    "null",
    "offset",
    "on",
    "only",
    "or",
    "order",
    "outer",
    "overlaps",
    "placing",
    "primary",
    "references",
    "returning",
    "right",
    "select",
    "session_user",
    "similar",
    "some",
    "symmetric",
    "system_user",
    "table",
    "tablesample",
    "then",
    "time",
    "timestamp",
    "to",
    "trailing",
    "true",
    "union",
    "unique",
    "update",
    "user",
    "using",
    "variadic",
    "verbose",
    "view",
    "when",
    "where",
    "window",
    "with",
];

/// Validate an identifier before it is interpolated into SQL.
///
/// Rejects empty identifiers and identifiers containing null bytes.
/// Length is not checked here: PostgreSQL truncates long names itself and
/// synthesized names are truncated with [`truncate_identifier`].
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    Ok(())
}

/// Whether `name` case-insensitively matches a reserved word.
pub fn is_reserved_word(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    RESERVED_WORDS.binary_search(&lower.as_str()).is_ok()
}

/// Whether PostgreSQL reads `name` unquoted as exactly this identifier.
fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '$')
}

/// Quote an identifier verbatim, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Escape a table or column name for use in DDL and DML.
///
/// Reserved words are quoted with their case preserved. Names PostgreSQL
/// would fold or reject unquoted (upper case, spaces, leading digits) are
/// quoted as well. Everything else is emitted as-is.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(escape_identifier("customer"), "customer");
/// assert_eq!(escape_identifier("user"), "\"user\"");
/// assert_eq!(escape_identifier("Order"), "\"Order\"");
/// ```
pub fn escape_identifier(name: &str) -> String {
    if is_reserved_word(name) || !is_plain_identifier(name) {
        quote_identifier(name)
    } else {
        name.to_string()
    }
}

/// Qualify a table name with its target schema.
pub fn qualify(schema: &str, table: &str) -> String {
    format!("{}.{}", escape_identifier(schema), escape_identifier(table))
}

/// Truncate to the identifier ceiling, which PostgreSQL counts in bytes.
///
/// Cuts on a character boundary, so a multi-byte name may end up shorter
/// than 63 bytes.
pub fn truncate_identifier(name: &str) -> String {
    if name.len() <= MAX_IDENTIFIER_LENGTH {
        return name.to_string();
    }
    let mut end = MAX_IDENTIFIER_LENGTH;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

/// Replace invalid characters, collapse underscore runs and strip the ends.
fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '_' {
            c
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches('_').to_string()
}

fn prefix_leading_digit(name: String) -> String {
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("{}{}", INDEX_DIGIT_PREFIX, name)
    } else {
        name
    }
}

/// Produce a legal PostgreSQL index name from an Informix index name.
///
/// Steps: trim, prefix `idx_` to a leading digit, replace characters outside
/// `[A-Za-z0-9_]` with `_`, collapse `_` runs, strip `_` from both ends,
/// substitute `<fallback>_idx` when nothing is left, re-check the leading digit,
/// lowercase and truncate to 63 bytes.
///
/// The result only contains `[a-z0-9_]` and never starts with a digit, so
/// normalizing it again returns it unchanged.
pub fn normalize_index_name(raw: &str, fallback: &str) -> String {
    let name = prefix_leading_digit(raw.trim().to_string());
    let mut name = sanitize(&name);

    if name.is_empty() {
        name = sanitize(&format!("{}_idx", fallback.trim()));
    }

    let name = prefix_leading_digit(name).to_ascii_lowercase();
    let truncated = truncate_identifier(&name);
    truncated.trim_end_matches('_').to_string()
}
