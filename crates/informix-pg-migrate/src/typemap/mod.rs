//! Type mapping between Informix catalog type codes and PostgreSQL.
//!
//! Informix stores a column's type in `syscolumns.coltype` as a small integer.
//! Adding 256 to the code marks the column NOT NULL, so the base type is always
//! `coltype % 256`. The meaning of `syscolumns.collength` depends on the type:
//! character types store the length, VARCHAR stores `(min << 8) | max`,
//! DECIMAL and MONEY store `(precision << 8) | scale`, and DATETIME stores
//! `(digits << 8) | (first_qualifier << 4) | last_qualifier`.
//!
//! Mapping never fails. Codes that cannot be represented faithfully fall back
//! to a safe target type and report a [`MappingAnomaly`] for the caller to log.

use std::fmt;

use thiserror::Error;

/// Offset added to a type code when the column is NOT NULL.
pub const NOT_NULL_FLAG: i32 = 256;

/// Largest NUMERIC precision accepted before falling back.
pub const MAX_NUMERIC_PRECISION: i32 = 1000;

/// Fallback precision and scale for DECIMAL/MONEY columns that cannot be decoded.
pub const FALLBACK_NUMERIC: (u16, u8) = (12, 2);

/// Scale byte Informix uses for floating-point DECIMAL(p).
const FLOATING_SCALE: i32 = 0xFF;

// DATETIME qualifier codes (the nibbles of collength).
const QUAL_DAY: i32 = 4;
const QUAL_HOUR: i32 = 6;

/// Decoded Informix base type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    Char,
    SmallInt,
    Integer,
    Float,
    SmallFloat,
    Decimal,
    Serial,
    Date,
    Money,
    Null,
    DateTime,
    Byte,
    Text,
    Varchar,
    Interval,
    NChar,
    NVarchar,
    Int8,
    Serial8,
    Set,
    Multiset,
    List,
    Row,
    Collection,
    LVarchar,
    Blob,
    Boolean,
    BigInt,
    BigSerial,
    Unknown(i32),
}

impl SourceType {
    /// Decode a raw `coltype`, stripping the NOT NULL flag.
    pub fn from_code(raw: i32) -> Self {
        match base_code(raw) {
            0 => SourceType::Char,
            1 => SourceType::SmallInt,
            2 => SourceType::Integer,
            3 => SourceType::Float,
            4 => SourceType::SmallFloat,
            5 => SourceType::Decimal,
            6 => SourceType::Serial,
            7 => SourceType::Date,
            8 => SourceType::Money,
            9 => SourceType::Null,
            10 => SourceType::DateTime,
            11 => SourceType::Byte,
            12 => SourceType::Text,
            13 => SourceType::Varchar,
            14 => SourceType::Interval,
            15 => SourceType::NChar,
            16 => SourceType::NVarchar,
            17 => SourceType::Int8,
            18 => SourceType::Serial8,
            19 => SourceType::Set,
            20 => SourceType::Multiset,
            21 => SourceType::List,
            22 => SourceType::Row,
            23 => SourceType::Collection,
            40 => SourceType::LVarchar,
            41 => SourceType::Blob,
            43 => SourceType::Boolean,
            52 => SourceType::BigInt,
            53 => SourceType::BigSerial,
            other => SourceType::Unknown(other),
        }
    }

    /// Informix name of the type, as shown by dbschema.
    pub fn name(&self) -> &'static str {
        match self {
            SourceType::Char => "CHAR",
            SourceType::SmallInt => "SMALLINT",
            SourceType::Integer => "INTEGER",
            SourceType::Float => "FLOAT",
            SourceType::SmallFloat => "SMALLFLOAT",
            SourceType::Decimal => "DECIMAL",
            SourceType::Serial => "SERIAL",
            SourceType::Date => "DATE",
            SourceType::Money => "MONEY",
            SourceType::Null => "NULL",
            SourceType::DateTime => "DATETIME",
            SourceType::Byte => "BYTE",
            SourceType::Text => "TEXT",
            SourceType::Varchar => "VARCHAR",
            SourceType::Interval => "INTERVAL",
            SourceType::NChar => "NCHAR",
            SourceType::NVarchar => "NVARCHAR",
            SourceType::Int8 => "INT8",
            SourceType::Serial8 => "SERIAL8",
            SourceType::Set => "SET",
            SourceType::Multiset => "MULTISET",
            SourceType::List => "LIST",
            SourceType::Row => "ROW",
            SourceType::Collection => "COLLECTION",
            SourceType::LVarchar => "LVARCHAR",
            SourceType::Blob => "BLOB",
            SourceType::Boolean => "BOOLEAN",
            SourceType::BigInt => "BIGINT",
            SourceType::BigSerial => "BIGSERIAL",
            SourceType::Unknown(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Unknown(code) => write!(f, "UNKNOWN({})", code),
            other => f.write_str(other.name()),
        }
    }
}

/// PostgreSQL column type produced by the mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    Char(u32),
    Varchar(Option<u32>),
    Text,
    SmallInt,
    Integer,
    BigInt,
    Real,
    DoublePrecision,
    Numeric { precision: u16, scale: Option<u8> },
    Serial,
    BigSerial,
    Date,
    Time,
    Timestamp,
    Interval,
    Boolean,
    Bytea,
}

impl TargetType {
    /// Type used to cast a bound text parameter in INSERT statements.
    ///
    /// String types stay `text` so that an over-long value fails on assignment
    /// instead of being silently truncated by an explicit `varchar(n)` cast.
    pub fn cast_type(&self) -> &'static str {
        match self {
            TargetType::Char(_) | TargetType::Varchar(_) | TargetType::Text => "text",
            TargetType::SmallInt => "smallint",
            TargetType::Integer | TargetType::Serial => "integer",
            TargetType::BigInt | TargetType::BigSerial => "bigint",
            TargetType::Real => "real",
            TargetType::DoublePrecision => "double precision",
            TargetType::Numeric { .. } => "numeric",
            TargetType::Date => "date",
            TargetType::Time => "time",
            TargetType::Timestamp => "timestamp",
            TargetType::Interval => "interval",
            TargetType::Boolean => "boolean",
            TargetType::Bytea => "bytea",
        }
    }

    /// Whether the column owns a sequence that must be reset after loading.
    pub fn is_serial(&self) -> bool {
        matches!(self, TargetType::Serial | TargetType::BigSerial)
    }

    /// Whether values arrive as hex text and need the `\x` bytea prefix.
    pub fn is_binary(&self) -> bool {
        matches!(self, TargetType::Bytea)
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetType::Char(n) => write!(f, "char({})", n),
            TargetType::Varchar(Some(n)) => write!(f, "varchar({})", n),
            TargetType::Varchar(None) => f.write_str("varchar"),
            TargetType::Text => f.write_str("text"),
            TargetType::SmallInt => f.write_str("smallint"),
            TargetType::Integer => f.write_str("integer"),
            TargetType::BigInt => f.write_str("bigint"),
            TargetType::Real => f.write_str("real"),
            TargetType::DoublePrecision => f.write_str("double precision"),
            TargetType::Numeric {
                precision,
                scale: Some(scale),
            } => write!(f, "numeric({},{})", precision, scale),
            TargetType::Numeric {
                precision,
                scale: None,
            } => write!(f, "numeric({})", precision),
            TargetType::Serial => f.write_str("serial"),
            TargetType::BigSerial => f.write_str("bigserial"),
            TargetType::Date => f.write_str("date"),
            TargetType::Time => f.write_str("time"),
            TargetType::Timestamp => f.write_str("timestamp"),
            TargetType::Interval => f.write_str("interval"),
            TargetType::Boolean => f.write_str("boolean"),
            TargetType::Bytea => f.write_str("bytea"),
        }
    }
}

/// Non-fatal problem found while mapping a column type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingAnomaly {
    #[error("unknown type code {0}, mapped to text")]
    UnknownTypeCode(i32),

    #[error("type {0} has no PostgreSQL equivalent, mapped to text")]
    UnsupportedType(SourceType),

    #[error("{kind} precision {precision} (scale {scale}) out of range, mapped to numeric(12,2)")]
    PrecisionOutOfRange {
        kind: SourceType,
        precision: i32,
        scale: i32,
    },
}

/// Result of mapping one column type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedType {
    pub source: SourceType,
    pub target: TargetType,
    pub anomaly: Option<MappingAnomaly>,
}

impl MappedType {
    fn clean(source: SourceType, target: TargetType) -> Self {
        Self {
            source,
            target,
            anomaly: None,
        }
    }

    fn flagged(source: SourceType, target: TargetType, anomaly: MappingAnomaly) -> Self {
        Self {
            source,
            target,
            anomaly: Some(anomaly),
        }
    }
}

/// Strip the NOT NULL flag from a raw type code.
pub fn base_code(raw: i32) -> i32 {
    raw.rem_euclid(NOT_NULL_FLAG)
}

/// Whether a raw type code marks the column NOT NULL.
pub fn is_not_null(raw: i32) -> bool {
    raw >= NOT_NULL_FLAG
}

/// Decode a packed `(precision << 8) | scale` length.
pub fn unpack_precision_scale(length: i32) -> (i32, i32) {
    ((length >> 8) & 0xFFFF, length & 0xFF)
}

/// Map an Informix `coltype`/`collength` pair to a PostgreSQL type.
pub fn map_type(raw_code: i32, length: i32) -> MappedType {
    let source = SourceType::from_code(raw_code);
    match source {
        SourceType::Char | SourceType::NChar => {
            MappedType::clean(source, TargetType::Char(length.max(1) as u32))
        }
        SourceType::Varchar | SourceType::NVarchar => {
            let max = length & 0xFF;
            let target = if max > 0 {
                TargetType::Varchar(Some(max as u32))
            } else {
                TargetType::Varchar(None)
            };
            MappedType::clean(source, target)
        }
        SourceType::SmallInt => MappedType::clean(source, TargetType::SmallInt),
        SourceType::Integer => MappedType::clean(source, TargetType::Integer),
        SourceType::Int8 | SourceType::BigInt => MappedType::clean(source, TargetType::BigInt),
        SourceType::Float => MappedType::clean(source, TargetType::DoublePrecision),
        SourceType::SmallFloat => MappedType::clean(source, TargetType::Real),
        SourceType::Decimal | SourceType::Money => map_numeric(source, length),
        SourceType::Serial => MappedType::clean(source, TargetType::Serial),
        SourceType::Serial8 | SourceType::BigSerial => {
            MappedType::clean(source, TargetType::BigSerial)
        }
        SourceType::Date => MappedType::clean(source, TargetType::Date),
        SourceType::DateTime => MappedType::clean(source, map_datetime(length)),
        SourceType::Interval => MappedType::clean(source, TargetType::Interval),
        SourceType::Boolean => MappedType::clean(source, TargetType::Boolean),
        SourceType::Byte | SourceType::Blob => MappedType::clean(source, TargetType::Bytea),
        SourceType::Text | SourceType::LVarchar => MappedType::clean(source, TargetType::Text),
        SourceType::Null
        | SourceType::Set
        | SourceType::Multiset
        | SourceType::List
        | SourceType::Row
        | SourceType::Collection => MappedType::flagged(
            source,
            TargetType::Text,
            MappingAnomaly::UnsupportedType(source),
        ),
        SourceType::Unknown(code) => MappedType::flagged(
            source,
            TargetType::Text,
            MappingAnomaly::UnknownTypeCode(code),
        ),
    }
}

fn map_numeric(source: SourceType, length: i32) -> MappedType {
    let (precision, scale) = unpack_precision_scale(length);
    if precision <= 0 || precision > MAX_NUMERIC_PRECISION {
        let (p, s) = FALLBACK_NUMERIC;
        return MappedType::flagged(
            source,
            TargetType::Numeric {
                precision: p,
                scale: Some(s),
            },
            MappingAnomaly::PrecisionOutOfRange {
                kind: source,
                precision,
                scale,
            },
        );
    }

    let scale = if scale == FLOATING_SCALE {
        None
    } else {
        Some(scale as u8)
    };
    MappedType::clean(
        source,
        TargetType::Numeric {
            precision: precision as u16,
            scale,
        },
    )
}

/// DATETIME HOUR TO x becomes `time`, YEAR TO DAY becomes `date`,
/// everything else `timestamp`.
fn map_datetime(length: i32) -> TargetType {
    let first = (length >> 4) & 0x0F;
    let last = length & 0x0F;
    if length <= 0 {
        TargetType::Timestamp
    } else if first >= QUAL_HOUR {
        TargetType::Time
    } else if first == 0 && last <= QUAL_DAY {
        TargetType::Date
    } else {
        TargetType::Timestamp
    }
}
