//! Decoding of `part1`..`part16` slot arrays.
//!
//! `sysindexes` describes the columns of an index (and therefore of the key a
//! constraint is built on) as sixteen small integers. Zero marks an unused
//! slot, a positive value is an ascending column ordinal and a negative value
//! a descending one. Slot order is key column order.

use crate::core::value::{cell_i64, Row};
use crate::source::types::{KeyColumnRef, SortOrder};

/// Number of part slots per index.
pub const PART_SLOTS: usize = 16;

/// The sixteen raw part values of one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartSlots(pub [i16; PART_SLOTS]);

impl PartSlots {
    /// Read sixteen consecutive cells starting at `start`.
    ///
    /// NULL and empty cells read as unused slots.
    pub fn from_row(row: &Row, start: usize) -> Result<Self, String> {
        let mut slots = [0i16; PART_SLOTS];
        for (i, slot) in slots.iter_mut().enumerate() {
            let value = cell_i64(row, start + i)
                .map_err(|e| format!("part{}: {}", i + 1, e))?
                .unwrap_or(0);
            *slot = i16::try_from(value)
                .map_err(|_| format!("part{} out of range: {}", i + 1, value))?;
        }
        Ok(Self(slots))
    }

    /// Used slots in slot order.
    pub fn decode(&self) -> Vec<KeyColumnRef> {
        self.0
            .iter()
            .filter(|&&p| p != 0)
            .map(|&p| KeyColumnRef {
                ordinal: p.saturating_abs(),
                order: if p < 0 { SortOrder::Desc } else { SortOrder::Asc },
            })
            .collect()
    }
}

/// Comma separated `part1, ..., part16` for catalog queries, with a table alias.
pub fn part_columns(alias: &str) -> String {
    (1..=PART_SLOTS)
        .map(|i| format!("{}.part{}", alias, i))
        .collect::<Vec<_>>()
        .join(", ")
}
