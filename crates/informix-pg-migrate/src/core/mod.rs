//! Building blocks shared by the source, target and schema modules.
//!
//! - [`identifier`]: index name normalization and keyword-aware escaping
//! - [`value`]: text rows and bound parameters

pub mod identifier;
pub mod value;

pub use identifier::{escape_identifier, normalize_index_name, qualify};
pub use value::{Batch, Row, SqlParam};
