//! Informix source capability and catalog decoding.

mod catalog;
mod odbc;
mod parts;
mod types;

pub use catalog::{source_table_ref, CatalogReader};
pub use odbc::OdbcSource;
pub use parts::{PartSlots, PART_SLOTS};
pub use types::*;

use crate::core::value::{Batch, Row, SqlParam};
use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Read-only access to the source database.
///
/// Requests are served one at a time. A stream holds the connection until its
/// receiver is drained or dropped, so drop it before issuing another request.
#[async_trait]
pub trait SourceConnection: Send + Sync {
    /// Run a query with bound parameters and return all rows as text.
    async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>>;

    /// Run a query through one forward cursor, delivering rows in batches.
    ///
    /// Execution and fetch errors arrive as an `Err` item on the channel.
    async fn stream(&self, sql: &str, batch_size: usize) -> Result<mpsc::Receiver<Result<Batch>>>;

    /// Close the connection.
    async fn close(&self);
}
