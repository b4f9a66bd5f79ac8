//! # informix-pg-migrate
//!
//! Informix to PostgreSQL schema and data migration library.
//!
//! Reads table, column, key and index definitions from the Informix system
//! catalog, recreates them in a PostgreSQL schema and copies table data in
//! batches. Every migration concern keeps a JSON checkpoint, so an interrupted
//! run resumes where it stopped:
//!
//! - **Tables**: drop-and-create plus batch copy with a verifying recount
//! - **Primary keys**, **foreign keys** and **indexes**: one DDL unit each
//! - **Validation**: row counts, constraint counts and checkpoint failures
//!
//! ## Example
//!
//! ```rust,no_run
//! use informix_pg_migrate::{Config, Credentials, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> informix_pg_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let credentials = Credentials::from_env()?;
//!     let orchestrator = Orchestrator::connect(config, &credentials).await?;
//!     let summary = orchestrator.migrate_tables().await?;
//!     println!("Migrated {} rows", summary.rows_transferred);
//!     orchestrator.close().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod orchestrator;
pub mod schema;
pub mod source;
pub mod state;
pub mod target;
pub mod transfer;
pub mod typemap;

// Re-exports for convenient access
pub use config::{Config, Credentials, MigrationConfig, SourceConfig, TargetConfig};
pub use error::{MigrateError, Result};
pub use orchestrator::{
    CheckResult, CheckStatus, HealthReport, Orchestrator, RunSummary, UnitFailure, ValidationReport,
};
pub use source::{CatalogReader, OdbcSource, SourceConnection, TableDescriptor};
pub use state::{CheckpointRecord, CheckpointStore, MigrationConcern};
pub use target::{PgTarget, TargetConnection};
pub use transfer::{TransferConfig, TransferEngine, TransferStats};
