//! Error types for the migration library.

use thiserror::Error;

/// Process exit code for configuration and credential errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Process exit code when either database cannot be reached.
pub const EXIT_CONNECTION_ERROR: u8 = 2;
/// Process exit code for fatal catalog, DDL or transfer errors.
pub const EXIT_MIGRATION_ERROR: u8 = 3;
/// Process exit code when validation finds failed checks.
pub const EXIT_VALIDATION_ERROR: u8 = 4;
/// Process exit code for unreadable or unwritable checkpoint files.
pub const EXIT_STATE_ERROR: u8 = 5;
/// Process exit code for other file system errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required secret was not supplied through the environment
    #[error("Missing credential: environment variable {0} is not set")]
    MissingCredential(String),

    /// Connection could not be established, with context
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// Source database (ODBC) error
    #[error("Source database error: {0}")]
    Source(#[from] odbc_api::Error),

    /// Target database connection or query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Catalog query or decoding failed
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// DDL for a single table, key or index failed
    #[error("DDL failed for {object}: {message}")]
    Ddl { object: String, message: String },

    /// Data transfer failed for a specific table
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// Row count after transfer does not match the rows sent
    #[error("Row count mismatch for table {table}: sent {expected}, target has {actual}")]
    Verification {
        table: String,
        expected: i64,
        actual: i64,
    },

    /// Validation run found failed checks
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Checkpoint file error
    #[error("Checkpoint error: {0}")]
    State(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Connection error with context about where it occurred
    pub fn connection(message: impl Into<String>, context: impl Into<String>) -> Self {
        MigrateError::Connection {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a DDL error for the named object
    pub fn ddl(object: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Ddl {
            object: object.into(),
            message: message.into(),
        }
    }

    /// Create a Catalog error
    pub fn catalog(message: impl Into<String>) -> Self {
        MigrateError::Catalog(message.into())
    }

    /// Whether this error must abort the whole run rather than a single object.
    ///
    /// Connection loss is fatal: every following unit would fail the same way
    /// and be recorded as a spurious per-object failure.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MigrateError::Config(_)
                | MigrateError::MissingCredential(_)
                | MigrateError::Connection { .. }
                | MigrateError::State(_)
        ) || matches!(self, MigrateError::Target(e) if e.is_closed())
            || matches!(self, MigrateError::Source(e) if source_connection_lost(e))
    }

    /// Error text as reported by the driver, for checkpoint and summary detail.
    ///
    /// PostgreSQL server errors display as a bare "db error"; this includes
    /// the SQLSTATE and server message instead.
    pub fn driver_message(&self) -> String {
        match self {
            MigrateError::Target(e) => match e.as_db_error() {
                Some(db) => format!("{} ({})", db.message(), db.code().code()),
                None => e.to_string(),
            },
            other => other.to_string(),
        }
    }

    /// Map the error to a process exit code.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::MissingCredential(_) | MigrateError::Yaml(_) => {
                EXIT_CONFIG_ERROR
            }
            MigrateError::Connection { .. } | MigrateError::Source(_) | MigrateError::Target(_) => {
                EXIT_CONNECTION_ERROR
            }
            MigrateError::Catalog(_)
            | MigrateError::Ddl { .. }
            | MigrateError::Transfer { .. } => EXIT_MIGRATION_ERROR,
            MigrateError::Verification { .. } | MigrateError::Validation(_) => {
                EXIT_VALIDATION_ERROR
            }
            MigrateError::State(_) | MigrateError::Json(_) => EXIT_STATE_ERROR,
            MigrateError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Whether an ODBC error means the Informix session is gone.
///
/// SQLSTATE class 08 covers link failures and disconnects reported by the
/// driver. IO errors surface when the socket drops mid-statement.
pub fn source_connection_lost(e: &odbc_api::Error) -> bool {
    use std::io::ErrorKind;

    match e {
        odbc_api::Error::Diagnostics { record, .. } => record.state.as_str().starts_with("08"),
        odbc_api::Error::FailedReadingInput(io) => matches!(
            io.kind(),
            ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe
                | ErrorKind::NotConnected
                | ErrorKind::UnexpectedEof
        ),
        _ => false,
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
