//! Configuration validation.

use super::Config;
use crate::core::identifier::validate_identifier;
use crate::error::{MigrateError, Result};
use crate::target::SslMode;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.host.is_empty() {
        return Err(MigrateError::Config("source.host is required".into()));
    }
    if config.source.server.is_empty() {
        return Err(MigrateError::Config("source.server is required".into()));
    }
    if config.source.database.is_empty() {
        return Err(MigrateError::Config("source.database is required".into()));
    }
    if config.source.user.is_empty() {
        return Err(MigrateError::Config("source.user is required".into()));
    }
    if config.source.driver.is_empty() {
        return Err(MigrateError::Config("source.driver is required".into()));
    }
    if config.source.max_text_length == 0 {
        return Err(MigrateError::Config(
            "source.max_text_length must be at least 1".into(),
        ));
    }
    // Values end up inside an ODBC connection string
    for (field, value) in [
        ("source.host", &config.source.host),
        ("source.server", &config.source.server),
        ("source.database", &config.source.database),
        ("source.user", &config.source.user),
    ] {
        if value.contains(';') {
            return Err(MigrateError::Config(format!(
                "{} must not contain ';'",
                field
            )));
        }
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(MigrateError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(MigrateError::Config("target.user is required".into()));
    }
    if config.target.schema.is_empty() {
        return Err(MigrateError::Config("target.schema is required".into()));
    }
    validate_identifier(&config.target.schema)
        .map_err(|e| MigrateError::Config(format!("target.schema: {}", e)))?;
    SslMode::parse(&config.target.ssl_mode)?;

    // Migration config validation
    if config.migration.batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    if let Some(0) = config.migration.checkpoint_every {
        return Err(MigrateError::Config(
            "migration.checkpoint_every must be at least 1".into(),
        ));
    }
    if config.migration.checkpoint_dir.is_empty() {
        return Err(MigrateError::Config(
            "migration.checkpoint_dir is required".into(),
        ));
    }

    Ok(())
}
