//! Configuration loading and validation.

mod credentials;
mod types;
mod validation;

pub use credentials::{Credentials, SOURCE_PASSWORD_VAR, TARGET_PASSWORD_VAR};
pub use types::*;

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Compute a SHA256 hash of the configuration, stored in checkpoint files.
    pub fn hash(&self) -> String {
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Directory holding the checkpoint files.
    pub fn checkpoint_dir(&self) -> PathBuf {
        PathBuf::from(&self.migration.checkpoint_dir)
    }
}

impl SourceConfig {
    /// Build an ODBC connection string for the Informix driver.
    ///
    /// DBDATE is pinned to ISO order so DATE values arrive in a form
    /// PostgreSQL parses regardless of the server default. DELIMIDENT lets
    /// table names be double-quoted.
    pub fn connection_string(&self, password: &str) -> String {
        let mut cs = format!(
            "DRIVER={{{}}};HOST={};SERVICE={};SERVER={};PROTOCOL={};DATABASE={};UID={};PWD={{{}}};DBDATE=Y4MD-;DBMONEY=.;DELIMIDENT=y",
            self.driver,
            self.host,
            self.port,
            self.server,
            self.protocol,
            self.database,
            self.user,
            password.replace('}', "}}")
        );
        if let Some(locale) = &self.client_locale {
            cs.push_str(&format!(";CLIENT_LOCALE={}", locale));
        }
        if let Some(locale) = &self.db_locale {
            cs.push_str(&format!(";DB_LOCALE={}", locale));
        }
        cs
    }

    /// Connection description for logs (no password).
    pub fn describe(&self) -> String {
        format!(
            "{}@{}:{}/{} ({})",
            self.user, self.host, self.port, self.database, self.server
        )
    }
}

impl TargetConfig {
    /// Build a connection string for tokio-postgres.
    ///
    /// TLS is negotiated by the connector, so `sslmode` here only decides
    /// whether tokio-postgres attempts it.
    pub fn connection_string(&self, password: &str) -> String {
        let sslmode = if self.ssl_mode.eq_ignore_ascii_case("disable") {
            "disable"
        } else {
            "require"
        };
        format!(
            "host={} port={} dbname={} user={} password='{}' sslmode={} application_name=informix-pg-migrate",
            self.host,
            self.port,
            self.database,
            self.user,
            password.replace('\\', "\\\\").replace('\'', "\\'"),
            sslmode
        )
    }

    /// Connection description for logs (no password).
    pub fn describe(&self) -> String {
        format!(
            "{}@{}:{}/{} (schema {})",
            self.user, self.host, self.port, self.database, self.schema
        )
    }
}
