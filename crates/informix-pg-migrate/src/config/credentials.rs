//! Database passwords supplied through the environment.

use std::fmt;

use crate::error::{MigrateError, Result};

/// Environment variable holding the Informix password.
pub const SOURCE_PASSWORD_VAR: &str = "IFX_PW";

/// Environment variable holding the PostgreSQL password.
pub const TARGET_PASSWORD_VAR: &str = "PG_PW";

/// Source and target passwords.
#[derive(Clone)]
pub struct Credentials {
    pub source_password: String,
    pub target_password: String,
}

impl Credentials {
    /// Read both passwords from `IFX_PW` and `PG_PW`.
    ///
    /// Fails on the first missing or empty variable. Called before any
    /// connection is attempted.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read both passwords through a lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| MigrateError::MissingCredential(key.to_string()))
        };
        Ok(Self {
            target_password: get(TARGET_PASSWORD_VAR)?,
            source_password: get(SOURCE_PASSWORD_VAR)?,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("source_password", &"[REDACTED]")
            .field("target_password", &"[REDACTED]")
            .finish()
    }
}
