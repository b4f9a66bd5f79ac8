//! Configuration type definitions.

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (Informix).
    pub source: SourceConfig,

    /// Target database configuration (PostgreSQL).
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source database (Informix) configuration.
///
/// The password is never read from the file; see [`super::Credentials`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database host.
    pub host: String,

    /// Listener port (default: 9088).
    #[serde(default = "default_informix_port")]
    pub port: u16,

    /// Informix server name (INFORMIXSERVER).
    pub server: String,

    /// Database name.
    pub database: String,

    /// Username (default: "informix").
    #[serde(default = "default_informix_user")]
    pub user: String,

    /// ODBC driver name as registered in odbcinst.ini.
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Network protocol (default: "onsoctcp").
    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// CLIENT_LOCALE, e.g. "en_US.utf8".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_locale: Option<String>,

    /// DB_LOCALE, e.g. "en_US.utf8".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_locale: Option<String>,

    /// Largest TEXT/LVARCHAR/BYTE value fetched, in bytes (default: 65536).
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,
}

/// Target database (PostgreSQL) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Target schema (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// SSL mode (default: "disable").
    #[serde(default = "default_disable")]
    pub ssl_mode: String,
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows per INSERT batch (default: 500).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Directory holding the checkpoint files (default: ".").
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: String,

    /// Persist checkpoints every N units instead of the per-concern default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_every: Option<usize>,

    /// Recount completed tables on resume and redo them on mismatch (default: false).
    #[serde(default)]
    pub verify_completed_tables: bool,

    /// Set SERIAL sequences to the column maximum after loading (default: true).
    #[serde(default = "default_true")]
    pub reset_sequences: bool,

    /// Tables to include (glob patterns, `*` and `?`). Empty means all.
    #[serde(default)]
    pub include_tables: Vec<String>,

    /// Tables to exclude (glob patterns).
    #[serde(default)]
    pub exclude_tables: Vec<String>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            checkpoint_dir: default_checkpoint_dir(),
            checkpoint_every: None,
            verify_completed_tables: false,
            reset_sequences: true,
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
        }
    }
}

impl MigrationConfig {
    /// Whether a table passes the include/exclude filters.
    pub fn table_selected(&self, table: &str) -> bool {
        let included = self.include_tables.is_empty()
            || self.include_tables.iter().any(|p| glob_match(p, table));
        included && !self.exclude_tables.iter().any(|p| glob_match(p, table))
    }
}

/// Case-insensitive glob match supporting `*` and `?`.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.to_lowercase().chars().collect();
    let n: Vec<char> = name.to_lowercase().chars().collect();

    let (mut pi, mut ni) = (0, 0);
    let mut star: Option<usize> = None;
    let mut mark = 0;
    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ni;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ni = mark;
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

// Default value functions for serde
fn default_informix_port() -> u16 {
    9088
}

fn default_informix_user() -> String {
    "informix".to_string()
}

fn default_driver() -> String {
    "IBM INFORMIX ODBC DRIVER".to_string()
}

fn default_protocol() -> String {
    "onsoctcp".to_string()
}

fn default_max_text_length() -> usize {
    65_536
}

fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_disable() -> String {
    "disable".to_string()
}

fn default_batch_size() -> usize {
    500
}

fn default_checkpoint_dir() -> String {
    ".".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("*", "orders"));
        assert!(glob_match("ord*", "orders"));
        assert!(glob_match("ORD*", "orders"));
        assert!(glob_match("o?ders", "orders"));
        assert!(glob_match("*_hist", "orders_hist"));
        assert!(glob_match("a*b*c", "axxbyyc"));
        assert!(!glob_match("ord", "orders"));
        assert!(!glob_match("*_hist", "orders"));
    }

    #[test]
    fn test_table_selected() {
        let mut m = MigrationConfig::default();
        assert!(m.table_selected("anything"));

        m.include_tables = vec!["uno_*".into()];
        m.exclude_tables = vec!["uno_tmp*".into()];
        assert!(m.table_selected("uno_awlp"));
        assert!(!m.table_selected("uno_tmp1"));
        assert!(!m.table_selected("orders"));
    }

    #[test]
    fn test_migration_defaults() {
        let m: MigrationConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(m.batch_size, 500);
        assert_eq!(m.checkpoint_dir, ".");
        assert!(m.reset_sequences);
        assert!(!m.verify_completed_tables);
        assert!(m.checkpoint_every.is_none());
    }
}
