//! File-based checkpoints for resume capability.
//!
//! Each migration concern (table data, primary keys, foreign keys, indexes)
//! keeps its own JSON file in the checkpoint directory. A unit of work is
//! recorded as completed only after its target object exists, so a resumed run
//! skips completed keys and retries everything else.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{MigrateError, Result};

/// The unit kind a checkpoint file tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationConcern {
    Tables,
    PrimaryKeys,
    ForeignKeys,
    Indexes,
}

impl MigrationConcern {
    pub const ALL: [MigrationConcern; 4] = [
        MigrationConcern::Tables,
        MigrationConcern::PrimaryKeys,
        MigrationConcern::ForeignKeys,
        MigrationConcern::Indexes,
    ];

    /// Checkpoint file name inside the checkpoint directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            MigrationConcern::Tables => "checkpoint.json",
            MigrationConcern::PrimaryKeys => "pk_checkpoint.json",
            MigrationConcern::ForeignKeys => "fk_checkpoint.json",
            MigrationConcern::Indexes => "index_checkpoint.json",
        }
    }

    /// Units processed between persists.
    ///
    /// Tables are slow and expensive to redo, so every table is persisted;
    /// keys and indexes are cheap and numerous.
    pub fn default_cadence(&self) -> usize {
        match self {
            MigrationConcern::Tables => 1,
            MigrationConcern::PrimaryKeys => 10,
            MigrationConcern::ForeignKeys => 50,
            MigrationConcern::Indexes => 100,
        }
    }

    /// Checkpoint file path under `dir`.
    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(self.file_name())
    }
}

impl fmt::Display for MigrationConcern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MigrationConcern::Tables => "tables",
            MigrationConcern::PrimaryKeys => "primary keys",
            MigrationConcern::ForeignKeys => "foreign keys",
            MigrationConcern::Indexes => "indexes",
        })
    }
}

/// Statistics recorded for a completed unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitStats {
    /// Rows transferred (table data only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<i64>,

    pub duration_secs: f64,

    pub completed_at: DateTime<Utc>,
}

impl UnitStats {
    pub fn new(rows: Option<i64>, duration_secs: f64) -> Self {
        Self {
            rows,
            duration_secs,
            completed_at: Utc::now(),
        }
    }
}

/// A unit whose last attempt failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedUnit {
    pub key: String,
    /// Driver-reported error text.
    pub detail: String,
    pub failed_at: DateTime<Utc>,
}

/// Persisted checkpoint state for one concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Identifier of the run that created this file.
    pub run_id: String,

    pub concern: MigrationConcern,

    /// SHA256 hash of the configuration that created this file.
    pub config_hash: String,

    /// When the first run against this file started.
    pub start_time: DateTime<Utc>,

    /// Last persist.
    pub updated_at: DateTime<Utc>,

    /// Keys whose target object was created successfully.
    pub completed: BTreeSet<String>,

    /// Keys whose last attempt failed. Disjoint from `completed`.
    pub failed: Vec<FailedUnit>,

    /// Per-key statistics of completed units.
    #[serde(default)]
    pub stats: BTreeMap<String, UnitStats>,
}

impl CheckpointRecord {
    /// Create a fresh, empty record.
    pub fn new(concern: MigrationConcern, config_hash: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4().to_string(),
            concern,
            config_hash: config_hash.into(),
            start_time: now,
            updated_at: now,
            completed: BTreeSet::new(),
            failed: Vec::new(),
            stats: BTreeMap::new(),
        }
    }

    /// Read a record. A missing file yields `Ok(None)`.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(MigrateError::State(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        let record = serde_json::from_str(&content).map_err(|e| {
            MigrateError::State(format!("{} is not a valid checkpoint: {}", path.display(), e))
        })?;
        Ok(Some(record))
    }

    /// Write the record atomically (temp file, then rename).
    pub fn write(&mut self, path: &Path) -> Result<()> {
        self.updated_at = Utc::now();
        let content = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| state_io(parent, e))?;
        }
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).map_err(|e| state_io(&temp_path, e))?;
        std::fs::rename(&temp_path, path).map_err(|e| state_io(path, e))?;
        Ok(())
    }

    pub fn is_completed(&self, key: &str) -> bool {
        self.completed.contains(key)
    }

    pub fn is_failed(&self, key: &str) -> bool {
        self.failed.iter().any(|f| f.key == key)
    }
}

fn state_io(path: &Path, e: std::io::Error) -> MigrateError {
    MigrateError::State(format!("cannot write {}: {}", path.display(), e))
}

/// In-memory checkpoint with batched persistence.
///
/// Marks take effect immediately; the file is rewritten by [`persist`] or,
/// every `cadence` marks, by [`persist_if_due`]. Unsaved marks are persisted
/// when the store is dropped.
///
/// [`persist`]: CheckpointStore::persist
/// [`persist_if_due`]: CheckpointStore::persist_if_due
pub struct CheckpointStore {
    path: PathBuf,
    record: CheckpointRecord,
    cadence: usize,
    unsaved: usize,
}

impl CheckpointStore {
    /// Load the concern's checkpoint from `dir`, or start a fresh one.
    ///
    /// `cadence` overrides the concern's default persist cadence.
    pub fn load(
        dir: &Path,
        concern: MigrationConcern,
        config_hash: &str,
        cadence: Option<usize>,
    ) -> Result<Self> {
        let path = concern.path_in(dir);
        let record = match CheckpointRecord::read(&path)? {
            Some(record) => {
                if record.concern != concern {
                    return Err(MigrateError::State(format!(
                        "{} tracks {}, expected {}",
                        path.display(),
                        record.concern,
                        concern
                    )));
                }
                if record.config_hash != config_hash {
                    warn!(
                        "Checkpoint {} was written with a different configuration; \
                         completed {} are still skipped",
                        path.display(),
                        concern
                    );
                }
                debug!(
                    "Resuming {} from {}: {} completed, {} failed",
                    concern,
                    path.display(),
                    record.completed.len(),
                    record.failed.len()
                );
                record
            }
            None => CheckpointRecord::new(concern, config_hash),
        };

        Ok(Self {
            path,
            record,
            cadence: cadence.unwrap_or_else(|| concern.default_cadence()).max(1),
            unsaved: 0,
        })
    }

    pub fn record(&self) -> &CheckpointRecord {
        &self.record
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_completed(&self, key: &str) -> bool {
        self.record.is_completed(key)
    }

    /// Record a unit as completed, clearing any earlier failure.
    pub fn mark_completed(&mut self, key: &str, stats: UnitStats) {
        self.record.failed.retain(|f| f.key != key);
        self.record.completed.insert(key.to_string());
        self.record.stats.insert(key.to_string(), stats);
        self.unsaved += 1;
    }

    /// Record a failed attempt, replacing any earlier failure for the key.
    pub fn mark_failed(&mut self, key: &str, detail: impl Into<String>) {
        self.record.completed.remove(key);
        self.record.stats.remove(key);
        self.record.failed.retain(|f| f.key != key);
        self.record.failed.push(FailedUnit {
            key: key.to_string(),
            detail: detail.into(),
            failed_at: Utc::now(),
        });
        self.unsaved += 1;
    }

    /// Write the record to disk.
    pub fn persist(&mut self) -> Result<()> {
        self.record.write(&self.path)?;
        self.unsaved = 0;
        debug!("Persisted checkpoint {}", self.path.display());
        Ok(())
    }

    /// Persist if at least `cadence` marks are unsaved.
    pub fn persist_if_due(&mut self) -> Result<()> {
        if self.unsaved >= self.cadence {
            self.persist()?;
        }
        Ok(())
    }
}

impl Drop for CheckpointStore {
    fn drop(&mut self) {
        if self.unsaved > 0 {
            if let Err(e) = self.persist() {
                warn!("Failed to persist checkpoint on exit: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_fresh_record() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::load(dir.path(), MigrationConcern::Tables, "hash", None).unwrap();
        assert!(store.record().completed.is_empty());
        assert!(store.record().failed.is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_record_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pk_checkpoint.json");

        let mut record = CheckpointRecord::new(MigrationConcern::PrimaryKeys, "abc123");
        record.completed.insert("orders.pk_orders".into());
        record.failed.push(FailedUnit {
            key: "items.pk_items".into(),
            detail: "column \"id\" does not exist".into(),
            failed_at: Utc::now(),
        });
        record.write(&path).unwrap();

        let mut loaded = CheckpointRecord::read(&path).unwrap().unwrap();
        assert_eq!(loaded, record);

        loaded.write(&path).unwrap();
        let reloaded = CheckpointRecord::read(&path).unwrap().unwrap();
        assert_eq!(reloaded, loaded);
    }

    #[test]
    fn test_completed_and_failed_are_disjoint() {
        let dir = TempDir::new().unwrap();
        let mut store =
            CheckpointStore::load(dir.path(), MigrationConcern::Tables, "hash", None).unwrap();

        store.mark_failed("orders", "insert failed");
        assert!(store.record().is_failed("orders"));

        store.mark_completed("orders", UnitStats::new(Some(10), 0.5));
        assert!(store.is_completed("orders"));
        assert!(!store.record().is_failed("orders"));

        store.mark_failed("orders", "row count mismatch");
        assert!(!store.is_completed("orders"));
        assert_eq!(store.record().failed.len(), 1);
        assert!(!store.record().stats.contains_key("orders"));
    }

    #[test]
    fn test_persist_cadence() {
        let dir = TempDir::new().unwrap();
        let mut store =
            CheckpointStore::load(dir.path(), MigrationConcern::ForeignKeys, "hash", Some(3))
                .unwrap();

        store.mark_completed("a.fk1", UnitStats::new(None, 0.1));
        store.mark_completed("a.fk2", UnitStats::new(None, 0.1));
        store.persist_if_due().unwrap();
        assert!(!store.path().exists());

        store.mark_completed("a.fk3", UnitStats::new(None, 0.1));
        store.persist_if_due().unwrap();
        let on_disk = CheckpointRecord::read(store.path()).unwrap().unwrap();
        assert_eq!(on_disk.completed.len(), 3);
    }

    #[test]
    fn test_drop_persists_unsaved_marks() {
        let dir = TempDir::new().unwrap();
        {
            let mut store =
                CheckpointStore::load(dir.path(), MigrationConcern::Indexes, "hash", None).unwrap();
            store.mark_completed("orders.ix_date", UnitStats::new(None, 0.2));
        }
        let path = MigrationConcern::Indexes.path_in(dir.path());
        let record = CheckpointRecord::read(&path).unwrap().unwrap();
        assert!(record.is_completed("orders.ix_date"));
    }

    #[test]
    fn test_resume_keeps_run_identity() {
        let dir = TempDir::new().unwrap();
        let run_id = {
            let mut store =
                CheckpointStore::load(dir.path(), MigrationConcern::Tables, "hash", None).unwrap();
            store.mark_completed("orders", UnitStats::new(Some(1), 0.0));
            store.persist().unwrap();
            store.record().run_id.clone()
        };

        let store =
            CheckpointStore::load(dir.path(), MigrationConcern::Tables, "other", None).unwrap();
        assert_eq!(store.record().run_id, run_id);
        assert!(store.is_completed("orders"));
    }

    #[test]
    fn test_concern_mismatch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut record = CheckpointRecord::new(MigrationConcern::Indexes, "hash");
        record
            .write(&MigrationConcern::Tables.path_in(dir.path()))
            .unwrap();

        let err = CheckpointStore::load(dir.path(), MigrationConcern::Tables, "hash", None)
            .err()
            .unwrap();
        assert!(matches!(err, MigrateError::State(_)));
    }

    #[test]
    fn test_corrupt_file_is_state_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(MigrationConcern::Tables.path_in(dir.path()), "{ not json").unwrap();
        let err = CheckpointStore::load(dir.path(), MigrationConcern::Tables, "hash", None)
            .err()
            .unwrap();
        assert_eq!(err.exit_code(), crate::error::EXIT_STATE_ERROR);
    }

    #[test]
    fn test_file_names() {
        assert_eq!(MigrationConcern::Tables.file_name(), "checkpoint.json");
        assert_eq!(MigrationConcern::Indexes.default_cadence(), 100);
    }
}
