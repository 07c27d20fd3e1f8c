//! Per-package backup ledger (`metadata.json`).

use super::ordering::sort_newest_first;
use crate::utils::fs::atomic_write;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One retained backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupVersionRecord {
    /// Version label of the backed-up file
    pub version: String,
    /// File name inside the package backup directory
    pub filename: String,
    /// SHA-256 of the backup file, computed after it was renamed into place
    pub sha256: String,
    /// When the backup was created
    pub created_at: DateTime<Utc>,
    /// Size of the backup file
    pub size_bytes: u64,
}

/// All backups of one package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupLedger {
    /// Package identifier
    pub package: String,
    /// Retained backups, one per version
    #[serde(default)]
    pub versions: Vec<BackupVersionRecord>,
}

impl BackupLedger {
    /// Empty ledger for `package`.
    #[must_use]
    pub fn new(package: &str) -> Self {
        Self {
            package: package.to_string(),
            versions: Vec::new(),
        }
    }

    /// Load the ledger at `path`, or an empty one if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path, package: &str) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new(package));
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read backup ledger {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse backup ledger {}", path.display()))
    }

    /// Write the ledger atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_vec_pretty(self).context("Failed to serialize backup ledger")?;
        atomic_write(path, &content)
    }

    /// Insert a record, replacing any existing record for the same version.
    pub fn upsert(&mut self, record: BackupVersionRecord) {
        self.versions.retain(|r| r.version != record.version);
        self.versions.push(record);
    }

    /// Record for `version`.
    #[must_use]
    pub fn get(&self, version: &str) -> Option<&BackupVersionRecord> {
        self.versions.iter().find(|r| r.version == version)
    }

    /// Remove the record for `version`, returning it.
    pub fn remove(&mut self, version: &str) -> Option<BackupVersionRecord> {
        let index = self.versions.iter().position(|r| r.version == version)?;
        Some(self.versions.remove(index))
    }

    /// Version labels, newest first.
    #[must_use]
    pub fn versions_newest_first(&self) -> Vec<String> {
        let mut versions: Vec<String> = self.versions.iter().map(|r| r.version.clone()).collect();
        sort_newest_first(&mut versions);
        versions
    }

    /// Records, newest first.
    #[must_use]
    pub fn records_newest_first(&self) -> Vec<BackupVersionRecord> {
        self.versions_newest_first()
            .iter()
            .filter_map(|v| self.get(v).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(version: &str) -> BackupVersionRecord {
        BackupVersionRecord {
            version: version.to_string(),
            filename: format!("app-{version}.AppImage"),
            sha256: "0".repeat(64),
            created_at: Utc::now(),
            size_bytes: 10,
        }
    }

    #[test]
    fn test_missing_ledger_is_empty() {
        let temp = TempDir::new().unwrap();
        let ledger = BackupLedger::load(&temp.path().join("metadata.json"), "app").unwrap();
        assert_eq!(ledger.package, "app");
        assert!(ledger.versions.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app").join("metadata.json");

        let mut ledger = BackupLedger::new("app");
        ledger.upsert(record("1.0.0"));
        ledger.upsert(record("1.1.0"));
        ledger.save(&path).unwrap();

        let loaded = BackupLedger::load(&path, "app").unwrap();
        assert_eq!(loaded, ledger);
    }

    #[test]
    fn test_upsert_replaces_same_version() {
        let mut ledger = BackupLedger::new("app");
        ledger.upsert(record("1.0.0"));
        let mut newer = record("1.0.0");
        newer.size_bytes = 99;
        ledger.upsert(newer);

        assert_eq!(ledger.versions.len(), 1);
        assert_eq!(ledger.get("1.0.0").unwrap().size_bytes, 99);
    }

    #[test]
    fn test_newest_first() {
        let mut ledger = BackupLedger::new("app");
        for v in ["1.2", "1.10", "1.3"] {
            ledger.upsert(record(v));
        }
        assert_eq!(ledger.versions_newest_first(), vec!["1.10", "1.3", "1.2"]);
        assert_eq!(ledger.remove("1.3").unwrap().version, "1.3");
        assert!(ledger.remove("1.3").is_none());
    }
}
