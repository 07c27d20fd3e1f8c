//! Versioned, checksummed backups of installed bundles.
//!
//! Each package gets a directory under the backup root:
//!
//! ```text
//! <backup_root>/<package>/
//! ├── metadata.json              # ledger, see BackupLedger
//! ├── <package>-1.2.0.AppImage
//! └── <package>-1.3.0.AppImage
//! ```
//!
//! A backup is copied under a temporary name and renamed into place; only then is it hashed and
//! recorded, so the ledger checksum always describes the bytes that were committed. The ledger
//! itself is written atomically. Restores re-hash the backup first and refuse to touch the live
//! file if the bytes no longer match.
//!
//! [`BackupManager`] knows nothing about package state; the installer decides when to back up
//! and records the restored version.

pub mod metadata;
pub mod ordering;

pub use metadata::{BackupLedger, BackupVersionRecord};
pub use ordering::{compare_versions, is_newer, parse_version, sort_newest_first};

use crate::constants::{BACKUP_METADATA_FILE, BUNDLE_EXTENSION};
use crate::core::AppboxError;
use crate::utils::fs::{atomic_copy, remove_file_if_exists, set_executable};
use crate::verification::hash::{HashAlgorithm, hash_file_blocking};
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Manages the backup directories of all packages.
#[derive(Debug, Clone)]
pub struct BackupManager {
    root: PathBuf,
}

impl BackupManager {
    /// Manager rooted at `root`.
    #[must_use]
    pub const fn new(root: PathBuf) -> Self {
        Self {
            root,
        }
    }

    /// Backup root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Backup directory of one package.
    #[must_use]
    pub fn package_dir(&self, package_id: &str) -> PathBuf {
        self.root.join(package_id)
    }

    fn ledger_path(&self, package_id: &str) -> PathBuf {
        self.package_dir(package_id).join(BACKUP_METADATA_FILE)
    }

    /// Back up `source` as `version` of `package_id`.
    ///
    /// Does not apply retention; see [`cleanup`](Self::cleanup).
    ///
    /// # Errors
    ///
    /// Returns an error if the copy, hash or ledger write fails.
    pub async fn create_backup(
        &self,
        source: &Path,
        package_id: &str,
        version: &str,
    ) -> Result<PathBuf> {
        let dir = self.package_dir(package_id);
        let ledger_path = self.ledger_path(package_id);
        let filename = backup_filename(package_id, version);
        let destination = dir.join(&filename);
        let source = source.to_path_buf();
        let package = package_id.to_string();
        let version = version.to_string();

        info!("Backing up {package} {version}");
        tokio::task::spawn_blocking(move || -> Result<PathBuf> {
            let size_bytes = atomic_copy(&source, &destination)
                .with_context(|| format!("Failed to back up {}", source.display()))?;
            let sha256 = hash_file_blocking(&destination, HashAlgorithm::Sha256)?;

            let mut ledger = BackupLedger::load(&ledger_path, &package)?;
            ledger.upsert(BackupVersionRecord {
                version,
                filename,
                sha256,
                created_at: Utc::now(),
                size_bytes,
            });
            ledger.save(&ledger_path)?;
            Ok(destination)
        })
        .await
        .context("Backup task panicked")?
    }

    /// Ledger records of `package_id`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger exists but cannot be read.
    pub async fn records(&self, package_id: &str) -> Result<Vec<BackupVersionRecord>> {
        Ok(self.load_ledger(package_id).await?.records_newest_first())
    }

    /// Retained versions of `package_id`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger exists but cannot be read.
    pub async fn list_versions(&self, package_id: &str) -> Result<Vec<String>> {
        Ok(self.load_ledger(package_id).await?.versions_newest_first())
    }

    /// Check a backup against its ledger checksum.
    ///
    /// # Errors
    ///
    /// Returns [`AppboxError::BackupNotFound`] if the version is not retained, or
    /// [`AppboxError::BackupIntegrity`] if the file is missing or its checksum differs.
    pub async fn verify_backup(
        &self,
        package_id: &str,
        version: &str,
    ) -> Result<BackupVersionRecord> {
        let ledger = self.load_ledger(package_id).await?;
        let record = ledger.get(version).cloned().ok_or_else(|| AppboxError::BackupNotFound {
            package: package_id.to_string(),
            version: version.to_string(),
        })?;

        let path = self.package_dir(package_id).join(&record.filename);
        let actual = if path.exists() {
            crate::verification::sha256_file(&path).await?
        } else {
            "missing".to_string()
        };
        if !actual.eq_ignore_ascii_case(&record.sha256) {
            return Err(AppboxError::BackupIntegrity {
                package: package_id.to_string(),
                version: version.to_string(),
                expected: record.sha256,
                actual,
            }
            .into());
        }
        Ok(record)
    }

    /// Restore `version` of `package_id` to `destination`.
    ///
    /// `destination` is the live file path; if it is an existing directory the file is written
    /// as `<destination>/<package_id>.AppImage`. The backup is verified first and the live file
    /// is left untouched on mismatch. The restored file is made executable.
    ///
    /// # Errors
    ///
    /// Returns [`AppboxError::BackupNotFound`] or [`AppboxError::BackupIntegrity`] as for
    /// [`verify_backup`](Self::verify_backup), or an I/O error from the copy.
    pub async fn restore(
        &self,
        package_id: &str,
        version: &str,
        destination: &Path,
    ) -> Result<(PathBuf, BackupVersionRecord)> {
        let record = self.verify_backup(package_id, version).await?;

        let target = if destination.is_dir() {
            destination.join(format!("{package_id}{BUNDLE_EXTENSION}"))
        } else {
            destination.to_path_buf()
        };
        let source = self.package_dir(package_id).join(&record.filename);

        info!("Restoring {package_id} {version} to {}", target.display());
        let copy_target = target.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            atomic_copy(&source, &copy_target)?;
            set_executable(&copy_target)
        })
        .await
        .context("Restore task panicked")??;

        Ok((target, record))
    }

    /// Keep the `max_backups` newest backups of `package_id` and delete the rest.
    ///
    /// With `max_backups == 0` every backup, the ledger and the directory are removed. Returns
    /// the number of backups deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read or written.
    pub async fn cleanup(&self, package_id: &str, max_backups: usize) -> Result<usize> {
        self.cleanup_keeping(package_id, max_backups, None).await
    }

    /// [`cleanup`](Self::cleanup), except that `pinned` is neither counted nor removed.
    ///
    /// Used after a restore so the restored version stays available for a repeat restore.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read or written.
    pub async fn cleanup_keeping(
        &self,
        package_id: &str,
        max_backups: usize,
        pinned: Option<&str>,
    ) -> Result<usize> {
        let dir = self.package_dir(package_id);
        if !dir.exists() {
            return Ok(0);
        }
        let ledger_path = self.ledger_path(package_id);
        let package = package_id.to_string();
        let pinned = if max_backups == 0 { None } else { pinned.map(str::to_string) };

        tokio::task::spawn_blocking(move || -> Result<usize> {
            let mut ledger = BackupLedger::load(&ledger_path, &package)?;
            let versions = ledger.versions_newest_first();
            let mut removed = 0;

            let candidates =
                versions.iter().filter(|v| pinned.as_deref() != Some(v.as_str()));
            for version in candidates.skip(max_backups) {
                if let Some(record) = ledger.remove(version) {
                    debug!("Removing backup {package} {version}");
                    remove_file_if_exists(&dir.join(&record.filename))?;
                    removed += 1;
                }
            }

            if max_backups == 0 || ledger.versions.is_empty() {
                remove_package_dir(&dir, &ledger_path, max_backups == 0)?;
            } else if removed > 0 {
                ledger.save(&ledger_path)?;
            }
            Ok(removed)
        })
        .await
        .context("Cleanup task panicked")?
    }

    /// Apply [`cleanup`](Self::cleanup) to every package under the backup root.
    ///
    /// A failure for one package is logged and does not stop the others.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup root cannot be listed.
    pub async fn cleanup_all(&self, max_backups: usize) -> Result<usize> {
        if !self.root.exists() {
            return Ok(0);
        }
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .with_context(|| format!("Failed to list {}", self.root.display()))?;

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let package = entry.file_name().to_string_lossy().into_owned();
            match self.cleanup(&package, max_backups).await {
                Ok(count) => removed += count,
                Err(e) => warn!("Failed to clean up backups of {package}: {e:#}"),
            }
        }
        Ok(removed)
    }

    async fn load_ledger(&self, package_id: &str) -> Result<BackupLedger> {
        let path = self.ledger_path(package_id);
        let package = package_id.to_string();
        tokio::task::spawn_blocking(move || BackupLedger::load(&path, &package))
            .await
            .context("Ledger task panicked")?
    }
}

/// `<package>-<version>.AppImage`, with path separators in the version replaced.
fn backup_filename(package_id: &str, version: &str) -> String {
    let version: String =
        version.chars().map(|c| if matches!(c, '/' | '\\') { '_' } else { c }).collect();
    format!("{package_id}-{version}{BUNDLE_EXTENSION}")
}

/// Remove a package directory whose ledger is empty.
///
/// Files the ledger does not track are deleted only when `discard_untracked` is set; otherwise
/// the ledger is dropped and the directory is left in place.
fn remove_package_dir(dir: &Path, ledger_path: &Path, discard_untracked: bool) -> Result<()> {
    let untracked: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path != ledger_path)
        .collect();

    if untracked.is_empty() || discard_untracked {
        for path in &untracked {
            warn!("Discarding untracked backup file {}", path.display());
        }
        return std::fs::remove_dir_all(dir)
            .with_context(|| format!("Failed to remove backup directory {}", dir.display()));
    }

    remove_file_if_exists(ledger_path)?;
    warn!(
        "Keeping {}: {} file(s) not tracked by the backup ledger",
        dir.display(),
        untracked.len()
    );
    Ok(())
}
