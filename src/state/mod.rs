//! Persistent per-package state.
//!
//! Every installed package has one JSON record, `<state_dir>/<package>.json`, holding where it
//! came from and what is installed. Records are written atomically, replaced wholesale on every
//! update and deleted on removal.
//!
//! Records carry [`CONFIG_VERSION`]. A record with any other version is rejected with
//! [`AppboxError::ConfigVersion`] rather than coerced into the current shape.
//!
//! ```json
//! {
//!   "config_version": 2,
//!   "source": "catalog",
//!   "catalog_ref": "firefox",
//!   "state": {
//!     "version": "1.2.3",
//!     "installed_date": "2025-01-01T00:00:00Z",
//!     "installed_path": "/home/user/Applications/firefox.AppImage",
//!     "verification": { "overall_passed": true, "actual_method": "digest", "methods": [...] },
//!     "icon": { "installed": false }
//!   }
//! }
//! ```

use crate::constants::CONFIG_VERSION;
use crate::core::AppboxError;
use crate::installer::naming::NamingPolicy;
use crate::utils::fs::{atomic_write, remove_file_if_exists};
use crate::verification::{VerificationOutcome, VerificationPolicy};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Complete persisted record of one installed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppState {
    /// Schema version of this record
    pub config_version: u32,
    /// Where the package came from
    #[serde(flatten)]
    pub source: PackageSource,
    /// What is installed
    pub state: InstalledState,
}

impl AppState {
    /// New record at the current schema version.
    #[must_use]
    pub const fn new(source: PackageSource, state: InstalledState) -> Self {
        Self {
            config_version: CONFIG_VERSION,
            source,
            state,
        }
    }
}

/// Origin of a package. `catalog_ref` exists only for catalog packages and `overrides` only for
/// URL packages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum PackageSource {
    /// Installed by catalog name
    Catalog {
        /// Catalog entry name
        catalog_ref: String,
    },
    /// Installed from a repository URL
    Url {
        /// Coordinates and policies captured at install time
        overrides: UrlOverrides,
    },
}

impl PackageSource {
    /// Short label for listings.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Catalog {
                ..
            } => "catalog",
            Self::Url {
                ..
            } => "url",
        }
    }
}

/// Coordinates and policies of a URL-installed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlOverrides {
    /// Repository owner
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Installed release was a prerelease fallback
    #[serde(default)]
    pub prerelease: bool,
    /// Verification settings
    #[serde(default)]
    pub verification: VerificationPolicy,
    /// File naming settings
    #[serde(default)]
    pub naming: NamingPolicy,
}

/// What is currently installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledState {
    /// Installed version
    pub version: String,
    /// When this version was installed
    pub installed_date: DateTime<Utc>,
    /// Path of the installed bundle
    pub installed_path: PathBuf,
    /// Verification result for the installed file
    pub verification: VerificationOutcome,
    /// Desktop icon state
    #[serde(default)]
    pub icon: IconState,
}

/// Desktop icon state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconState {
    /// An icon was installed
    #[serde(default)]
    pub installed: bool,
    /// Icon location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Deserialize)]
struct VersionProbe {
    #[serde(default)]
    config_version: Option<u32>,
}

/// JSON-file-per-package state store.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// Store rooted at `dir`.
    #[must_use]
    pub const fn new(dir: PathBuf) -> Self {
        Self {
            dir,
        }
    }

    /// Directory holding the records.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, package_id: &str) -> PathBuf {
        self.dir.join(format!("{package_id}.json"))
    }

    /// Load the record of `package_id`, or `None` if it is not installed.
    ///
    /// # Errors
    ///
    /// Returns [`AppboxError::ConfigVersion`] for records of another schema version, or an
    /// error if the file cannot be read or parsed.
    pub async fn load(&self, package_id: &str) -> Result<Option<AppState>> {
        let path = self.path_for(package_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        // Check the version before the shape so old records get the migrate hint
        let probe: VersionProbe = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        let found = probe.config_version.unwrap_or(0);
        if found != CONFIG_VERSION {
            return Err(AppboxError::ConfigVersion {
                package: package_id.to_string(),
                found,
                expected: CONFIG_VERSION,
            }
            .into());
        }

        let state = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(state))
    }

    /// Persist the record of `package_id`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`AppboxError::ConfigVersion`] if `state` carries another schema version, or an
    /// error if the write fails.
    pub async fn save(&self, package_id: &str, state: &AppState) -> Result<()> {
        if state.config_version != CONFIG_VERSION {
            return Err(AppboxError::ConfigVersion {
                package: package_id.to_string(),
                found: state.config_version,
                expected: CONFIG_VERSION,
            }
            .into());
        }
        let path = self.path_for(package_id);
        let content = serde_json::to_vec_pretty(state).context("Failed to serialize state")?;
        debug!("Saving state for {package_id} to {}", path.display());
        tokio::task::spawn_blocking(move || atomic_write(&path, &content))
            .await
            .context("State write task panicked")?
    }

    /// Delete the record of `package_id`. Returns whether a record existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub async fn remove(&self, package_id: &str) -> Result<bool> {
        let path = self.path_for(package_id);
        tokio::task::spawn_blocking(move || remove_file_if_exists(&path))
            .await
            .context("State remove task panicked")?
    }

    /// Identifiers of every stored package, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be listed.
    pub async fn list_ids(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("Failed to list {}", self.dir.display()))?;

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn installed(version: &str) -> InstalledState {
        InstalledState {
            version: version.to_string(),
            installed_date: Utc::now(),
            installed_path: PathBuf::from("/apps/app.AppImage"),
            verification: VerificationOutcome::skipped("verification disabled"),
            icon: IconState::default(),
        }
    }

    #[tokio::test]
    async fn test_round_trip_catalog_and_url() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path().to_path_buf());

        let catalog = AppState::new(
            PackageSource::Catalog {
                catalog_ref: "firefox".to_string(),
            },
            installed("1.2.3"),
        );
        let url = AppState::new(
            PackageSource::Url {
                overrides: UrlOverrides {
                    owner: "o".to_string(),
                    repo: "tool".to_string(),
                    prerelease: true,
                    verification: VerificationPolicy::default(),
                    naming: NamingPolicy::default(),
                },
            },
            installed("0.1.0-beta"),
        );

        store.save("firefox", &catalog).await.unwrap();
        store.save("tool", &url).await.unwrap();

        assert_eq!(store.load("firefox").await.unwrap(), Some(catalog));
        assert_eq!(store.load("tool").await.unwrap(), Some(url));
        assert_eq!(store.list_ids().await.unwrap(), vec!["firefox", "tool"]);
    }

    #[tokio::test]
    async fn test_source_fields_are_exclusive() {
        let state = AppState::new(
            PackageSource::Catalog {
                catalog_ref: "firefox".to_string(),
            },
            installed("1.0.0"),
        );
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["source"], "catalog");
        assert_eq!(json["catalog_ref"], "firefox");
        assert!(json.get("overrides").is_none());

        let url = AppState::new(
            PackageSource::Url {
                overrides: UrlOverrides {
                    owner: "o".to_string(),
                    repo: "tool".to_string(),
                    prerelease: false,
                    verification: VerificationPolicy::default(),
                    naming: NamingPolicy::default(),
                },
            },
            installed("1.0.0"),
        );
        let json = serde_json::to_value(&url).unwrap();
        assert_eq!(json["source"], "url");
        assert_eq!(json["overrides"]["repo"], "tool");
        assert!(json.get("catalog_ref").is_none());
    }

    #[tokio::test]
    async fn test_missing_record_is_none() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path().join("absent"));
        assert_eq!(store.load("nope").await.unwrap(), None);
        assert!(store.list_ids().await.unwrap().is_empty());
        assert!(!store.remove("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_old_config_version_rejected() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path().to_path_buf());
        std::fs::write(
            temp.path().join("legacy.json"),
            r#"{"config_version": 1, "appimage": {"version": "1.0"}}"#,
        )
        .unwrap();

        let err = store.load("legacy").await.unwrap_err();
        match err.downcast_ref::<AppboxError>() {
            Some(AppboxError::ConfigVersion {
                found,
                expected,
                ..
            }) => {
                assert_eq!(*found, 1);
                assert_eq!(*expected, CONFIG_VERSION);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_save_rejects_wrong_version() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path().to_path_buf());
        let mut state = AppState::new(
            PackageSource::Catalog {
                catalog_ref: "a".to_string(),
            },
            installed("1.0.0"),
        );
        state.config_version = 1;
        assert!(store.save("a", &state).await.is_err());
    }

    #[tokio::test]
    async fn test_remove() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path().to_path_buf());
        let state = AppState::new(
            PackageSource::Catalog {
                catalog_ref: "a".to_string(),
            },
            installed("1.0.0"),
        );
        store.save("a", &state).await.unwrap();
        assert!(store.remove("a").await.unwrap());
        assert_eq!(store.load("a").await.unwrap(), None);
    }
}
