//! Package catalog.
//!
//! The catalog maps a package name to its GitHub coordinates and policies. It is read-only;
//! appbox never writes it. The JSON file is an object keyed by package name:
//!
//! ```json
//! {
//!   "obsidian": {
//!     "owner": "obsidianmd",
//!     "repo": "obsidian-releases",
//!     "verification": { "checksum_file": "SHA256SUMS" },
//!     "naming": { "target_name": "Obsidian", "characteristic_suffixes": ["x86_64"] }
//!   }
//! }
//! ```

use crate::installer::desktop::IconPolicy;
use crate::installer::naming::NamingPolicy;
use crate::verification::VerificationPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Catalog record for one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Package name; filled from the catalog key
    #[serde(default, skip_serializing)]
    pub name: String,
    /// Repository owner
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Track prereleases instead of stable releases
    #[serde(default)]
    pub prerelease: bool,
    /// Verification settings
    #[serde(default)]
    pub verification: VerificationPolicy,
    /// Naming settings
    #[serde(default)]
    pub naming: NamingPolicy,
    /// Icon settings
    #[serde(default)]
    pub icon: IconPolicy,
}

/// Read-only lookup from package name to [`CatalogEntry`].
pub trait Catalog: Send + Sync {
    /// Entry for `name`; lookups ignore ASCII case.
    fn get_entry(&self, name: &str) -> Option<CatalogEntry>;

    /// All package names, sorted.
    fn names(&self) -> Vec<String>;

    /// Catalog names close to `name`, best first.
    fn suggestions(&self, name: &str) -> Vec<String> {
        let name = name.to_ascii_lowercase();
        let mut scored: Vec<(f64, String)> = self
            .names()
            .into_iter()
            .map(|candidate| (strsim::jaro_winkler(&name, &candidate), candidate))
            .filter(|(score, _)| *score >= 0.8)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.into_iter().take(3).map(|(_, n)| n).collect()
    }
}

/// Catalog backed by a JSON file (or built in memory).
#[derive(Debug, Clone, Default)]
pub struct JsonCatalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl JsonCatalog {
    /// Catalog from entries, keyed by their lowercased names.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.name.to_ascii_lowercase(), entry))
                .collect(),
        }
    }

    /// Parse a catalog document.
    ///
    /// # Errors
    ///
    /// Returns an error if `content` is not a valid catalog.
    pub fn parse(content: &str) -> Result<Self> {
        let raw: BTreeMap<String, CatalogEntry> =
            serde_json::from_str(content).context("Failed to parse catalog")?;
        Ok(Self::from_entries(raw.into_iter().map(|(name, mut entry)| {
            entry.name = name;
            entry
        })))
    }

    /// Load a catalog file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read catalog {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid catalog {}", path.display()))
    }

    /// Load `path` if given, otherwise an empty catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is given but cannot be loaded.
    pub async fn load_optional(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path).await,
            None => Ok(Self::default()),
        }
    }
}

impl Catalog for JsonCatalog {
    fn get_entry(&self, name: &str) -> Option<CatalogEntry> {
        self.entries.get(&name.to_ascii_lowercase()).cloned()
    }

    fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}
