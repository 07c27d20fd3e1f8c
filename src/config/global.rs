//! Global configuration management for appbox.
//!
//! This module handles the user configuration file (`~/.config/appbox/config.toml`) which stores
//! directory layout, network behaviour and install limits. Every field has a default, so a
//! missing file or a file containing only one section is valid.
//!
//! # Configuration File Location
//!
//! - **Default**: `$XDG_CONFIG_HOME/appbox/config.toml` (usually `~/.config/appbox/config.toml`)
//! - **Override**: the `--config` flag or the `APPBOX_CONFIG_PATH` environment variable
//!
//! # File Format
//!
//! ```toml
//! [directories]
//! install = "~/Applications"
//! backup = "~/Applications/backups"
//!
//! [network]
//! retry_attempts = 3
//! timeout_seconds = 30
//! rate_limit_threshold = 10
//!
//! [install]
//! max_concurrent_downloads = 3
//! max_backups = 1
//! ```
//!
//! Paths may start with `~` or reference environment variables; they are expanded with
//! `shellexpand` when the file is loaded.

use crate::constants::{
    DEFAULT_MAX_BACKUPS, DEFAULT_MAX_CONCURRENT_DOWNLOADS, DEFAULT_MAX_RATE_LIMIT_WAIT,
    DEFAULT_RATE_LIMIT_THRESHOLD, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RETRY_ATTEMPTS,
    GITHUB_API_BASE,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::debug;

/// Environment variable overriding the configuration file location.
pub const CONFIG_PATH_ENV: &str = "APPBOX_CONFIG_PATH";

/// Global configuration structure for appbox.
///
/// # Examples
///
/// ```rust,no_run
/// use appbox_cli::config::GlobalConfig;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = GlobalConfig::load().await?;
/// println!("Installing into {}", config.directories.install.display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct GlobalConfig {
    /// Where bundles, downloads, backups and state live.
    #[serde(default)]
    pub directories: DirectoryConfig,

    /// Retry, timeout and rate-limit behaviour for GitHub calls.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Batch install limits and backup retention.
    #[serde(default)]
    pub install: InstallConfig,
}

/// Directory layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Directory installed bundles are moved into.
    pub install: PathBuf,
    /// Staging directory for in-flight downloads.
    pub download: PathBuf,
    /// Root of the per-package backup directories.
    pub backup: PathBuf,
    /// Directory holding one JSON state file per installed package.
    pub state: PathBuf,
    /// Directory desktop integrations place icons in.
    pub icon: PathBuf,
    /// Optional catalog file; when absent only URL installs are available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<PathBuf>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let config = dirs::config_dir().unwrap_or_else(|| home.join(".config")).join("appbox");
        let cache = dirs::cache_dir().unwrap_or_else(|| home.join(".cache")).join("appbox");
        let install = home.join("Applications");

        Self {
            backup: install.join("backups"),
            icon: install.join("icons"),
            install,
            download: cache.join("downloads"),
            state: config.join("apps"),
            catalog: None,
        }
    }
}

impl DirectoryConfig {
    /// Expand `~` and environment variables in every configured path.
    fn expand(&mut self) {
        for path in [
            &mut self.install,
            &mut self.download,
            &mut self.backup,
            &mut self.state,
            &mut self.icon,
        ] {
            *path = expand_path(path);
        }
        if let Some(catalog) = self.catalog.as_mut() {
            *catalog = expand_path(catalog);
        }
    }
}

/// Network behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Attempts per outbound call, including the first one.
    pub retry_attempts: u32,
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
    /// Remaining API quota below which calls wait for the reset window.
    pub rate_limit_threshold: u64,
    /// Longest wait for a quota reset, in seconds.
    pub max_rate_limit_wait_seconds: u64,
    /// GitHub REST API base URL.
    pub api_base: String,
    /// Personal access token; `GITHUB_TOKEN` is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            timeout_seconds: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            rate_limit_threshold: DEFAULT_RATE_LIMIT_THRESHOLD,
            max_rate_limit_wait_seconds: DEFAULT_MAX_RATE_LIMIT_WAIT.as_secs(),
            api_base: GITHUB_API_BASE.to_string(),
            github_token: None,
        }
    }
}

impl NetworkConfig {
    /// Per-request timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Rate-limit wait cap as a [`Duration`].
    #[must_use]
    pub const fn max_rate_limit_wait(&self) -> Duration {
        Duration::from_secs(self.max_rate_limit_wait_seconds)
    }

    /// Configured token, falling back to the `GITHUB_TOKEN` environment variable.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.github_token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .filter(|token| !token.trim().is_empty())
    }
}

/// Install limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InstallConfig {
    /// Worker-pool size for batch operations.
    pub max_concurrent_downloads: usize,
    /// Backups retained per package; `0` disables backups entirely.
    pub max_backups: usize,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            max_backups: DEFAULT_MAX_BACKUPS,
        }
    }
}

impl GlobalConfig {
    /// Load configuration from the default location, or defaults if the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load() -> Result<Self> {
        Self::load_with_optional(None).await
    }

    /// Load configuration from `path` if given, otherwise from the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };
        if path.exists() {
            Self::load_from(&path).await
        } else {
            debug!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid TOML.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        config.directories.expand();
        Ok(config)
    }

    /// Save configuration to a specific file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write config to {}", path.display()))?;

        // The file may hold a GitHub token
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let mut perms = fs::metadata(path)
                .await
                .with_context(|| format!("Failed to read permissions for {}", path.display()))?
                .permissions();
            perms.set_mode(0o600);
            fs::set_permissions(path, perms).await.with_context(|| {
                format!("Failed to set secure permissions on {}", path.display())
            })?;
        }

        Ok(())
    }

    /// Default configuration file path.
    ///
    /// `APPBOX_CONFIG_PATH` wins over the platform config directory.
    ///
    /// # Errors
    ///
    /// Returns an error if neither the config directory nor the home directory can be found.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_dir = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .ok_or_else(|| anyhow::anyhow!("Unable to determine config directory"))?;

        Ok(config_dir.join("appbox").join("config.toml"))
    }
}

/// Expand `~` and `$VARS` in a path, leaving it unchanged if expansion fails.
fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => path.to_path_buf(),
    }
}
