//! Test utilities for appbox
//!
//! Helpers shared by unit tests and the integration suite: once-only logging, a configuration
//! rooted in a temporary directory, and fixtures for state records and bundles.
//!
//! # Example
//!
//! ```rust,no_run
//! use appbox_cli::test_utils::{init_test_logging, test_config};
//!
//! let temp = tempfile::TempDir::new().unwrap();
//! init_test_logging(None);
//! let config = test_config(temp.path(), "http://127.0.0.1:8080");
//! assert!(config.directories.install.starts_with(temp.path()));
//! ```

use crate::config::{DirectoryConfig, GlobalConfig, InstallConfig, NetworkConfig};
use crate::state::{AppState, IconState, InstalledState, PackageSource};
use crate::verification::VerificationOutcome;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. With `level` set that level is used; otherwise logging is
/// enabled only when `RUST_LOG` is set.
///
/// ```bash
/// RUST_LOG=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

/// Configuration with every directory under `root` and the API pointed at `api_base`.
///
/// Retries are kept to two attempts and the rate-limit wait is disabled so failing tests stay
/// fast.
#[must_use]
pub fn test_config(root: &Path, api_base: &str) -> GlobalConfig {
    GlobalConfig {
        directories: DirectoryConfig {
            install: root.join("apps"),
            download: root.join("downloads"),
            backup: root.join("backups"),
            state: root.join("state"),
            icon: root.join("icons"),
            catalog: None,
        },
        network: NetworkConfig {
            retry_attempts: 2,
            timeout_seconds: 5,
            rate_limit_threshold: 0,
            max_rate_limit_wait_seconds: 0,
            api_base: api_base.to_string(),
            github_token: None,
        },
        install: InstallConfig {
            max_concurrent_downloads: 2,
            max_backups: 1,
        },
    }
}

/// Catalog-sourced state record for `package` at `version`.
#[must_use]
pub fn sample_state(package: &str, version: &str) -> AppState {
    AppState::new(
        PackageSource::Catalog {
            catalog_ref: package.to_string(),
        },
        InstalledState {
            version: version.to_string(),
            installed_date: Utc::now(),
            installed_path: PathBuf::from(format!("/nonexistent/{package}.AppImage")),
            verification: VerificationOutcome::skipped("fixture"),
            icon: IconState::default(),
        },
    )
}

/// Bundle bytes that differ per `label`.
#[must_use]
pub fn bundle_bytes(label: &str) -> Vec<u8> {
    format!("\x7fELF appimage fixture {label}").into_bytes()
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
