//! Global constants used throughout appbox.
//!
//! This module contains timeout values, retry parameters, default limits and on-disk names
//! used by the resolver, verifier, backup manager and orchestrator.

use std::time::Duration;

/// Schema version written into every persisted `AppState`.
///
/// State files carrying any other value are rejected rather than coerced.
pub const CONFIG_VERSION: u32 = 2;

/// Default number of attempts for every outbound network call.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Delay before the first retry; doubles on each further attempt.
pub const INITIAL_RETRY_DELAY_MS: u64 = 500;

/// Upper bound on a single retry delay.
pub const MAX_RETRY_DELAY_MS: u64 = 10_000;

/// Default per-request timeout for API calls and downloads.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Remaining API quota below which the resolver waits for the reset window.
pub const DEFAULT_RATE_LIMIT_THRESHOLD: u64 = 10;

/// Longest the resolver will sleep waiting for an API quota reset.
pub const DEFAULT_MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(300);

/// Default worker-pool size for batch installs and updates.
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 3;

/// Default number of backups retained per package.
pub const DEFAULT_MAX_BACKUPS: usize = 1;

/// Number of releases requested when looking for the newest prerelease.
pub const PRERELEASE_PAGE_SIZE: u32 = 20;

/// Default GitHub REST API base URL.
pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// Canonical extension appended to every installed bundle.
pub const BUNDLE_EXTENSION: &str = ".AppImage";

/// Name of the per-package backup ledger file.
pub const BACKUP_METADATA_FILE: &str = "metadata.json";

/// User agent sent with every request (GitHub rejects requests without one).
pub const USER_AGENT: &str = concat!("appbox/", env!("CARGO_PKG_VERSION"));
