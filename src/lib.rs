//! appbox - AppImage package manager
//!
//! Installs, updates and maintains portable Linux application bundles (AppImages) published as
//! GitHub release assets, addressed either by catalog name or by repository URL.
//!
//! # Architecture Overview
//!
//! Every install or update runs one pipeline per package:
//!
//! ```text
//! resolve -> download -> verify -> back up previous -> install -> persist state
//! ```
//!
//! - The live file is only replaced after the download has been verified
//! - The previous version is kept as a checksummed backup that can be restored later
//! - Pipelines for a batch run concurrently under a configurable limit; one failure never
//!   stops the others
//!
//! # Core Modules
//!
//! - [`github`] - Release resolution, asset selection, retries and rate-limit throttling
//! - [`verification`] - Digest and checksum-file verification chain
//! - [`backup`] - Versioned, checksummed backups with retention
//! - [`installer`] - Install/update orchestration and batch reporting
//!
//! ## Supporting Modules
//!
//! - [`catalog`] - Read-only package catalog
//! - [`state`] - Per-package JSON state records
//! - [`config`] - Global configuration (`~/.config/appbox/config.toml`)
//! - [`core`] - Error taxonomy and user-facing error formatting
//! - [`utils`] - Atomic file operations and progress rendering
//! - [`cli`] - Command-line interface
//!
//! # Example
//!
//! ```rust,no_run
//! use appbox_cli::catalog::JsonCatalog;
//! use appbox_cli::config::GlobalConfig;
//! use appbox_cli::installer::Installer;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = GlobalConfig::load().await?;
//! let catalog = JsonCatalog::load_optional(config.directories.catalog.as_deref()).await?;
//! let installer = Installer::new(&config, Arc::new(catalog))?;
//!
//! for check in installer.check_updates(&[]).await? {
//!     println!("{}: {} -> {:?}", check.name, check.installed_version, check.latest_version);
//! }
//! # Ok(())
//! # }
//! ```

// Core functionality
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;

// Pipeline
pub mod backup;
pub mod github;
pub mod installer;
pub mod verification;

// Stores
pub mod catalog;
pub mod state;

// Supporting modules
pub mod utils;

// Test utilities (only compiled in test mode or with test-utils feature)
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
