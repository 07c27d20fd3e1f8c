//! Command-line interface for appbox.
//!
//! Each command lives in its own module with its clap argument struct and an `execute`
//! method. Commands share setup (configuration loading, catalog loading, progress rendering and
//! Ctrl-C handling) through [`common`].
//!
//! # Available Commands
//!
//! - `install` - Install packages by catalog name or GitHub repository URL
//! - `update` - Update installed packages, or only check for updates with `--check`
//! - `remove` - Remove installed packages and, by default, their backups
//! - `list` - List installed packages
//! - `backup` - List, restore and prune backups
//!
//! # Examples
//!
//! ```bash
//! appbox install firefox obsidian
//! appbox install https://github.com/owner/tool --force
//! appbox update --check
//! appbox backup restore firefox 1.2.1
//! appbox --quiet --no-progress list --json
//! ```
//!
//! # Global Options
//!
//! - `--verbose` - Enable debug output
//! - `--quiet` - Suppress log output
//! - `--no-progress` - Disable progress bars
//! - `--config` - Use a different configuration file

mod backup;
mod common;
mod install;
mod list;
mod remove;
mod update;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Runtime settings derived from global flags, passed to every command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliConfig {
    /// Log filter for the tracing subscriber; `None` disables logging.
    pub log_level: Option<String>,

    /// Disable progress bars.
    pub no_progress: bool,

    /// Configuration file overriding the default location.
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether progress bars should be drawn.
    #[must_use]
    pub fn show_progress(&self) -> bool {
        !self.no_progress && self.log_level.as_deref() != Some("debug")
    }
}

/// Main CLI structure for appbox.
#[derive(Parser)]
#[command(
    name = "appbox",
    about = "Install, update and back up AppImage bundles from GitHub releases",
    version,
    long_about = "appbox installs portable Linux application bundles from GitHub releases by catalog name or repository URL, verifies every download, and keeps checksummed backups of previous versions."
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output for debugging.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress log output; only results and errors are printed.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the global configuration file.
    #[arg(short, long, global = true, env = "APPBOX_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Disable progress bars and spinners.
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install packages by catalog name or GitHub repository URL.
    Install(install::InstallCommand),

    /// Update installed packages.
    Update(update::UpdateCommand),

    /// Remove installed packages.
    Remove(remove::RemoveCommand),

    /// List installed packages.
    List(list::ListCommand),

    /// Manage backups of previous versions.
    Backup(backup::BackupCommand),
}

impl Cli {
    /// Execute the parsed command.
    ///
    /// # Errors
    ///
    /// Returns the command's error; batch commands fail when any target failed.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    /// Translate global flags into a [`CliConfig`].
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            None
        } else {
            Some("info".to_string())
        };

        CliConfig {
            log_level,
            no_progress: self.no_progress || self.quiet,
            config_path: self.config.clone(),
        }
    }

    /// Execute with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns the command's error.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        match self.command {
            Commands::Install(cmd) => cmd.execute(&config).await,
            Commands::Update(cmd) => cmd.execute(&config).await,
            Commands::Remove(cmd) => cmd.execute(&config).await,
            Commands::List(cmd) => cmd.execute(&config).await,
            Commands::Backup(cmd) => cmd.execute(&config).await,
        }
    }
}
