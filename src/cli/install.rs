//! Install packages.
//!
//! # Examples
//!
//! ```bash
//! # Catalog names
//! appbox install firefox obsidian
//!
//! # Repository URLs (latest stable release, newest prerelease if there is none)
//! appbox install https://github.com/owner/tool
//!
//! # Reinstall even if already installed
//! appbox install firefox --force
//! ```

use super::CliConfig;
use super::common::build_installer;
use anyhow::{Result, bail};
use clap::Args;

/// Command to install packages.
#[derive(Args)]
pub struct InstallCommand {
    /// Catalog names or `https://github.com/<owner>/<repo>` URLs
    #[arg(required = true, value_name = "TARGET")]
    targets: Vec<String>,

    /// Reinstall packages that are already installed
    #[arg(long)]
    force: bool,

    /// Maximum number of packages installed at once
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,
}

impl InstallCommand {
    /// Execute the install command.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch cannot start or any target failed.
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let installer = build_installer(config, self.concurrency).await?;
        let report = installer.install(&self.targets, self.force).await?;
        report.print_summary("installed");

        if !report.all_succeeded() {
            bail!(
                "{} of {} targets failed",
                report.failed() + report.invalid.len(),
                report.results.len() + report.invalid.len() + report.already_installed.len()
            );
        }
        Ok(())
    }
}
