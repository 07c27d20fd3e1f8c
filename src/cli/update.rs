//! Update installed packages.
//!
//! Without names every installed package is considered. `--check` only reports which packages
//! have a newer release.

use super::CliConfig;
use super::common::build_installer;
use anyhow::{Result, bail};
use clap::Args;
use colored::Colorize;

/// Command to update installed packages.
#[derive(Args)]
pub struct UpdateCommand {
    /// Packages to update; all installed packages when omitted
    #[arg(value_name = "NAME")]
    names: Vec<String>,

    /// Only check for updates
    #[arg(long)]
    check: bool,

    /// Reinstall packages that are already up to date
    #[arg(long, conflicts_with = "check")]
    force: bool,

    /// Maximum number of packages updated at once
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,
}

impl UpdateCommand {
    /// Execute the update command.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch cannot start or any package failed.
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let installer = build_installer(config, self.concurrency).await?;

        if self.check {
            let checks = installer.check_updates(&self.names).await?;
            if checks.is_empty() {
                println!("No packages installed");
                return Ok(());
            }
            for check in &checks {
                match (&check.latest_version, &check.error) {
                    (_, Some(error)) => {
                        println!("  {} {} {}", "!".yellow(), check.name.bold(), error);
                    }
                    (Some(latest), None) if check.update_available => println!(
                        "  {} {} {} -> {}",
                        "↑".cyan(),
                        check.name.bold(),
                        check.installed_version,
                        latest.green()
                    ),
                    _ => println!(
                        "  {} {} {} (up to date)",
                        "-".dimmed(),
                        check.name.bold(),
                        check.installed_version
                    ),
                }
            }
            let available = checks.iter().filter(|c| c.update_available).count();
            println!("{available} update(s) available");
            return Ok(());
        }

        let report = installer.update(&self.names, self.force).await?;
        report.print_summary("updated");
        if !report.all_succeeded() {
            bail!("{} package(s) failed to update", report.failed() + report.invalid.len());
        }
        Ok(())
    }
}
