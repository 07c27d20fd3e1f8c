//! List installed packages.

use super::CliConfig;
use super::common::build_installer;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

/// Command to list installed packages.
#[derive(Args)]
pub struct ListCommand {
    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

impl ListCommand {
    /// Execute the list command.
    ///
    /// # Errors
    ///
    /// Returns an error if the state directory cannot be read.
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let installer = build_installer(config, None).await?;
        let packages = installer.list_installed().await?;

        if self.json {
            let json = serde_json::to_string_pretty(&packages).context("Failed to serialize list")?;
            println!("{json}");
            return Ok(());
        }

        if packages.is_empty() {
            println!("No packages installed");
            return Ok(());
        }

        let width = packages.iter().map(|p| p.name.len()).max().unwrap_or(0);
        for package in &packages {
            let verified = if package.verified { "verified".green() } else { "unverified".yellow() };
            let backups = if package.backups.is_empty() {
                String::new()
            } else {
                format!(" backups: {}", package.backups.join(", "))
            };
            println!(
                "{}  {:<12} {:<8} {}{}",
                format!("{:<width$}", package.name).bold(),
                package.version,
                package.source,
                verified,
                backups.dimmed(),
            );
        }
        Ok(())
    }
}
