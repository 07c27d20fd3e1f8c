//! Remove installed packages.

use super::CliConfig;
use super::common::build_installer;
use anyhow::{Result, bail};
use clap::Args;
use colored::Colorize;

/// Command to remove installed packages.
#[derive(Args)]
pub struct RemoveCommand {
    /// Packages to remove
    #[arg(required = true, value_name = "NAME")]
    names: Vec<String>,

    /// Keep the backups of removed packages
    #[arg(long)]
    keep_backups: bool,
}

impl RemoveCommand {
    /// Execute the remove command.
    ///
    /// # Errors
    ///
    /// Returns an error if any package could not be removed.
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let installer = build_installer(config, None).await?;
        let results = installer.remove(&self.names, self.keep_backups).await?;

        let mut failed = 0;
        for result in &results {
            if result.removed {
                println!("  {} {} {}", "✓".green(), result.name.bold(), result.message);
            } else {
                failed += 1;
                println!("  {} {} {}", "✗".red(), result.name.bold(), result.message.red());
            }
        }
        if failed > 0 {
            bail!("{failed} package(s) could not be removed");
        }
        Ok(())
    }
}
