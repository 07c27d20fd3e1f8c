//! Manage backups of previously installed versions.
//!
//! # Examples
//!
//! ```bash
//! appbox backup list                  # every package with backups
//! appbox backup list firefox          # versions of one package
//! appbox backup restore firefox 1.2.1
//! appbox backup cleanup --keep 2      # prune every package
//! ```

use super::CliConfig;
use super::common::{build_installer, load_config};
use crate::backup::BackupManager;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

/// Command to manage backups.
#[derive(Args)]
pub struct BackupCommand {
    #[command(subcommand)]
    action: BackupAction,
}

#[derive(Subcommand)]
enum BackupAction {
    /// List retained backup versions.
    List {
        /// Package to list; all installed packages when omitted
        name: Option<String>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Restore a backed-up version as the installed version.
    Restore {
        /// Package to restore
        name: String,

        /// Version to restore
        version: String,
    },

    /// Delete old backups beyond the retention limit.
    Cleanup {
        /// Package to clean up; every package when omitted
        name: Option<String>,

        /// Backups to keep per package; the configured `max_backups` when omitted
        #[arg(long, value_name = "N")]
        keep: Option<usize>,
    },
}

impl BackupCommand {
    /// Execute the backup command.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup operation fails.
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        match self.action {
            BackupAction::List {
                name,
                json,
            } => list(config, name, json).await,
            BackupAction::Restore {
                name,
                version,
            } => {
                let installer = build_installer(config, None).await?;
                let record = installer.restore(&name, &version).await?;
                println!(
                    "{} Restored {} {} ({})",
                    "✓".green(),
                    name.bold(),
                    record.version,
                    &record.sha256[..record.sha256.len().min(12)]
                );
                Ok(())
            }
            BackupAction::Cleanup {
                name,
                keep,
            } => {
                let global = load_config(config).await?;
                let manager = BackupManager::new(global.directories.backup.clone());
                let keep = keep.unwrap_or(global.install.max_backups);
                let removed = match name {
                    Some(name) => manager.cleanup(&name.to_ascii_lowercase(), keep).await?,
                    None => manager.cleanup_all(keep).await?,
                };
                println!("Removed {removed} backup(s)");
                Ok(())
            }
        }
    }
}

async fn list(config: &CliConfig, name: Option<String>, json: bool) -> Result<()> {
    let global = load_config(config).await?;
    let manager = BackupManager::new(global.directories.backup.clone());

    let names = match name {
        Some(name) => vec![name.to_ascii_lowercase()],
        None => package_dirs(&manager).await?,
    };

    let mut listing = Vec::new();
    for name in names {
        let records = manager.records(&name).await?;
        if !records.is_empty() {
            listing.push((name, records));
        }
    }

    if json {
        let value: serde_json::Map<String, serde_json::Value> = listing
            .into_iter()
            .map(|(name, records)| Ok((name, serde_json::to_value(records)?)))
            .collect::<Result<_, serde_json::Error>>()?;
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if listing.is_empty() {
        println!("No backups");
        return Ok(());
    }
    for (name, records) in listing {
        println!("{}", name.bold());
        for record in records {
            println!(
                "  {:<16} {} {:>10} bytes  {}",
                record.version,
                record.created_at.format("%Y-%m-%d %H:%M"),
                record.size_bytes,
                record.filename.dimmed()
            );
        }
    }
    Ok(())
}

async fn package_dirs(manager: &BackupManager) -> Result<Vec<String>> {
    let root = manager.root();
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut entries = tokio::fs::read_dir(root)
        .await
        .with_context(|| format!("Failed to list {}", root.display()))?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}
