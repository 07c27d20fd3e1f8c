//! Setup shared by the CLI commands.

use super::CliConfig;
use crate::catalog::JsonCatalog;
use crate::config::GlobalConfig;
use crate::installer::Installer;
use crate::utils::progress::BatchProgress;
use anyhow::Result;
use colored::Colorize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Load the global configuration named by `config`.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be parsed.
pub async fn load_config(config: &CliConfig) -> Result<GlobalConfig> {
    GlobalConfig::load_with_optional(config.config_path.clone()).await
}

/// Build an installer with the configured catalog, progress rendering and Ctrl-C handling.
///
/// # Errors
///
/// Returns an error if the configuration or catalog cannot be loaded.
pub async fn build_installer(config: &CliConfig, concurrency: Option<usize>) -> Result<Installer> {
    let global = load_config(config).await?;
    let catalog = JsonCatalog::load_optional(global.directories.catalog.as_deref()).await?;
    debug!("Loaded catalog with {} entries", crate::catalog::Catalog::names(&catalog).len());

    let mut installer = Installer::new(&global, Arc::new(catalog))?
        .with_observer(Arc::new(BatchProgress::new(config.show_progress())));
    if let Some(concurrency) = concurrency {
        installer = installer.with_concurrency(concurrency);
    }
    cancel_on_ctrl_c(installer.cancellation_token().clone());
    Ok(installer)
}

/// Cancel `token` on the first Ctrl-C.
pub fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Cancelling: no new packages will start".yellow());
            token.cancel();
        }
    });
}
