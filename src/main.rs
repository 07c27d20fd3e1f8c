//! appbox CLI entry point
//!
//! Parses arguments, installs the tracing subscriber and runs the command. Errors are shown
//! with context and a suggestion, and the process exits with status 1.

use anyhow::Result;
use appbox_cli::cli::{Cli, CliConfig};
use appbox_cli::core::user_friendly_error;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.build_config();
    init_logging(&config);

    match cli.execute_with_config(config).await {
        Ok(()) => Ok(()),
        Err(e) => {
            user_friendly_error(e).display();
            std::process::exit(1);
        }
    }
}

/// `RUST_LOG` wins over the flags; `--quiet` without `RUST_LOG` disables logging.
fn init_logging(config: &CliConfig) {
    let filter = match (std::env::var("RUST_LOG").ok(), config.log_level.as_deref()) {
        (Some(env), _) if !env.is_empty() => EnvFilter::new(env),
        (_, Some(level)) => EnvFilter::new(format!("appbox_cli={level},appbox={level}")),
        (_, None) => return,
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}
