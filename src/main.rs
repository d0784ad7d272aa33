mod commands;
mod render;
mod utils;

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser};
use evsync_core::config::{FileConfig, SyncConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "evsync")]
#[command(version)]
#[command(about = "Copy events missing on either side between your vault and a Nextcloud calendar")]
struct Cli {
    /// Read settings from this file instead of ~/.config/evsync/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Sync with this calendar (by display name)
    #[arg(short, long, value_name = "NAME")]
    calendar: Option<String>,

    /// Show what would be written without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Log more (-v for info, -vv for debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut file = FileConfig::load(cli.config.as_deref())?;
    if let Some(calendar) = cli.calendar {
        file.calendar_name = calendar;
    }
    let config = SyncConfig::from_env(file)?;

    commands::sync::run(&config, cli.dry_run).await
}

/// `RUST_LOG` wins over `-v` when set.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
