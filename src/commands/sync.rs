use anyhow::Result;
use evsync_core::caldav::CalDavCalendar;
use evsync_core::config::SyncConfig;
use evsync_core::sync::SyncDiff;
use evsync_core::vault::VaultStore;
use owo_colors::OwoColorize;

use crate::render::Render;
use crate::utils::tui;

pub async fn run(config: &SyncConfig, dry_run: bool) -> Result<()> {
    let spinner = tui::create_spinner("Connecting to vault");
    let vault = VaultStore::connect(&config.vault, config.read_retry).await;
    spinner.finish_and_clear();
    let vault = vault?;

    let spinner = tui::create_spinner(format!(
        "Looking up calendar {}",
        config.nextcloud.calendar_name
    ));
    let calendar = CalDavCalendar::connect(&config.nextcloud, config.read_retry).await;
    spinner.finish_and_clear();
    let calendar = calendar?;

    println!("📅 {} {}", calendar.calendar_name(), calendar.url().dimmed());

    let spinner = tui::create_spinner("Reading events");
    let diff = SyncDiff::from_stores(&vault, &calendar).await;
    spinner.finish_and_clear();
    let diff = diff?;

    println!("{}", diff.render());

    if dry_run {
        if !diff.is_empty() {
            println!("\n{}", "Dry run, nothing written.".dimmed());
        }
        return Ok(());
    }

    if diff.is_empty() {
        return Ok(());
    }

    let report = diff.apply(&vault, &calendar).await?;
    println!("\n{}", report.render());

    Ok(())
}
