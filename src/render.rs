//! Colored terminal rendering for sync plans and results.

use evsync_core::Event;
use evsync_core::sync::{SyncDiff, SyncReport};
use owo_colors::OwoColorize;

pub trait Render {
    fn render(&self) -> String;
}

/// Above this many events per direction, show a count instead of a list
const COMPACT_THRESHOLD: usize = 5;

impl Render for Event {
    fn render(&self) -> String {
        let time = format!("{} → {}", self.start, self.end);
        format!("{} {} {}", "+".green(), self.title.green(), time.dimmed())
    }
}

impl Render for SyncDiff {
    fn render(&self) -> String {
        let totals = format!(
            "   {} in vault, {} in calendar",
            self.vault_total, self.calendar_total
        );

        if self.is_empty() {
            return format!("{}\n{}", totals.dimmed(), "   In sync".dimmed());
        }

        let mut lines = vec![totals.dimmed().to_string()];

        if !self.to_vault.is_empty() {
            lines.push("   Missing from vault:".dimmed().to_string());
            render_event_list(&self.to_vault, &mut lines);
        }

        if !self.to_calendar.is_empty() {
            lines.push("   Missing from calendar:".dimmed().to_string());
            render_event_list(&self.to_calendar, &mut lines);
        }

        lines.join("\n")
    }
}

impl Render for SyncReport {
    fn render(&self) -> String {
        let mut lines = Vec::new();

        if !self.stored_in_vault.is_empty() {
            lines.push("   Stored in vault:".dimmed().to_string());
            render_uid_list(&self.stored_in_vault, &mut lines);
        }
        if !self.created_in_calendar.is_empty() {
            lines.push("   Created in calendar:".dimmed().to_string());
            render_uid_list(&self.created_in_calendar, &mut lines);
        }

        lines.push(format!(
            "{} Stored in vault: {}, created in calendar: {}",
            "✓".green(),
            self.stored_in_vault.len(),
            self.created_in_calendar.len()
        ));
        lines.join("\n")
    }
}

fn render_uid_list(uids: &[String], lines: &mut Vec<String>) {
    if uids.len() <= COMPACT_THRESHOLD {
        for uid in uids {
            lines.push(format!("   {} {}", "+".green(), uid));
        }
    } else {
        let label = format!("({} {})", uids.len(), pluralize("event", uids.len()));
        lines.push(format!("   {} {}", "+".green(), label.green()));
    }
}

fn render_event_list(events: &[Event], lines: &mut Vec<String>) {
    if events.len() <= COMPACT_THRESHOLD {
        for event in events {
            lines.push(format!("   {}", event.render()));
        }
    } else {
        let label = format!("({} new {})", events.len(), pluralize("event", events.len()));
        lines.push(format!("   {} {}", "+".green(), label.green()));
    }
}

fn pluralize(word: &str, count: usize) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{word}s")
    }
}
