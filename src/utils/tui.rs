use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Spinner on stderr; call `finish_and_clear` before printing results.
pub fn create_spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner().tick_strings(&["-", "\\", "|", "/"]);
    let style = style.clone().template("{msg} {spinner}").unwrap_or(style);
    spinner.set_style(style);
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}
