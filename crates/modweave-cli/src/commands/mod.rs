pub mod resolve;

use indicatif::{ProgressBar, ProgressStyle};
use modweave_schema::RunStatus;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_CYCLES: u8 = 1;
pub const EXIT_INVALID_INPUT: u8 = 2;
pub const EXIT_WRITE_ERROR: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

fn plain_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    pb.set_style(style);
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_status(status: RunStatus) -> String {
    use console::Style;
    let word = status.to_string();
    match status {
        RunStatus::Ok => Style::new().green().apply_to(word).to_string(),
        RunStatus::Warn => Style::new().yellow().apply_to(word).to_string(),
        RunStatus::Error => Style::new().red().bold().apply_to(word).to_string(),
    }
}

/// Exit code for an error message: write failures are 3, anything else that
/// stops a run before it completes is an input problem.
pub fn exit_code_for(msg: &str) -> u8 {
    if msg.starts_with("failed to write") {
        EXIT_WRITE_ERROR
    } else {
        EXIT_INVALID_INPUT
    }
}
