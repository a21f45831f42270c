//! Terminal chrome: spinners and progress bars on stderr, banner and errors on stdout.

use indicatif::{ProgressBar, ProgressStyle};
use kuttai_core::Error;
use std::time::Duration;

const TICKS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

pub const MAGENTA: &str = "\x1b[35m";
pub const CYAN: &str = "\x1b[36m";
pub const BOLD: &str = "\x1b[1m";
pub const RESET: &str = "\x1b[0m";

pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars(TICKS)
        .template("{spinner:.cyan} {msg}...")
    {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Byte progress for downloads; unknown totals render as a spinner with a byte counter.
pub fn download_bar(total: Option<u64>) -> ProgressBar {
    let (pb, template) = match total {
        Some(len) => (
            ProgressBar::new(len),
            "{spinner:.cyan} [{bar:40.cyan/dim}] {bytes}/{total_bytes} ({eta}) {msg}",
        ),
        None => (ProgressBar::new_spinner(), "{spinner:.cyan} {bytes} {msg}"),
    };
    if let Ok(style) = ProgressStyle::default_bar()
        .tick_chars(TICKS)
        .template(template)
    {
        pb.set_style(style.progress_chars("█▓░"));
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

pub fn banner() -> String {
    format!(
        "{CYAN}{BOLD}
  _  __     _   _      _    ___
 | |/ /   _| |_| |_   / \\  |_ _|
 | ' / | | | __| __| / _ \\  | |
 | . \\ |_| | |_| |_ / ___ \\ | |
 |_|\\_\\__,_|\\__|\\__/_/   \\_\\___|
{RESET}
  Your KTU study companion · by EcoCee (ecocee.in)
"
    )
}

pub fn assistant_line(text: &str) -> String {
    format!("{MAGENTA}🤖 KuttAI{RESET}: {text}\n")
}

/// `❌ message` plus, when there is one, `💡 hint`.
pub fn render_error(prefix: &str, e: &Error) -> String {
    let hint = e.hint();
    if hint.is_empty() {
        format!("❌ {prefix}: {e}")
    } else {
        format!("❌ {prefix}: {e}\n💡 {hint}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_error_includes_hint() {
        let e = Error::DomainNotAllowed {
            url: "https://evil.com/".to_string(),
            allowed: vec!["ktu.edu.in".to_string()],
        };
        let s = render_error("Failed to fetch", &e);
        assert!(s.starts_with("❌ Failed to fetch: "));
        assert!(s.contains("\n💡 "));
    }
}
