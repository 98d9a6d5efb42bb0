//! Terminal rendering of relayed entries.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use retro2mp4_core::relay::{EventRelay, LogEntry, LogLevel, SubscriptionToken};

/// Progress bar for the current file with log lines printed above it.
#[derive(Clone)]
pub struct ProgressDisplay {
    bar: ProgressBar,
}

impl Default for ProgressDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressDisplay {
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(progress_style());
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    /// Renders every entry published on `relay` from now on.
    pub fn attach(&self, relay: &EventRelay) -> SubscriptionToken {
        let bar = self.bar.clone();
        relay.subscribe(move |entry| {
            render(&bar, entry);
            Ok(())
        })
    }

    /// Prints a line above the bar.
    pub fn println(&self, line: impl AsRef<str>) {
        self.bar.println(line.as_ref());
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos:>3}% {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("#>-")
}

fn render(bar: &ProgressBar, entry: &LogEntry) {
    match entry.level {
        LogLevel::Progress => {
            let Some(progress) = entry.data.as_ref().and_then(|d| d.get("progress")) else {
                return;
            };
            if let Some(percent) = progress.get("percent").and_then(|p| p.as_f64()) {
                bar.set_position(percent.round() as u64);
            }
            let remaining = progress
                .get("remaining_secs")
                .and_then(|r| r.as_f64())
                .map(|secs| format!(" | ETA {}", format_remaining(secs)))
                .unwrap_or_default();
            bar.set_message(format!("{}{}", entry.message, remaining));
        }
        LogLevel::Info => {
            if entry.message.starts_with("Converting ") {
                bar.set_position(0);
                bar.set_message(entry.message.clone());
            }
            bar.println(entry.format_line());
        }
        LogLevel::Error => {
            let mut line = entry.format_line();
            if let Some(error) = entry
                .data
                .as_ref()
                .and_then(|d| d.get("error"))
                .and_then(|e| e.as_str())
            {
                line.push_str("\n  ");
                line.push_str(&error.replace('\n', "\n  "));
            }
            bar.println(line);
        }
    }
}

/// Compact `1h02m`, `3m05s` or `42s` rendering of an estimate.
pub fn format_remaining(secs: f64) -> String {
    let secs = secs.max(0.0).round() as u64;
    if secs >= 3600 {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}
