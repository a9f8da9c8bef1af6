//! Progress rendering for long-running transfers.
//!
//! A [`Reporter`] is handed to every component that moves bytes. It renders
//! indicatif bars on stderr in text mode and renders nothing in JSON mode,
//! keeping stdout parseable.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Byte-progress template for uploads and downloads.
const BYTES_TEMPLATE: &str = "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})";

/// Spinner template for operations of unknown length.
const SPINNER_TEMPLATE: &str = "{spinner} {msg}";

/// Factory for progress bars, honoring the output mode.
#[derive(Debug, Clone, Copy)]
pub struct Reporter {
    enabled: bool,
}

impl Reporter {
    /// Creates a reporter; pass `false` to suppress all rendering.
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Reporter that renders nothing.
    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    /// Byte progress bar for a transfer of `size` bytes; a spinner when the
    /// size is unknown (`size < 0`).
    pub fn bytes(&self, size: i64, label: &str) -> Option<ProgressBar> {
        if !self.enabled {
            return None;
        }
        if size < 0 {
            return self.spinner(label);
        }

        let bar = ProgressBar::new(size as u64);
        bar.set_style(
            ProgressStyle::with_template(BYTES_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_message(label.to_string());
        Some(bar)
    }

    /// Indeterminate spinner with a steady tick.
    pub fn spinner(&self, label: &str) -> Option<ProgressBar> {
        if !self.enabled {
            return None;
        }

        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template(SPINNER_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(label.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        Some(bar)
    }
}

/// Finishes and clears a bar if one was rendered.
pub fn finish(bar: Option<ProgressBar>) {
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_reporter_renders_nothing() {
        let reporter = Reporter::disabled();
        assert!(reporter.bytes(100, "x").is_none());
        assert!(reporter.spinner("x").is_none());
    }

    #[test]
    fn test_unknown_size_falls_back_to_spinner() {
        let reporter = Reporter::new(true);
        let bar = reporter.bytes(-1, "x").unwrap();
        assert_eq!(bar.length(), None);
        bar.finish_and_clear();
    }
}
