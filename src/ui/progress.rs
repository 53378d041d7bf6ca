//! Progress reporting

use crate::types::RelPath;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

/// Spinner for the snapshot phase, bar for the execution phase.
///
/// Both draw to stderr and hide themselves when it is not a terminal.
pub struct ProgressReporter {
    scan_bar: ProgressBar,
    action_bar: ProgressBar,
    started_at: Option<Instant>,
    transferred_bytes: u64,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let scan_bar = ProgressBar::new_spinner();
        scan_bar.enable_steady_tick(Duration::from_millis(120));
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            scan_bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
        }

        let action_bar = ProgressBar::new(0);
        if let Ok(style) =
            ProgressStyle::with_template("{bar:30.cyan/blue} {pos}/{len} actions | {msg}")
        {
            action_bar.set_style(style.progress_chars("=>-"));
        }

        Self {
            scan_bar,
            action_bar,
            started_at: None,
            transferred_bytes: 0,
        }
    }

    pub fn start_scan(&self, label: &str) {
        self.scan_bar.set_message(format!("Scanning {}...", label));
    }

    pub fn update_scan(&self, label: &str, files: u64, bytes: u64) {
        self.scan_bar.set_message(format!(
            "Scanning {}... {} files | {}",
            label,
            files,
            HumanBytes(bytes)
        ));
    }

    pub fn finish_scan(&self, local_files: usize, remote_files: usize) {
        self.scan_bar.finish_with_message(format!(
            "Scanned: {} local files | {} remote files",
            local_files, remote_files
        ));
    }

    /// Initialize the execution bar with the number of non-skip actions.
    pub fn start_actions(&mut self, total: u64) {
        self.started_at = Some(Instant::now());
        self.transferred_bytes = 0;
        self.action_bar.set_length(total);
        self.action_bar.set_position(0);
        self.action_bar.set_message("Starting...".to_string());
    }

    pub fn set_current(&self, action: &str, path: &RelPath) {
        self.action_bar.set_message(format!("{} {}", action, path));
    }

    /// Mark one action complete and refresh throughput display.
    pub fn complete_action(&mut self, bytes: u64) {
        self.transferred_bytes = self.transferred_bytes.saturating_add(bytes);
        self.action_bar.inc(1);

        let throughput = self.current_throughput_bps();
        self.action_bar.set_message(format!(
            "{} transferred | {}/s",
            HumanBytes(self.transferred_bytes),
            HumanBytes(throughput)
        ));
    }

    pub fn action_error(&self, action: &str, path: &RelPath, err: &str) {
        self.action_bar.inc(1);
        self.action_bar
            .println(format!("ERROR {} {}: {}", action, path, err));
    }

    pub fn finish_actions(&self, succeeded: usize, failed: usize, bytes: u64) {
        self.action_bar.finish_with_message(format!(
            "Done: {} succeeded, {} failed | {} transferred",
            succeeded,
            failed,
            HumanBytes(bytes)
        ));
    }

    fn current_throughput_bps(&self) -> u64 {
        match self.started_at {
            Some(started) => {
                let secs = started.elapsed().as_secs_f64();
                if secs > 0.0 {
                    (self.transferred_bytes as f64 / secs) as u64
                } else {
                    0
                }
            }
            None => 0,
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_action_progress_increments_position_and_bytes() {
        let mut reporter = ProgressReporter::new();
        reporter.start_actions(3);

        reporter.complete_action(128);
        reporter.complete_action(256);
        reporter.action_error("Upload", &RelPath::parse("x.tex").unwrap(), "boom");

        assert_eq!(reporter.action_bar.position(), 3);
        assert_eq!(reporter.action_bar.length(), Some(3));
        assert_eq!(reporter.transferred_bytes, 384);
    }

    #[test]
    fn test_current_action_updates_message() {
        let reporter = ProgressReporter::new();
        reporter.set_current("Download", &RelPath::parse("chapters/intro.tex").unwrap());

        let msg = reporter.action_bar.message();
        assert!(msg.contains("Download"));
        assert!(msg.contains("chapters/intro.tex"));
    }

    #[test]
    fn test_throughput_becomes_non_zero_after_transfer_time() {
        let mut reporter = ProgressReporter::new();
        reporter.start_actions(1);
        thread::sleep(Duration::from_millis(30));
        reporter.complete_action(1024);

        assert!(reporter.current_throughput_bps() > 0);
    }

    #[test]
    fn test_scan_methods_execute_without_panicking() {
        let reporter = ProgressReporter::new();
        reporter.start_scan("local tree");
        reporter.update_scan("local tree", 3, 2048);
        reporter.finish_scan(3, 4);
    }
}
