//! Progress reporting for batch runs (offline sessions, bulk matching).
//!
//! Interactive runs get indicatif bars; `--log-only` hides them and emits
//! periodic tracing lines instead so the output stays readable in log files.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::info;

const BAR_TEMPLATE: &str =
    "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}, ETA: {eta})";
const SPINNER_TEMPLATE: &str = "{msg} {spinner} [{elapsed_precise}]";

/// Global flag for log-only mode (set from args in main)
pub static LOG_ONLY: AtomicBool = AtomicBool::new(false);

pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// "12.3s" below a minute, "4.5m" above
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}

/// Bar over `len` recordings; hidden in log-only mode.
pub fn create_progress_bar(len: u64, msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if is_log_only() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .map(|s| s.progress_chars("=> "))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb
}

/// Spinner for catalog fetches of unknown duration.
pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if is_log_only() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        let style = ProgressStyle::with_template(SPINNER_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(100));
    }
    pb.set_message(msg.to_string());
    pb
}

/// Whether `current` lands on a reporting step.
fn should_log(current: u64, total: u64, interval: u64) -> bool {
    current == total || (interval > 0 && current % interval == 0)
}

/// Periodic progress line, only in log-only mode.
pub fn log_progress(phase: &str, current: u64, total: u64, interval: u64) {
    if is_log_only() && should_log(current, total, interval) {
        let pct = if total == 0 {
            100.0
        } else {
            100.0 * current as f64 / total as f64
        };
        info!("[{}] {}/{} ({:.1}%)", phase, current, total, pct);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(12_340)), "12.3s");
        assert_eq!(format_duration(Duration::from_secs(270)), "4.5m");
    }

    #[test]
    fn test_should_log() {
        assert!(should_log(10, 25, 10));
        assert!(should_log(25, 25, 10));
        assert!(!should_log(11, 25, 10));
        // Zero interval only reports completion
        assert!(!should_log(3, 5, 0));
        assert!(should_log(5, 5, 0));
    }
}
