//! Progress reporting for pre-compression runs
//!
//! Provides real-time progress display using indicatif progress bars.

use crate::walker::{RunProgress, RunReport};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter that displays run status
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Invalid progress template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, progress: &RunProgress) {
        let msg = format!(
            "Queued: {} ({} waiting) | Done: {} | Gz: {} | Read: {} | {:.0}/s | Workers: {}",
            format_number(progress.queued),
            format_number(progress.pending),
            format_number(progress.processed),
            format_number(progress.compressed),
            format_size(progress.bytes_in, BINARY),
            progress.files_per_second(),
            progress.workers,
        );

        self.bar.set_message(msg);
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| {
            chunk
                .iter()
                .rev()
                .map(|&b| b as char)
                .collect::<String>()
        })
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Share of the original size saved by the artifacts, in percent
fn saved_percent(bytes_in: u64, bytes_out: u64) -> f64 {
    if bytes_in == 0 {
        0.0
    } else {
        100.0 * (bytes_in.saturating_sub(bytes_out)) as f64 / bytes_in as f64
    }
}

/// Print a summary of the run
pub fn print_summary(report: &RunReport) {
    let secs = report.duration.as_secs_f64();
    let rate = if secs > 0.0 {
        report.pool.received as f64 / secs
    } else {
        0.0
    };

    println!();
    if report.is_success() {
        println!("{}", style("Pre-compression Complete").green().bold());
    } else {
        println!("{}", style("Pre-compression Failed").red().bold());
    }
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Directories:").bold(), format_number(report.walk.dirs));
    println!("  {} {}", style("Examined:").bold(), format_number(report.pool.received));
    println!("  {} {}", style("Compressed:").bold(), format_number(report.compressed));
    println!(
        "  {} {} ({})",
        style("Not smaller:").bold(),
        format_number(report.pool.not_smaller),
        format_size(report.pool.bytes_rejected, BINARY),
    );
    println!(
        "  {} {}",
        style("Already done:").bold(),
        format_number(report.walk.already_compressed)
    );
    println!(
        "  {} {} -> {} ({:.1}% saved)",
        style("Artifacts:").bold(),
        format_size(report.pool.bytes_in, BINARY),
        format_size(report.pool.bytes_out, BINARY),
        saved_percent(report.pool.bytes_in, report.pool.bytes_out),
    );
    println!(
        "  {} {:.1}s ({:.0} files/sec)",
        style("Duration:").bold(),
        secs,
        rate
    );
    if let Some(e) = &report.error {
        println!("  {} {}", style("Error:").yellow().bold(), e);
    }
    println!();
}

/// Print a header at the start of the run
pub fn print_header(root: &str, workers: usize, mtime: &str) {
    println!();
    println!(
        "{} {}",
        style("pre-compress").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Root:").bold(), root);
    println!("  {} {}", style("Workers:").bold(), workers);
    println!("  {} {}", style("M-time:").bold(), mtime);
    println!();
}
