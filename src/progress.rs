//! Progress reporting for the crawler
//!
//! Provides real-time progress display using indicatif progress bars.

use crate::crawl::{ScanProgress, ScanSummary};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter that displays crawl status
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, progress: &ScanProgress) {
        let totals = &progress.totals;
        let msg = format!(
            "Visited: {} | New: {} | Unchanged: {} | Size: {} | Rate: {:.0}/s | Errors: {} | Pending: {} | Workers: {}/{}",
            format_number(totals.visited),
            format_number(totals.files_cataloged),
            format_number(totals.files_unchanged),
            format_size(totals.bytes_identified, BINARY),
            progress.entries_per_second(),
            format_number(progress.errors),
            format_number(progress.pending),
            progress.active_workers,
            progress.total_workers,
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
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of the scan results
pub fn print_summary(summary: &ScanSummary, catalog: &str, catalog_size: Option<u64>) {
    let duration_secs = summary.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        summary.visited as f64 / duration_secs
    } else {
        0.0
    };

    let title = if summary.completed {
        style("Scan Complete").green().bold()
    } else {
        style("Scan Interrupted").yellow().bold()
    };

    println!();
    println!("{}", title);
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Visited:").bold(), format_number(summary.visited));
    println!(
        "  {} {}",
        style("Directories:").bold(),
        format_number(summary.dirs_expanded)
    );
    println!(
        "  {} {} ({} new metadata, {} duplicates)",
        style("Cataloged:").bold(),
        format_number(summary.files_cataloged),
        format_number(summary.metadata_inserted),
        format_number(summary.dedup_hits)
    );
    println!(
        "  {} {}",
        style("Unchanged:").bold(),
        format_number(summary.files_unchanged)
    );
    println!(
        "  {} {}",
        style("Identified:").bold(),
        format_size(summary.bytes_identified, BINARY)
    );
    println!(
        "  {} {:.1}s ({:.0} entries/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    if summary.skipped > 0 {
        println!("  {} {}", style("Skipped:").bold(), format_number(summary.skipped));
    }
    if summary.mismatches > 0 {
        println!(
            "  {} {}",
            style("Mismatches:").yellow().bold(),
            format_number(summary.mismatches)
        );
    }
    if summary.errors > 0 {
        println!(
            "  {} {}",
            style("Errors:").yellow().bold(),
            format_number(summary.errors)
        );
    }
    if summary.worker_failures > 0 {
        println!(
            "  {} {}",
            style("Worker failures:").red().bold(),
            format_number(summary.worker_failures)
        );
    }
    match catalog_size {
        Some(size) => println!(
            "  {} {} ({})",
            style("Catalog:").bold(),
            catalog,
            format_size(size, BINARY)
        ),
        None => println!("  {} {}", style("Catalog:").bold(), catalog),
    }
    println!();
}

/// Print a header at the start of the scan
pub fn print_header(roots: &[String], workers: usize, catalog: &str) {
    println!();
    println!(
        "{} {}",
        style("fscatalog").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    for root in roots {
        println!("  {} {}", style("Root:").bold(), root);
    }
    println!("  {} {}", style("Workers:").bold(), workers);
    println!("  {} {}", style("Catalog:").bold(), catalog);
    println!();
}
