//! Output formatting and styling module.
//!
//! Provides a centralized interface for all CLI output: colored status lines,
//! the transform progress bar and the end-of-run summary table. Logging goes
//! through `tracing` on stderr; this module owns what the user reads on stdout.

use crate::file_category::CLASSIFICATION_ORDER;
use crate::summary::{ProcessingOutcome, RunSummary};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

/// Manages all CLI output with consistent styling and formatting.
///
/// This struct provides methods for:
/// - Success messages (green with ✓)
/// - Error messages (red with ✗)
/// - Warning messages (yellow with ⚠)
/// - Progress bars for the transform phase
/// - The run summary table
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use mediaprep::output::OutputFormatter;
    /// OutputFormatter::success("All previews up to date");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark, on stderr.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Creates a progress bar over file × job pairings.
    ///
    /// The length is set by the pipeline once the work list is known.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use mediaprep::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar();
    /// pb.set_length(10);
    /// pb.inc(1);
    /// pb.finish_and_clear();
    /// ```
    pub fn create_progress_bar() -> ProgressBar {
        let pb = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        pb.set_style(style);
        pb
    }

    /// Prints the run summary: outcome counts, files per category, phase
    /// timings and every failure with its reason.
    pub fn run_summary(summary: &RunSummary) {
        if summary.dry_run {
            Self::dry_run_notice("Nothing was moved, copied or converted.");
        }

        Self::header("SUMMARY");
        let width = ProcessingOutcome::ALL
            .iter()
            .map(|outcome| outcome.label().len())
            .max()
            .unwrap_or(0)
            .max(8);

        println!("{:<width$} | {}", "Outcome".bold(), "Count".bold());
        println!("{}", "-".repeat(width + 10));
        for outcome in ProcessingOutcome::ALL {
            let count = summary.count(outcome);
            if count == 0 {
                continue;
            }
            let count = if outcome.is_failure() {
                count.to_string().red()
            } else {
                count.to_string().green()
            };
            println!("{:<width$} | {}", outcome.label(), count);
        }
        println!("{}", "-".repeat(width + 10));
        println!(
            "{:<width$} | {}",
            "Total".bold(),
            summary.total().to_string().green().bold()
        );

        Self::header("FILES");
        for category in CLASSIFICATION_ORDER {
            let count = summary
                .files_by_category
                .get(&category)
                .copied()
                .unwrap_or(0);
            println!(
                "{:<width$} | {} ({})",
                category.as_str(),
                count,
                category.description()
            );
        }

        Self::header("TIME");
        println!("{:<width$} | {:.2}s", "scan", summary.scan_seconds);
        println!("{:<width$} | {:.2}s", "transform", summary.transform_seconds);
        println!(
            "{:<width$} | {}",
            "started",
            summary.started_at.format("%Y-%m-%d %H:%M:%S")
        );

        if summary.failures.is_empty() {
            return;
        }
        Self::header("PROBLEMS");
        for failure in &summary.failures {
            let job = failure
                .job
                .as_deref()
                .map(|job| format!(" [{job}]"))
                .unwrap_or_default();
            let line = format!(
                "{}{} {}: {}",
                failure.path.display(),
                job,
                failure.outcome,
                failure.reason
            );
            if failure.outcome.is_failure() {
                Self::error(&line);
            } else {
                Self::warning(&line);
            }
        }
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }
}
