//! Per-file outcomes and the run summary they roll up into.

use crate::file_category::Category;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Terminal state of one file (or one file × job pairing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingOutcome {
    Converted,
    Moved,
    /// Already in a dated-card or organized directory; nothing to do.
    LeftInPlace,
    SkippedExists,
    SkippedMissingSource,
    /// The output name could not be derived from the source path.
    SkippedUnderivablePath,
    FailedExternalTool,
    /// Any other per-file filesystem failure.
    Failed,
}

impl ProcessingOutcome {
    pub const ALL: [ProcessingOutcome; 8] = [
        ProcessingOutcome::Converted,
        ProcessingOutcome::Moved,
        ProcessingOutcome::LeftInPlace,
        ProcessingOutcome::SkippedExists,
        ProcessingOutcome::SkippedMissingSource,
        ProcessingOutcome::SkippedUnderivablePath,
        ProcessingOutcome::FailedExternalTool,
        ProcessingOutcome::Failed,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ProcessingOutcome::Converted => "converted",
            ProcessingOutcome::Moved => "moved",
            ProcessingOutcome::LeftInPlace => "left_in_place",
            ProcessingOutcome::SkippedExists => "skipped_exists",
            ProcessingOutcome::SkippedMissingSource => "skipped_missing_source",
            ProcessingOutcome::SkippedUnderivablePath => "skipped_underivable_path",
            ProcessingOutcome::FailedExternalTool => "failed_external_tool",
            ProcessingOutcome::Failed => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ProcessingOutcome::FailedExternalTool | ProcessingOutcome::Failed
        )
    }
}

impl fmt::Display for ProcessingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A file that did not reach a successful outcome, and why.
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub path: PathBuf,
    /// Job spec name; `None` for relocation.
    pub job: Option<String>,
    pub outcome: ProcessingOutcome,
    pub reason: String,
}

/// Counts and timings for one run. Nothing here is persisted.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Local>,
    pub base_dir: PathBuf,
    pub dry_run: bool,
    pub files_by_category: BTreeMap<Category, usize>,
    pub counts: BTreeMap<ProcessingOutcome, usize>,
    pub scan_seconds: f64,
    pub transform_seconds: f64,
    pub failures: Vec<FailureRecord>,
}

impl RunSummary {
    pub fn new(base_dir: PathBuf, dry_run: bool) -> Self {
        Self {
            started_at: Local::now(),
            base_dir,
            dry_run,
            files_by_category: BTreeMap::new(),
            counts: BTreeMap::new(),
            scan_seconds: 0.0,
            transform_seconds: 0.0,
            failures: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: ProcessingOutcome) {
        *self.counts.entry(outcome).or_insert(0) += 1;
    }

    /// Records an outcome together with the reason it is not a success.
    pub fn record_failure(&mut self, record: FailureRecord) {
        self.record(record.outcome);
        self.failures.push(record);
    }

    pub fn count(&self, outcome: ProcessingOutcome) -> usize {
        self.counts.get(&outcome).copied().unwrap_or(0)
    }

    /// Total outcomes recorded.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Number of outcomes that are failures.
    pub fn failure_count(&self) -> usize {
        self.counts
            .iter()
            .filter(|(outcome, _)| outcome.is_failure())
            .map(|(_, count)| count)
            .sum()
    }

    pub fn set_scan_elapsed(&mut self, elapsed: Duration) {
        self.scan_seconds = elapsed.as_secs_f64();
    }

    pub fn set_transform_elapsed(&mut self, elapsed: Duration) {
        self.transform_seconds = elapsed.as_secs_f64();
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
