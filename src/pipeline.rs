//! One complete run over a base directory.
//!
//! The scan phase classifies the tree and relocates raw, video and misc files
//! out of the legacy layout. The transform phase classifies again (relocation
//! changed paths; a dry run applies the reported moves to the first tree
//! instead) and applies every enabled job spec to each image and video that
//! is not itself a job output. Per-file problems become outcomes in the
//! [`RunSummary`]; only a missing base directory, a missing input layout or a
//! configuration error ends the run.

use crate::classifier::{ClassifiedFile, ClassifiedTree, ClassifyError, FileClassifier};
use crate::config::{CompiledConfig, ConfigError};
use crate::file_category::Category;
use crate::file_organizer::{FileOrganizer, OrganizeError};
use crate::job_spec::JobSpec;
use crate::summary::{FailureRecord, ProcessingOutcome, RunSummary};
use crate::transform::{ToolRunner, TransformError, TransformRunner};
use indicatif::ProgressBar;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

const RELOCATED: [Category; 3] = [Category::Raw, Category::Video, Category::Misc];
const TRANSFORMED: [Category; 2] = [Category::Image, Category::Video];

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Classify(#[from] ClassifyError),
    #[error(
        "{} has neither a '{legacy_root}' nor a '{dated_card_root}' directory",
        .base_dir.display()
    )]
    MissingInputLayout {
        base_dir: PathBuf,
        legacy_root: String,
        dated_card_root: String,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub dry_run: bool,
}

/// Drives the scan and transform phases with one configuration and tool runner.
pub struct MediaPipeline<'a> {
    config: &'a CompiledConfig,
    runner: &'a dyn ToolRunner,
    progress: ProgressBar,
}

impl<'a> MediaPipeline<'a> {
    pub fn new(config: &'a CompiledConfig, runner: &'a dyn ToolRunner) -> Self {
        Self {
            config,
            runner,
            progress: ProgressBar::hidden(),
        }
    }

    /// Advance `progress` once per file × job pairing during the transform phase.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Runs both phases over `base_dir`.
    ///
    /// # Errors
    ///
    /// Fails if `base_dir` is not a directory, if it contains neither input
    /// root, or if a job spec turns out to be inconsistent with the files it
    /// was applied to. Per-file failures are reported in the summary instead.
    pub fn run(&self, base_dir: &Path, options: RunOptions) -> Result<RunSummary, PipelineError> {
        if !base_dir.is_dir() {
            return Err(ClassifyError::DirectoryNotFound(base_dir.to_path_buf()).into());
        }
        let base_dir = std::path::absolute(base_dir)
            .map_err(|_| ClassifyError::DirectoryNotFound(base_dir.to_path_buf()))?;
        self.check_layout(&base_dir)?;

        let mut summary = RunSummary::new(base_dir.clone(), options.dry_run);
        let classifier = FileClassifier::new(&self.config.registry, &self.config.filters);

        info!("Scanning {}", base_dir.display());
        let scan_started = Instant::now();
        let tree = classifier.classify_tree(&base_dir)?;
        summary.files_by_category = tree.counts();
        for (category, count) in &summary.files_by_category {
            debug!(%category, count, "classified");
        }
        let moves = self.relocate_all(&base_dir, &tree, options, &mut summary)?;
        summary.set_scan_elapsed(scan_started.elapsed());

        info!("Transforming files in {}", base_dir.display());
        let transform_started = Instant::now();
        let tree = if options.dry_run {
            tree.with_moves(&moves, &self.config.registry, &base_dir)
        } else {
            classifier.classify_tree(&base_dir)?
        };
        self.transform_all(&base_dir, &tree, options, &mut summary)?;
        summary.set_transform_elapsed(transform_started.elapsed());

        info!(
            "Finished: {} outcomes, {} failures",
            summary.total(),
            summary.failure_count()
        );
        Ok(summary)
    }

    fn check_layout(&self, base_dir: &Path) -> Result<(), PipelineError> {
        let legacy_root = self.config.registry.legacy_root();
        let dated_card_root = self.config.registry.dated_card_root();
        if base_dir.join(legacy_root).is_dir() || base_dir.join(dated_card_root).is_dir() {
            return Ok(());
        }
        Err(PipelineError::MissingInputLayout {
            base_dir: base_dir.to_path_buf(),
            legacy_root: legacy_root.to_string(),
            dated_card_root: dated_card_root.to_string(),
        })
    }

    /// Relocates every raw, video and misc file, returning the source and
    /// destination of each file reported as moved.
    fn relocate_all(
        &self,
        base_dir: &Path,
        tree: &ClassifiedTree,
        options: RunOptions,
        summary: &mut RunSummary,
    ) -> Result<HashMap<PathBuf, PathBuf>, PipelineError> {
        let organizer =
            FileOrganizer::new(base_dir, &self.config.relocate).dry_run(options.dry_run);
        let mut moves = HashMap::new();

        for category in RELOCATED {
            for file in tree.bucket(category) {
                let result = organizer.relocate(file).and_then(|outcome| {
                    if outcome == ProcessingOutcome::Moved {
                        let destination = organizer.destination_for(file)?;
                        moves.insert(file.absolute_path.clone(), destination);
                    }
                    Ok(outcome)
                });
                match result {
                    Ok(outcome) => summary.record(outcome),
                    Err(OrganizeError::Config(e)) => return Err(e.into()),
                    Err(e) => {
                        error!("{e}");
                        summary.record_failure(FailureRecord {
                            path: file.absolute_path.clone(),
                            job: None,
                            outcome: ProcessingOutcome::Failed,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }
        Ok(moves)
    }

    fn transform_all(
        &self,
        base_dir: &Path,
        tree: &ClassifiedTree,
        options: RunOptions,
        summary: &mut RunSummary,
    ) -> Result<(), PipelineError> {
        let transformer = TransformRunner::new(
            base_dir,
            &self.config.tools,
            self.config.registry.dated_card_root(),
            self.runner,
        )
        .dry_run(options.dry_run);

        let mut work: Vec<(&ClassifiedFile, &JobSpec)> = Vec::new();
        for category in TRANSFORMED {
            for file in tree.bucket(category) {
                if self.config.is_job_output(base_dir, &file.absolute_path) {
                    debug!(path = %file.absolute_path.display(), "job output, not a source");
                    continue;
                }
                for spec in self.config.jobs.job_specs_for(category) {
                    work.push((file, spec));
                }
            }
        }

        self.progress.set_length(work.len() as u64);
        for (file, spec) in work {
            self.progress.set_message(display_name(&file.absolute_path));
            match transformer.run_job(file, spec) {
                Ok(outcome) => summary.record(outcome),
                Err(TransformError::Config(e)) => {
                    self.progress.abandon();
                    return Err(e.into());
                }
                Err(e) => {
                    let outcome = failure_outcome(&e);
                    if outcome == ProcessingOutcome::SkippedUnderivablePath {
                        warn!(job = %spec.name, "{e}");
                    } else {
                        error!(job = %spec.name, "{e}");
                    }
                    summary.record_failure(FailureRecord {
                        path: file.absolute_path.clone(),
                        job: Some(spec.name.clone()),
                        outcome,
                        reason: e.to_string(),
                    });
                }
            }
            self.progress.inc(1);
        }
        self.progress.finish_and_clear();
        Ok(())
    }
}

fn failure_outcome(e: &TransformError) -> ProcessingOutcome {
    match e {
        TransformError::PathDerivation { .. } => ProcessingOutcome::SkippedUnderivablePath,
        TransformError::ExternalToolFailure { .. } => ProcessingOutcome::FailedExternalTool,
        _ => ProcessingOutcome::Failed,
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
