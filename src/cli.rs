//! Command-line interface module for mediaprep.
//!
//! This module handles all CLI-related functionality including:
//! - Argument parsing
//! - Mapping `-v`/`-q` counts onto a log level and installing the subscriber
//! - Loading configuration and running the pipeline

use crate::config::{ConfigError, MediaConfig};
use crate::output::OutputFormatter;
use crate::pipeline::{MediaPipeline, PipelineError, RunOptions};
use crate::summary::RunSummary;
use crate::transform::{SystemToolRunner, ToolRunner};
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Log levels from most to least verbose. Net verbosity 0 selects `INFO`.
const LEVELS: [LevelFilter; 6] = [
    LevelFilter::TRACE,
    LevelFilter::DEBUG,
    LevelFilter::INFO,
    LevelFilter::WARN,
    LevelFilter::ERROR,
    LevelFilter::OFF,
];
const DEFAULT_LEVEL_INDEX: i16 = 2;

/// Sort a photo/video card dump and build resized previews.
#[derive(Debug, Clone, Parser)]
#[command(name = "mediaprep", version)]
#[command(
    about = "Sort a photo/video card dump and build resized previews",
    long_about = "Classifies every file under the image directory by extension, moves raw, \
video and misc files out of the flat jpg/ layout, then runs each enabled job \
(gm mogrify resize/crop, ffmpeg transcode) into its output directory. Outputs \
that already exist are skipped, so re-running is cheap."
)]
pub struct Cli {
    /// More log output; repeat for more
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Less log output; repeat for less
    #[arg(short, long, action = ArgAction::Count)]
    pub quiet: u8,

    /// Base directory holding jpg/ and/or raw-media/
    #[arg(short = 'i', long = "imagedir", value_name = "DIR", default_value = ".")]
    pub imagedir: PathBuf,

    /// Configuration file (default: ./.mediapreprc.toml, then ~/.config/mediaprep/config.toml)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Run only the named job; repeatable. Disabled jobs may be named too
    #[arg(short = 'j', long = "job", value_name = "NAME")]
    pub jobs: Vec<String>,

    /// Report what would happen without changing anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// `quiet - verbose`; negative is chattier than the default.
    pub fn net_verbosity(&self) -> i16 {
        i16::from(self.quiet) - i16::from(self.verbose)
    }

    /// The progress bar only makes sense at the default level and without `--json`.
    pub fn shows_progress(&self) -> bool {
        self.net_verbosity() == 0 && !self.json
    }
}

/// Errors that end the program with a non-zero status.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Log level for a net verbosity, one step per occurrence, clamped to the ends.
pub fn level_for_verbosity(net: i16) -> LevelFilter {
    let index = (DEFAULT_LEVEL_INDEX + net).clamp(0, LEVELS.len() as i16 - 1);
    LEVELS[index as usize]
}

/// Installs the global `tracing` subscriber on stderr.
///
/// `RUST_LOG` takes precedence over the level derived from `net`. Quieter than
/// default, lines carry only the message.
pub fn init_logging(net: i16) {
    let filter = EnvFilter::builder()
        .with_default_directive(level_for_verbosity(net).into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // An already installed subscriber (tests) is kept.
    let _ = if net > 0 {
        builder
            .without_time()
            .with_level(false)
            .with_target(false)
            .try_init()
    } else {
        builder.with_target(false).try_init()
    };
}

/// Loads configuration and runs the pipeline with the real external tools.
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use mediaprep::cli::{Cli, run_cli};
///
/// let cli = Cli::parse_from(["mediaprep", "-i", "/photos/2020-trip", "--dry-run"]);
/// match run_cli(&cli) {
///     Ok(summary) => println!("{} outcomes", summary.total()),
///     Err(e) => eprintln!("Error: {}", e),
/// }
/// ```
pub fn run_cli(cli: &Cli) -> Result<RunSummary, CliError> {
    run_cli_with_runner(cli, &SystemToolRunner)
}

/// Like [`run_cli`], with the external tools provided by `runner`.
pub fn run_cli_with_runner(cli: &Cli, runner: &dyn ToolRunner) -> Result<RunSummary, CliError> {
    let config = MediaConfig::load(cli.config.as_deref())?
        .compile()?
        .restrict_jobs(&cli.jobs)?;

    let mut pipeline = MediaPipeline::new(&config, runner);
    if cli.shows_progress() {
        pipeline = pipeline.with_progress(OutputFormatter::create_progress_bar());
    }

    let summary = pipeline.run(
        &cli.imagedir,
        RunOptions {
            dry_run: cli.dry_run,
        },
    )?;
    Ok(summary)
}
