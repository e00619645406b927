//! Preview generation through external tools.
//!
//! For every image or video file and every enabled job spec of its category,
//! [`TransformRunner::run_job`] produces one output under the job's
//! destination directory. Outputs are built in a hidden `.partial-<name>` work
//! file next to the final path and renamed into place only after every tool
//! invocation succeeded, so an existing output is always a finished one and
//! "skip if it exists" is a safe resumption rule.

use crate::classifier::ClassifiedFile;
use crate::config::{ConfigError, ToolConfig};
use crate::file_category::Category;
use crate::file_organizer::ensure_dir;
use crate::job_spec::JobSpec;
use crate::summary::ProcessingOutcome;
use std::fmt;
use std::fs::{self, File, FileTimes};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Number of leading characters of the card directory name used as the
/// date-code prefix of video outputs (`2020-01-01_`).
pub const DATE_CODE_LEN: usize = 11;

const PARTIAL_PREFIX: &str = ".partial-";

#[derive(Debug, Error)]
pub enum TransformError {
    #[error(
        "Cannot derive output name for {}: no '{marker}' card directory of {min}+ characters",
        .path.display(),
        min = DATE_CODE_LEN
    )]
    PathDerivation { path: PathBuf, marker: String },
    #[error("{program} failed ({}): {}", describe_exit(.exit_code), .stderr.trim())]
    ExternalToolFailure {
        program: String,
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("Failed to launch {program}: {source}")]
    ToolLaunch {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to create directory {}: {source}", .path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to copy {} to {}: {source}", .from.display(), .to.display())]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to finish {}: {source}", .path.display())]
    FinalizeFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} has no file name component", .0.display())]
    MissingFileName(PathBuf),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "killed by signal".to_string(),
    }
}

/// One external program call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolInvocation {
    /// Starts an invocation from a configured command (program plus leading args).
    fn from_command(command: &[String]) -> Result<Self, ConfigError> {
        let (program, args) = command
            .split_first()
            .ok_or(ConfigError::EmptyToolCommand("tool"))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// What a finished tool process reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stderr: String,
}

/// Runs external programs synchronously.
pub trait ToolRunner {
    /// Runs the invocation to completion.
    ///
    /// An `Err` means the process could not be started at all.
    fn run(&self, invocation: &ToolInvocation) -> io::Result<ToolOutput>;
}

/// [`ToolRunner`] backed by real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemToolRunner;

impl ToolRunner for SystemToolRunner {
    fn run(&self, invocation: &ToolInvocation) -> io::Result<ToolOutput> {
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()?;

        Ok(ToolOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Applies job specs to classified files beneath one base directory.
pub struct TransformRunner<'a> {
    base_dir: &'a Path,
    tools: &'a ToolConfig,
    dated_card_root: &'a str,
    runner: &'a dyn ToolRunner,
    dry_run: bool,
}

impl<'a> TransformRunner<'a> {
    pub fn new(
        base_dir: &'a Path,
        tools: &'a ToolConfig,
        dated_card_root: &'a str,
        runner: &'a dyn ToolRunner,
    ) -> Self {
        Self {
            base_dir,
            tools,
            dated_card_root,
            runner,
            dry_run: false,
        }
    }

    /// Report what would happen without touching the filesystem or running tools.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Destination path of `file` under `spec`.
    pub fn destination_for(
        &self,
        file: &ClassifiedFile,
        spec: &JobSpec,
    ) -> Result<PathBuf, TransformError> {
        let name = match spec.applies_to {
            Category::Image => file
                .absolute_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| TransformError::MissingFileName(file.absolute_path.clone()))?,
            Category::Video => {
                let extension = spec.output_extension.as_deref().ok_or_else(|| {
                    ConfigError::MissingOutputExtension(spec.name.clone())
                })?;
                derive_video_name(&file.absolute_path, self.dated_card_root, extension)?
            }
            category => {
                return Err(ConfigError::UntransformableCategory {
                    job: spec.name.clone(),
                    category,
                }
                .into());
            }
        };
        Ok(self.base_dir.join(&spec.destination_subdir).join(name))
    }

    /// Produces the output of `spec` for `file`.
    ///
    /// Returns [`ProcessingOutcome::SkippedExists`] without running any tool
    /// when the output is already there, and [`ProcessingOutcome::Converted`]
    /// once a new output has been renamed into place.
    ///
    /// # Errors
    ///
    /// A tool exiting unsuccessfully yields [`TransformError::ExternalToolFailure`]
    /// carrying its exit code and stderr; the work file is removed. A video
    /// whose path has no card directory yields [`TransformError::PathDerivation`].
    /// A job for a different category is a configuration error.
    pub fn run_job(
        &self,
        file: &ClassifiedFile,
        spec: &JobSpec,
    ) -> Result<ProcessingOutcome, TransformError> {
        if spec.applies_to != file.category {
            return Err(ConfigError::JobCategoryMismatch {
                job: spec.name.clone(),
                expected: spec.applies_to,
                found: file.category,
            }
            .into());
        }

        let source = &file.absolute_path;
        let destination = self.destination_for(file, spec)?;

        if destination.exists() {
            debug!(job = %spec.name, path = %destination.display(), "skipping existing file");
            return Ok(ProcessingOutcome::SkippedExists);
        }

        if !source.exists() {
            warn!("missing: {}", source.display());
            return Ok(ProcessingOutcome::SkippedMissingSource);
        }

        if self.dry_run {
            info!(
                "[dry run] would convert {} -> {}",
                source.display(),
                destination.display()
            );
            return Ok(ProcessingOutcome::Converted);
        }

        let destination_dir = self.base_dir.join(&spec.destination_subdir);
        ensure_dir(&destination_dir).map_err(|e| TransformError::DirectoryCreationFailed {
            path: destination_dir.clone(),
            source: e,
        })?;

        let partial = partial_path(&destination)?;
        remove_if_present(&partial).map_err(|e| TransformError::FinalizeFailed {
            path: partial.clone(),
            source: e,
        })?;

        let produced = match file.category {
            Category::Video => self.transcode(source, &partial, spec),
            _ => self.convert_image(source, &partial, spec),
        };
        if let Err(e) = produced {
            if let Err(cleanup) = remove_if_present(&partial) {
                warn!("could not remove {}: {cleanup}", partial.display());
            }
            return Err(e);
        }

        fs::rename(&partial, &destination).map_err(|e| TransformError::FinalizeFailed {
            path: destination.clone(),
            source: e,
        })?;

        debug!(job = %spec.name, path = %destination.display(), "processed");
        Ok(ProcessingOutcome::Converted)
    }

    /// Copies the source into the work file, then transforms it in place.
    fn convert_image(
        &self,
        source: &Path,
        work: &Path,
        spec: &JobSpec,
    ) -> Result<(), TransformError> {
        copy_preserving_times(source, work).map_err(|e| TransformError::CopyFailed {
            from: source.to_path_buf(),
            to: work.to_path_buf(),
            source: e,
        })?;

        for invocation in image_invocations(&self.tools.image, spec, work)? {
            self.invoke(&invocation)?;
        }
        Ok(())
    }

    fn transcode(&self, source: &Path, work: &Path, spec: &JobSpec) -> Result<(), TransformError> {
        let invocation = video_invocation(&self.tools.video, spec, source, work)?;
        self.invoke(&invocation)
    }

    fn invoke(&self, invocation: &ToolInvocation) -> Result<(), TransformError> {
        debug!(command = %invocation, "running");
        let output = self
            .runner
            .run(invocation)
            .map_err(|source| TransformError::ToolLaunch {
                program: invocation.program.clone(),
                source,
            })?;

        if output.success {
            Ok(())
        } else {
            Err(TransformError::ExternalToolFailure {
                program: invocation.program.clone(),
                exit_code: output.exit_code,
                stderr: output.stderr,
            })
        }
    }
}

/// Image tool calls for one job: a resize (with quality), then an optional
/// center-gravity crop. With cropping the resize fills the box (`WxH^`) so
/// the crop has no empty borders.
pub fn image_invocations(
    command: &[String],
    spec: &JobSpec,
    target: &Path,
) -> Result<Vec<ToolInvocation>, ConfigError> {
    let mut invocations = Vec::new();

    if spec.quality.is_some() || spec.resize_dimensions.is_some() {
        let mut resize = ToolInvocation::from_command(command)?;
        if let Some(quality) = spec.quality {
            resize = resize.arg("-quality").arg(quality.to_string());
        }
        if let Some(geometry) = spec.resize_dimensions {
            let fill = if spec.crop { "^" } else { "" };
            resize = resize.arg("-resize").arg(format!("{geometry}{fill}"));
        }
        invocations.push(resize.path_arg(target));
    }

    if spec.crop {
        let geometry = spec
            .crop_dimensions
            .ok_or_else(|| ConfigError::MissingCropDimensions(spec.name.clone()))?;
        invocations.push(
            ToolInvocation::from_command(command)?
                .arg("-gravity")
                .arg("center")
                .arg("-extent")
                .arg(geometry.to_string())
                .path_arg(target),
        );
    }

    Ok(invocations)
}

/// Video tool call transcoding `source` into `target`, scaled when the job
/// has resize dimensions.
pub fn video_invocation(
    command: &[String],
    spec: &JobSpec,
    source: &Path,
    target: &Path,
) -> Result<ToolInvocation, ConfigError> {
    let mut invocation = ToolInvocation::from_command(command)?
        .arg("-i")
        .path_arg(source);
    if let Some(geometry) = spec.resize_dimensions {
        invocation = invocation.arg("-vf").arg(geometry.scale_filter());
    }
    Ok(invocation.path_arg(target))
}

/// Output file name for a video: the date code taken from the card directory
/// right after `marker`, then the source stem, then `extension`.
///
/// `base/raw-media/2020-01-01_card1/clip.mov` gives `2020-01-01_clip.webm`.
///
/// # Errors
///
/// [`TransformError::PathDerivation`] when no `marker` segment is followed by
/// a directory (not the file itself) of at least [`DATE_CODE_LEN`] characters.
pub fn derive_video_name(
    path: &Path,
    marker: &str,
    extension: &str,
) -> Result<String, TransformError> {
    let underivable = || TransformError::PathDerivation {
        path: path.to_path_buf(),
        marker: marker.to_string(),
    };

    let segments: Vec<String> = path
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    let marker_index = segments
        .iter()
        .position(|segment| segment.eq_ignore_ascii_case(marker))
        .ok_or_else(underivable)?;
    let card_index = marker_index + 1;
    if card_index + 1 >= segments.len() {
        return Err(underivable());
    }

    let card = &segments[card_index];
    if card.chars().count() < DATE_CODE_LEN {
        return Err(underivable());
    }
    let date_code: String = card.chars().take(DATE_CODE_LEN).collect();

    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .ok_or_else(underivable)?;

    Ok(format!(
        "{date_code}{stem}.{}",
        extension.trim_start_matches('.')
    ))
}

fn partial_path(destination: &Path) -> Result<PathBuf, TransformError> {
    let name = destination
        .file_name()
        .ok_or_else(|| TransformError::MissingFileName(destination.to_path_buf()))?;
    let mut partial_name = std::ffi::OsString::from(PARTIAL_PREFIX);
    partial_name.push(name);
    Ok(destination.with_file_name(partial_name))
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Copies bytes and permissions, then carries over access and modification times.
fn copy_preserving_times(source: &Path, destination: &Path) -> io::Result<()> {
    fs::copy(source, destination)?;
    let metadata = fs::metadata(source)?;
    let mut times = FileTimes::new().set_modified(metadata.modified()?);
    if let Ok(accessed) = metadata.accessed() {
        times = times.set_accessed(accessed);
    }
    File::options()
        .write(true)
        .open(destination)?
        .set_times(times)
}
