//! mediaprep - sort a photo/video card dump and build resized previews
//!
//! This library classifies the files under a base directory by extension,
//! moves raw, video and misc files out of the flat legacy layout, and fans
//! images and videos out into one preview per configured job by calling
//! external tools (`gm mogrify`, `ffmpeg`). Existing outputs are skipped, so a
//! run can be repeated or resumed at any time.

pub mod classifier;
pub mod cli;
pub mod config;
pub mod file_category;
pub mod file_organizer;
pub mod job_spec;
pub mod output;
pub mod pipeline;
pub mod summary;
pub mod transform;

pub use classifier::{ClassifiedFile, ClassifiedTree, ClassifyError, FileClassifier};
pub use config::{CompiledConfig, CompiledFilters, ConfigError, MediaConfig};
pub use file_category::{Category, PathLayoutStyle, PatternRegistry};
pub use file_organizer::{ExistingDestination, FileOrganizer, OrganizeError};
pub use job_spec::{Geometry, JobSpec, JobSpecRegistry};
pub use pipeline::{MediaPipeline, PipelineError, RunOptions};
pub use summary::{FailureRecord, ProcessingOutcome, RunSummary};
pub use transform::{
    SystemToolRunner, ToolInvocation, ToolOutput, ToolRunner, TransformError, TransformRunner,
};

pub use cli::{Cli, run_cli};
