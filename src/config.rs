//! Run configuration.
//!
//! Every table the run consults (extension lists, directory layout names,
//! relocation directories, job specs, tool commands and file filters) lives in
//! one [`MediaConfig`] value. The compiled-in defaults reproduce the classic
//! `jpg/` + `raw-media/` workflow; a TOML file may override any section.
//!
//! # Configuration File Format
//!
//! ```toml
//! [tools]
//! image = ["gm", "mogrify"]
//! video = ["ffmpeg"]
//!
//! [layout]
//! legacy_root = "jpg"
//! dated_card_root = "raw-media"
//! organized_dirs = ["vid-sm", "0800", "raw", "vid", "misc", "work"]
//!
//! [extensions]
//! image = ["jpg", "jpeg"]
//! video = ["mov", "mts"]
//!
//! [relocate]
//! raw = "raw"
//! video = "vid"
//! misc = "misc"
//! on_existing = "overwrite"
//!
//! [filters]
//! enable_hidden_files = false
//! exclude_filenames = ["Thumbs.db"]
//! exclude_patterns = ["work/**"]
//!
//! [[jobs]]
//! name = "800"
//! destination_subdir = "0800"
//! applies_to = "image"
//! resize_dimensions = "800x800"
//! quality = 50
//! ```
//!
//! Unknown keys are rejected when the file is loaded.

use crate::file_category::{Category, PatternRegistry};
use crate::file_organizer::ExistingDestination;
use crate::job_spec::{JobSpec, JobSpecRegistry};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading or validating configuration, or when a caller
/// asks for a job spec or directory that does not exist.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
    #[error("IO error reading configuration {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid glob pattern '{0}'")]
    InvalidGlobPattern(String),
    #[error("Invalid extension pattern for {category}: {reason}")]
    InvalidExtensionPattern { category: Category, reason: String },
    #[error("Invalid geometry '{0}': expected WIDTHxHEIGHT")]
    InvalidGeometry(String),
    #[error("Invalid destination '{value}' for job '{job}': expected a single directory name")]
    InvalidDestination { job: String, value: String },
    #[error("Job spec '{0}' is defined more than once")]
    DuplicateJobSpec(String),
    #[error("Job spec '{0}' sets crop but has no crop_dimensions")]
    MissingCropDimensions(String),
    #[error("Video job spec '{0}' has no output_extension")]
    MissingOutputExtension(String),
    #[error("Job spec '{job}' targets {category}, which has no transform")]
    UntransformableCategory { job: String, category: Category },
    #[error("Job spec '{job}' applies to {expected} but was given a {found} file")]
    JobCategoryMismatch {
        job: String,
        expected: Category,
        found: Category,
    },
    #[error("Unknown job spec '{0}'")]
    UnknownJobSpec(String),
    #[error("No destination directory configured for {0} files")]
    UnknownDirectoryKey(Category),
    #[error("Tool command for {0} is empty")]
    EmptyToolCommand(&'static str),
}

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MediaConfig {
    #[serde(default)]
    pub tools: ToolConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub extensions: ExtensionConfig,
    #[serde(default)]
    pub relocate: RelocateDirs,
    #[serde(default)]
    pub filters: FilterRules,
    #[serde(default = "default_jobs")]
    pub jobs: Vec<JobSpec>,
}

/// External programs, each given as the program followed by leading arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    /// In-place image transformer (`gm mogrify`).
    pub image: Vec<String>,
    /// Video transcoder (`ffmpeg`).
    pub video: Vec<String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            image: vec!["gm".to_string(), "mogrify".to_string()],
            video: vec!["ffmpeg".to_string()],
        }
    }
}

/// Directory names that identify the input and output layouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    pub legacy_root: String,
    pub dated_card_root: String,
    /// Output directories whose contents are never moved again.
    pub organized_dirs: Vec<String>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            legacy_root: "jpg".to_string(),
            dated_card_root: "raw-media".to_string(),
            organized_dirs: ["vid-sm", "0800", "raw", "vid", "misc", "work"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Extension lists per category, matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtensionConfig {
    pub image: Vec<String>,
    pub raw: Vec<String>,
    pub video: Vec<String>,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        let to_vec = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
        Self {
            image: to_vec(&["jpg", "jpeg", "jpe", "jif", "jfif", "jfi"]),
            raw: to_vec(&[
                "3fr", "arw", "srf", "sr2", "bay", "crw", "cr2", "cap", "tif", "iiq", "eip",
                "dcs", "dcr", "drf", "k25", "kdc", "dng", "erf", "fff", "mef", "mos", "mrw",
                "nef", "nrw", "orf", "ptx", "pef", "pxn", "r3d", "raf", "raw", "rw2", "rwl",
                "rwz", "x3f", "tiff",
            ]),
            video: to_vec(&["avi", "mpg", "mp4", "mts", "mov"]),
        }
    }
}

/// Where legacy-layout files of each non-image category are moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelocateDirs {
    pub raw: String,
    pub video: String,
    pub misc: String,
    /// What to do when the move target already exists.
    pub on_existing: ExistingDestination,
}

impl Default for RelocateDirs {
    fn default() -> Self {
        Self {
            raw: "raw".to_string(),
            video: "vid".to_string(),
            misc: "misc".to_string(),
            on_existing: ExistingDestination::default(),
        }
    }
}

impl RelocateDirs {
    /// Destination subdirectory for a category that gets relocated.
    ///
    /// Images are never relocated, so asking for one is a configuration error.
    pub fn destination_for(&self, category: Category) -> Result<&str, ConfigError> {
        match category {
            Category::Raw => Ok(&self.raw),
            Category::Video => Ok(&self.video),
            Category::Misc => Ok(&self.misc),
            Category::Image => Err(ConfigError::UnknownDirectoryKey(category)),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [("raw", &self.raw), ("video", &self.video), ("misc", &self.misc)] {
            if value.trim().is_empty() || value.contains(['/', '\\']) {
                return Err(ConfigError::ConfigInvalid(format!(
                    "relocate.{key} must be a single directory name, got '{value}'"
                )));
            }
        }
        Ok(())
    }
}

/// Which discovered files are skipped before classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterRules {
    /// Whether to include hidden files and directories (starting with ".").
    pub enable_hidden_files: bool,
    /// Exact filenames to skip.
    pub exclude_filenames: Vec<String>,
    /// Glob patterns matched against the path relative to the base directory.
    pub exclude_patterns: Vec<String>,
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            enable_hidden_files: false,
            exclude_filenames: vec![".DS_Store".to_string(), "Thumbs.db".to_string()],
            exclude_patterns: vec![".Trashes/**".to_string(), ".Spotlight-V100/**".to_string()],
        }
    }
}

fn default_jobs() -> Vec<JobSpec> {
    vec![
        JobSpec::default_image(),
        JobSpec::hd_crop(),
        JobSpec::default_video(),
    ]
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            tools: ToolConfig::default(),
            layout: LayoutConfig::default(),
            extensions: ExtensionConfig::default(),
            relocate: RelocateDirs::default(),
            filters: FilterRules::default(),
            jobs: default_jobs(),
        }
    }
}

impl MediaConfig {
    /// Load configuration from a file, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `.mediapreprc.toml` in the current directory
    /// 3. Look for `~/.config/mediaprep/config.toml` in home directory
    /// 4. Fall back to default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is explicitly provided but cannot be read,
    /// or if any file found cannot be parsed.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(".mediapreprc.toml");
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("mediaprep")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        Ok(Self::default())
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text. Missing sections take their defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }

    /// Validate and compile into the immutable structures a run consumes.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure: a bad job spec, an empty tool
    /// command, an invalid relocation directory or an invalid glob pattern.
    pub fn compile(self) -> Result<CompiledConfig, ConfigError> {
        if self.tools.image.is_empty() {
            return Err(ConfigError::EmptyToolCommand("images"));
        }
        if self.tools.video.is_empty() {
            return Err(ConfigError::EmptyToolCommand("video"));
        }
        self.relocate.validate()?;

        // Every output directory counts as organized, configured or not.
        let mut layout = self.layout.clone();
        let outputs = [&self.relocate.raw, &self.relocate.video, &self.relocate.misc]
            .into_iter()
            .chain(self.jobs.iter().map(|job| &job.destination_subdir));
        for dir in outputs {
            if !layout.organized_dirs.contains(dir) {
                layout.organized_dirs.push(dir.clone());
            }
        }

        let registry = PatternRegistry::new(&self.extensions, &layout)?;
        let job_outputs = self
            .jobs
            .iter()
            .map(|job| job.destination_subdir.clone())
            .collect();
        let jobs = JobSpecRegistry::new(self.jobs)?;
        let filters = CompiledFilters::new(self.filters)?;

        Ok(CompiledConfig {
            registry,
            jobs,
            job_outputs,
            relocate: self.relocate,
            tools: self.tools,
            filters,
        })
    }
}

/// Validated configuration, shared read-only by every stage of a run.
#[derive(Debug, Clone)]
pub struct CompiledConfig {
    pub registry: PatternRegistry,
    pub jobs: JobSpecRegistry,
    /// Destination directories of every configured job, kept across `restrict_jobs`.
    pub job_outputs: Vec<String>,
    pub relocate: RelocateDirs,
    pub tools: ToolConfig,
    pub filters: CompiledFilters,
}

impl CompiledConfig {
    /// Replace the job registry with only the named specs.
    pub fn restrict_jobs<S: AsRef<str>>(mut self, names: &[S]) -> Result<Self, ConfigError> {
        if !names.is_empty() {
            self.jobs = self.jobs.restrict_to(names)?;
        }
        Ok(self)
    }

    /// Whether `path` lies in some job's destination directory under `base_dir`.
    ///
    /// Such files are previews, never transform sources.
    pub fn is_job_output(&self, base_dir: &Path, path: &Path) -> bool {
        let relative = path.strip_prefix(base_dir).unwrap_or(path);
        let Some(Component::Normal(first)) = relative
            .components()
            .find(|c| matches!(c, Component::Normal(_)))
        else {
            return false;
        };
        let first = first.to_string_lossy();
        self.job_outputs
            .iter()
            .any(|dir| dir.eq_ignore_ascii_case(&first))
    }
}

/// Pre-compiled filter rules.
#[derive(Debug, Clone)]
pub struct CompiledFilters {
    enable_hidden_files: bool,
    exclude_filenames: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
}

impl CompiledFilters {
    fn new(rules: FilterRules) -> Result<Self, ConfigError> {
        let exclude_patterns = rules
            .exclude_patterns
            .iter()
            .map(|pattern| {
                Pattern::new(pattern).map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enable_hidden_files: rules.enable_hidden_files,
            exclude_filenames: rules.exclude_filenames.into_iter().collect(),
            exclude_patterns,
        })
    }

    /// Whether the walk should enter a directory with this name.
    pub fn should_descend(&self, dir_name: &str) -> bool {
        self.enable_hidden_files || !dir_name.starts_with('.')
    }

    /// Check if a file, given relative to the base directory, should be classified.
    ///
    /// Checks are performed in this order, with early termination:
    /// 1. Hidden file or directory - excluded unless enabled
    /// 2. Exact filename match - excluded
    /// 3. Glob pattern match - excluded
    pub fn should_include(&self, relative_path: &Path) -> bool {
        if !self.enable_hidden_files && is_hidden(relative_path) {
            return false;
        }

        let file_name = relative_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        if self.exclude_filenames.contains(file_name.as_ref()) {
            return false;
        }

        !self
            .exclude_patterns
            .iter()
            .any(|pattern| pattern.matches_path(relative_path))
    }
}

fn is_hidden(path: &Path) -> bool {
    path.components().any(|component| match component {
        Component::Normal(part) => part.to_string_lossy().starts_with('.'),
        _ => false,
    })
}
