/// Relocation of non-image files out of the legacy input layout.
///
/// Raw, video and misc files found in the flat `jpg/` directory are moved into
/// their category's directory under the base path. Files in the dated-card
/// hierarchy or already under an output directory are left alone.
use crate::classifier::ClassifiedFile;
use crate::config::{ConfigError, RelocateDirs};
use crate::summary::ProcessingOutcome;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// What a move does when its target already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExistingDestination {
    /// Replace the existing file (the rename overwrites it).
    #[default]
    Overwrite,
    /// Leave both files alone and report `skipped_exists`.
    Skip,
}

/// Errors that can occur while relocating a file.
#[derive(Debug, Error)]
pub enum OrganizeError {
    #[error("Failed to create directory {}: {source}", .path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to move {} to {}: {source}", .from.display(), .to.display())]
    FileMoveFailure {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} has no file name component", .0.display())]
    MissingFileName(PathBuf),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for file organization operations.
pub type OrganizeResult<T> = Result<T, OrganizeError>;

/// Moves files into their category directories within one base directory.
pub struct FileOrganizer<'a> {
    base_dir: &'a Path,
    dirs: &'a RelocateDirs,
    dry_run: bool,
}

impl<'a> FileOrganizer<'a> {
    pub fn new(base_dir: &'a Path, dirs: &'a RelocateDirs) -> Self {
        Self {
            base_dir,
            dirs,
            dry_run: false,
        }
    }

    /// Report what would happen without touching the filesystem.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Where [`relocate`](Self::relocate) puts `file`:
    /// `base_dir/<category dir>/<file name>`.
    ///
    /// # Errors
    ///
    /// Fails if the category has no relocation directory or the path has no
    /// file name.
    pub fn destination_for(&self, file: &ClassifiedFile) -> OrganizeResult<PathBuf> {
        let subdir = self.dirs.destination_for(file.category)?;
        let file_name = file
            .absolute_path
            .file_name()
            .ok_or_else(|| OrganizeError::MissingFileName(file.absolute_path.clone()))?;
        Ok(self.base_dir.join(subdir).join(file_name))
    }

    /// Moves a legacy-layout file to `base_dir/<category dir>/<file name>`.
    ///
    /// Files that are already in place are reported as
    /// [`ProcessingOutcome::LeftInPlace`]; a source that vanished since the
    /// walk is [`ProcessingOutcome::SkippedMissingSource`]. When the target
    /// exists the configured [`ExistingDestination`] policy decides.
    ///
    /// The category directory is created if absent (one level only; the
    /// base directory must exist).
    ///
    /// # Errors
    ///
    /// Returns an `OrganizeError` if the category has no relocation directory,
    /// the directory cannot be created or the rename fails.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use mediaprep::classifier::ClassifiedFile;
    /// use mediaprep::config::RelocateDirs;
    /// use mediaprep::file_category::{Category, PathLayoutStyle};
    /// use mediaprep::file_organizer::FileOrganizer;
    /// use std::path::{Path, PathBuf};
    ///
    /// let dirs = RelocateDirs::default();
    /// let organizer = FileOrganizer::new(Path::new("/photos/2013-05-01"), &dirs);
    /// let file = ClassifiedFile {
    ///     absolute_path: PathBuf::from("/photos/2013-05-01/jpg/IMG_0001.CR2"),
    ///     category: Category::Raw,
    ///     layout_style: PathLayoutStyle::Legacy,
    /// };
    ///
    /// match organizer.relocate(&file) {
    ///     Ok(outcome) => println!("{}: {}", file.absolute_path.display(), outcome),
    ///     Err(e) => eprintln!("Relocation failed: {}", e),
    /// }
    /// ```
    pub fn relocate(&self, file: &ClassifiedFile) -> OrganizeResult<ProcessingOutcome> {
        let source = &file.absolute_path;
        let destination = self.destination_for(file)?;

        if file.layout_style.is_in_place() {
            debug!(path = %source.display(), layout = ?file.layout_style, "left in place");
            return Ok(ProcessingOutcome::LeftInPlace);
        }

        if !source.exists() {
            warn!("missing: {}", source.display());
            return Ok(ProcessingOutcome::SkippedMissingSource);
        }

        if destination.exists() {
            match self.dirs.on_existing {
                ExistingDestination::Skip => {
                    debug!(path = %destination.display(), "destination exists, skipping");
                    return Ok(ProcessingOutcome::SkippedExists);
                }
                ExistingDestination::Overwrite => {
                    warn!("overwriting existing file: {}", destination.display());
                }
            }
        }

        if self.dry_run {
            info!(
                "[dry run] would move {} -> {}",
                source.display(),
                destination.display()
            );
            return Ok(ProcessingOutcome::Moved);
        }

        if let Some(category_path) = destination.parent() {
            ensure_dir(category_path).map_err(|e| OrganizeError::DirectoryCreationFailed {
                path: category_path.to_path_buf(),
                source: e,
            })?;
        }

        fs::rename(source, &destination).map_err(|e| OrganizeError::FileMoveFailure {
            from: source.clone(),
            to: destination.clone(),
            source: e,
        })?;

        debug!(from = %source.display(), to = %destination.display(), "moved");
        Ok(ProcessingOutcome::Moved)
    }
}

/// Creates a single directory level if it does not exist yet.
///
/// Losing a creation race to another process is not an error.
pub(crate) fn ensure_dir(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    info!("creating: {}", path.display());
    match fs::create_dir(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(e) => Err(e),
    }
}
