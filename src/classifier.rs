//! Recursive directory walk that buckets every regular file by category.

use crate::config::CompiledFilters;
use crate::file_category::{CLASSIFICATION_ORDER, Category, PathLayoutStyle, PatternRegistry};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum ClassifyError {
    /// The base directory is missing or is not a directory. Fatal for the run.
    #[error("Directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),
}

/// A file found by the walk, with its category and current layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedFile {
    pub absolute_path: PathBuf,
    pub category: Category,
    pub layout_style: PathLayoutStyle,
}

/// Per-category file lists, each in walk order.
#[derive(Debug, Clone, Default)]
pub struct ClassifiedTree {
    buckets: BTreeMap<Category, Vec<ClassifiedFile>>,
}

impl ClassifiedTree {
    /// Files of one category; empty when none were found.
    pub fn bucket(&self, category: Category) -> &[ClassifiedFile] {
        self.buckets
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// File count per category, zero entries included.
    pub fn counts(&self) -> BTreeMap<Category, usize> {
        CLASSIFICATION_ORDER
            .into_iter()
            .map(|category| (category, self.bucket(category).len()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The tree a rescan would produce after every `from -> to` move in `moves`.
    ///
    /// Moved files take their new path and layout. A move onto a path the
    /// tree already holds replaces that entry, as the rename would.
    pub fn with_moves(
        &self,
        moves: &HashMap<PathBuf, PathBuf>,
        registry: &PatternRegistry,
        base_dir: &Path,
    ) -> ClassifiedTree {
        let targets: HashSet<&PathBuf> = moves.values().collect();
        let mut tree = ClassifiedTree::default();
        for file in self.buckets.values().flatten() {
            match moves.get(&file.absolute_path) {
                Some(to) => tree.push(ClassifiedFile {
                    absolute_path: to.clone(),
                    category: file.category,
                    layout_style: registry.layout_style(base_dir, to),
                }),
                None if targets.contains(&file.absolute_path) => {}
                None => tree.push(file.clone()),
            }
        }
        tree
    }

    fn push(&mut self, file: ClassifiedFile) {
        self.buckets.entry(file.category).or_default().push(file);
    }
}

/// Walks a base directory and classifies what it finds.
pub struct FileClassifier<'a> {
    registry: &'a PatternRegistry,
    filters: &'a CompiledFilters,
}

impl<'a> FileClassifier<'a> {
    pub fn new(registry: &'a PatternRegistry, filters: &'a CompiledFilters) -> Self {
        Self { registry, filters }
    }

    /// Classifies every regular file beneath `base_dir`.
    ///
    /// Order within a bucket is directory-walk order and is not stable across
    /// runs. Entries that cannot be read are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::DirectoryNotFound`] if `base_dir` does not exist
    /// or is not a directory.
    pub fn classify_tree(&self, base_dir: &Path) -> Result<ClassifiedTree, ClassifyError> {
        if !base_dir.is_dir() {
            return Err(ClassifyError::DirectoryNotFound(base_dir.to_path_buf()));
        }
        let base_dir = std::path::absolute(base_dir)
            .map_err(|_| ClassifyError::DirectoryNotFound(base_dir.to_path_buf()))?;

        let mut tree = ClassifiedTree::default();
        let walker = WalkDir::new(&base_dir).into_iter().filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || self.filters.should_descend(&entry.file_name().to_string_lossy())
        });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.into_path();
            let relative = path.strip_prefix(&base_dir).unwrap_or(&path);
            if !self.filters.should_include(relative) {
                debug!(path = %relative.display(), "filtered out");
                continue;
            }

            let category = self.registry.classify(&path);
            let layout_style = self.registry.layout_style(&base_dir, &path);
            debug!(
                path = %relative.display(),
                %category,
                layout = ?layout_style,
                "classified"
            );
            tree.push(ClassifiedFile {
                absolute_path: path,
                category,
                layout_style,
            });
        }

        Ok(tree)
    }
}
