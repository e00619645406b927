/// File categorization and on-disk layout detection.
///
/// A [`PatternRegistry`] holds one case-insensitive, end-anchored regex per
/// category plus the two directory-prefix patterns used to tell how a file is
/// currently laid out beneath the base directory.
///
/// # Examples
///
/// ```
/// use mediaprep::config::MediaConfig;
/// use mediaprep::file_category::Category;
/// use std::path::Path;
///
/// let compiled = MediaConfig::default().compile().unwrap();
/// let registry = &compiled.registry;
/// assert_eq!(registry.classify(Path::new("jpg/IMG_0001.JPG")), Category::Image);
/// assert_eq!(registry.classify(Path::new("jpg/IMG_0001.CR2")), Category::Raw);
/// assert_eq!(registry.classify(Path::new("jpg/notes.txt")), Category::Misc);
/// ```
use crate::config::{ConfigError, ExtensionConfig, LayoutConfig};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};

/// Broad media category a file belongs to.
///
/// The derived ordering is the classification priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Still images the preview jobs resize (JPEG family)
    Image,
    /// Camera raw formats (CR2, NEF, DNG, etc.)
    Raw,
    /// Video clips (MOV, MTS, MP4, etc.)
    Video,
    /// Anything else
    Misc,
}

/// Order in which categories are tested. The first match wins and `Misc`
/// always matches, so classification never fails.
pub const CLASSIFICATION_ORDER: [Category; 4] = [
    Category::Image,
    Category::Raw,
    Category::Video,
    Category::Misc,
];

impl Category {
    /// Lowercase name used in configuration files and summaries.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Image => "image",
            Category::Raw => "raw",
            Category::Video => "video",
            Category::Misc => "misc",
        }
    }

    /// Returns a human-readable description of this category.
    pub fn description(&self) -> &'static str {
        match self {
            Category::Image => "Image files",
            Category::Raw => "Camera raw files",
            Category::Video => "Video files",
            Category::Misc => "Other files",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a discovered file is currently arranged on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PathLayoutStyle {
    /// Flat `jpg/` input directory; non-images still need to be moved out.
    Legacy,
    /// `raw-media/<card>/...` hierarchy; files stay where the card copy put them.
    DatedCard,
    /// Already beneath one of the known output directories.
    AlreadyOrganized,
}

impl PathLayoutStyle {
    /// True when the file is considered correctly placed and must not be moved.
    pub fn is_in_place(&self) -> bool {
        !matches!(self, PathLayoutStyle::Legacy)
    }
}

/// Compiled extension and layout patterns.
#[derive(Debug, Clone)]
pub struct PatternRegistry {
    /// Category patterns in [`CLASSIFICATION_ORDER`], `Misc` excluded.
    category_patterns: Vec<(Category, Regex)>,
    dated_card_pattern: Regex,
    organized_pattern: Option<Regex>,
    legacy_root: String,
    dated_card_root: String,
}

impl PatternRegistry {
    /// Builds the registry from extension lists and layout names.
    ///
    /// Each list becomes `(?i)\.(?:ext1|ext2|...)$`; an empty list yields no
    /// pattern, so that category never matches.
    pub fn new(extensions: &ExtensionConfig, layout: &LayoutConfig) -> Result<Self, ConfigError> {
        let mut category_patterns = Vec::new();
        for category in CLASSIFICATION_ORDER {
            let list = match category {
                Category::Image => &extensions.image,
                Category::Raw => &extensions.raw,
                Category::Video => &extensions.video,
                Category::Misc => continue,
            };
            if let Some(pattern) = extension_pattern(category, list)? {
                category_patterns.push((category, pattern));
            }
        }

        let dated_card_pattern =
            prefix_pattern(std::slice::from_ref(&layout.dated_card_root))?.ok_or_else(|| {
                ConfigError::ConfigInvalid("layout.dated_card_root must not be empty".to_string())
            })?;
        let organized_pattern = prefix_pattern(&layout.organized_dirs)?;

        Ok(Self {
            category_patterns,
            dated_card_pattern,
            organized_pattern,
            legacy_root: layout.legacy_root.clone(),
            dated_card_root: layout.dated_card_root.clone(),
        })
    }

    /// Assigns a path to exactly one category.
    ///
    /// Categories are tested in [`CLASSIFICATION_ORDER`]; an extension listed
    /// under two categories resolves to the earlier one.
    pub fn classify(&self, path: &Path) -> Category {
        let text = path.to_string_lossy();
        self.category_patterns
            .iter()
            .find(|(_, pattern)| pattern.is_match(&text))
            .map(|(category, _)| *category)
            .unwrap_or(Category::Misc)
    }

    /// Determines the layout style of `path` relative to `base_dir`.
    ///
    /// Paths outside `base_dir` are tested as given.
    pub fn layout_style(&self, base_dir: &Path, path: &Path) -> PathLayoutStyle {
        let relative = path.strip_prefix(base_dir).unwrap_or(path);
        let text = slash_joined(relative);

        if self.dated_card_pattern.is_match(&text) {
            PathLayoutStyle::DatedCard
        } else if self
            .organized_pattern
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(&text))
        {
            PathLayoutStyle::AlreadyOrganized
        } else {
            PathLayoutStyle::Legacy
        }
    }

    /// Name of the flat legacy input directory (`jpg`).
    pub fn legacy_root(&self) -> &str {
        &self.legacy_root
    }

    /// Name of the dated-card root directory (`raw-media`).
    pub fn dated_card_root(&self) -> &str {
        &self.dated_card_root
    }
}

fn extension_pattern(category: Category, list: &[String]) -> Result<Option<Regex>, ConfigError> {
    let alternatives: Vec<String> = list
        .iter()
        .map(|ext| ext.trim().trim_start_matches('.'))
        .filter(|ext| !ext.is_empty())
        .map(regex::escape)
        .collect();

    if alternatives.is_empty() {
        return Ok(None);
    }

    let source = format!(r"(?i)\.(?:{})$", alternatives.join("|"));
    Regex::new(&source)
        .map(Some)
        .map_err(|e| ConfigError::InvalidExtensionPattern {
            category,
            reason: e.to_string(),
        })
}

/// Matches a relative path whose first named segment is one of `names`,
/// allowing leading punctuation such as `./`.
fn prefix_pattern(names: &[String]) -> Result<Option<Regex>, ConfigError> {
    let alternatives: Vec<String> = names
        .iter()
        .map(|name| name.trim().trim_matches('/'))
        .filter(|name| !name.is_empty())
        .map(regex::escape)
        .collect();

    if alternatives.is_empty() {
        return Ok(None);
    }

    let source = format!(r"(?i)^[^A-Za-z0-9]*(?:{})(?:/|$)", alternatives.join("|"));
    Regex::new(&source)
        .map(Some)
        .map_err(|e| ConfigError::ConfigInvalid(format!("layout directory names: {e}")))
}

fn slash_joined(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            Component::CurDir => Some(".".into()),
            Component::ParentDir => Some("..".into()),
            Component::RootDir | Component::Prefix(_) => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MediaConfig;

    fn default_registry() -> PatternRegistry {
        MediaConfig::default().compile().unwrap().registry
    }

    fn registry_with(image: &[&str], raw: &[&str], video: &[&str]) -> PatternRegistry {
        let to_vec = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let extensions = ExtensionConfig {
            image: to_vec(image),
            raw: to_vec(raw),
            video: to_vec(video),
        };
        PatternRegistry::new(&extensions, &LayoutConfig::default()).unwrap()
    }

    #[test]
    fn test_image_extensions_classify_as_image() {
        let registry = default_registry();
        for name in ["a.jpg", "b.JPG", "c.jpeg", "d.JpE", "e.jfif", "f.jfi", "g.jif"] {
            assert_eq!(registry.classify(Path::new(name)), Category::Image, "{name}");
        }
    }

    #[test]
    fn test_raw_extensions_classify_as_raw() {
        let registry = default_registry();
        for name in ["a.cr2", "b.NEF", "c.dng", "d.rwz", "e.tif", "f.TIFF", "g.3fr", "h.x3f"] {
            assert_eq!(registry.classify(Path::new(name)), Category::Raw, "{name}");
        }
    }

    #[test]
    fn test_video_extensions_classify_as_video() {
        let registry = default_registry();
        for name in ["a.avi", "b.MPG", "c.mp4", "d.MTS", "e.mov"] {
            assert_eq!(registry.classify(Path::new(name)), Category::Video, "{name}");
        }
    }

    #[test]
    fn test_everything_else_is_misc() {
        let registry = default_registry();
        for name in ["notes.txt", "clip.webm", "README", "photo.jpg.bak", "jpg"] {
            assert_eq!(registry.classify(Path::new(name)), Category::Misc, "{name}");
        }
    }

    #[test]
    fn test_extension_must_follow_a_dot() {
        let registry = default_registry();
        assert_eq!(registry.classify(Path::new("dir/somejpg")), Category::Misc);
    }

    #[test]
    fn test_classify_uses_full_path_end() {
        let registry = default_registry();
        let path = Path::new("base/raw-media/2020-01-01_card1/DCIM/100CANON/IMG_0001.JPG");
        assert_eq!(registry.classify(path), Category::Image);
    }

    #[test]
    fn test_dual_match_resolves_to_image_before_raw() {
        let registry = registry_with(&["jpg", "dual"], &["dual", "cr2"], &["mov"]);
        assert_eq!(registry.classify(Path::new("x.dual")), Category::Image);
        assert_eq!(registry.classify(Path::new("x.cr2")), Category::Raw);
    }

    #[test]
    fn test_dual_match_resolves_to_raw_before_video() {
        let registry = registry_with(&["jpg"], &["cr2", "mov"], &["mov", "mp4"]);
        assert_eq!(registry.classify(Path::new("clip.MOV")), Category::Raw);
        assert_eq!(registry.classify(Path::new("clip.mp4")), Category::Video);
    }

    #[test]
    fn test_empty_category_never_matches() {
        let registry = registry_with(&[], &["cr2"], &[]);
        assert_eq!(registry.classify(Path::new("a.jpg")), Category::Misc);
        assert_eq!(registry.classify(Path::new("a.cr2")), Category::Raw);
    }

    #[test]
    fn test_layout_style_literal_examples() {
        let registry = default_registry();
        let base = Path::new("base");
        assert_eq!(
            registry.layout_style(base, Path::new("base/jpg/img001.jpg")),
            PathLayoutStyle::Legacy
        );
        assert_eq!(
            registry.layout_style(
                base,
                Path::new("base/raw-media/2020-01-01_card1/DCIM/100/img001.jpg")
            ),
            PathLayoutStyle::DatedCard
        );
        assert_eq!(
            registry.layout_style(base, Path::new("base/0800/img001.jpg")),
            PathLayoutStyle::AlreadyOrganized
        );
    }

    #[test]
    fn test_layout_style_requires_whole_segment() {
        let registry = default_registry();
        let base = Path::new("/data/set");
        assert_eq!(
            registry.layout_style(base, Path::new("/data/set/raw/a.cr2")),
            PathLayoutStyle::AlreadyOrganized
        );
        assert_eq!(
            registry.layout_style(base, Path::new("/data/set/rawfiles/a.cr2")),
            PathLayoutStyle::Legacy
        );
        assert_eq!(
            registry.layout_style(base, Path::new("/data/set/vid/a.mov")),
            PathLayoutStyle::AlreadyOrganized
        );
    }

    #[test]
    fn test_layout_style_tolerates_leading_dot_segment() {
        let registry = default_registry();
        assert_eq!(
            registry.layout_style(Path::new("/elsewhere"), Path::new("./raw-media/card/a.mov")),
            PathLayoutStyle::DatedCard
        );
    }

    #[test]
    fn test_layout_style_is_in_place() {
        assert!(!PathLayoutStyle::Legacy.is_in_place());
        assert!(PathLayoutStyle::DatedCard.is_in_place());
        assert!(PathLayoutStyle::AlreadyOrganized.is_in_place());
    }

    #[test]
    fn test_category_order_matches_priority() {
        let mut sorted = CLASSIFICATION_ORDER;
        sorted.sort();
        assert_eq!(sorted, CLASSIFICATION_ORDER);
        assert_eq!(Category::Video.to_string(), "video");
    }
}
