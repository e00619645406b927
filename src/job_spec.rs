//! Declarative output jobs.
//!
//! A [`JobSpec`] names a destination subdirectory beneath the base directory
//! and the transform that produces each output there. Several specs may target
//! the same category, fanning one source out into several previews.

use crate::config::ConfigError;
use crate::file_category::Category;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// A `WIDTHxHEIGHT` geometry, as accepted by the image and video tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// ffmpeg `-vf` scale filter for this geometry.
    pub fn scale_filter(&self) -> String {
        format!("scale={}:{}", self.width, self.height)
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Geometry {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidGeometry(value.to_string());
        let (width, height) = value
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(invalid)?;
        let width: u32 = width.parse().map_err(|_| invalid())?;
        let height: u32 = height.parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }
}

impl TryFrom<String> for Geometry {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Geometry> for String {
    fn from(geometry: Geometry) -> Self {
        geometry.to_string()
    }
}

/// One output transform and where its results go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSpec {
    pub name: String,
    /// Directory under the base directory receiving this job's outputs.
    pub destination_subdir: String,
    pub applies_to: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resize_dimensions: Option<Geometry>,
    /// Center-gravity crop to `crop_dimensions` after resizing.
    #[serde(default)]
    pub crop: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop_dimensions: Option<Geometry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
    /// Container extension forced onto video outputs (without the dot).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_extension: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl JobSpec {
    /// The stock 800x800 image preview written to `0800/`.
    pub fn default_image() -> Self {
        Self {
            name: "800".to_string(),
            destination_subdir: "0800".to_string(),
            applies_to: Category::Image,
            resize_dimensions: Some(Geometry::new(800, 800)),
            crop: false,
            crop_dimensions: None,
            quality: Some(50),
            output_extension: None,
            enabled: true,
        }
    }

    /// A 1920x1080 center crop, shipped disabled.
    pub fn hd_crop() -> Self {
        Self {
            name: "1080".to_string(),
            destination_subdir: "1080".to_string(),
            applies_to: Category::Image,
            resize_dimensions: Some(Geometry::new(2000, 2000)),
            crop: true,
            crop_dimensions: Some(Geometry::new(1920, 1080)),
            quality: Some(50),
            output_extension: None,
            enabled: false,
        }
    }

    /// The stock 640x360 webm transcode written to `vid-sm/`.
    pub fn default_video() -> Self {
        Self {
            name: "vid-sm".to_string(),
            destination_subdir: "vid-sm".to_string(),
            applies_to: Category::Video,
            resize_dimensions: Some(Geometry::new(640, 360)),
            crop: false,
            crop_dimensions: None,
            quality: None,
            output_extension: Some("webm".to_string()),
            enabled: true,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::ConfigInvalid(
                "job spec with an empty name".to_string(),
            ));
        }
        if self.destination_subdir.trim().is_empty()
            || self.destination_subdir.contains(['/', '\\'])
        {
            return Err(ConfigError::InvalidDestination {
                job: self.name.clone(),
                value: self.destination_subdir.clone(),
            });
        }
        match self.applies_to {
            Category::Image => {}
            Category::Video => {
                let has_extension = self
                    .output_extension
                    .as_deref()
                    .is_some_and(|ext| !ext.trim_start_matches('.').is_empty());
                if !has_extension {
                    return Err(ConfigError::MissingOutputExtension(self.name.clone()));
                }
            }
            category => {
                return Err(ConfigError::UntransformableCategory {
                    job: self.name.clone(),
                    category,
                });
            }
        }
        if self.crop && self.crop_dimensions.is_none() {
            return Err(ConfigError::MissingCropDimensions(self.name.clone()));
        }
        Ok(())
    }
}

/// Ordered, validated set of job specs. Read-only after construction.
#[derive(Debug, Clone, Default)]
pub struct JobSpecRegistry {
    specs: Vec<JobSpec>,
}

impl JobSpecRegistry {
    /// Validates every spec and rejects duplicate names (case-insensitive).
    pub fn new(specs: Vec<JobSpec>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for spec in &specs {
            spec.validate()?;
            if !seen.insert(spec.name.to_lowercase()) {
                return Err(ConfigError::DuplicateJobSpec(spec.name.clone()));
            }
        }
        Ok(Self { specs })
    }

    /// Enabled specs for `category`, in configuration order.
    pub fn job_specs_for(&self, category: Category) -> impl Iterator<Item = &JobSpec> {
        self.specs
            .iter()
            .filter(move |spec| spec.enabled && spec.applies_to == category)
    }

    /// Looks up a spec by name, ignoring case.
    pub fn get(&self, name: &str) -> Result<&JobSpec, ConfigError> {
        self.specs
            .iter()
            .find(|spec| spec.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| ConfigError::UnknownJobSpec(name.to_string()))
    }

    /// A registry holding only the named specs, each enabled.
    ///
    /// Fails on the first unknown name.
    pub fn restrict_to<S: AsRef<str>>(&self, names: &[S]) -> Result<Self, ConfigError> {
        let mut specs: Vec<JobSpec> = Vec::with_capacity(names.len());
        for name in names {
            let mut spec = self.get(name.as_ref())?.clone();
            if specs.iter().any(|s| s.name == spec.name) {
                continue;
            }
            spec.enabled = true;
            specs.push(spec);
        }
        Ok(Self { specs })
    }

    /// All specs, enabled or not.
    pub fn all(&self) -> &[JobSpec] {
        &self.specs
    }
}
