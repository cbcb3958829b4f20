//! Inclusion and exclusion rules applied by the controller before an item is
//! seeded.
//!
//! Checks run in order: structural exclusion, media-class allow list, then the
//! media-type deny list. The first failing check decides the verdict.

use core_runtime::config::{CommonConfig, MediaClass};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "flv", "wmv", "asf", "rm", "rmvb", "mpg", "mpeg", "3gp", "mov", "webm", "mkv", "avi",
];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "flac", "ogg", "wav"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tiff", "ai", "cdr", "eps"];

/// Outcome of filtering one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterVerdict {
    Accept,
    /// Under an excluded directory
    StructurallyExcluded,
    /// Extension maps to no class, or to a class that is not enabled
    UnsupportedClass(Option<MediaClass>),
    /// Extension is on the deny list
    ExcludedMediaType(String),
}

impl FilterVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, FilterVerdict::Accept)
    }
}

/// Map an extension (without the dot, any case) to its media class
pub fn classify_extension(extension: &str) -> Option<MediaClass> {
    let ext = extension.to_ascii_lowercase();
    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaClass::Video)
    } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaClass::Audio)
    } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaClass::Image)
    } else {
        None
    }
}

/// Lowercase extension of the last path segment of `key`
///
/// Query strings and fragments are ignored so URL keys classify by their path.
pub fn extension_of(key: &str) -> Option<String> {
    let path = key.split(['?', '#']).next().unwrap_or(key);
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let (_, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

/// Media filter built from the `[common]` settings
#[derive(Debug, Clone)]
pub struct MediaFilter {
    allowed: Option<HashSet<MediaClass>>,
    excluded_types: HashSet<String>,
    excluded_dirs: Vec<PathBuf>,
}

impl MediaFilter {
    /// Filter that accepts every item
    ///
    /// Used for run lists, where every line is an explicit request.
    pub fn allow_all() -> Self {
        Self {
            allowed: None,
            excluded_types: HashSet::new(),
            excluded_dirs: Vec::new(),
        }
    }

    pub fn from_common(common: &CommonConfig) -> Self {
        Self {
            allowed: Some(common.support_media_classification.iter().copied().collect()),
            excluded_types: common.exclude_media_type.iter().cloned().collect(),
            excluded_dirs: Vec::new(),
        }
    }

    /// Skip items whose parent directory lies under any of `dirs`
    pub fn with_excluded_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.excluded_dirs = dirs;
        self
    }

    pub fn check(&self, key: &str) -> FilterVerdict {
        if self.is_structurally_excluded(key) {
            return FilterVerdict::StructurallyExcluded;
        }

        let extension = extension_of(key);

        if let Some(allowed) = &self.allowed {
            let class = extension.as_deref().and_then(classify_extension);
            match class {
                Some(class) if allowed.contains(&class) => {}
                other => return FilterVerdict::UnsupportedClass(other),
            }
        }

        if let Some(ext) = extension {
            if self.excluded_types.contains(&ext) {
                return FilterVerdict::ExcludedMediaType(ext);
            }
        }

        FilterVerdict::Accept
    }

    fn is_structurally_excluded(&self, key: &str) -> bool {
        if self.excluded_dirs.is_empty() {
            return false;
        }
        let parent = Path::new(key)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.excluded_dirs
            .iter()
            .any(|dir| parent.starts_with(dir.to_string_lossy().as_ref()))
    }
}
