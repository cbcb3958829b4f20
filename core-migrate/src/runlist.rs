//! # Run List
//!
//! Source enumeration for the direct-pull variant.
//!
//! ## Format
//!
//! ```text
//! # URL,MediaName,ClassId,MediaStoragePath
//! https://cdn.example.com/a.mp4
//! https://cdn.example.com/b.mp4,Trailer,12,/movies/b.mp4
//! ```
//!
//! Blank lines and `#` comments are ignored. Fields are trimmed and anything
//! after the fourth is ignored. A line is skipped with a warning when its URL
//! is not `http(s)` or its storage path does not start with `/`. A non-integer
//! class id is dropped with a warning and the line kept.
//!
//! ## Storage Paths
//!
//! [`StoragePathPolicy`] turns the `custom_path` settings and the line's own
//! storage path into the path sent with the pull request.

use crate::{MigrateError, Result};
use async_trait::async_trait;
use bridge_traits::{ListPage, SourceAttributes, SourceEnumerator, SourceItem};
use core_runtime::config::CustomPathConfig;
use std::path::Path;
use tracing::{info, warn};

/// One accepted run-list line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunListEntry {
    pub line: usize,
    pub url: String,
    pub media_name: Option<String>,
    pub class_id: Option<i64>,
    pub storage_path: Option<String>,
}

/// Accepted entries plus the number of rejected lines
#[derive(Debug, Clone, Default)]
pub struct ParsedRunList {
    pub entries: Vec<RunListEntry>,
    pub skipped: usize,
}

/// Parse run-list text, warning about every rejected line
pub fn parse_run_list(content: &str) -> ParsedRunList {
    let mut parsed = ParsedRunList::default();

    for (index, raw) in content.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).take(4).collect();
        let non_empty = |i: usize| fields.get(i).filter(|f| !f.is_empty()).map(|f| f.to_string());

        let url = fields[0];
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            warn!(line = line_no, url, "Invalid URL in run list, skipping line");
            parsed.skipped += 1;
            continue;
        }

        let class_id = match non_empty(2) {
            Some(raw) => match raw.parse::<i64>() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(line = line_no, class_id = %raw, "ClassId is not an integer, ignoring it");
                    None
                }
            },
            None => None,
        };

        let storage_path = non_empty(3);
        if let Some(path) = &storage_path {
            if !path.starts_with('/') {
                warn!(line = line_no, path = %path, "MediaStoragePath must start with '/', skipping line");
                parsed.skipped += 1;
                continue;
            }
        }

        parsed.entries.push(RunListEntry {
            line: line_no,
            url: url.to_string(),
            media_name: non_empty(1),
            class_id,
            storage_path,
        });
    }

    parsed
}

/// Path component of an absolute URL, without query or fragment
fn url_path(url: &str) -> &str {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = without_scheme
        .find('/')
        .map_or("", |start| &without_scheme[start..]);
    path.split(['?', '#']).next().unwrap_or_default()
}

fn url_file_name(url: &str) -> &str {
    url_path(url).rsplit('/').next().unwrap_or_default()
}

/// Resolves the storage path of a pulled media file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoragePathPolicy {
    use_url_path: bool,
    /// Starts with `/` and never ends with one; empty when unset
    prefix: String,
}

impl StoragePathPolicy {
    pub fn new(use_url_path: bool, prefix: &str) -> Self {
        let trimmed = prefix.trim().trim_end_matches('/');
        let prefix = if trimmed.is_empty() {
            String::new()
        } else if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        };
        Self {
            use_url_path,
            prefix,
        }
    }

    pub fn from_config(config: &CustomPathConfig) -> Self {
        Self::new(config.use_url_path, &config.prefix)
    }

    /// Storage path for `url`, given the line's own `MediaStoragePath`
    pub fn resolve(&self, url: &str, line_path: Option<&str>) -> Option<String> {
        let path = if self.use_url_path {
            Some(url_path(url))
        } else {
            line_path
        }
        .filter(|p| !p.is_empty() && *p != "/");

        match (self.prefix.is_empty(), path) {
            (true, path) => path.map(str::to_string),
            (false, Some(path)) => Some(format!("{}{}", self.prefix, path)),
            (false, None) => {
                let file_name = url_file_name(url);
                if file_name.is_empty() {
                    Some(self.prefix.clone())
                } else {
                    Some(format!("{}/{}", self.prefix, file_name))
                }
            }
        }
    }
}

/// [`SourceEnumerator`] over a parsed run list
///
/// The whole list is served as a single page keyed by URL.
#[derive(Debug, Clone)]
pub struct RunListEnumerator {
    items: Vec<SourceItem>,
}

impl RunListEnumerator {
    /// Build from run-list text
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Config`] when no line is usable
    pub fn from_content(content: &str, policy: &StoragePathPolicy) -> Result<Self> {
        let parsed = parse_run_list(content);
        if parsed.entries.is_empty() {
            return Err(MigrateError::Config(format!(
                "Run list contains no valid entries ({} lines rejected)",
                parsed.skipped
            )));
        }

        info!(
            accepted = parsed.entries.len(),
            skipped = parsed.skipped,
            "Run list parsed"
        );

        let items = parsed
            .entries
            .into_iter()
            .map(|entry| {
                let storage_path = policy.resolve(&entry.url, entry.storage_path.as_deref());
                SourceItem::new(entry.url).with_attributes(SourceAttributes {
                    media_name: entry.media_name,
                    class_id: entry.class_id,
                    storage_path,
                })
            })
            .collect();

        Ok(Self { items })
    }

    /// Read and parse a run-list file
    pub async fn from_file(path: impl AsRef<Path>, policy: &StoragePathPolicy) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            MigrateError::Config(format!("Run list {} cannot be read: {}", path.display(), e))
        })?;
        Self::from_content(&content, policy)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl SourceEnumerator for RunListEnumerator {
    async fn list_items(
        &self,
        _prefix: &str,
        _marker: Option<&str>,
    ) -> bridge_traits::error::Result<ListPage> {
        Ok(ListPage::last(self.items.clone()))
    }
}
