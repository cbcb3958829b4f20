//! Local directory source
//!
//! Walks `localPath` recursively on the first listing call. Every regular
//! file becomes one [`SourceItem`] keyed by its absolute path, with its size
//! and modification time. Symbolic links are followed for files and skipped
//! for directories so a link cycle cannot stall the walk.

use crate::error::{LocalSourceError, Result};
use crate::paging::{page_at, DEFAULT_PAGE_SIZE};
use async_trait::async_trait;
use bridge_traits::{ListPage, SourceEnumerator, SourceItem};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// [`SourceEnumerator`] over a directory tree
pub struct LocalFsEnumerator {
    root: PathBuf,
    page_size: usize,
    listing: OnceCell<Vec<SourceItem>>,
}

impl LocalFsEnumerator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            page_size: DEFAULT_PAGE_SIZE,
            listing: OnceCell::new(),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn listing(&self) -> Result<&Vec<SourceItem>> {
        self.listing.get_or_try_init(|| walk(&self.root)).await
    }
}

async fn walk(root: &Path) -> Result<Vec<SourceItem>> {
    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| LocalSourceError::Io { path, source }
    };

    let root_meta = tokio::fs::metadata(root).await.map_err(io_error(root))?;
    if !root_meta.is_dir() {
        return Err(LocalSourceError::Io {
            path: root.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        });
    }

    let mut items = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(io_error(&dir))?;
        let mut children = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error(&dir))? {
            children.push(entry.path());
        }
        children.sort();

        for path in children {
            let link_meta = match tokio::fs::symlink_metadata(&path).await {
                Ok(meta) => meta,
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "Skipping unreadable entry");
                    continue;
                }
            };
            if link_meta.is_dir() {
                pending.push(path);
                continue;
            }

            let meta = if link_meta.file_type().is_symlink() {
                match tokio::fs::metadata(&path).await {
                    Ok(meta) if meta.is_file() => meta,
                    Ok(_) => {
                        debug!(path = %path.display(), "Skipping symlink to directory");
                        continue;
                    }
                    Err(error) => {
                        warn!(path = %path.display(), error = %error, "Skipping dangling symlink");
                        continue;
                    }
                }
            } else if link_meta.is_file() {
                link_meta
            } else {
                continue;
            };

            let key = path
                .to_str()
                .ok_or_else(|| LocalSourceError::NonUtf8Path(path.clone()))?
                .to_string();
            let modified = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);

            items.push(
                SourceItem::new(key)
                    .with_size(meta.len())
                    .with_modified_time(modified),
            );
        }
    }

    info!(root = %root.display(), files = items.len(), "Local directory walked");
    Ok(items)
}

#[async_trait]
impl SourceEnumerator for LocalFsEnumerator {
    async fn list_items(
        &self,
        _prefix: &str,
        marker: Option<&str>,
    ) -> bridge_traits::error::Result<ListPage> {
        let listing = self.listing().await?;
        Ok(page_at(listing, marker, self.page_size)?)
    }
}
