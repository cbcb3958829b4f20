//! URL list source
//!
//! A text file with one URL per line. Blank lines are ignored and each URL is
//! trimmed. Sizes are unknown until download, so items carry a size of zero.

use crate::error::{LocalSourceError, Result};
use crate::paging::{page_at, DEFAULT_PAGE_SIZE};
use async_trait::async_trait;
use bridge_traits::{ListPage, SourceEnumerator, SourceItem};
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;
use tracing::info;

/// [`SourceEnumerator`] over a URL list file
pub struct UrlListEnumerator {
    path: PathBuf,
    page_size: usize,
    listing: OnceCell<Vec<SourceItem>>,
}

impl UrlListEnumerator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            page_size: DEFAULT_PAGE_SIZE,
            listing: OnceCell::new(),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    async fn listing(&self) -> Result<&Vec<SourceItem>> {
        self.listing
            .get_or_try_init(|| async {
                let content = tokio::fs::read_to_string(&self.path)
                    .await
                    .map_err(|source| LocalSourceError::Io {
                        path: self.path.clone(),
                        source,
                    })?;
                let items = parse_url_list(&content);
                info!(path = %self.path.display(), urls = items.len(), "URL list read");
                Ok(items)
            })
            .await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn parse_url_list(content: &str) -> Vec<SourceItem> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(SourceItem::new)
        .collect()
}

#[async_trait]
impl SourceEnumerator for UrlListEnumerator {
    async fn list_items(
        &self,
        _prefix: &str,
        marker: Option<&str>,
    ) -> bridge_traits::error::Result<ListPage> {
        let listing = self.listing().await?;
        Ok(page_at(listing, marker, self.page_size)?)
    }
}
