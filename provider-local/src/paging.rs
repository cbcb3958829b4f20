use crate::error::{LocalSourceError, Result};
use bridge_traits::{ListPage, SourceItem};

pub(crate) const DEFAULT_PAGE_SIZE: usize = 1000;

/// Slice one page out of a fully materialized listing
pub(crate) fn page_at(items: &[SourceItem], marker: Option<&str>, page_size: usize) -> Result<ListPage> {
    let start = match marker {
        None => 0,
        Some(raw) => raw
            .parse::<usize>()
            .ok()
            .filter(|start| *start <= items.len())
            .ok_or_else(|| LocalSourceError::InvalidMarker(raw.to_string()))?,
    };
    let end = (start + page_size.max(1)).min(items.len());
    let is_done = end >= items.len();

    Ok(ListPage {
        items: items[start..end].to_vec(),
        next_marker: (!is_done).then(|| end.to_string()),
        is_done,
    })
}
