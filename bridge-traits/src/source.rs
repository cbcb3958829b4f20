//! Source Enumeration Abstractions
//!
//! Describes where migrated items come from and how the engine lists them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;
use std::str::FromStr;
use tokio::io::AsyncRead;

use crate::error::{BridgeError, Result};

/// Kind of source a migration run reads from.
///
/// The string form is the tag persisted with every record and written to the
/// result file, so it must stay stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MigrateType {
    #[serde(rename = "migrateLocal")]
    Local,
    #[serde(rename = "migrateCos")]
    Cos,
    #[serde(rename = "migrateUrl")]
    Url,
    #[serde(rename = "migrateAws")]
    Aws,
    #[serde(rename = "migrateAli")]
    Ali,
    #[serde(rename = "migrateQiniu")]
    Qiniu,
    #[serde(rename = "pullUpload")]
    PullUpload,
}

impl MigrateType {
    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrateType::Local => "migrateLocal",
            MigrateType::Cos => "migrateCos",
            MigrateType::Url => "migrateUrl",
            MigrateType::Aws => "migrateAws",
            MigrateType::Ali => "migrateAli",
            MigrateType::Qiniu => "migrateQiniu",
            MigrateType::PullUpload => "pullUpload",
        }
    }

    /// Whether the source is an object-storage bucket
    pub fn is_bucket(&self) -> bool {
        matches!(
            self,
            MigrateType::Cos | MigrateType::Aws | MigrateType::Ali | MigrateType::Qiniu
        )
    }
}

impl FromStr for MigrateType {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "migrateLocal" => Ok(MigrateType::Local),
            "migrateCos" => Ok(MigrateType::Cos),
            "migrateUrl" => Ok(MigrateType::Url),
            "migrateAws" => Ok(MigrateType::Aws),
            "migrateAli" => Ok(MigrateType::Ali),
            "migrateQiniu" => Ok(MigrateType::Qiniu),
            "pullUpload" => Ok(MigrateType::PullUpload),
            _ => Err(BridgeError::UnknownMigrateType(s.to_string())),
        }
    }
}

impl fmt::Display for MigrateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-item options carried by direct-pull sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
}

impl SourceAttributes {
    pub fn is_empty(&self) -> bool {
        self.media_name.is_none() && self.class_id.is_none() && self.storage_path.is_none()
    }
}

/// One item discovered by a [`SourceEnumerator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceItem {
    /// Source identifier: absolute path, URL, or object key
    pub key: String,
    pub size_bytes: u64,
    /// Last modification time as a unix timestamp in seconds
    pub modified_time: i64,
    pub etag: String,
    pub attributes: Option<SourceAttributes>,
}

impl SourceItem {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            size_bytes: 0,
            modified_time: 0,
            etag: String::new(),
            attributes: None,
        }
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    pub fn with_modified_time(mut self, modified_time: i64) -> Self {
        self.modified_time = modified_time;
        self
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = etag.into();
        self
    }

    pub fn with_attributes(mut self, attributes: SourceAttributes) -> Self {
        self.attributes = Some(attributes);
        self
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub items: Vec<SourceItem>,
    /// Marker to pass to the next `list_items` call
    pub next_marker: Option<String>,
    pub is_done: bool,
}

impl ListPage {
    /// A final page holding every item
    pub fn last(items: Vec<SourceItem>) -> Self {
        Self {
            items,
            next_marker: None,
            is_done: true,
        }
    }
}

/// Paginated listing of a migration source.
///
/// Implementations must be restartable per page: calling `list_items` again
/// with the same marker returns the same page, which is what lets the engine
/// retry a failed page without re-listing from the start.
///
/// # Example
///
/// ```ignore
/// let mut marker = None;
/// loop {
///     let page = source.list_items("", marker.as_deref()).await?;
///     handle(page.items);
///     if page.is_done {
///         break;
///     }
///     marker = page.next_marker;
/// }
/// ```
#[async_trait]
pub trait SourceEnumerator: Send + Sync {
    /// List items under `prefix`, continuing after `marker`
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read
    async fn list_items(&self, prefix: &str, marker: Option<&str>) -> Result<ListPage>;
}

/// Body read incrementally from a source or a response
pub type ByteReader = Pin<Box<dyn AsyncRead + Send>>;

/// Opened source content
pub struct SourceBody {
    pub reader: ByteReader,
    /// Length in bytes, when the source announces it
    pub size: Option<u64>,
}

impl fmt::Debug for SourceBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceBody").field("size", &self.size).finish()
    }
}

/// Read access to the objects of a bucket source.
///
/// Bucket connectors implement this next to [`SourceEnumerator`] so the
/// transport can stream an object it only knows by key.
#[async_trait]
pub trait ObjectReader: Send + Sync {
    /// Open the object stored under `key`
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotAvailable`] when the object does not exist
    async fn open_object(&self, key: &str) -> Result<SourceBody>;
}

/// A source item resolved to something a transport can read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    /// File on the local filesystem
    LocalFile(PathBuf),
    /// Object downloadable over HTTP(S)
    Url(String),
    /// URL the destination platform fetches by itself
    Pull {
        url: String,
        attributes: SourceAttributes,
    },
    /// Key inside the configured source bucket
    Object { key: String },
}

impl SourceRef {
    /// Human readable identifier for logs
    pub fn display_key(&self) -> &str {
        match self {
            SourceRef::LocalFile(path) => path.to_str().unwrap_or("<non-utf8 path>"),
            SourceRef::Url(url) => url,
            SourceRef::Pull { url, .. } => url,
            SourceRef::Object { key } => key,
        }
    }
}
