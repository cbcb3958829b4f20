//! Error types for local sources

use std::path::PathBuf;
use thiserror::Error;

/// Local source errors
#[derive(Error, Debug)]
pub enum LocalSourceError {
    /// A file or directory could not be read
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Paths are stored as record keys and must be valid UTF-8
    #[error("Path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),

    /// The continuation marker was not produced by this source
    #[error("Invalid listing marker: {0}")]
    InvalidMarker(String),
}

/// Result type for local source operations
pub type Result<T> = std::result::Result<T, LocalSourceError>;

impl From<LocalSourceError> for bridge_traits::BridgeError {
    fn from(error: LocalSourceError) -> Self {
        match error {
            LocalSourceError::Io { path, source } if source.kind() == std::io::ErrorKind::NotFound => {
                bridge_traits::BridgeError::NotAvailable(format!("{} does not exist", path.display()))
            }
            other => bridge_traits::BridgeError::OperationFailed(other.to_string()),
        }
    }
}
