//! Upload Abstractions
//!
//! Contracts for moving one resolved source item to the destination platform.

use async_trait::async_trait;
use std::fmt;

use crate::source::SourceRef;

/// Classification of a failed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferErrorKind {
    /// Network or service failure that may succeed on another attempt
    Transient,
    /// Failure that will not go away by repeating the call
    Permanent,
    /// Malformed input or parameter validation failure
    InvalidInput,
    /// A deadline elapsed
    Timeout,
}

impl TransferErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferErrorKind::Transient => "transient",
            TransferErrorKind::Permanent => "permanent",
            TransferErrorKind::InvalidInput => "invalid_input",
            TransferErrorKind::Timeout => "timeout",
        }
    }
}

/// Classified transfer failure.
///
/// `request_id` is set when the remote service acknowledged the request. Its
/// presence means the remote side may already be acting on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferError {
    pub kind: TransferErrorKind,
    /// Machine readable code, e.g. `INVALID_URL` or a service error code
    pub code: String,
    pub message: String,
    pub request_id: Option<String>,
}

impl TransferError {
    pub fn new(kind: TransferErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            request_id: None,
        }
    }

    pub fn transient(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(TransferErrorKind::Transient, code, message)
    }

    pub fn permanent(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(TransferErrorKind::Permanent, code, message)
    }

    pub fn invalid_input(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(TransferErrorKind::InvalidInput, code, message)
    }

    pub fn timeout(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(TransferErrorKind::Timeout, code, message)
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        let request_id = request_id.into();
        self.request_id = if request_id.is_empty() {
            None
        } else {
            Some(request_id)
        };
        self
    }

    /// Whether the remote service observed the failed request
    pub fn reached_remote(&self) -> bool {
        self.request_id.is_some()
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(request_id) = &self.request_id {
            write!(f, " (request id: {})", request_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for TransferError {}

pub type TransferResult<T> = std::result::Result<T, TransferError>;

/// Identifiers assigned by the destination platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub destination_id: String,
    pub destination_url: Option<String>,
}

/// One complete transfer of a source item.
///
/// Implementations own any protocol-level retries. Callers invoke `transfer`
/// once per attempt and decide about further attempts from the returned
/// [`TransferError`].
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn transfer(&self, source: &SourceRef) -> TransferResult<TransferOutcome>;
}

/// Temporary credentials issued for the object put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempCredentials {
    pub secret_id: String,
    pub secret_key: String,
    pub token: String,
}

/// State returned by the apply phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub session_key: String,
    pub storage_bucket: String,
    pub storage_region: String,
    /// Object path inside the bucket, with a leading `/`
    pub media_storage_path: String,
    pub credentials: Option<TempCredentials>,
}

/// Sizes observed after the object put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredObject {
    /// Size of the source body, when it was known up front
    pub source_size: Option<u64>,
    /// Size reported by the destination bucket after the put
    pub object_size: u64,
}

impl StoredObject {
    pub fn is_complete(&self) -> bool {
        self.source_size
            .map(|expected| expected == self.object_size)
            .unwrap_or(true)
    }
}

/// The three remote calls of a two-phase (apply / commit) upload.
#[async_trait]
pub trait TwoPhaseTransport: Send + Sync {
    /// Register the upload and obtain a storage location
    async fn apply(&self, source: &SourceRef) -> TransferResult<UploadSession>;

    /// Write the source body to the location returned by `apply`
    async fn put_media(
        &self,
        session: &UploadSession,
        source: &SourceRef,
    ) -> TransferResult<StoredObject>;

    /// Confirm the upload and obtain destination identifiers
    async fn commit(&self, session: &UploadSession) -> TransferResult<TransferOutcome>;
}
