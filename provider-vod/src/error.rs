//! Error types for the destination platform transports

use bridge_traits::{TransferError, TransferErrorKind};
use std::path::PathBuf;
use thiserror::Error;

/// Destination transport errors
#[derive(Error, Debug)]
pub enum VodError {
    /// The API answered with an error envelope
    #[error("API error {code}: {message} (request id: {request_id})")]
    Api {
        code: String,
        message: String,
        request_id: String,
    },

    /// No response was obtained
    #[error("Network error: {0}")]
    Network(String),

    /// The response could not be understood
    ///
    /// `request_id` is set when the service acknowledged the call before the
    /// payload failed to decode.
    #[error("Invalid response: {message}")]
    InvalidResponse {
        message: String,
        request_id: Option<String>,
    },

    /// Object storage rejected a request
    #[error("Object storage returned HTTP {status} for {operation}")]
    Storage {
        operation: &'static str,
        status: u16,
        request_id: Option<String>,
    },

    /// A source URL could not be downloaded
    #[error("download failed: {url} returned HTTP {status}")]
    Download { url: String, status: u16 },

    /// A local source file could not be read
    #[error("Cannot read {path}: {source}")]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A bucket object could not be opened
    #[error("Cannot read object {key}: {source}")]
    ObjectRead {
        key: String,
        #[source]
        source: bridge_traits::BridgeError,
    },

    /// The request cannot be built from this source
    #[error("{message}")]
    InvalidSource { code: &'static str, message: String },
}

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, VodError>;

impl VodError {
    /// Undecodable response that carried no request id
    pub fn invalid_response(message: impl Into<String>) -> Self {
        VodError::InvalidResponse {
            message: message.into(),
            request_id: None,
        }
    }

    pub fn invalid_source(code: &'static str, message: impl Into<String>) -> Self {
        VodError::InvalidSource {
            code,
            message: message.into(),
        }
    }
}

/// Classify an API error code by its family (the part before the first `.`)
fn api_error_kind(code: &str) -> TransferErrorKind {
    const INVALID_INPUT: [&str; 3] = ["InvalidParameter", "MissingParameter", "UnknownParameter"];
    const PERMANENT: [&str; 5] = [
        "AuthFailure",
        "UnauthorizedOperation",
        "ResourceNotFound",
        "UnsupportedOperation",
        "InvalidAction",
    ];

    let family = code.split('.').next().unwrap_or(code);
    if INVALID_INPUT.iter().any(|p| family.starts_with(p)) {
        TransferErrorKind::InvalidInput
    } else if PERMANENT.contains(&family) {
        TransferErrorKind::Permanent
    } else {
        TransferErrorKind::Transient
    }
}

fn status_kind(status: u16) -> TransferErrorKind {
    match status {
        408 | 429 => TransferErrorKind::Transient,
        400..=499 => TransferErrorKind::Permanent,
        _ => TransferErrorKind::Transient,
    }
}

fn with_request_id(error: TransferError, request_id: Option<String>) -> TransferError {
    match request_id {
        Some(id) => error.with_request_id(id),
        None => error,
    }
}

impl From<VodError> for TransferError {
    fn from(error: VodError) -> Self {
        let message = error.to_string();
        match error {
            VodError::Api {
                code, request_id, ..
            } => TransferError::new(api_error_kind(&code), code, message).with_request_id(request_id),
            VodError::Network(_) => TransferError::transient("NETWORK_ERROR", message),
            VodError::InvalidResponse { request_id, .. } => {
                with_request_id(TransferError::transient("INVALID_RESPONSE", message), request_id)
            }
            VodError::Storage {
                status, request_id, ..
            } => with_request_id(
                TransferError::new(status_kind(status), format!("COS_{}", status), message),
                request_id,
            ),
            VodError::Download { status, .. } => {
                TransferError::new(status_kind(status), "DOWNLOAD_FAILED", message)
            }
            VodError::SourceRead { .. } => TransferError::permanent("SOURCE_READ_ERROR", message),
            VodError::ObjectRead {
                source: bridge_traits::BridgeError::NotAvailable(_),
                ..
            } => TransferError::permanent("SOURCE_READ_ERROR", message),
            VodError::ObjectRead { .. } => TransferError::transient("SOURCE_READ_ERROR", message),
            VodError::InvalidSource { code, .. } => TransferError::invalid_input(code, message),
        }
    }
}

impl From<bridge_traits::BridgeError> for VodError {
    fn from(error: bridge_traits::BridgeError) -> Self {
        VodError::Network(error.to_string())
    }
}
