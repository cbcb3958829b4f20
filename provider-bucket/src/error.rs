//! Error types for bucket sources

use thiserror::Error;

/// Bucket source errors
#[derive(Error, Debug)]
pub enum BucketError {
    #[error("Invalid bucket configuration: {0}")]
    Config(String),

    #[error("Cannot list bucket {bucket}: {message}")]
    List { bucket: String, message: String },

    #[error("Cannot read object {key}: {message}")]
    Read {
        key: String,
        message: String,
        /// The bucket answered that the key does not exist
        not_found: bool,
    },
}

/// Result type for bucket source operations
pub type Result<T> = std::result::Result<T, BucketError>;

impl From<BucketError> for bridge_traits::BridgeError {
    fn from(error: BucketError) -> Self {
        match error {
            BucketError::Read {
                key,
                not_found: true,
                ..
            } => bridge_traits::BridgeError::NotAvailable(format!("object {key} does not exist")),
            other => bridge_traits::BridgeError::OperationFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::BridgeError;

    #[test]
    fn test_missing_object_is_not_available() {
        let missing = BucketError::Read {
            key: "videos/a.mp4".to_string(),
            message: "NoSuchKey".to_string(),
            not_found: true,
        };
        match BridgeError::from(missing) {
            BridgeError::NotAvailable(message) => assert!(message.contains("videos/a.mp4")),
            other => panic!("unexpected {other:?}"),
        }

        let throttled = BucketError::Read {
            key: "videos/a.mp4".to_string(),
            message: "SlowDown".to_string(),
            not_found: false,
        };
        assert!(matches!(
            BridgeError::from(throttled),
            BridgeError::OperationFailed(_)
        ));

        let listing = BucketError::List {
            bucket: "media".to_string(),
            message: "AccessDenied".to_string(),
        };
        assert!(matches!(
            BridgeError::from(listing),
            BridgeError::OperationFailed(_)
        ));
    }
}
