use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("config has changed, exit! (stored fingerprint {stored}, current {current})")]
    SessionMismatch { stored: String, current: String },

    #[error("Enumeration failed after {attempts} attempts: {message}")]
    Enumeration { attempts: u32, message: String },

    #[error("Record store error: {0}")]
    Store(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Report error: {0}")]
    Report(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<core_runtime::Error> for MigrateError {
    fn from(err: core_runtime::Error) -> Self {
        MigrateError::Config(err.to_string())
    }
}

impl From<sqlx::Error> for MigrateError {
    fn from(err: sqlx::Error) -> Self {
        MigrateError::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MigrateError>;
