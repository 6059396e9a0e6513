use thiserror::Error;

/// Errors raised by the booking core
#[derive(Error, Debug)]
pub enum BookingError {
    #[error("Unknown form field: {0}")]
    UnknownField(String),

    #[error("Invalid value for field {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },

    #[error("Step not found: {0}")]
    StepNotFound(usize),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BookingError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFieldValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by a [`KeyValueStore`](crate::storage::KeyValueStore)
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Quota exceeded writing {key}: {requested} characters requested, {available} available")]
    QuotaExceeded {
        key: String,
        requested: usize,
        available: usize,
    },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BookingError>;
