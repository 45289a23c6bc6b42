//! Storage errors.

use std::fmt::Display;

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage not configured: {0}")]
    Config(String),

    /// The bucket itself could not be reached.
    #[error("Bucket unreachable: {0}")]
    Unreachable(String),

    #[error("Could not check {key}: {reason}")]
    Head { key: String, reason: String },

    #[error("Could not upload {key}: {reason}")]
    Upload { key: String, reason: String },

    #[error("Could not delete {key}: {reason}")]
    Delete { key: String, reason: String },

    #[error("Invalid object key {0:?}")]
    InvalidKey(String),
}

impl StorageError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn head(key: &str, reason: impl Display) -> Self {
        Self::Head {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn upload(key: &str, reason: impl Display) -> Self {
        Self::Upload {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn delete(key: &str, reason: impl Display) -> Self {
        Self::Delete {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}
