//! Client error types.

use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server refused the request as invalid (400).
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Unexpected response {status}: {body}")]
    UnexpectedResponse { status: u16, body: String },

    /// The server answered a delete with something other than `deleted`.
    #[error("Delete refused: {0}")]
    DeleteRefused(String),

    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("Background task failed: {0}")]
    Task(String),
}
