//! Synthesis error types.

use thiserror::Error;

/// Result type for synthesis operations.
pub type SynthResult<T> = Result<T, SynthError>;

/// Errors that can occur while synthesizing a panel.
#[derive(Debug, Error)]
pub enum SynthError {
    #[error("Synthesizer not configured: {0}")]
    Config(String),

    #[error("Synthesis request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Synthesis API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Synthesis response had no image payload")]
    MissingPayload,

    #[error("Invalid image payload: {0}")]
    Decode(String),
}

impl SynthError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
