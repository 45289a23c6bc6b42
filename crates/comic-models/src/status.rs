//! Panel status wire format.
//!
//! Shared by the server handlers and the client so both sides agree on the
//! JSON bodies exchanged over `/comics/:video/:style/:bucket`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Status body returned by the panel endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PanelStatus {
    /// Artifact exists and is served at `url`.
    Ready { url: String },
    /// A generation job is running. Advisory: retry shortly.
    Generating,
    /// Nothing known for this identity.
    Missing,
    /// Generation failed or the server hit an internal error.
    Error { message: String },
    /// Artifact and job state were removed.
    Deleted { key: String },
}

impl PanelStatus {
    pub fn ready(url: impl Into<String>) -> Self {
        Self::Ready { url: url.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PanelStatus::Ready { .. } => "ready",
            PanelStatus::Generating => "generating",
            PanelStatus::Missing => "missing",
            PanelStatus::Error { .. } => "error",
            PanelStatus::Deleted { .. } => "deleted",
        }
    }

    /// URL when ready.
    pub fn url(&self) -> Option<&str> {
        match self {
            PanelStatus::Ready { url } => Some(url.as_str()),
            _ => None,
        }
    }
}

/// Header carrying the force-overwrite flag on generation requests.
pub const FORCE_OVERWRITE_HEADER: &str = "x-force-overwrite";
