//! Panel identity.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bucket::{BucketKey, BucketParseError};
use crate::style::StyleCatalog;

/// Maximum length of a video identifier.
const MAX_VIDEO_ID_LEN: usize = 128;

/// `(video, style, bucket)` tuple addressing one panel and its job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PanelIdentity {
    pub video: String,
    pub style: String,
    pub bucket: BucketKey,
}

impl PanelIdentity {
    /// Build an identity without catalog validation.
    pub fn new(video: impl Into<String>, style: impl Into<String>, bucket: BucketKey) -> Self {
        Self {
            video: video.into(),
            style: style.into(),
            bucket,
        }
    }

    /// Validate raw request parts into an identity.
    ///
    /// Fails on an empty or unsafe video id, an unparsable timecode, or a
    /// style that is not in the catalog.
    pub fn validate(
        video: &str,
        style: &str,
        timecode: &str,
        catalog: &StyleCatalog,
    ) -> Result<Self, IdentityError> {
        if !is_valid_segment(video, MAX_VIDEO_ID_LEN) {
            return Err(IdentityError::InvalidVideo(video.to_string()));
        }
        if style.is_empty() {
            return Err(IdentityError::UnknownStyle(style.to_string()));
        }
        let bucket = BucketKey::parse(timecode)?;
        if !catalog.contains(style) {
            return Err(IdentityError::UnknownStyle(style.to_string()));
        }

        Ok(Self::new(video, style, bucket))
    }

    /// Object path relative to any store prefix: `video/style/MM-SS.jpg`.
    pub fn object_path(&self) -> String {
        format!("{}/{}/{}.jpg", self.video, self.style, self.bucket)
    }
}

impl fmt::Display for PanelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.video, self.style, self.bucket)
    }
}

/// Video ids become object key segments, so keep them to a safe alphabet.
fn is_valid_segment(s: &str, max_len: usize) -> bool {
    if s.is_empty() || s.len() > max_len || s == "." || s == ".." {
        return false;
    }
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Identity validation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("Invalid video id: {0:?}")]
    InvalidVideo(String),

    #[error("Unknown style: {0}")]
    UnknownStyle(String),

    #[error(transparent)]
    InvalidBucket(#[from] BucketParseError),
}
