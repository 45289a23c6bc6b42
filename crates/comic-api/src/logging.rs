//! Structured logging for generation jobs.

use tracing::{error, info, Span};

use comic_models::PanelIdentity;

/// Consistent log lines for one panel generation.
pub struct GenerationLogger {
    video: String,
    style: String,
    bucket: String,
    job_id: String,
}

impl GenerationLogger {
    pub fn new(identity: &PanelIdentity, job_id: impl Into<String>) -> Self {
        Self {
            video: identity.video.clone(),
            style: identity.style.clone(),
            bucket: identity.bucket.to_string(),
            job_id: job_id.into(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            video = %self.video,
            style = %self.style,
            bucket = %self.bucket,
            "Generation started: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            video = %self.video,
            style = %self.style,
            bucket = %self.bucket,
            "Generation failed: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            video = %self.video,
            style = %self.style,
            bucket = %self.bucket,
            "Generation completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Span covering the whole generation.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "generation",
            job_id = %self.job_id,
            video = %self.video,
            style = %self.style,
            bucket = %self.bucket
        )
    }
}
