//! Panel status protocol.
//!
//! Combines the volatile job registry with the durable artifact store:
//! a live record answers first, the store answers once the record has
//! expired.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use comic_models::{JobState, PanelIdentity, PanelStatus, StyleCatalog};
use comic_storage::{ArtifactStore, KeyLayout};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::services::generation::GenerationPipeline;
use crate::services::job_registry::{BeginOutcome, JobRegistry};

/// Content types accepted for uploaded frames.
pub const ACCEPTED_FRAME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "application/octet-stream",
];

/// Result of a generation request.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// The panel already exists and no overwrite was requested.
    Ready(String),
    /// Another request already started this generation.
    AlreadyGenerating,
    /// A new generation was started. The handle resolves once its outcome
    /// is recorded.
    Started(JoinHandle<()>),
}

impl SubmitOutcome {
    /// Wire status for this outcome.
    pub fn status(&self) -> PanelStatus {
        match self {
            SubmitOutcome::Ready(url) => PanelStatus::ready(url.clone()),
            SubmitOutcome::AlreadyGenerating | SubmitOutcome::Started(_) => {
                PanelStatus::Generating
            }
        }
    }
}

/// Panel operations shared by the HTTP handlers.
#[derive(Clone)]
pub struct PanelService {
    catalog: Arc<StyleCatalog>,
    registry: Arc<JobRegistry>,
    store: Arc<dyn ArtifactStore>,
    layout: KeyLayout,
    pipeline: Arc<GenerationPipeline>,
}

impl PanelService {
    pub fn new(
        catalog: Arc<StyleCatalog>,
        registry: Arc<JobRegistry>,
        store: Arc<dyn ArtifactStore>,
        layout: KeyLayout,
        pipeline: Arc<GenerationPipeline>,
    ) -> Self {
        Self {
            catalog,
            registry,
            store,
            layout,
            pipeline,
        }
    }

    /// Validate raw path parts. Runs before any registry or store access.
    pub fn identity(&self, video: &str, style: &str, timecode: &str) -> ApiResult<PanelIdentity> {
        Ok(PanelIdentity::validate(video, style, timecode, &self.catalog)?)
    }

    pub fn object_key(&self, identity: &PanelIdentity) -> String {
        self.layout.object_key(identity)
    }

    /// Current status of a panel.
    pub async fn status(&self, identity: &PanelIdentity) -> PanelStatus {
        if let Some(record) = self.registry.get(identity).await {
            match record.state {
                JobState::Generating => return PanelStatus::Generating,
                JobState::Error => {
                    return PanelStatus::error(
                        record.error.unwrap_or_else(|| "Generation failed".to_string()),
                    )
                }
                JobState::Ready => {
                    if let Some(url) = record.url {
                        return PanelStatus::ready(url);
                    }
                }
            }
        }

        let key = self.object_key(identity);
        if self.artifact_exists(&key).await {
            PanelStatus::ready(self.store.public_url(&key))
        } else {
            PanelStatus::Missing
        }
    }

    /// Start generating a panel from an uploaded frame.
    ///
    /// An existing artifact short-circuits to `ready` unless `force` is set.
    /// A generation already running for the identity is joined, never
    /// duplicated.
    pub async fn request_generation(
        &self,
        identity: PanelIdentity,
        frame: Vec<u8>,
        content_type: &str,
        force: bool,
    ) -> ApiResult<SubmitOutcome> {
        if !is_accepted_frame_type(content_type) {
            return Err(ApiError::UnsupportedMedia(content_type.to_string()));
        }
        if frame.is_empty() {
            return Err(ApiError::bad_request("Missing image body"));
        }

        let key = self.object_key(&identity);
        let exists = self.artifact_exists(&key).await;
        if exists && !force {
            return Ok(SubmitOutcome::Ready(self.store.public_url(&key)));
        }
        if exists {
            info!(panel = %identity, "Overwrite requested");
        }

        match self.registry.begin_generating(&identity).await {
            BeginOutcome::AlreadyActive => {
                metrics::record_dedup_hit(&identity.style);
                Ok(SubmitOutcome::AlreadyGenerating)
            }
            BeginOutcome::Created(token) => {
                info!(panel = %identity, force, %token, "Generating panel");
                let handle = self
                    .pipeline
                    .spawn(
                        Arc::clone(&self.registry),
                        token,
                        frame,
                        content_type.to_string(),
                        identity,
                    )
                    .await;
                Ok(SubmitOutcome::Started(handle))
            }
        }
    }

    /// Delete a panel's artifact and forget its job record.
    ///
    /// A running generation is cancelled first so it cannot upload after
    /// the artifact is gone.
    pub async fn delete(&self, identity: &PanelIdentity) -> ApiResult<PanelStatus> {
        if self.registry.cancel(identity).await {
            info!(panel = %identity, "Cancelled running generation");
        }
        let key = self.object_key(identity);
        self.store.delete(&key).await?;
        self.registry.remove(identity).await;
        info!(panel = %identity, key = %key, "Panel deleted");
        Ok(PanelStatus::Deleted { key })
    }

    /// Existence check where store failures count as "absent".
    async fn artifact_exists(&self, key: &str) -> bool {
        match self.store.exists(key).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(key = %key, error = %e, "Existence check failed, treating as missing");
                false
            }
        }
    }
}

/// Whether an uploaded frame's content type is accepted. Parameters such as
/// `; charset=` are ignored.
pub fn is_accepted_frame_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    ACCEPTED_FRAME_TYPES.contains(&essence.as_str())
}
