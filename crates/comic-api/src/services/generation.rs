//! Panel generation pipeline.
//!
//! frame + style -> image synthesis -> upload -> outcome in the job registry.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, Instrument};

use comic_models::{PanelIdentity, StyleCatalog};
use comic_storage::{ArtifactStore, KeyLayout, StorageError, PANEL_CONTENT_TYPE};
use comic_synth::{build_prompt, ImageSynthesizer, SynthError};

use crate::logging::GenerationLogger;
use crate::metrics;
use crate::services::job_registry::{GenerationToken, JobRegistry};

/// Why a generation did not produce a panel.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Image synthesis failed: {0}")]
    Synthesis(#[from] SynthError),

    #[error("Upload failed: {0}")]
    Upload(#[from] StorageError),

    /// The claim was cancelled or replaced before the upload.
    #[error("Generation {0} no longer holds its claim")]
    Superseded(GenerationToken),
}

/// Runs generations against a synthesizer and an artifact store.
pub struct GenerationPipeline {
    synthesizer: Arc<dyn ImageSynthesizer>,
    store: Arc<dyn ArtifactStore>,
    catalog: Arc<StyleCatalog>,
    layout: KeyLayout,
}

impl GenerationPipeline {
    pub fn new(
        synthesizer: Arc<dyn ImageSynthesizer>,
        store: Arc<dyn ArtifactStore>,
        catalog: Arc<StyleCatalog>,
        layout: KeyLayout,
    ) -> Self {
        Self {
            synthesizer,
            store,
            catalog,
            layout,
        }
    }

    /// Generate and upload one panel under the claim `token`. Returns the
    /// public URL.
    ///
    /// The upload is skipped once the claim is gone. Failures are reported
    /// once; nothing is retried here.
    pub async fn run(
        &self,
        frame: Vec<u8>,
        content_type: &str,
        identity: &PanelIdentity,
        registry: &JobRegistry,
        token: GenerationToken,
    ) -> Result<String, GenerationError> {
        let prompt = build_prompt(&self.catalog, &identity.style);
        let panel = self
            .synthesizer
            .synthesize(frame, content_type, &prompt)
            .await?;

        if !registry.holds(identity, token).await {
            return Err(GenerationError::Superseded(token));
        }

        let key = self.layout.object_key(identity);
        let url = self.store.put(&key, panel, PANEL_CONTENT_TYPE).await?;
        Ok(url)
    }

    /// Run a generation in the background.
    ///
    /// The work runs in its own task, registered with the claim so that a
    /// delete can abort it. A supervisor task awaits it and writes the
    /// outcome into the registry, including panics. The returned handle
    /// resolves once the outcome has been handled.
    pub async fn spawn(
        self: &Arc<Self>,
        registry: Arc<JobRegistry>,
        token: GenerationToken,
        frame: Vec<u8>,
        content_type: String,
        identity: PanelIdentity,
    ) -> JoinHandle<()> {
        let logger = GenerationLogger::new(&identity, token.to_string());
        let span = logger.create_span();
        let frame_summary = format!("{} byte {} frame", frame.len(), content_type);

        let pipeline = Arc::clone(self);
        let worker_registry = Arc::clone(&registry);
        let worker_identity = identity.clone();
        let worker = tokio::spawn(
            async move {
                pipeline
                    .run(
                        frame,
                        &content_type,
                        &worker_identity,
                        &worker_registry,
                        token,
                    )
                    .await
            }
            .instrument(span.clone()),
        );
        if !registry.attach(&identity, token, worker.abort_handle()).await {
            worker.abort();
        }

        tokio::spawn(
            async move {
                let started = Instant::now();
                logger.log_start(&frame_summary);
                metrics::record_generation_started(&identity.style);

                let outcome = worker.await;
                let elapsed = started.elapsed().as_secs_f64();

                match outcome {
                    Ok(Ok(url)) => {
                        logger.log_completion(&format!("{} in {:.1}s", url, elapsed));
                        metrics::record_generation_completed(&identity.style, elapsed);
                        registry.complete(&identity, token, url).await;
                    }
                    Ok(Err(GenerationError::Superseded(_))) => {
                        info!(panel = %identity, "Generation superseded, result discarded");
                    }
                    Ok(Err(e)) => {
                        logger.log_error(&format!("{} after {:.1}s", e, elapsed));
                        metrics::record_generation_failed(&identity.style);
                        registry.fail(&identity, token, e.to_string()).await;
                    }
                    Err(join_error) if join_error.is_cancelled() => {
                        info!(panel = %identity, "Generation cancelled");
                    }
                    Err(_) => {
                        let message = "Generation task panicked";
                        logger.log_error(message);
                        metrics::record_generation_failed(&identity.style);
                        registry.fail(&identity, token, message).await;
                    }
                }
            }
            .instrument(span),
        )
    }
}
