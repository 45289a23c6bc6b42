//! Application state.

use std::sync::Arc;

use comic_models::StyleCatalog;
use comic_storage::{ArtifactStore, KeyLayout, S3ArtifactStore, S3StoreConfig};
use comic_synth::{ImageSynthesizer, OpenAiImageClient};

use crate::config::ApiConfig;
use crate::services::{GenerationPipeline, JobRegistry, PanelService};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub catalog: Arc<StyleCatalog>,
    pub registry: Arc<JobRegistry>,
    pub store: Arc<dyn ArtifactStore>,
    pub panels: PanelService,
}

impl AppState {
    /// Create application state from the environment: style catalog from
    /// disk, S3 store, OpenAI synthesizer.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let catalog = StyleCatalog::from_path(&config.styles_path)?;
        tracing::info!(styles = catalog.len(), path = %config.styles_path, "Loaded style catalog");

        let storage_config = S3StoreConfig::from_env()?;
        let layout = storage_config.key_layout();
        let store = S3ArtifactStore::new(storage_config).await?;
        let synthesizer = OpenAiImageClient::from_env()?;

        Ok(Self::from_parts(
            config,
            catalog,
            Arc::new(store),
            Arc::new(synthesizer),
            layout,
        ))
    }

    /// Assemble state from explicit collaborators.
    pub fn from_parts(
        config: ApiConfig,
        catalog: StyleCatalog,
        store: Arc<dyn ArtifactStore>,
        synthesizer: Arc<dyn ImageSynthesizer>,
        layout: KeyLayout,
    ) -> Self {
        let catalog = Arc::new(catalog);
        let registry = Arc::new(JobRegistry::new(config.job_ttl));
        let pipeline = Arc::new(GenerationPipeline::new(
            synthesizer,
            Arc::clone(&store),
            Arc::clone(&catalog),
            layout.clone(),
        ));
        let panels = PanelService::new(
            Arc::clone(&catalog),
            Arc::clone(&registry),
            Arc::clone(&store),
            layout,
            pipeline,
        );

        Self {
            config,
            catalog,
            registry,
            store,
            panels,
        }
    }
}
