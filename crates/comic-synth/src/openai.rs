//! OpenAI images-edit adapter.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{SynthError, SynthResult};
use crate::ImageSynthesizer;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-image-1";

/// Configuration for the OpenAI image client.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    /// API root, without the `/images/edits` suffix.
    pub base_url: String,
    pub model: String,
    pub size: String,
    pub output_format: String,
    /// JPEG compression level, 0-100.
    pub output_compression: u8,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            size: "1024x1024".to_string(),
            output_format: "jpeg".to_string(),
            output_compression: 85,
            timeout: Duration::from_secs(180),
        }
    }

    /// Load from environment variables.
    pub fn from_env() -> SynthResult<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SynthError::config("OPENAI_API_KEY not set"))?;

        let mut config = Self::new(api_key);
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            if !base_url.is_empty() {
                config.base_url = base_url;
            }
        }
        if let Ok(model) = std::env::var("OPENAI_IMAGE_MODEL") {
            if !model.is_empty() {
                config.model = model;
            }
        }
        Ok(config)
    }

    fn edits_url(&self) -> String {
        format!("{}/images/edits", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    b64_json: Option<String>,
}

/// Calls the OpenAI `images/edits` endpoint with the captured frame.
pub struct OpenAiImageClient {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiImageClient {
    pub fn new(config: OpenAiConfig) -> SynthResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> SynthResult<Self> {
        Self::new(OpenAiConfig::from_env()?)
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }
}

/// Frame part mime type and file name for an uploaded content type.
fn frame_part_kind(content_type: &str) -> (&'static str, &'static str) {
    if content_type.to_ascii_lowercase().contains("png") {
        ("image/png", "frame.png")
    } else {
        ("image/jpeg", "frame.jpg")
    }
}

#[async_trait]
impl ImageSynthesizer for OpenAiImageClient {
    async fn synthesize(
        &self,
        frame: Vec<u8>,
        content_type: &str,
        prompt: &str,
    ) -> SynthResult<Vec<u8>> {
        let (mime, file_name) = frame_part_kind(content_type);
        let image = Part::bytes(frame).file_name(file_name).mime_str(mime)?;

        let form = Form::new()
            .text("model", self.config.model.clone())
            .text("prompt", prompt.to_string())
            .text("size", self.config.size.clone())
            .text("output_format", self.config.output_format.clone())
            .text("output_compression", self.config.output_compression.to_string())
            .part("image[]", image);

        debug!(model = %self.config.model, "Requesting image edit");

        let response = self
            .client
            .post(self.config.edits_url())
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(status, body = %body, "Image edit request rejected");
            return Err(SynthError::Api { status, body });
        }

        let parsed: ImagesResponse = response.json().await?;
        let b64 = parsed
            .data
            .into_iter()
            .next()
            .and_then(|d| d.b64_json)
            .filter(|s| !s.is_empty())
            .ok_or(SynthError::MissingPayload)?;

        BASE64
            .decode(b64.as_bytes())
            .map_err(|e| SynthError::Decode(e.to_string()))
    }
}
