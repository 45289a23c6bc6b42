//! Panel image synthesis.
//!
//! Turns a captured video frame plus a style prompt into comic panel bytes.

pub mod error;
pub mod openai;
pub mod prompt;

use async_trait::async_trait;

pub use error::{SynthError, SynthResult};
pub use openai::{OpenAiConfig, OpenAiImageClient};
pub use prompt::{build_prompt, render_prompt, DEFAULT_PROMPT, FALLBACK_STYLE_TEXT};

/// External image synthesis capability.
#[async_trait]
pub trait ImageSynthesizer: Send + Sync {
    /// Produce JPEG panel bytes from a frame and a prompt.
    async fn synthesize(
        &self,
        frame: Vec<u8>,
        content_type: &str,
        prompt: &str,
    ) -> SynthResult<Vec<u8>>;
}
