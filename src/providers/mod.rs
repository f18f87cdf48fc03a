//! Remote generation service integrations

mod gemini;

use async_trait::async_trait;
use thiserror::Error;

pub use gemini::GeminiClient;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// A remote generative-language capability. May fail transiently; callers
/// are expected to fall back rather than retry.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}
