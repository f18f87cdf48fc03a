//! Speech conversion service interface
//!
//! Speech recognition and synthesis are external capabilities. The default
//! build ships `DisabledSpeech`, which always reports the capability as
//! unavailable; the HTTP layer maps that to the user-facing apology text.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech service unavailable")]
    Unavailable,

    #[error("could not understand the audio")]
    Unrecognized,

    #[error("conversion failed: {0}")]
    Conversion(String),
}

#[async_trait]
pub trait SpeechService: Send + Sync {
    async fn to_text(&self, audio: &[u8]) -> Result<String, SpeechError>;
    async fn to_speech(&self, text: &str) -> Result<Vec<u8>, SpeechError>;
}

pub struct DisabledSpeech;

#[async_trait]
impl SpeechService for DisabledSpeech {
    async fn to_text(&self, _audio: &[u8]) -> Result<String, SpeechError> {
        Err(SpeechError::Unavailable)
    }

    async fn to_speech(&self, _text: &str) -> Result<Vec<u8>, SpeechError> {
        Err(SpeechError::Unavailable)
    }
}
