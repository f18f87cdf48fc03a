//! Speech conversion handlers
//!
//! Speech-to-text mirrors the assistant's conversational tone on failure:
//! a recognition error is returned as the recognized text rather than as an
//! HTTP error, so the client can surface it directly in the chat view.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthUser;
use crate::routes::ApiError;
use crate::state::AppState;

const RECOGNITION_APOLOGY: &str = "Sorry, I could not understand the audio";

pub async fn speech_to_text(
    AuthUser(_user_id): AuthUser,
    State(state): State<AppState>,
    audio: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    if audio.is_empty() {
        return Err(ApiError::BadRequest("No audio provided".into()));
    }

    let text = match state.speech.to_text(&audio).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(error = %e, "speech recognition failed");
            RECOGNITION_APOLOGY.to_string()
        }
    };

    Ok(Json(json!({ "text": text })))
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct TextToSpeechRequest {
    pub text: String,
}

pub async fn text_to_speech(
    AuthUser(_user_id): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<TextToSpeechRequest>,
) -> Result<Response, ApiError> {
    if req.text.trim().is_empty() {
        return Err(ApiError::BadRequest("No text provided".into()));
    }

    let audio = state.speech.to_speech(&req.text).await.map_err(|e| {
        tracing::warn!(error = %e, "text to speech failed");
        ApiError::Internal("Text to speech conversion failed".into())
    })?;

    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], audio).into_response())
}
