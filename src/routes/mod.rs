//! API routes and error responses

pub mod auth;
pub mod chat;
pub mod speech;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;

use crate::core::memory::StoreError;
use crate::core::ChatError;
use crate::state::AppState;

/// API error that renders as `{"error": "..."}` with the matching status.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "store error");
        ApiError::Internal("Internal server error".into())
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::EmptyMessage => ApiError::BadRequest(err.to_string()),
            ChatError::UserNotFound => ApiError::NotFound(err.to_string()),
            ChatError::Store(e) => e.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    message: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        message: "AI Assistant API is running",
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/login", post(auth::login))
        .route(
            "/api/auth/profile",
            get(auth::get_profile).put(auth::update_profile),
        )
        .route("/api/chat", post(chat::chat))
        .route("/api/chat/history", get(chat::history))
        .route("/api/chat/clear", post(chat::clear))
        .route("/api/chat/speech-to-text", post(speech::speech_to_text))
        .route("/api/chat/text-to-speech", post(speech::text_to_speech))
}
