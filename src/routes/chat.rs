//! Chat message, history, and clear handlers

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::conversation::Message;
use crate::core::ChatReply;
use crate::routes::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ChatRequest {
    pub message: String,
}

pub async fn chat(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    let reply = state
        .orchestrator
        .handle_message(user_id, &req.message)
        .await?;
    Ok(Json(reply))
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<Message>,
    pub assistant_name: String,
    pub user_name: String,
}

pub async fn history(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let user = state
        .users
        .get_by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    let history = state.history.get_recent(user_id, 20).await?;

    Ok(Json(HistoryResponse {
        history,
        assistant_name: user.assistant_name,
        user_name: user.preferred_name,
    }))
}

pub async fn clear(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.history.clear(user_id).await?;
    Ok(Json(
        serde_json::json!({ "message": "Chat history cleared successfully" }),
    ))
}
