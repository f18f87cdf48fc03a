//! Signup, login, and profile handlers

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::{self, AuthUser};
use crate::core::memory::{NewUser, PreferencesUpdate, Theme};
use crate::routes::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub preferred_name: String,
    pub assistant_name: String,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub message: &'static str,
    pub access_token: String,
    pub user_id: String,
    pub preferred_name: String,
    pub assistant_name: String,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, Json<SignupResponse>), ApiError> {
    for (field, value) in [
        ("username", &req.username),
        ("email", &req.email),
        ("password", &req.password),
        ("preferred_name", &req.preferred_name),
        ("assistant_name", &req.assistant_name),
    ] {
        if value.trim().is_empty() {
            return Err(ApiError::BadRequest(format!(
                "Missing required field: {field}"
            )));
        }
    }

    if !auth::validate_email(&req.email) {
        return Err(ApiError::BadRequest("Invalid email format".into()));
    }

    if state.users.get_by_username(&req.username).await?.is_some() {
        return Err(ApiError::Conflict("Username already exists".into()));
    }
    if state.users.get_by_email(&req.email).await?.is_some() {
        return Err(ApiError::Conflict("Email already exists".into()));
    }

    let password_hash = auth::hash_password(&req.password)
        .map_err(|e| ApiError::Internal(format!("Registration failed: {e}")))?;

    let user_id = state
        .users
        .create(NewUser {
            username: req.username,
            email: req.email,
            password_hash,
            preferred_name: req.preferred_name.clone(),
            assistant_name: req.assistant_name.clone(),
        })
        .await?;

    let access_token = auth::issue_token(user_id, &state.config.jwt_secret)
        .map_err(|e| ApiError::Internal(format!("Registration failed: {e}")))?;

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            message: "User created successfully",
            access_token,
            user_id: user_id.to_string(),
            preferred_name: req.preferred_name,
            assistant_name: req.assistant_name,
        }),
    ))
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: &'static str,
    pub access_token: String,
    pub user_id: String,
    pub preferred_name: String,
    pub assistant_name: String,
    pub theme_preference: Theme,
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let identifier = req
        .username
        .or(req.email)
        .filter(|s| !s.trim().is_empty());
    let (Some(identifier), Some(password)) = (identifier, req.password) else {
        return Err(ApiError::BadRequest(
            "Username or email and password required".into(),
        ));
    };

    // An email-shaped identifier is looked up by email, anything else by
    // username.
    let user = if auth::validate_email(&identifier) {
        state.users.get_by_email(&identifier).await?
    } else {
        state.users.get_by_username(&identifier).await?
    };

    let user = user
        .filter(|u| auth::verify_password(&password, &u.password_hash))
        .ok_or_else(|| ApiError::Unauthorized("Invalid credentials".into()))?;

    let access_token = auth::issue_token(user.id, &state.config.jwt_secret)
        .map_err(|e| ApiError::Internal(format!("Login failed: {e}")))?;

    Ok(Json(LoginResponse {
        message: "Login successful",
        access_token,
        user_id: user.id.to_string(),
        preferred_name: user.preferred_name,
        assistant_name: user.assistant_name,
        theme_preference: user.theme_preference,
    }))
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub username: String,
    pub email: String,
    pub preferred_name: String,
    pub assistant_name: String,
    pub theme_preference: Theme,
    pub voice_enabled: bool,
}

pub async fn get_profile(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user = state
        .users
        .get_by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    Ok(Json(ProfileResponse {
        username: user.username,
        email: user.email,
        preferred_name: user.preferred_name,
        assistant_name: user.assistant_name,
        theme_preference: user.theme_preference,
        voice_enabled: user.voice_enabled,
    }))
}

pub async fn update_profile(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Json(update): Json<PreferencesUpdate>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.users.update_preferences(user_id, update).await?;
    Ok(Json(
        serde_json::json!({ "message": "Profile updated successfully" }),
    ))
}
