//! Authentication: password hashing, JWT issuance, and the request
//! identity extractor.
//!
//! Credential hashing and token signing are delegated to `bcrypt` and
//! `jsonwebtoken`; this module only wires them to the user store and the
//! HTTP layer.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::routes::ApiError;
use crate::state::AppState;

/// Access tokens are valid for 24 hours.
const TOKEN_LIFETIME_HOURS: i64 = 24;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email pattern")
});

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    Ok(bcrypt::hash(password, bcrypt::DEFAULT_COST)?)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

pub fn validate_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

/// Issue an HS256 bearer token with `sub` set to the user id.
pub fn issue_token(user_id: Uuid, secret: &str) -> Result<String, AuthError> {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (Utc::now() + Duration::hours(TOKEN_LIFETIME_HOURS)).timestamp(),
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

/// Validate a token and return the user id it was issued for.
pub fn decode_token(token: &str, secret: &str) -> Option<Uuid> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?;
    Uuid::parse_str(&data.claims.sub).ok()
}

fn parse_bearer_token(parts: &Parts) -> Option<&str> {
    let raw = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = raw.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Authenticated request identity, extracted from the
/// `Authorization: Bearer <jwt>` header.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parse_bearer_token(parts)
            .ok_or_else(|| ApiError::Unauthorized("Missing authorization token".into()))?;

        decode_token(token, &state.config.jwt_secret)
            .map(AuthUser)
            .ok_or_else(|| ApiError::Unauthorized("Invalid or expired token".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_roundtrip() {
        let hash = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn test_verify_with_garbage_hash() {
        assert!(!verify_password("hunter2", "not-a-bcrypt-hash"));
    }

    #[test]
    fn test_email_validation() {
        assert!(validate_email("sam@example.com"));
        assert!(validate_email("a.b+c@sub.domain.org"));
        assert!(!validate_email("sam"));
        assert!(!validate_email("sam@"));
        assert!(!validate_email("sam@host"));
    }

    #[test]
    fn test_token_roundtrip() {
        let id = Uuid::new_v4();
        let token = issue_token(id, "secret").unwrap();
        assert_eq!(decode_token(&token, "secret"), Some(id));
    }

    #[test]
    fn test_token_wrong_secret_rejected() {
        let token = issue_token(Uuid::new_v4(), "secret").unwrap();
        assert_eq!(decode_token(&token, "other"), None);
    }
}
