//! Application configuration

use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub gemini_api_key: Option<String>,
    pub serpapi_key: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5000),
            jwt_secret: env::var("JWT_SECRET_KEY")
                .unwrap_or_else(|_| "dev-secret-change-me".into()),
            gemini_api_key: configured_key("GEMINI_API_KEY", "your-gemini-api-key-here"),
            serpapi_key: configured_key("SERPAPI_KEY", "your-serpapi-key-here"),
        })
    }
}

/// Read an API key from the environment, treating the `.env` template
/// placeholder value as unset.
fn configured_key(var: &str, placeholder: &str) -> Option<String> {
    match env::var(var) {
        Ok(value) if !value.is_empty() && value != placeholder => Some(value),
        _ => None,
    }
}
