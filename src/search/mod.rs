//! Web search service integration (SerpAPI)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const SEARCH_URL: &str = "https://serpapi.com/search";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How many organic results are kept per query.
pub const TOP_RESULTS: usize = 3;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

#[async_trait]
pub trait SearchService: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError>;
}

/// No-op search used when no API key is configured; knowledge queries then
/// proceed without augmentation.
pub struct DisabledSearch;

#[async_trait]
impl SearchService for DisabledSearch {
    async fn search(&self, _query: &str) -> Result<Vec<SearchResult>, SearchError> {
        Ok(Vec::new())
    }
}

pub struct SerpApiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SerpResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

impl SerpApiClient {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(%e, "reqwest client build failed; using default client");
                Client::new()
            });
        Self {
            client,
            api_key,
            base_url: SEARCH_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SearchService for SerpApiClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", query),
                ("api_key", self.api_key.as_str()),
                ("engine", "google"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::InvalidResponse(format!("{}: {}", status, body)));
        }

        let parsed: SerpResponse = response.json().await?;

        Ok(parsed
            .organic_results
            .into_iter()
            .take(TOP_RESULTS)
            .map(|r| SearchResult {
                title: r.title,
                link: r.link,
                snippet: r.snippet,
            })
            .collect())
    }
}
