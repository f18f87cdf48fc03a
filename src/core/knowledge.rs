//! Knowledge-query detection and search-context augmentation

use std::sync::Arc;

use crate::search::{SearchResult, SearchService, TOP_RESULTS};

/// Phrases that mark a message as a knowledge query.
const KNOWLEDGE_KEYWORDS: &[&str] = &[
    "what is",
    "explain",
    "how does",
    "tell me about",
    "define",
    "meaning of",
    "who is",
    "when was",
    "why is",
];

/// Formatted search context handed to generation, plus the raw results the
/// orchestrator needs for its Sources list.
#[derive(Debug, Clone)]
pub struct SearchContext {
    pub formatted: String,
    pub results: Vec<SearchResult>,
}

pub struct KnowledgeAugmenter {
    search: Arc<dyn SearchService>,
}

/// Heuristic: is the message asking for factual information?
pub fn is_knowledge_query(message: &str) -> bool {
    let lower = message.to_lowercase();
    KNOWLEDGE_KEYWORDS.iter().any(|k| lower.contains(k))
}

impl KnowledgeAugmenter {
    pub fn new(search: Arc<dyn SearchService>) -> Self {
        Self { search }
    }

    /// Fetch and format web-search context for a knowledge query. Empty
    /// results and search failures both yield `None`; the caller proceeds
    /// without augmentation.
    pub async fn augment(&self, message: &str) -> Option<SearchContext> {
        if !is_knowledge_query(message) {
            return None;
        }

        let results = match self.search.search(message).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(error = %e, "web search failed, skipping augmentation");
                return None;
            }
        };

        if results.is_empty() {
            return None;
        }

        let mut formatted = String::from("Search Results:\n");
        for (i, result) in results.iter().take(TOP_RESULTS).enumerate() {
            formatted.push_str(&format!(
                "{}. {}\n   URL: {}\n   Summary: {}\n\n",
                i + 1,
                result.title,
                result.link,
                result.snippet
            ));
        }

        Some(SearchContext { formatted, results })
    }
}
