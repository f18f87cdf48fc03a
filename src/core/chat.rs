//! Chat orchestration
//!
//! Top-level message flow: validate, resolve the user, try the rule-based
//! action path first, otherwise optionally augment with web-search context
//! and generate a reply. The (user, assistant) exchange is persisted exactly
//! once per handled message, after the reply is determined, on both paths.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::conversation::Message;
use crate::core::actions::{self, ActionResult};
use crate::core::generate::ResponseGenerator;
use crate::core::knowledge::KnowledgeAugmenter;
use crate::core::memory::{HistoryStore, StoreError, UserStore};
use crate::search::SearchResult;

/// How many stored messages are loaded as generation context.
const HISTORY_LIMIT: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Message cannot be empty")]
    EmptyMessage,

    #[error("User not found")]
    UserNotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    #[serde(rename = "response")]
    pub reply: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionResult>,

    pub assistant_name: String,
}

pub struct ChatOrchestrator {
    users: Arc<dyn UserStore>,
    history: Arc<dyn HistoryStore>,
    generator: ResponseGenerator,
    augmenter: KnowledgeAugmenter,
}

impl ChatOrchestrator {
    pub fn new(
        users: Arc<dyn UserStore>,
        history: Arc<dyn HistoryStore>,
        generator: ResponseGenerator,
        augmenter: KnowledgeAugmenter,
    ) -> Self {
        Self {
            users,
            history,
            generator,
            augmenter,
        }
    }

    pub async fn handle_message(
        &self,
        user_id: Uuid,
        raw_message: &str,
    ) -> Result<ChatReply, ChatError> {
        let message = raw_message.trim();
        if message.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let user = self
            .users
            .get_by_id(user_id)
            .await?
            .ok_or(ChatError::UserNotFound)?;

        let history = self.history.get_recent(user_id, HISTORY_LIMIT).await?;

        // Action path: a keyword match skips generation and search entirely.
        if let Some(category) = actions::detect(message) {
            let action = actions::execute(category, message, &user.preferred_name);
            self.persist_exchange(user_id, message, &action.response)
                .await?;

            return Ok(ChatReply {
                reply: action.response.clone(),
                action: Some(action),
                assistant_name: user.assistant_name,
            });
        }

        let reply = match self.augmenter.augment(message).await {
            Some(context) => {
                let enhanced =
                    format!("{message}\n\nContext from web search:\n{}", context.formatted);
                let generated = self.generator.generate(user_id, &enhanced, &history).await;
                append_sources(generated, &context.results)
            }
            None => self.generator.generate(user_id, message, &history).await,
        };

        self.persist_exchange(user_id, message, &reply).await?;

        Ok(ChatReply {
            reply,
            action: None,
            assistant_name: user.assistant_name,
        })
    }

    async fn persist_exchange(
        &self,
        user_id: Uuid,
        user_message: &str,
        reply: &str,
    ) -> Result<(), StoreError> {
        self.history
            .append_and_save(user_id, &[Message::user(user_message), Message::assistant(reply)])
            .await
    }
}

fn append_sources(mut reply: String, results: &[SearchResult]) -> String {
    reply.push_str("\n\n**Sources:**\n");
    let lines: Vec<String> = results
        .iter()
        .take(3)
        .map(|r| format!("- [{}]({})", r.title, r.link))
        .collect();
    reply.push_str(&lines.join("\n"));
    reply
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::generate::{FixedPicker, GenerationThrottle, RemoteBreaker};
    use crate::core::memory::{NewUser, SqliteStore};
    use crate::providers::{GenerationError, GenerationService};
    use crate::search::{SearchError, SearchService};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingRemote {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GenerationService for CountingRemote {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("generated reply".into())
        }
    }

    #[derive(Default)]
    struct CountingSearch {
        calls: AtomicUsize,
        results: Vec<SearchResult>,
    }

    #[async_trait]
    impl SearchService for CountingSearch {
        async fn search(&self, _query: &str) -> Result<Vec<SearchResult>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.results.clone())
        }
    }

    struct Fixture {
        store: Arc<SqliteStore>,
        remote: Arc<CountingRemote>,
        search: Arc<CountingSearch>,
        orchestrator: ChatOrchestrator,
        user_id: Uuid,
    }

    async fn fixture_with_results(results: Vec<SearchResult>) -> Fixture {
        let store = Arc::new(SqliteStore::new_in_memory_async().await.unwrap());
        let user_id = store
            .create(NewUser {
                username: "sam".into(),
                email: "sam@example.com".into(),
                password_hash: "hash".into(),
                preferred_name: "Sam".into(),
                assistant_name: "Nova".into(),
            })
            .await
            .unwrap();

        let remote = Arc::new(CountingRemote::default());
        let search = Arc::new(CountingSearch {
            calls: AtomicUsize::new(0),
            results,
        });

        let generator = ResponseGenerator::new(
            store.clone(),
            Some(remote.clone() as Arc<dyn GenerationService>),
            Arc::new(GenerationThrottle::new(Duration::from_millis(1))),
            Arc::new(RemoteBreaker::new()),
            Arc::new(FixedPicker(0)),
        );
        let augmenter = KnowledgeAugmenter::new(search.clone() as Arc<dyn SearchService>);

        let orchestrator =
            ChatOrchestrator::new(store.clone(), store.clone(), generator, augmenter);

        Fixture {
            store,
            remote,
            search,
            orchestrator,
            user_id,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with_results(Vec::new()).await
    }

    #[tokio::test]
    async fn test_empty_message_rejected_without_persistence() {
        let fx = fixture().await;

        let err = fx
            .orchestrator
            .handle_message(fx.user_id, "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::EmptyMessage));

        let history = fx.store.get_recent(fx.user_id, 20).await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_user_rejected() {
        let fx = fixture().await;
        let err = fx
            .orchestrator
            .handle_message(Uuid::new_v4(), "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::UserNotFound));
    }

    #[tokio::test]
    async fn test_action_short_circuits_generation_and_search() {
        let fx = fixture().await;

        let reply = fx
            .orchestrator
            .handle_message(fx.user_id, "What time is it?")
            .await
            .unwrap();

        assert!(reply.reply.contains("Sam"));
        assert!(reply.action.is_some());
        assert_eq!(reply.assistant_name, "Nova");
        assert_eq!(fx.remote.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fx.search.calls.load(Ordering::SeqCst), 0);

        let history = fx.store.get_recent(fx.user_id, 20).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "What time is it?");
    }

    #[tokio::test]
    async fn test_knowledge_query_without_results_has_no_sources() {
        let fx = fixture().await;

        let reply = fx
            .orchestrator
            .handle_message(fx.user_id, "what is entropy")
            .await
            .unwrap();

        assert_eq!(fx.search.calls.load(Ordering::SeqCst), 1);
        assert_eq!(reply.reply, "generated reply");
        assert!(!reply.reply.contains("Sources"));
    }

    #[tokio::test]
    async fn test_knowledge_query_with_results_appends_sources() {
        let fx = fixture_with_results(vec![SearchResult {
            title: "Entropy".into(),
            link: "https://example.com/entropy".into(),
            snippet: "A measure of disorder.".into(),
        }])
        .await;

        let reply = fx
            .orchestrator
            .handle_message(fx.user_id, "what is entropy")
            .await
            .unwrap();

        assert!(reply.reply.starts_with("generated reply"));
        assert!(reply.reply.contains("**Sources:**"));
        assert!(reply.reply.contains("[Entropy](https://example.com/entropy)"));

        // raw message is persisted, not the augmented one
        let history = fx.store.get_recent(fx.user_id, 20).await.unwrap();
        assert_eq!(history[0].content, "what is entropy");
    }

    #[tokio::test]
    async fn test_plain_message_persists_exactly_one_pair() {
        let fx = fixture().await;

        fx.orchestrator
            .handle_message(fx.user_id, "just chatting")
            .await
            .unwrap();

        let history = fx.store.get_recent(fx.user_id, 20).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "generated reply");
        assert_eq!(fx.search.calls.load(Ordering::SeqCst), 0);
    }
}
