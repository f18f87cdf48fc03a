//! Conversational reply generation with rule-based fallback
//!
//! The generator is remote-capable only while a generation service is
//! configured and the circuit breaker has not tripped. The first remote
//! error trips the breaker for the remainder of the process lifetime and
//! every later call takes the deterministic fallback path.

use chrono::Local;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::conversation::{Message, Role};
use crate::core::memory::UserStore;
use crate::providers::GenerationService;

/// Minimum spacing between remote generation calls.
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(2);

/// How many trailing history entries feed the prompt context.
const CONTEXT_MESSAGES: usize = 6;

const USER_LOOKUP_APOLOGY: &str = "I'm sorry, I couldn't find your user information.";

/// Process-wide pacing for remote generation calls. The lock is held across
/// the wait, so concurrent callers serialize: this is a global throttle,
/// not a per-user one. All remote generations pace against one shared
/// last-call timestamp.
pub struct GenerationThrottle {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl GenerationThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Wait until at least `min_interval` has passed since the previous
    /// acquisition, then record this call.
    pub async fn acquire(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

impl Default for GenerationThrottle {
    fn default() -> Self {
        Self::new(MIN_REQUEST_INTERVAL)
    }
}

/// One-way circuit breaker for the remote generation capability. Once
/// tripped it stays tripped until process restart; `reset` exists for tests.
#[derive(Default)]
pub struct RemoteBreaker {
    tripped: AtomicBool,
}

impl RemoteBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Relaxed)
    }

    pub fn trip(&self) {
        self.tripped.store(true, Ordering::Relaxed);
    }

    #[doc(hidden)]
    pub fn reset(&self) {
        self.tripped.store(false, Ordering::Relaxed);
    }
}

/// Picks one of N template variants. Production uses `RandomPicker`;
/// tests substitute a fixed strategy and assert set membership.
pub trait VariantPicker: Send + Sync {
    fn pick(&self, len: usize) -> usize;
}

pub struct RandomPicker;

impl VariantPicker for RandomPicker {
    fn pick(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }
}

/// Always picks the given index (clamped); for deterministic tests.
pub struct FixedPicker(pub usize);

impl VariantPicker for FixedPicker {
    fn pick(&self, len: usize) -> usize {
        self.0.min(len.saturating_sub(1))
    }
}

pub struct ResponseGenerator {
    users: Arc<dyn UserStore>,
    remote: Option<Arc<dyn GenerationService>>,
    throttle: Arc<GenerationThrottle>,
    breaker: Arc<RemoteBreaker>,
    picker: Arc<dyn VariantPicker>,
}

impl ResponseGenerator {
    pub fn new(
        users: Arc<dyn UserStore>,
        remote: Option<Arc<dyn GenerationService>>,
        throttle: Arc<GenerationThrottle>,
        breaker: Arc<RemoteBreaker>,
        picker: Arc<dyn VariantPicker>,
    ) -> Self {
        Self {
            users,
            remote,
            throttle,
            breaker,
            picker,
        }
    }

    /// Generate a reply for the message. Always returns a non-empty string:
    /// remote errors fall back to rule-based text, and store or lookup
    /// failures produce a deterministic apology instead of propagating.
    pub async fn generate(&self, user_id: Uuid, message: &str, history: &[Message]) -> String {
        let user = match self.users.get_by_id(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return USER_LOOKUP_APOLOGY.to_string(),
            Err(e) => {
                tracing::error!(%user_id, error = %e, "user lookup failed during generation");
                return USER_LOOKUP_APOLOGY.to_string();
            }
        };

        let preferred_name = user.preferred_name;
        let assistant_name = user.assistant_name;

        if let Some(remote) = self.remote.as_ref().filter(|_| !self.breaker.is_tripped()) {
            self.throttle.acquire().await;

            let prompt = build_prompt(&preferred_name, &assistant_name, message, history);
            match remote.generate(&prompt).await {
                Ok(text) => return clean_response(&text, &assistant_name),
                Err(e) => {
                    tracing::warn!(error = %e, "remote generation failed, switching to fallback");
                    self.breaker.trip();
                }
            }
        }

        fallback_reply(&preferred_name, &assistant_name, message, self.picker.as_ref())
    }
}

/// Assemble the persona + recent-history context block and the prompt cue.
fn build_prompt(
    preferred_name: &str,
    assistant_name: &str,
    message: &str,
    history: &[Message],
) -> String {
    let mut context = format!(
        "You are {assistant_name}, a helpful AI assistant.\n\
         The user's name is {preferred_name}. Always address them by name when appropriate.\n\
         Be friendly, helpful, and engaging.\n\n\
         Previous conversation context:"
    );

    if history.is_empty() {
        context.push_str("\nNo previous conversation.");
    } else {
        let start = history.len().saturating_sub(CONTEXT_MESSAGES);
        for msg in &history[start..] {
            let role = match msg.role {
                Role::User => "User",
                Role::Assistant => assistant_name,
            };
            context.push_str(&format!("\n{}: {}", role, msg.content));
        }
    }

    context.push_str(&format!(
        "\n\nInstructions: Respond naturally as {assistant_name}. \
         Keep responses clear and helpful."
    ));

    format!("{context}\n\nUser: {message}\n{assistant_name}:")
}

/// Strip a leading `Name:` echo and bold markup from the model's reply.
fn clean_response(response: &str, assistant_name: &str) -> String {
    let prefix = format!("{assistant_name}:");
    let trimmed = response.trim();
    let without_prefix = trimmed.strip_prefix(&prefix).unwrap_or(trimmed);
    without_prefix.replace("**", "").trim().to_string()
}

fn choose(picker: &dyn VariantPicker, mut variants: Vec<String>) -> String {
    let index = picker.pick(variants.len());
    variants.swap_remove(index)
}

/// Deterministic category selection with randomized choice within each
/// category's template variants.
fn fallback_reply(
    preferred_name: &str,
    assistant_name: &str,
    message: &str,
    picker: &dyn VariantPicker,
) -> String {
    let lower = message.to_lowercase();

    if ["hello", "hi", "hey", "hola"].iter().any(|w| lower.contains(w)) {
        return choose(
            picker,
            vec![
                format!("Hello {preferred_name}! Great to see you today!"),
                format!("Hi {preferred_name}! How can I assist you?"),
                format!("Hey {preferred_name}! What can I help you with?"),
            ],
        );
    }

    if message.contains('?') {
        if lower.contains("how are you") {
            return format!(
                "I'm doing well, thank you for asking {preferred_name}! How are you today?"
            );
        }
        if lower.contains("your name") {
            return format!("My name is {assistant_name}, your personal AI assistant!");
        }
        if lower.contains("time") {
            let current_time = Local::now().format("%I:%M %p");
            return format!("The current time is {current_time}, {preferred_name}.");
        }
        return choose(
            picker,
            vec![
                format!(
                    "That's an interesting question, {preferred_name}. While I'm currently \
                     operating in basic mode, I'd be happy to help you think through this."
                ),
                format!(
                    "I appreciate your question, {preferred_name}. Let me suggest researching \
                     this topic online for the most current information."
                ),
                format!(
                    "Great question, {preferred_name}! This would be a perfect topic to \
                     explore further when full AI capabilities are available."
                ),
            ],
        );
    }

    if ["weather", "temperature", "forecast"].iter().any(|w| lower.contains(w)) {
        return format!(
            "I'd love to check the weather for you {preferred_name}, but I'm currently in \
             basic mode. You might want to check a weather app or website for the most \
             accurate forecast!"
        );
    }

    if ["what is", "who is", "tell me about"].iter().any(|w| lower.contains(w)) {
        return format!(
            "That sounds like something worth researching, {preferred_name}! While I'm in \
             basic mode, I'd recommend searching online for the most up-to-date information \
             about that topic."
        );
    }

    choose(
        picker,
        vec![
            format!("Thanks for sharing that, {preferred_name}! I'm here to chat with you."),
            format!("I understand, {preferred_name}. What else would you like to talk about?"),
            format!(
                "Interesting point, {preferred_name}! I'm currently operating in basic mode \
                 but still happy to converse with you."
            ),
            format!(
                "Got it, {preferred_name}! Is there anything specific you'd like help with today?"
            ),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory::{NewUser, SqliteStore};
    use crate::providers::GenerationError;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Remote fake: fails the first `failures` calls, then succeeds.
    struct FlakyRemote {
        failures: usize,
        calls: AtomicUsize,
    }

    impl FlakyRemote {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GenerationService for FlakyRemote {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(GenerationError::InvalidResponse("503".into()))
            } else {
                Ok("Nova: **remote reply**".into())
            }
        }
    }

    async fn store_with_user() -> (Arc<SqliteStore>, Uuid) {
        let store = Arc::new(SqliteStore::new_in_memory_async().await.unwrap());
        let id = store
            .create(NewUser {
                username: "sam".into(),
                email: "sam@example.com".into(),
                password_hash: "hash".into(),
                preferred_name: "Sam".into(),
                assistant_name: "Nova".into(),
            })
            .await
            .unwrap();
        (store, id)
    }

    fn generator(
        users: Arc<SqliteStore>,
        remote: Option<Arc<dyn GenerationService>>,
    ) -> ResponseGenerator {
        ResponseGenerator::new(
            users,
            remote,
            Arc::new(GenerationThrottle::new(Duration::from_millis(10))),
            Arc::new(RemoteBreaker::new()),
            Arc::new(FixedPicker(0)),
        )
    }

    #[tokio::test]
    async fn test_fallback_only_without_remote() {
        let (store, id) = store_with_user().await;
        let gen = generator(store, None);

        for message in ["hello there", "how are you?", "what is rust", "random chat"] {
            let reply = gen.generate(id, message, &[]).await;
            assert!(!reply.is_empty());
        }
    }

    #[tokio::test]
    async fn test_fallback_personalizes_by_category() {
        let (store, id) = store_with_user().await;
        let gen = generator(store, None);

        let reply = gen.generate(id, "hello", &[]).await;
        assert_eq!(reply, "Hello Sam! Great to see you today!");

        let reply = gen.generate(id, "what's your name?", &[]).await;
        assert!(reply.contains("Nova"));

        let reply = gen.generate(id, "forecast tomorrow", &[]).await;
        assert!(reply.contains("weather"));
    }

    #[tokio::test]
    async fn test_unknown_user_apology() {
        let (store, _) = store_with_user().await;
        let gen = generator(store, None);

        let reply = gen.generate(Uuid::new_v4(), "hello", &[]).await;
        assert_eq!(reply, USER_LOOKUP_APOLOGY);
    }

    #[tokio::test]
    async fn test_remote_reply_is_cleaned() {
        let (store, id) = store_with_user().await;
        let remote = Arc::new(FlakyRemote::new(0));
        let gen = generator(store, Some(remote as Arc<dyn GenerationService>));

        let reply = gen.generate(id, "tell me something", &[]).await;
        assert_eq!(reply, "remote reply");
    }

    #[tokio::test]
    async fn test_breaker_trips_once_and_stays_tripped() {
        let (store, id) = store_with_user().await;
        let remote = Arc::new(FlakyRemote::new(1));
        let gen = generator(
            store.clone(),
            Some(remote.clone() as Arc<dyn GenerationService>),
        );

        // first call errors remotely and falls back
        let first = gen.generate(id, "hello", &[]).await;
        assert_eq!(first, "Hello Sam! Great to see you today!");
        assert_eq!(remote.call_count(), 1);

        // remote would now succeed, but the breaker keeps it out of reach
        let second = gen.generate(id, "hello", &[]).await;
        assert_eq!(second, "Hello Sam! Great to see you today!");
        assert_eq!(remote.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_spaces_consecutive_calls() {
        let throttle = GenerationThrottle::new(Duration::from_secs(2));

        throttle.acquire().await;
        let before_second = Instant::now();
        throttle.acquire().await;

        assert!(before_second.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_no_wait_after_interval() {
        let throttle = GenerationThrottle::new(Duration::from_secs(2));

        throttle.acquire().await;
        tokio::time::advance(Duration::from_secs(3)).await;

        let before = Instant::now();
        throttle.acquire().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_build_prompt_limits_history() {
        let history: Vec<Message> = (0..10)
            .map(|i| Message::user(format!("msg{i}")))
            .collect();
        let prompt = build_prompt("Sam", "Nova", "new question", &history);

        assert!(!prompt.contains("msg3"));
        assert!(prompt.contains("msg4"));
        assert!(prompt.contains("msg9"));
        assert!(prompt.ends_with("Nova:"));
    }

    #[test]
    fn test_clean_response() {
        assert_eq!(clean_response("Nova: **hi** there", "Nova"), "hi there");
        assert_eq!(clean_response("plain reply", "Nova"), "plain reply");
    }
}
