//! Core chat pipeline: actions, knowledge augmentation, generation,
//! orchestration, and storage.

pub mod actions;
pub mod chat;
pub mod generate;
pub mod knowledge;
pub mod memory;

pub use chat::{ChatError, ChatOrchestrator, ChatReply};
pub use generate::{GenerationThrottle, RemoteBreaker, ResponseGenerator};
pub use knowledge::KnowledgeAugmenter;
pub use memory::{HistoryStore, SqliteStore, UserStore};
