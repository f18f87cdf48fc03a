//! Application state shared across handlers

use std::sync::Arc;

use crate::config::Config;
use crate::core::{ChatOrchestrator, HistoryStore, UserStore};
use crate::speech::SpeechService;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub users: Arc<dyn UserStore>,
    pub history: Arc<dyn HistoryStore>,
    pub orchestrator: Arc<ChatOrchestrator>,
    pub speech: Arc<dyn SpeechService>,
}
