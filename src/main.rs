//! Attache - personal AI assistant API

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use attache::config::Config;
use attache::core::generate::{RandomPicker, MIN_REQUEST_INTERVAL};
use attache::core::{
    ChatOrchestrator, GenerationThrottle, KnowledgeAugmenter, RemoteBreaker, ResponseGenerator,
    SqliteStore,
};
use attache::providers::{GeminiClient, GenerationService};
use attache::routes;
use attache::search::{DisabledSearch, SearchService, SerpApiClient};
use attache::speech::DisabledSpeech;
use attache::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "attache=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let data_dir = std::env::var("ATTACHE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./data"));

    let store = Arc::new(SqliteStore::new(&data_dir.join("attache.db")).await?);

    let remote: Option<Arc<dyn GenerationService>> = match config.gemini_api_key.clone() {
        Some(key) => {
            tracing::info!("✅ Gemini API configured");
            Some(Arc::new(GeminiClient::new(key)))
        }
        None => {
            tracing::warn!("❌ No Gemini API key found, using fallback responses only");
            None
        }
    };

    let search: Arc<dyn SearchService> = match config.serpapi_key.clone() {
        Some(key) => {
            tracing::info!("✅ SerpAPI search configured");
            Arc::new(SerpApiClient::new(key))
        }
        None => {
            tracing::warn!("❌ No SerpAPI key found, knowledge queries run unaugmented");
            Arc::new(DisabledSearch)
        }
    };

    let generator = ResponseGenerator::new(
        store.clone(),
        remote,
        Arc::new(GenerationThrottle::new(MIN_REQUEST_INTERVAL)),
        Arc::new(RemoteBreaker::new()),
        Arc::new(RandomPicker),
    );
    let augmenter = KnowledgeAugmenter::new(search);
    let orchestrator = Arc::new(ChatOrchestrator::new(
        store.clone(),
        store.clone(),
        generator,
        augmenter,
    ));

    let state = AppState {
        config,
        users: store.clone(),
        history: store,
        orchestrator,
        speech: Arc::new(DisabledSpeech),
    };

    let app = Router::new()
        .merge(routes::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("🤖 Attache API running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
