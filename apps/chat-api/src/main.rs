use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat_api::config::Config;
use chat_api::db::kv::{KeyValueStore, MemoryStore};
use chat_api::gateway::membership::MembershipIndex;
use chat_api::gateway::registry::ConnectionRegistry;
use chat_api::gateway::typing::{TypingTracker, TYPING_TTL};
use chat_api::store::{seed, ChatStore, MemoryChatStore};
use chat_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing — env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let host = config.host.clone();
    let port = config.port;

    // In-memory stores, seeded with the demo dataset.
    let store: Arc<dyn ChatStore> = Arc::new(MemoryChatStore::new());
    seed::seed(store.as_ref()).await;
    let kv = Arc::new(MemoryStore::new());

    let state = AppState {
        config: Arc::new(config.clone()),
        store,
        kv: kv.clone() as Arc<dyn KeyValueStore>,
        registry: Arc::new(ConnectionRegistry::new()),
        membership: Arc::new(MembershipIndex::new()),
        typing: Arc::new(TypingTracker::new()),
    };

    // Expire stale typing indicators on the same cadence as their TTL.
    let typing = state.typing.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TYPING_TTL);
        loop {
            interval.tick().await;
            let removed = typing.sweep(TYPING_TTL);
            if removed > 0 {
                tracing::debug!(removed, "swept stale typing indicators");
            }
        }
    });

    // Reclaim expired KV entries (sessions, CSRF tokens).
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let removed = kv.sweep_expired();
            if removed > 0 {
                tracing::debug!(removed, "swept expired kv entries");
            }
        }
    });

    let cors = if config.cors_origin == "*" {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        match config.cors_origin.parse::<HeaderValue>() {
            Ok(origin) => CorsLayer::new()
                .allow_origin(origin)
                .allow_methods(Any)
                .allow_headers(Any),
            Err(_) => {
                tracing::warn!(origin = %config.cors_origin, "invalid CORS origin, allowing any");
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any)
            }
        }
    };

    let app = Router::new()
        .merge(chat_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));
    tracing::info!(%addr, "chat-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app).await.expect("server error");
}
