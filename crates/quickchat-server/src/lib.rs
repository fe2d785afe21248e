//! QuickChat Server Library
//!
//! Presence registry, message relay, typing hints and seen sync over a
//! WebSocket live channel, plus a reference JSON message store.

pub mod config;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod presence;
pub mod relay;
pub mod seen;
pub mod store;
pub mod typing;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use config::{AppState, ServerConfig};
use handlers::{get_history, list_conversations, live_socket, mark_seen, send_message};
use store::JsonMessageStore;

pub use error::{Error, Result};
pub use hub::LiveHub;

pub async fn run() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        // Already set, ignore
    }

    info!("=== QuickChat Server ===");

    let config = ServerConfig::default();
    config.ensure_dirs().await?;
    info!("Data directory: {:?}", config.data_dir);

    let store = Arc::new(JsonMessageStore::new(&config).await?);
    let state = AppState::new(config.clone(), store);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("QuickChat server listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the HTTP + live channel router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(status))
        .route("/api/messages/conversations", get(list_conversations))
        .route("/api/messages/send/{peer_id}", post(send_message))
        .route("/api/messages/mark/{id}", put(mark_seen))
        .route("/api/messages/{peer_id}", get(get_history))
        .route("/ws", get(live_socket))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

async fn status() -> &'static str {
    "Server is live"
}
