use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    body::Body,
    extract::Request,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use rust_embed::RustEmbed;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;

use super::api::{self, AppState, SharedState};
use super::changes::ChangeFeed;
use super::db::{BoardDb, DbHandle};
use super::live::LiveDashboard;
use super::storage::LocalObjectStore;
use super::ws;
use crate::config::RelboardConfig;

/// Dashboard page and its static assets, compiled into the binary.
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/assets/"]
struct Assets;

/// Build the full application router with API, WebSocket, and page serving.
pub fn build_router(state: SharedState) -> Router {
    api::api_router()
        .route("/ws", get(ws::ws_handler))
        .fallback(static_handler)
        .with_state(state)
}

/// Serve embedded static files or fall back to index.html.
async fn static_handler(req: Request<Body>) -> Response {
    let path = req.uri().path().trim_start_matches('/');

    if !path.is_empty()
        && let Some(content) = Assets::get(path)
    {
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        return ([(header::CONTENT_TYPE, mime.as_ref().to_string())], content.data.into_owned())
            .into_response();
    }

    match Assets::get("index.html") {
        Some(content) => Html(String::from_utf8_lossy(&content.data).to_string()).into_response(),
        None => (StatusCode::NOT_FOUND, "Dashboard page not bundled").into_response(),
    }
}

/// Open the database, creating its parent directory when needed.
pub fn open_database(path: &Path) -> Result<BoardDb> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    BoardDb::new(path).context("Failed to initialize release board database")
}

/// Assemble shared state from configuration.
pub fn build_state(config: &RelboardConfig, db: BoardDb) -> SharedState {
    let (ws_tx, _rx) = broadcast::channel::<String>(256);
    let store = LocalObjectStore::new(&config.storage.root, config.public_base_url());

    Arc::new(AppState {
        db: DbHandle::new(db),
        changes: ChangeFeed::new(),
        ws_tx,
        store: Arc::new(store),
        upload_policy: config.upload_policy(),
    })
}

/// Start the release board server and block until Ctrl+C.
pub async fn start_server(config: RelboardConfig) -> Result<()> {
    let db = open_database(&config.database.path)?;
    std::fs::create_dir_all(&config.storage.root).with_context(|| {
        format!(
            "Failed to create storage directory: {}",
            config.storage.root.display()
        )
    })?;

    let state = build_state(&config, db);
    let live = LiveDashboard::spawn(
        state.db.clone(),
        &state.changes,
        state.ws_tx.clone(),
        config.live_config(),
    );

    let mut app = build_router(state);
    if config.server.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(
        %local_addr,
        db = %config.database.path.display(),
        dev_mode = config.server.dev_mode,
        "release board listening"
    );
    println!("Release board running at http://{}", local_addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error");

    live.shutdown().await;
    served?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
