//! Client-facing read surface: playlist render, guide passthrough, stream
//! relay and status. Everything here consumes the currently active
//! snapshot; nothing writes catalog state.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use axum::{routing::get, Router};
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::Config;
use crate::database::Database;

pub mod handlers;
pub mod stream;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub database: Database,
    pub config: Config,
    /// Client used for upstream relay requests: bounded connection
    /// establishment, unbounded body transfer (live streams stay open).
    pub relay_client: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config, database: Database) -> Self {
        let relay_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            database,
            config,
            relay_client,
        }
    }
}

pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(config: Config, database: Database) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.web.host, config.web.port).parse()?;
        let app = Self::create_router(AppState::new(config, database));
        Ok(Self { app, addr })
    }

    /// Build the read-endpoint router. Exposed for in-process tests.
    pub fn create_router(state: AppState) -> Router {
        Router::new()
            .route("/health", get(handlers::health))
            .route("/status", get(handlers::status))
            .route("/stream/:stream_key", get(stream::relay_stream))
            // `<output>.m3u` and `<output>.xml` share one capture; the
            // handler dispatches on the extension.
            .route("/:file", get(handlers::serve_lineup_file))
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Serve until the stop signal fires.
    pub async fn serve(self, mut stop: watch::Receiver<bool>) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        info!("Web server listening on {}", self.addr);

        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = stop.changed().await;
        })
        .await?;

        Ok(())
    }
}
