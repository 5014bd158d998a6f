pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use db::DBService;
use services::services::{database_validator::DatabaseValidator, shift_clock::ShiftClockService};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::config::ServerConfig;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    db: DBService,
    config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(db: DBService, config: ServerConfig) -> Self {
        Self {
            db,
            config: Arc::new(config),
        }
    }

    pub fn db(&self) -> &DBService {
        &self.db
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

pub fn build_router(state: AppState) -> Router {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Open the database, start background services and serve until Ctrl+C.
pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    let db = DBService::new(&config.database_url)
        .await
        .context("Failed to initialize database")?;

    DatabaseValidator::new(db.pool.clone()).validate().await?;

    if config.follow_clock {
        ShiftClockService::spawn(db.clone(), config.clock_interval).await;
    }

    let listener = bind_listener(&config).await?;
    let app = build_router(AppState::new(db, config));
    info!(addr = %listener.local_addr()?, "Production server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down gracefully");
    Ok(())
}

/// Bind `host:port`, resolving names like `localhost` and bare IPv6 literals like `::1`.
pub async fn bind_listener(config: &ServerConfig) -> anyhow::Result<TcpListener> {
    TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind to {}:{}", config.host, config.port))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}
