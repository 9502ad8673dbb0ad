//! Web layer module
//!
//! Webhook and transfer ingress for the media server, plus a small API to
//! inspect plugins, read their stored data and trigger manual runs.

use anyhow::Result;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{config::Config, plugins::PluginRegistry};

pub mod handlers;
pub mod responses;

pub use responses::{Accepted, ApiResponse};

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(config: Arc<Config>, registry: Arc<PluginRegistry>) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.web.host, config.web.port).parse()?;
        let app = create_router(AppState { config, registry });
        Ok(Self { app, addr })
    }

    /// Start the web server
    pub async fn serve(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        info!("Listening on http://{}", self.addr);
        axum::serve(listener, self.app).await?;
        Ok(())
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

/// Build the router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/webhook", post(handlers::receive_webhook))
        .route("/transfer", post(handlers::receive_transfer))
        .route("/plugins", get(handlers::list_plugins))
        .route("/plugins/:id/data", get(handlers::get_plugin_data))
        .route("/plugins/:id/data/:key", delete(handlers::delete_plugin_data))
        .route("/plugins/:id/run", post(handlers::run_plugin))
}

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<PluginRegistry>,
}
