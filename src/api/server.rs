//! API server using Axum
//!
//! Serves cached upstream pages plus health and status endpoints.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::config::Config;
use crate::error::{GatewayError, Result};
use crate::gateway::FetchOrchestrator;
use crate::proxy::pool::ProxyPool;

use super::routes;

/// Shared state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<FetchOrchestrator>,
    pub pool: Arc<ProxyPool>,
    pub config: Arc<Config>,
    pub started_at: Instant,
    pub started_wall: DateTime<Utc>,
}

impl AppState {
    pub fn new(orchestrator: Arc<FetchOrchestrator>, pool: Arc<ProxyPool>, config: Config) -> Self {
        Self {
            orchestrator,
            pool,
            config: Arc::new(config),
            started_at: Instant::now(),
            started_wall: Utc::now(),
        }
    }
}

/// API server
pub struct ApiServer {
    state: AppState,
}

impl ApiServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Router with tracing and the inbound request timeout applied
    pub fn build_router(&self) -> Router {
        let request_timeout = Duration::from_secs(self.state.config.server.request_timeout);

        routes::create_router(self.state.clone()).layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout)),
        )
    }

    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr: SocketAddr = self.state.config.server_addr().parse().map_err(|_| {
            GatewayError::InvalidConfig(format!(
                "invalid server address {}",
                self.state.config.server_addr()
            ))
        })?;

        let router = self.build_router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("API server listening on {}", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await?;

        info!("API server shut down");
        Ok(())
    }
}
