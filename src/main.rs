//! fetchgate - Entry Point
//!
//! Wires the proxy pool, cache, cooldowns and orchestrator, then serves the
//! API until Ctrl+C or SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fetchgate::api::{ApiServer, AppState};
use fetchgate::config::{Config, LogConfig};
use fetchgate::gateway::FetchOrchestrator;
use fetchgate::proxy::{create_source, ClientFactory, ProxyPool, UpstreamProber};
use fetchgate::repository::{CooldownTracker, ResponseCache};
use fetchgate::services::{PoolRefreshHandle, PoolRefreshService};
use fetchgate::upstream::{create_header_strategy, HttpUpstream};

fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("fetchgate={},tower_http={}", log.level, log.level).into()
    });

    let json = log.format.eq_ignore_ascii_case("json");
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;
    init_tracing(&config.log);

    info!("Starting fetchgate");
    info!(
        "Upstream {} (fresh window {}s, cooldown {}s, cache capacity {})",
        config.upstream.base_url,
        config.cache.fresh_window.as_secs(),
        config.cache.cooldown.as_secs(),
        config.cache.capacity
    );

    // Egress pool
    let factory = ClientFactory::new(
        config.upstream.connect_timeout,
        config.upstream.request_timeout,
        config.pool.keepalive,
    );
    let source_client = factory
        .direct()
        .context("failed to build proxy source client")?;
    let source = create_source(&config.pool.source, source_client);
    if let Some(source) = &source {
        info!("Proxy source: {}", source.source_name());
    }
    let prober = Arc::new(UpstreamProber::new(
        &config.upstream.base_url,
        config.pool.probe_timeout,
        factory.clone(),
    ));
    let pool = Arc::new(
        ProxyPool::new(config.pool.clone(), factory, source, prober)
            .context("failed to build proxy pool")?,
    );

    // Fetch pipeline
    let headers = create_header_strategy(config.upstream.spoof_headers);
    info!("Header strategy: {}", headers.strategy_name());
    let transport = Arc::new(HttpUpstream::new(&config.upstream, pool.clone(), headers));
    let orchestrator = Arc::new(FetchOrchestrator::new(
        Arc::new(ResponseCache::new(config.cache.capacity)),
        Arc::new(CooldownTracker::new()),
        transport,
        config.cache.clone(),
    ));

    // Pool refresh service
    let (refresh_handle, refresh_shutdown) = PoolRefreshHandle::new();
    let refresh_service = PoolRefreshService::new(pool.clone(), config.pool.retry_gap);
    let refresh_task = tokio::spawn(async move {
        refresh_service.run(refresh_shutdown).await;
    });

    // API server
    let (shutdown_tx, api_shutdown) = watch::channel(false);
    let api_server = ApiServer::new(AppState::new(orchestrator, pool, config.clone()));
    let api_task = tokio::spawn(async move {
        if let Err(e) = api_server.run(api_shutdown).await {
            error!("API server error: {}", e);
        }
    });

    info!("Server started on {}", config.server_addr());

    shutdown_signal().await;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    refresh_handle.shutdown();

    let _ = tokio::join!(api_task, refresh_task);

    info!("fetchgate stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
