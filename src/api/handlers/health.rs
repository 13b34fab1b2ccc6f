//! Health and status endpoints

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::api::server::AppState;
use crate::models::{CacheSnapshot, GatewayStatus};

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "fetchgate"
        })),
    )
}

/// Pool membership, cache occupancy and fetch counters
pub async fn status(State(state): State<AppState>) -> Json<GatewayStatus> {
    let orchestrator = &state.orchestrator;
    let cache = orchestrator.cache();

    Json(GatewayStatus {
        started_at: state.started_wall,
        uptime_secs: state.started_at.elapsed().as_secs(),
        pool: state.pool.snapshot(),
        cache: CacheSnapshot {
            entries: cache.len(),
            capacity: cache.capacity(),
            active_cooldowns: orchestrator
                .cooldowns()
                .active_count(tokio::time::Instant::now()),
        },
        fetches: orchestrator.counters(),
    })
}
