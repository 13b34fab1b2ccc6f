//! Upstream page endpoint

use axum::extract::{Path, State};
use axum::http::header::{HeaderName, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};

use crate::api::server::AppState;
use crate::error::{GatewayError, Result};
use crate::models::Fingerprint;

/// Tells the caller whether the body came from a live call or the cache
pub static X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// `GET /servers/{resource_id}[{cursor}]`
pub async fn fetch_servers(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response> {
    let fingerprint = Fingerprint::parse_key(&key, &state.config.upstream.cursor_prefix)?;
    let fetched = state.orchestrator.fetch(&fingerprint).await?;

    Ok((
        [
            (CONTENT_TYPE, "application/json"),
            (X_CACHE.clone(), fetched.origin.as_str()),
        ],
        fetched.payload,
    )
        .into_response())
}

/// `GET /servers/` with nothing after the slash
pub async fn missing_key() -> Result<Response> {
    Err(GatewayError::InvalidRequest("resource id is empty".into()))
}
