//! API route definitions

use axum::routing::get;
use axum::Router;

use super::handlers;
use super::server::AppState;

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api/status", get(handlers::health::status))
        // Catch-all so keys containing '/' reach the handler and get a 400
        .route("/servers/", get(handlers::servers::missing_key))
        .route("/servers/*key", get(handlers::servers::fetch_servers))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, Config, LogConfig, PoolConfig, ServerConfig, UpstreamConfig};
    use crate::gateway::FetchOrchestrator;
    use crate::models::{Fingerprint, ProxyAddr};
    use crate::proxy::health::ProxyProber;
    use crate::proxy::pool::{ClientFactory, ProxyPool};
    use crate::repository::{CooldownTracker, ResponseCache};
    use crate::upstream::{UpstreamError, UpstreamReply, UpstreamTransport};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use bytes::Bytes;
    use http_body_util::BodyExt;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    /// Answers by resource id; unknown ids time out
    #[derive(Default)]
    struct MapTransport {
        replies: Mutex<HashMap<String, (u16, &'static str)>>,
    }

    #[async_trait]
    impl UpstreamTransport for MapTransport {
        async fn get(&self, fingerprint: &Fingerprint) -> Result<UpstreamReply, UpstreamError> {
            let reply = self.replies.lock().get(fingerprint.resource.as_str()).copied();
            match reply {
                Some((status, body)) => Ok(UpstreamReply {
                    status: StatusCode::from_u16(status).unwrap(),
                    body: Bytes::from_static(body.as_bytes()),
                }),
                None => Err(UpstreamError::Timeout(Duration::from_secs(5))),
            }
        }
    }

    struct NeverProber;

    #[async_trait]
    impl ProxyProber for NeverProber {
        async fn probe(&self, _proxy: &ProxyAddr) -> bool {
            false
        }
    }

    fn config() -> Config {
        Config {
            server: ServerConfig {
                port: 0,
                host: "127.0.0.1".into(),
                request_timeout: 30,
            },
            upstream: UpstreamConfig::default(),
            cache: CacheConfig::default(),
            pool: PoolConfig::default(),
            log: LogConfig {
                level: "info".into(),
                format: "pretty".into(),
            },
        }
    }

    fn router(transport: MapTransport) -> Router {
        let config = config();
        let pool = ProxyPool::new(
            config.pool.clone(),
            ClientFactory::new(Duration::from_secs(1), Duration::from_secs(5), 2),
            None,
            Arc::new(NeverProber),
        )
        .unwrap();
        let orchestrator = FetchOrchestrator::new(
            Arc::new(ResponseCache::new(config.cache.capacity)),
            Arc::new(CooldownTracker::new()),
            Arc::new(transport),
            config.cache.clone(),
        );
        create_router(AppState::new(Arc::new(orchestrator), Arc::new(pool), config))
    }

    fn transport(entries: &[(&str, u16, &'static str)]) -> MapTransport {
        let transport = MapTransport::default();
        for (id, status, body) in entries {
            transport
                .replies
                .lock()
                .insert(id.to_string(), (*status, *body));
        }
        transport
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, Option<String>, Bytes) {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let cache = response
            .headers()
            .get("x-cache")
            .map(|v| v.to_str().unwrap().to_string());
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, cache, body)
    }

    fn error_message(body: &Bytes) -> String {
        let value: serde_json::Value = serde_json::from_slice(body).unwrap();
        value["error"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(MapTransport::default());
        let (status, _, body) = get(&app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "healthy");
    }

    #[tokio::test]
    async fn test_servers_live_then_fresh() {
        let page = r#"{"data":[{"id":"srv-1","playing":3}],"nextPageCursor":null}"#;
        let app = router(transport(&[("920587237", 200, page)]));

        let (status, cache, body) = get(&app, "/servers/920587237").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cache.as_deref(), Some("live"));
        assert_eq!(body, Bytes::from_static(page.as_bytes()));

        let (status, cache, body) = get(&app, "/servers/920587237").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cache.as_deref(), Some("fresh"));
        assert_eq!(body, Bytes::from_static(page.as_bytes()));
    }

    #[tokio::test]
    async fn test_servers_sets_json_content_type() {
        let app = router(transport(&[("1", 200, r#"{"data":[1]}"#)]));
        let response = app
            .oneshot(Request::builder().uri("/servers/1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.headers()["content-type"], "application/json");
    }

    #[tokio::test]
    async fn test_servers_error_statuses() {
        let app = router(transport(&[
            ("404", 404, r#"{"errors":[]}"#),
            ("empty", 200, r#"{"data":[]}"#),
            ("busy", 429, ""),
        ]));

        let (status, _, body) = get(&app, "/servers/404").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error_message(&body), "Resource not found: 404");

        let (status, _, body) = get(&app, "/servers/empty").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error_message(&body), "No servers found for empty");

        let (status, _, _) = get(&app, "/servers/busy").await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

        let (status, _, body) = get(&app, "/servers/456").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            error_message(&body),
            "Unable to fetch 456, please try again"
        );
    }

    #[tokio::test]
    async fn test_malformed_keys_are_rejected() {
        let app = router(MapTransport::default());

        let (status, _, _) = get(&app, "/servers/").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, _) = get(&app, "/servers/12/34").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // Key that is nothing but a cursor
        let (status, _, _) = get(&app, "/servers/eyJzdGFydCI6MTAwfQ").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_status_reports_counters_and_pool() {
        let app = router(transport(&[("7", 200, r#"{"data":[1]}"#)]));
        get(&app, "/servers/7").await;
        get(&app, "/servers/7").await;

        let (status, _, body) = get(&app, "/api/status").await;
        assert_eq!(status, StatusCode::OK);

        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["fetches"]["live_calls"], 1);
        assert_eq!(value["fetches"]["fresh_hits"], 1);
        assert_eq!(value["cache"]["entries"], 1);
        assert_eq!(value["cache"]["active_cooldowns"], 0);
        assert_eq!(value["pool"]["enabled"], false);
        assert_eq!(value["pool"]["proxies"].as_array().unwrap().len(), 0);
    }
}
