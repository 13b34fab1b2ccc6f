//! Upstream transport
//!
//! One HTTP GET per live fetch, routed through a client from the proxy pool.
//! Transport failures evict the proxy that carried the call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};
use url::Url;

use crate::config::UpstreamConfig;
use crate::models::Fingerprint;
use crate::proxy::pool::ProxyPool;
use crate::upstream::headers::HeaderStrategy;

/// Raw upstream answer, body read in full
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub body: Bytes,
}

/// The call never produced a complete response
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Issues the live call for one fingerprint
#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<UpstreamReply, UpstreamError>;
}

/// HTTP transport over the egress proxy pool
pub struct HttpUpstream {
    pool: Arc<ProxyPool>,
    headers: Box<dyn HeaderStrategy>,
    base_url: Url,
    path_suffix: Vec<String>,
    page_limit: u32,
    request_timeout: Duration,
}

impl HttpUpstream {
    pub fn new(
        config: &UpstreamConfig,
        pool: Arc<ProxyPool>,
        headers: Box<dyn HeaderStrategy>,
    ) -> Self {
        Self {
            pool,
            headers,
            base_url: config.base_url.clone(),
            path_suffix: config
                .path_suffix
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            page_limit: config.page_limit,
            request_timeout: config.request_timeout,
        }
    }

    /// `{base}/{resource}/{suffix}?limit=N[&cursor=...]`
    pub fn request_url(&self, fingerprint: &Fingerprint) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push(fingerprint.resource.as_str())
                .extend(&self.path_suffix);
        }

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &self.page_limit.to_string());
            if let Some(cursor) = &fingerprint.cursor {
                query.append_pair("cursor", cursor.as_str());
            }
        }
        url
    }
}

#[async_trait]
impl UpstreamTransport for HttpUpstream {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<UpstreamReply, UpstreamError> {
        let lease = self.pool.acquire_client();
        let url = self.request_url(fingerprint);
        debug!(
            "GET {} via {}",
            url,
            lease
                .proxy
                .as_ref()
                .map_or_else(|| "direct".to_string(), ToString::to_string)
        );

        let call = async {
            let resp = lease
                .client
                .get(url)
                .headers(self.headers.headers())
                .send()
                .await?;
            let status = resp.status();
            let body = resp.bytes().await?;
            Ok::<_, reqwest::Error>(UpstreamReply { status, body })
        };

        let result = match timeout(self.request_timeout, call).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => Err(UpstreamError::Transport(e)),
            Err(_) => Err(UpstreamError::Timeout(self.request_timeout)),
        };

        if let (Err(e), Some(proxy)) = (&result, &lease.proxy) {
            warn!("Upstream call through {} failed: {}", proxy, e);
            self.pool.evict_client(&lease);
        }

        result
    }
}
