//! Health probing for candidate egress proxies
//!
//! A candidate passes when it can reach the real upstream host within the
//! probe timeout.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::time::timeout;
use tracing::{debug, instrument};
use url::Url;

use crate::models::ProxyAddr;
use crate::proxy::pool::ClientFactory;

/// Pass/fail reachability check for one proxy
#[async_trait]
pub trait ProxyProber: Send + Sync {
    async fn probe(&self, proxy: &ProxyAddr) -> bool;
}

/// Probes a proxy by requesting the upstream host root through it
pub struct UpstreamProber {
    target: Url,
    probe_timeout: Duration,
    factory: ClientFactory,
}

impl UpstreamProber {
    /// `upstream` may be any URL on the upstream host; only its origin is used
    pub fn new(upstream: &Url, probe_timeout: Duration, factory: ClientFactory) -> Self {
        let mut target = upstream.clone();
        target.set_path("/");
        target.set_query(None);
        target.set_fragment(None);

        Self {
            target,
            probe_timeout,
            factory,
        }
    }

    pub fn target(&self) -> &Url {
        &self.target
    }
}

/// Proxies answer 407 or a 5xx of their own when they cannot forward
fn is_reachable(status: StatusCode) -> bool {
    status != StatusCode::PROXY_AUTHENTICATION_REQUIRED && !status.is_server_error()
}

#[async_trait]
impl ProxyProber for UpstreamProber {
    #[instrument(skip(self), fields(proxy = %proxy))]
    async fn probe(&self, proxy: &ProxyAddr) -> bool {
        let client = match self.factory.probe_client(proxy, self.probe_timeout) {
            Ok(client) => client,
            Err(e) => {
                debug!("Proxy {} rejected: {}", proxy, e);
                return false;
            }
        };

        match timeout(self.probe_timeout, client.get(self.target.clone()).send()).await {
            Ok(Ok(resp)) if is_reachable(resp.status()) => {
                debug!("Proxy {} reached {} ({})", proxy, self.target, resp.status());
                true
            }
            Ok(Ok(resp)) => {
                debug!("Proxy {} answered {}", proxy, resp.status());
                false
            }
            Ok(Err(e)) => {
                debug!("Proxy {} probe failed: {}", proxy, e);
                false
            }
            Err(_) => {
                debug!("Proxy {} probe timed out", proxy);
                false
            }
        }
    }
}
