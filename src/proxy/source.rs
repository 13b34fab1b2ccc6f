//! Candidate proxy sources
//!
//! A source is pulled once per candidate during a pool refresh. It may fail or
//! come back empty; the refresh simply ends up with fewer candidates.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use tracing::{debug, info};
use url::Url;

use crate::config::ProxySourceConfig;
use crate::error::{GatewayError, Result};
use crate::models::ProxyAddr;

/// Pull interface for candidate egress proxies
#[async_trait]
pub trait ProxySource: Send + Sync {
    /// Next candidate, `None` when the source has nothing to offer
    async fn next_candidate(&self) -> Result<Option<ProxyAddr>>;

    /// Source name for logs
    fn source_name(&self) -> &'static str;
}

/// Hands out a fixed list in shuffled order, reshuffling once exhausted
pub struct StaticProxySource {
    proxies: Vec<ProxyAddr>,
    queue: Mutex<Vec<ProxyAddr>>,
}

impl StaticProxySource {
    pub fn new(proxies: Vec<ProxyAddr>) -> Self {
        Self {
            proxies,
            queue: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ProxySource for StaticProxySource {
    async fn next_candidate(&self) -> Result<Option<ProxyAddr>> {
        let mut queue = self.queue.lock();
        if queue.is_empty() {
            queue.extend(self.proxies.iter().cloned());
            queue.shuffle(&mut rand::thread_rng());
        }
        Ok(queue.pop())
    }

    fn source_name(&self) -> &'static str {
        "static"
    }
}

/// Downloads a plain-text proxy list and hands it out one address at a time
pub struct RemoteListSource {
    url: Url,
    client: reqwest::Client,
    buffer: tokio::sync::Mutex<Vec<ProxyAddr>>,
}

impl RemoteListSource {
    pub fn new(url: Url, client: reqwest::Client) -> Self {
        Self {
            url,
            client,
            buffer: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    async fn download(&self) -> Result<Vec<ProxyAddr>> {
        let body = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| GatewayError::ProxySource(format!("download failed: {}", e)))?
            .text()
            .await
            .map_err(|e| GatewayError::ProxySource(format!("read failed: {}", e)))?;

        let mut proxies = parse_proxy_list(&body);
        proxies.shuffle(&mut rand::thread_rng());
        info!("Downloaded {} proxy candidates from {}", proxies.len(), self.url);
        Ok(proxies)
    }
}

#[async_trait]
impl ProxySource for RemoteListSource {
    async fn next_candidate(&self) -> Result<Option<ProxyAddr>> {
        let mut buffer = self.buffer.lock().await;
        if buffer.is_empty() {
            *buffer = self.download().await?;
        }
        Ok(buffer.pop())
    }

    fn source_name(&self) -> &'static str {
        "remote"
    }
}

/// Parse a proxy list with one address per line; `#` starts a comment line.
/// Lines that fail to parse are skipped.
pub fn parse_proxy_list(text: &str) -> Vec<ProxyAddr> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| match ProxyAddr::parse(line) {
            Ok(addr) => Some(addr),
            Err(e) => {
                debug!("Skipping proxy list entry {:?}: {}", line, e);
                None
            }
        })
        .collect()
}

/// Build the configured source, `None` when proxying is disabled
pub fn create_source(
    config: &ProxySourceConfig,
    client: reqwest::Client,
) -> Option<Box<dyn ProxySource>> {
    match config {
        ProxySourceConfig::Disabled => None,
        ProxySourceConfig::Static(proxies) => {
            Some(Box::new(StaticProxySource::new(proxies.clone())))
        }
        ProxySourceConfig::Remote(url) => {
            Some(Box::new(RemoteListSource::new(url.clone(), client)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn addr(port: u16) -> ProxyAddr {
        ProxyAddr::parse(&format!("10.0.0.1:{}", port)).unwrap()
    }

    #[tokio::test]
    async fn test_static_source_cycles_through_every_proxy() {
        let source = StaticProxySource::new(vec![addr(1), addr(2), addr(3)]);

        let mut seen = HashSet::new();
        for _ in 0..3 {
            seen.insert(source.next_candidate().await.unwrap().unwrap());
        }
        assert_eq!(seen.len(), 3);

        // Exhausted queue is refilled.
        assert!(source.next_candidate().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_static_source_empty() {
        let source = StaticProxySource::new(Vec::new());
        assert!(source.next_candidate().await.unwrap().is_none());
        assert_eq!(source.source_name(), "static");
    }

    #[test]
    fn test_parse_proxy_list_skips_comments_and_garbage() {
        let text = "# free proxies\n1.2.3.4:8080\n\n  socks5://5.6.7.8:1080  \nnot-a-proxy\n";
        let proxies = parse_proxy_list(text);
        assert_eq!(proxies.len(), 2);
        assert_eq!(proxies[0].to_string(), "http://1.2.3.4:8080");
        assert_eq!(proxies[1].to_string(), "socks5://5.6.7.8:1080");
    }

    #[test]
    fn test_create_source() {
        let client = reqwest::Client::new();
        assert!(create_source(&ProxySourceConfig::Disabled, client.clone()).is_none());

        let source = create_source(&ProxySourceConfig::Static(vec![addr(1)]), client.clone());
        assert_eq!(source.map(|s| s.source_name()), Some("static"));

        let url = Url::parse("https://lists.example/proxies.txt").unwrap();
        let source = create_source(&ProxySourceConfig::Remote(url), client);
        assert_eq!(source.map(|s| s.source_name()), Some("remote"));
    }
}
