//! Egress proxy pool
//!
//! Keeps a small set of verified proxies, each with its own long-lived HTTP
//! client, plus a direct client used whenever the pool is empty. Readers load
//! an immutable snapshot; refresh and eviction publish a new snapshot under a
//! writer lock, so an in-flight request keeps whatever client it acquired.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use tokio::sync::Notify;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, instrument, warn};

use crate::config::PoolConfig;
use crate::error::Result;
use crate::models::{PoolSnapshot, ProxyAddr};
use crate::proxy::health::ProxyProber;
use crate::proxy::source::ProxySource;

/// Builds outbound HTTP clients, direct or bound to one proxy
#[derive(Debug, Clone)]
pub struct ClientFactory {
    connect_timeout: Duration,
    request_timeout: Duration,
    keepalive: usize,
}

impl ClientFactory {
    pub fn new(connect_timeout: Duration, request_timeout: Duration, keepalive: usize) -> Self {
        Self {
            connect_timeout,
            request_timeout,
            keepalive,
        }
    }

    fn builder(&self) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .pool_max_idle_per_host(self.keepalive)
    }

    /// Client that ignores proxies, including any from the environment
    pub fn direct(&self) -> Result<reqwest::Client> {
        Ok(self.builder().no_proxy().build()?)
    }

    /// Persistent client routed through `proxy`
    pub fn proxied(&self, proxy: &ProxyAddr) -> Result<reqwest::Client> {
        let proxy = reqwest::Proxy::all(proxy.url())?;
        Ok(self.builder().proxy(proxy).build()?)
    }

    /// Throwaway client for a single probe, no idle connections kept
    pub fn probe_client(&self, proxy: &ProxyAddr, probe_timeout: Duration) -> Result<reqwest::Client> {
        let proxy = reqwest::Proxy::all(proxy.url())?;
        Ok(reqwest::Client::builder()
            .connect_timeout(probe_timeout)
            .timeout(probe_timeout)
            .pool_max_idle_per_host(0)
            .proxy(proxy)
            .build()?)
    }
}

/// Client handed to one upstream call
#[derive(Debug, Clone)]
pub struct OutboundClient {
    /// Proxy the client is bound to, `None` for the direct client
    pub proxy: Option<ProxyAddr>,
    pub client: reqwest::Client,
    /// Pool entry the client was taken from
    member: Option<Arc<PoolMember>>,
}

impl OutboundClient {
    pub fn is_direct(&self) -> bool {
        self.proxy.is_none()
    }
}

#[derive(Debug)]
struct PoolMember {
    addr: ProxyAddr,
    client: reqwest::Client,
}

#[derive(Debug, Default)]
struct PoolState {
    members: Vec<Arc<PoolMember>>,
    refreshed_at: Option<Instant>,
    refreshed_wall: Option<DateTime<Utc>>,
}

/// Pool of verified egress proxies
pub struct ProxyPool {
    state: ArcSwap<PoolState>,
    direct: reqwest::Client,
    source: Option<Box<dyn ProxySource>>,
    prober: Arc<dyn ProxyProber>,
    factory: ClientFactory,
    config: PoolConfig,
    /// Serializes snapshot publication (refresh swap and eviction)
    writer: Mutex<()>,
    /// One refresh cycle at a time
    refresh_cycle: tokio::sync::Mutex<()>,
    refresh_requested: Notify,
}

impl ProxyPool {
    /// Create an empty pool; `source: None` disables proxying entirely
    pub fn new(
        config: PoolConfig,
        factory: ClientFactory,
        source: Option<Box<dyn ProxySource>>,
        prober: Arc<dyn ProxyProber>,
    ) -> Result<Self> {
        let direct = factory.direct()?;
        Ok(Self {
            state: ArcSwap::from_pointee(PoolState::default()),
            direct,
            source,
            prober,
            factory,
            config,
            writer: Mutex::new(()),
            refresh_cycle: tokio::sync::Mutex::new(()),
            refresh_requested: Notify::new(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.source.is_some() && self.config.max_size > 0
    }

    /// Pick a client for one call. Never fails: falls back to the direct
    /// client when no proxy is live. Signals the refresh service when a
    /// refresh is due but never waits for it.
    pub fn acquire_client(&self) -> OutboundClient {
        if self.refresh_due(Instant::now()) {
            self.refresh_requested.notify_one();
        }

        let state = self.state.load();
        match state.members.choose(&mut rand::thread_rng()) {
            Some(member) => OutboundClient {
                proxy: Some(member.addr.clone()),
                client: member.client.clone(),
                member: Some(member.clone()),
            },
            None => self.direct_client(),
        }
    }

    pub fn direct_client(&self) -> OutboundClient {
        OutboundClient {
            proxy: None,
            client: self.direct.clone(),
            member: None,
        }
    }

    /// Whether the refresh policy calls for a new cycle at `now`
    pub fn refresh_due(&self, now: Instant) -> bool {
        if !self.is_enabled() {
            return false;
        }

        let state = self.state.load();
        match state.refreshed_at {
            None => true,
            Some(at) => {
                let elapsed = now.saturating_duration_since(at);
                elapsed > self.config.refresh_interval
                    || (state.members.len() < self.config.min_live
                        && elapsed >= self.config.retry_gap)
            }
        }
    }

    /// Resolves once `acquire_client` has asked for a refresh
    pub async fn refresh_requested(&self) {
        self.refresh_requested.notified().await;
    }

    /// Run one refresh cycle and return the new pool size
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> usize {
        let Some(source) = self.source.as_deref() else {
            return 0;
        };
        let _cycle = self.refresh_cycle.lock().await;

        let candidates = self.solicit(source).await;
        let solicited = candidates.len();
        let verified = self.probe_all(candidates).await;

        let members: Vec<Arc<PoolMember>> = verified
            .into_iter()
            .filter_map(|addr| match self.factory.proxied(&addr) {
                Ok(client) => Some(Arc::new(PoolMember { addr, client })),
                Err(e) => {
                    warn!("Failed to build client for proxy {}: {}", addr, e);
                    None
                }
            })
            .collect();

        let live = members.len();
        self.publish(PoolState {
            members,
            refreshed_at: Some(Instant::now()),
            refreshed_wall: Some(Utc::now()),
        });

        if live == 0 {
            warn!(
                "Pool refresh found no working proxies out of {} candidates, using direct connection",
                solicited
            );
        } else {
            info!(
                "Pool refresh complete: {} of {} candidates live",
                live, solicited
            );
        }
        live
    }

    async fn solicit(&self, source: &dyn ProxySource) -> Vec<ProxyAddr> {
        let wanted = self.config.candidate_count();
        let mut candidates: Vec<ProxyAddr> = Vec::with_capacity(wanted);

        for _ in 0..wanted {
            match source.next_candidate().await {
                Ok(Some(addr)) => {
                    if !candidates.contains(&addr) {
                        candidates.push(addr);
                    }
                }
                Ok(None) => continue,
                Err(e) => {
                    warn!("Proxy source {} failed: {}", source.source_name(), e);
                    continue;
                }
            }
        }

        debug!("Solicited {} proxy candidates", candidates.len());
        candidates
    }

    /// Probe every candidate concurrently and keep the first `max_size` to pass
    async fn probe_all(&self, candidates: Vec<ProxyAddr>) -> Vec<ProxyAddr> {
        let concurrency = candidates.len().max(1);
        let probe_timeout = self.config.probe_timeout;

        futures::stream::iter(candidates)
            .map(|addr| async move {
                let alive = timeout(probe_timeout, self.prober.probe(&addr))
                    .await
                    .unwrap_or(false);
                (addr, alive)
            })
            .buffer_unordered(concurrency)
            .filter_map(|(addr, alive)| async move { alive.then_some(addr) })
            .take(self.config.max_size)
            .collect()
            .await
    }

    /// Drop every member bound to `addr`. Returns false when none was in
    /// the pool.
    pub fn evict(&self, addr: &ProxyAddr) -> bool {
        self.remove_where(|member| &member.addr == addr)
    }

    /// Drop the exact member `lease` was taken from. A member probed by a
    /// later refresh for the same address stays.
    pub fn evict_client(&self, lease: &OutboundClient) -> bool {
        match &lease.member {
            Some(failed) => self.remove_where(|member| Arc::ptr_eq(member, failed)),
            None => false,
        }
    }

    fn remove_where(&self, doomed: impl Fn(&Arc<PoolMember>) -> bool) -> bool {
        let _writer = self.writer.lock();
        let current = self.state.load_full();

        let (gone, members): (Vec<_>, Vec<_>) =
            current.members.iter().cloned().partition(|m| doomed(m));
        if gone.is_empty() {
            return false;
        }

        let remaining = members.len();
        self.state.store(Arc::new(PoolState {
            members,
            refreshed_at: current.refreshed_at,
            refreshed_wall: current.refreshed_wall,
        }));

        for member in &gone {
            warn!("Evicted proxy {} ({} left in pool)", member.addr, remaining);
        }
        true
    }

    fn publish(&self, state: PoolState) {
        let _writer = self.writer.lock();
        // The previous snapshot, and with it the old clients, is released
        // once the last in-flight request holding it finishes.
        self.state.store(Arc::new(state));
    }

    pub fn live_count(&self) -> usize {
        self.state.load().members.len()
    }

    pub fn members(&self) -> Vec<ProxyAddr> {
        self.state
            .load()
            .members
            .iter()
            .map(|m| m.addr.clone())
            .collect()
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        let state = self.state.load();
        PoolSnapshot {
            enabled: self.is_enabled(),
            proxies: state.members.iter().map(|m| m.addr.to_string()).collect(),
            last_refresh: state.refreshed_wall,
        }
    }
}
