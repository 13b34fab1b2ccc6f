//! Fetch orchestration
//!
//! Decides for every request whether to answer from cache, call upstream, or
//! fall back to a stale snapshot. Order of checks:
//!
//! 1. resource in cooldown: cached entry (any age) or `RateLimited`
//! 2. fresh cached entry: served as is
//! 3. live call, classified into cache/cooldown updates
//!
//! Every failure path tries the cached entry for the exact fingerprint before
//! surfacing an error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use serde::de::IgnoredAny;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::CacheConfig;
use crate::error::{GatewayError, Result};
use crate::models::{FetchCounters, Fingerprint};
use crate::repository::{CacheEntry, CooldownTracker, ResponseCache};
use crate::upstream::{UpstreamReply, UpstreamTransport};

/// Where a returned payload came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOrigin {
    /// Upstream call made for this request
    Live,
    /// Cache entry inside the freshness window
    Fresh,
    /// Cache entry past the window, served because upstream could not answer
    Stale,
}

impl FetchOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchOrigin::Live => "live",
            FetchOrigin::Fresh => "fresh",
            FetchOrigin::Stale => "stale",
        }
    }
}

/// Payload returned to the caller
#[derive(Debug, Clone)]
pub struct Fetched {
    pub payload: Bytes,
    pub origin: FetchOrigin,
}

/// Upstream reply interpreted for the pipeline
#[derive(Debug)]
enum Classified {
    Data(Bytes),
    Empty,
    NotFound,
    Throttled,
    Failed(String),
}

/// Only the presence of a non-empty `data` array is checked
#[derive(Deserialize)]
struct Page {
    #[serde(default)]
    data: Option<Vec<IgnoredAny>>,
}

fn classify(reply: UpstreamReply) -> Classified {
    match reply.status.as_u16() {
        200 => match serde_json::from_slice::<Page>(&reply.body) {
            Ok(page) if page.data.as_ref().is_some_and(|d| !d.is_empty()) => {
                Classified::Data(reply.body)
            }
            Ok(_) => Classified::Empty,
            Err(e) => Classified::Failed(format!("unreadable body: {}", e)),
        },
        404 => Classified::NotFound,
        429 => Classified::Throttled,
        other => Classified::Failed(format!("unexpected status {}", other)),
    }
}

#[derive(Debug, Default)]
struct FetchStats {
    fresh_hits: AtomicU64,
    stale_served: AtomicU64,
    live_calls: AtomicU64,
    throttled: AtomicU64,
}

impl FetchStats {
    fn snapshot(&self) -> FetchCounters {
        FetchCounters {
            fresh_hits: self.fresh_hits.load(Ordering::Relaxed),
            stale_served: self.stale_served.load(Ordering::Relaxed),
            live_calls: self.live_calls.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
        }
    }
}

/// Outcome of one upstream flight, shared by every caller that joined it
type Flight = Arc<OnceCell<Result<Fetched>>>;

/// Leaves a flight and forgets it once nobody else is attached
struct InflightGuard<'a> {
    inflight: &'a DashMap<Fingerprint, Flight>,
    fingerprint: &'a Fingerprint,
    flight: Option<Flight>,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.flight.take();
        self.inflight
            .remove_if(self.fingerprint, |_, flight| Arc::strong_count(flight) == 1);
    }
}

/// Owned copy of a flight outcome. Only the per-resource outcomes ever
/// leave a flight; anything else degrades to `Internal`.
fn replay(outcome: &Result<Fetched>) -> Result<Fetched> {
    match outcome {
        Ok(fetched) => Ok(fetched.clone()),
        Err(GatewayError::ResourceNotFound { resource_id }) => Err(GatewayError::ResourceNotFound {
            resource_id: resource_id.clone(),
        }),
        Err(GatewayError::NoServersFound { resource_id }) => Err(GatewayError::NoServersFound {
            resource_id: resource_id.clone(),
        }),
        Err(GatewayError::RateLimited { resource_id }) => Err(GatewayError::RateLimited {
            resource_id: resource_id.clone(),
        }),
        Err(GatewayError::UpstreamUnavailable { resource_id }) => {
            Err(GatewayError::UpstreamUnavailable {
                resource_id: resource_id.clone(),
            })
        }
        Err(other) => Err(GatewayError::Internal(other.to_string())),
    }
}

/// Central fetch pipeline
pub struct FetchOrchestrator {
    cache: Arc<ResponseCache>,
    cooldowns: Arc<CooldownTracker>,
    transport: Arc<dyn UpstreamTransport>,
    config: CacheConfig,
    inflight: DashMap<Fingerprint, Flight>,
    stats: FetchStats,
}

impl FetchOrchestrator {
    pub fn new(
        cache: Arc<ResponseCache>,
        cooldowns: Arc<CooldownTracker>,
        transport: Arc<dyn UpstreamTransport>,
        config: CacheConfig,
    ) -> Self {
        Self {
            cache,
            cooldowns,
            transport,
            config,
            inflight: DashMap::new(),
            stats: FetchStats::default(),
        }
    }

    /// Produce a payload for `fingerprint`, live or cached
    #[instrument(skip(self), fields(fingerprint = %fingerprint))]
    pub async fn fetch(&self, fingerprint: &Fingerprint) -> Result<Fetched> {
        if let Some(result) = self.serve_without_upstream(fingerprint, Instant::now()) {
            return result;
        }

        if !self.config.single_flight {
            return self.fetch_live(fingerprint).await;
        }

        let flight = self.inflight.entry(fingerprint.clone()).or_default().clone();
        let guard = InflightGuard {
            inflight: &self.inflight,
            fingerprint,
            flight: Some(flight.clone()),
        };

        let mut led = false;
        let outcome = {
            let led = &mut led;
            flight
                .get_or_init(|| async move {
                    *led = true;
                    // A flight opened right after the previous one closed
                    // sees its cache write or cooldown.
                    match self.serve_without_upstream(fingerprint, Instant::now()) {
                        Some(result) => result,
                        None => self.fetch_live(fingerprint).await,
                    }
                })
                .await
        };

        let result = if led {
            replay(outcome)
        } else {
            debug!("Joined in-flight fetch");
            self.joined(outcome)
        };

        drop(flight);
        drop(guard);
        result
    }

    /// Result for a caller that waited on another caller's flight
    fn joined(&self, outcome: &Result<Fetched>) -> Result<Fetched> {
        let mut result = replay(outcome);
        if let Ok(fetched) = &mut result {
            if fetched.origin == FetchOrigin::Stale {
                self.stats.stale_served.fetch_add(1, Ordering::Relaxed);
            } else {
                fetched.origin = FetchOrigin::Fresh;
                self.stats.fresh_hits.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    /// Steps 1 and 2: answers that never touch upstream
    fn serve_without_upstream(
        &self,
        fingerprint: &Fingerprint,
        now: Instant,
    ) -> Option<Result<Fetched>> {
        let entry = self.cache.get(fingerprint);

        if self.cooldowns.is_cooling(&fingerprint.resource, now) {
            return Some(match entry {
                Some(entry) => {
                    debug!("Resource in cooldown, serving cached entry");
                    Ok(self.from_cache(entry, now))
                }
                None => {
                    warn!("Resource in cooldown and nothing cached");
                    Err(GatewayError::RateLimited {
                        resource_id: fingerprint.resource.to_string(),
                    })
                }
            });
        }

        match entry {
            Some(entry) if entry.is_fresh(now, self.config.fresh_window) => {
                debug!(
                    "Cache hit ({}s remaining)",
                    self.config
                        .fresh_window
                        .saturating_sub(entry.age(now))
                        .as_secs()
                );
                Some(Ok(self.from_cache(entry, now)))
            }
            _ => None,
        }
    }

    /// Step 3: live call and classification
    async fn fetch_live(&self, fingerprint: &Fingerprint) -> Result<Fetched> {
        self.stats.live_calls.fetch_add(1, Ordering::Relaxed);
        let resource_id = fingerprint.resource.to_string();

        let reply = self.transport.get(fingerprint).await;
        let now = Instant::now();

        let classified = match reply {
            Ok(reply) => classify(reply),
            Err(e) => Classified::Failed(e.to_string()),
        };

        match classified {
            Classified::Data(payload) => {
                info!("Fetched fresh data ({} bytes)", payload.len());
                self.cache.put(fingerprint.clone(), payload.clone(), now);
                Ok(Fetched {
                    payload,
                    origin: FetchOrigin::Live,
                })
            }
            Classified::Empty => {
                info!("Upstream returned no servers");
                Err(GatewayError::NoServersFound { resource_id })
            }
            Classified::NotFound => {
                info!("Upstream reports resource does not exist");
                Err(GatewayError::ResourceNotFound { resource_id })
            }
            Classified::Throttled => {
                self.stats.throttled.fetch_add(1, Ordering::Relaxed);
                self.cooldowns
                    .set(fingerprint.resource.clone(), now + self.config.cooldown);
                warn!(
                    "Rate limited, cooling down for {}s",
                    self.config.cooldown.as_secs()
                );
                self.stale_or(fingerprint, now, GatewayError::RateLimited { resource_id })
            }
            Classified::Failed(reason) => {
                warn!("Upstream call failed: {}", reason);
                self.stale_or(
                    fingerprint,
                    now,
                    GatewayError::UpstreamUnavailable { resource_id },
                )
            }
        }
    }

    fn stale_or(
        &self,
        fingerprint: &Fingerprint,
        now: Instant,
        err: GatewayError,
    ) -> Result<Fetched> {
        match self.cache.get(fingerprint) {
            Some(entry) => {
                debug!("Falling back to cached entry ({}s old)", entry.age(now).as_secs());
                Ok(self.from_cache(entry, now))
            }
            None => Err(err),
        }
    }

    fn from_cache(&self, entry: CacheEntry, now: Instant) -> Fetched {
        let origin = if entry.is_fresh(now, self.config.fresh_window) {
            self.stats.fresh_hits.fetch_add(1, Ordering::Relaxed);
            FetchOrigin::Fresh
        } else {
            self.stats.stale_served.fetch_add(1, Ordering::Relaxed);
            FetchOrigin::Stale
        };

        Fetched {
            payload: entry.payload,
            origin,
        }
    }

    pub fn counters(&self) -> FetchCounters {
        self.stats.snapshot()
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn cooldowns(&self) -> &CooldownTracker {
        &self.cooldowns
    }
}
