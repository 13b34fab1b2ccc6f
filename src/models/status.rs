use chrono::{DateTime, Utc};
use serde::Serialize;

/// Gateway status reported by `/api/status`
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStatus {
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub pool: PoolSnapshot,
    pub cache: CacheSnapshot,
    pub fetches: FetchCounters,
}

/// Current egress pool membership
#[derive(Debug, Clone, Serialize, Default)]
pub struct PoolSnapshot {
    /// Whether a proxy source is configured at all
    pub enabled: bool,
    /// Proxies currently in rotation (credentials omitted)
    pub proxies: Vec<String>,
    /// Wall-clock time of the last completed refresh
    pub last_refresh: Option<DateTime<Utc>>,
}

impl PoolSnapshot {
    /// True when every upstream call goes out without a proxy
    pub fn direct_only(&self) -> bool {
        self.proxies.is_empty()
    }
}

/// Response cache and cooldown occupancy
#[derive(Debug, Clone, Serialize, Default)]
pub struct CacheSnapshot {
    pub entries: usize,
    pub capacity: usize,
    pub active_cooldowns: usize,
}

/// Fetch outcome counters since startup
#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct FetchCounters {
    pub fresh_hits: u64,
    pub stale_served: u64,
    pub live_calls: u64,
    pub throttled: u64,
}
