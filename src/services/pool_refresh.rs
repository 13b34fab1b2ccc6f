//! Pool refresh service
//!
//! Owns the refresh cycle of the egress pool so no request ever pays for
//! solicitation and probing. Wakes up on a ticker and whenever
//! `ProxyPool::acquire_client` reports that a refresh is due.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument};

use crate::proxy::pool::ProxyPool;

/// Periodically re-evaluates the refresh policy of a [`ProxyPool`]
pub struct PoolRefreshService {
    pool: Arc<ProxyPool>,
    check_interval: Duration,
}

impl PoolRefreshService {
    pub fn new(pool: Arc<ProxyPool>, check_interval: Duration) -> Self {
        Self {
            pool,
            check_interval: check_interval.max(Duration::from_secs(1)),
        }
    }

    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if !self.pool.is_enabled() {
            info!("No proxy source configured, upstream calls go direct");
            return;
        }

        info!(
            "Starting pool refresh service (check every {}s)",
            self.check_interval.as_secs()
        );

        let live = self.pool.refresh().await;
        info!("Initial pool refresh finished with {} proxies", live);

        let mut ticker = interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => self.refresh_if_due().await,
                _ = self.pool.refresh_requested() => {
                    debug!("Refresh requested by a caller");
                    self.refresh_if_due().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Pool refresh service shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn refresh_if_due(&self) {
        if self.pool.refresh_due(Instant::now()) {
            self.pool.refresh().await;
        }
    }
}

/// Handle for stopping the pool refresh service
pub struct PoolRefreshHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl PoolRefreshHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Default for PoolRefreshHandle {
    fn default() -> Self {
        Self::new().0
    }
}
