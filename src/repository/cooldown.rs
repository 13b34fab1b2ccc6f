//! Rate-limit cooldown tracking
//!
//! Records, per upstream resource, the instant until which live calls are
//! suppressed after the upstream answered 429. Cursors do not matter here:
//! a throttled resource is throttled for every page.

use dashmap::DashMap;
use tokio::time::Instant;

use crate::models::ResourceId;

#[derive(Debug, Default)]
pub struct CooldownTracker {
    until: DashMap<ResourceId, Instant>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self {
            until: DashMap::new(),
        }
    }

    /// Cooldown deadline for a resource, `None` when never throttled
    pub fn get(&self, resource: &ResourceId) -> Option<Instant> {
        self.until.get(resource).map(|v| *v)
    }

    /// Last write wins, every 429 restarts the full backoff window.
    pub fn set(&self, resource: ResourceId, until: Instant) {
        self.until.insert(resource, until);
    }

    pub fn is_cooling(&self, resource: &ResourceId, now: Instant) -> bool {
        self.get(resource).is_some_and(|until| now < until)
    }

    pub fn active_count(&self, now: Instant) -> usize {
        self.until.iter().filter(|entry| now < *entry.value()).count()
    }
}
