//! In-memory stores shared by concurrent fetches

pub mod cache;
pub mod cooldown;

pub use cache::{CacheEntry, ResponseCache};
pub use cooldown::CooldownTracker;
