//! fetchgate - resilient upstream fetch gateway
//!
//! Fronts a rate-limited, paginated JSON API and keeps answering when it
//! misbehaves.
//!
//! ## Features
//!
//! - Per-page response cache with a short freshness window and stale fallback
//! - Per-resource cooldown after upstream throttling
//! - Rotating pool of probed egress proxies with direct fallback
//! - Single-flight collapsing of concurrent identical misses

pub mod api;
pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod proxy;
pub mod repository;
pub mod services;
pub mod upstream;

pub use config::Config;
pub use error::{GatewayError, Result};
