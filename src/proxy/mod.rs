//! Egress proxy management
//!
//! - Candidate sources (static list or downloaded list)
//! - Reachability probes against the upstream host
//! - The live pool of verified proxies with per-proxy HTTP clients

pub mod health;
pub mod pool;
pub mod source;

pub use health::{ProxyProber, UpstreamProber};
pub use pool::{ClientFactory, OutboundClient, ProxyPool};
pub use source::{create_source, parse_proxy_list, ProxySource, RemoteListSource, StaticProxySource};
