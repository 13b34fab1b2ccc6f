//! Upstream API access
//!
//! Builds the outbound request for a fingerprint, decorates it through a
//! pluggable header strategy and sends it over the egress pool.

pub mod headers;
pub mod transport;

pub use headers::{create_header_strategy, HeaderStrategy, RandomizedHeaders, StaticHeaders};
pub use transport::{HttpUpstream, UpstreamError, UpstreamReply, UpstreamTransport};
