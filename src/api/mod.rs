//! API server implementation
//!
//! Inbound HTTP surface: the cached upstream endpoint plus health and status.

pub mod handlers;
pub mod routes;
pub mod server;

pub use server::{ApiServer, AppState};
