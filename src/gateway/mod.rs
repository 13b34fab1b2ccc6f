pub mod orchestrator;

pub use orchestrator::{FetchOrchestrator, FetchOrigin, Fetched};
