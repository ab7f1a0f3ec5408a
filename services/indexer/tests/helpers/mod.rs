//! Shared utilities for the indexer client integration tests

#![allow(dead_code)]

pub mod log_capture;
pub mod stub_indexer;

pub use log_capture::LogCapture;
pub use stub_indexer::{blob_payload, StubConfig, StubIndexer};
