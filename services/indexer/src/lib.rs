//! Video Indexer Client
//!
//! Client-side integration layer for a hosted video indexing service. Every
//! operation is gated by a short-lived token of the right scope, remote
//! failures are classified into retryable and terminal errors, and per-video
//! artifacts can be gathered into a single zip bundle that tolerates missing
//! pieces.
//!
//! ## Features
//!
//! - **Scoped Tokens**: account-wide and per-video tokens are distinct types,
//!   minted fresh for every call
//! - **Failure Classification**: a `Retry-After` hint turns a failure into
//!   [`IndexerError::RateLimited`]; the caller decides when to retry
//! - **Artifact Bundles**: all nine artifact kinds fetched into one archive,
//!   skipping the ones that are unavailable
//! - **Keyword Scans**: keyword counts across videos with a first-seen event
//!   stream
//! - **Face Pre-validation**: batch size, scheme and picture size checked
//!   before enrollment
//!
//! ## Architecture
//!
//! ```text
//!                        ┌──────────────┐
//!                        │ Indexer      │
//!                        │ Client       │
//!                        └──────────────┘
//!            ┌──────────────────┼──────────────────┐
//!            ▼                  ▼                  ▼
//!   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!   │ Artifact     │   │ Keyword      │   │ Face         │
//!   │ Collector    │   │ Aggregator   │   │ Validator    │──▶ picture hosts
//!   └──────────────┘   └──────────────┘   └──────────────┘
//!            │                  │
//!            ▼                  ▼
//!   ┌──────────────┐   ┌──────────────┐
//!   │ Token        │──▶│ Gateway      │──▶ indexer API
//!   │ Broker       │   │              │
//!   └──────────────┘   └──────────────┘
//! ```

pub mod artifacts;
pub mod client;
pub mod config;
pub mod error;
pub mod faces;
pub mod gateway;
pub mod keywords;
pub mod models;
pub mod token;

pub use artifacts::{ArtifactCollector, ArtifactKind, ArtifactOutcome, ArtifactSource, BundleReport};
pub use client::IndexerClient;
pub use config::{AccountConfig, Config, HttpConfig};
pub use error::{IndexerError, Result};
pub use faces::{FacePreValidator, ImageDimensions, ImageProbe, RemoteImageProbe};
pub use gateway::Gateway;
pub use keywords::{KeywordAggregator, KeywordCount, KeywordEvent, KeywordSource, KeywordTally};
pub use token::{AccountToken, Permission, ResourceToken, TokenBroker};
