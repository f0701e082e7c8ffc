//! Port definitions for dependency injection and testability.
//!
//! Ports are trait definitions that describe what the discovery pipeline
//! needs from its storage collaborators. Following hexagonal architecture,
//! adapters implement these traits over concrete backends; this repository
//! ships an in-memory adapter ([`crate::store::MemoryStore`]) used by the
//! runner's tests and the reference binary, while SQL and columnar adapters
//! live with their backends.
//!
//! # Port Categories
//!
//! | Category | Ports | Purpose |
//! |----------|-------|---------|
//! | Discovery | [`CandidateStore`], [`TokenMetadataStore`] | Candidate rows and enrichment |
//! | Raw events | [`SwapEventStore`], [`LiquidityEventStore`] | Append-only event history |
//! | Resumability | [`ProgressStore`] | First-sight seen-cache rehydration |

pub mod store;

pub use store::{
    CandidateStore, LiquidityEventStore, ProgressStore, SwapEventStore, TokenMetadataStore,
};
