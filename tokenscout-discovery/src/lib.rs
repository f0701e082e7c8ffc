//! TOKENSCOUT Discovery Service
//!
//! A Rust backend service that ingests live DEX trading activity, derives a
//! canonical time-ordered event log per token, and discovers tokens either
//! trading for the first time (NEW_TOKEN) or spiking against their own
//! history (ACTIVE_TOKEN). Candidates carry deterministic hash identifiers,
//! so independent observers replaying the same input produce byte-identical
//! output.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        DISCOVERY CORE                           │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │    Push /    │  │     DEX      │  │   Ordering   │           │
//! │  │ Pull Sources │─▶│   Parsers    │─▶│    Runner    │           │
//! │  └──────────────┘  └──────────────┘  └──────┬───────┘           │
//! │                                             │                   │
//! │              ┌──────────────────────────────┼──────────────┐    │
//! │              ▼                              ▼              ▼    │
//! │       ┌──────────────┐             ┌──────────────┐   ┌───────┐ │
//! │       │  Detectors   │             │    Stores    │   │ Meta- │ │
//! │       │ (first-sight,│             │   (ports)    │   │ data  │ │
//! │       │    spike)    │             └──────────────┘   └───────┘ │
//! │       └──────────────┘                                          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`types`] - Domain types (events, entities, the identity hash)
//! - [`error`] - Layered error types with the duplicate-key signal
//! - [`config`] - Configuration loading and validation
//! - [`parsers`] - Per-program DEX decoders and the dispatch registry
//! - [`sources`] - Push (live) and pull (backfill) event sources
//! - [`runner`] - The slot-buffered deterministic ordering pipeline
//! - [`detectors`] - First-sight and spike discovery
//! - [`metadata`] - On-chain token metadata enrichment
//! - [`ports`] - Storage port traits
//! - [`store`] - In-memory storage adapter
//!
//! # Getting Started
//!
//! ```bash
//! # Set up environment
//! cp .env.example .env
//! # Edit .env with your RPC endpoints
//!
//! # Start live discovery
//! cargo run -- run
//!
//! # Backfill a historical window
//! cargo run -- backfill --from-ms 1700000000000 --to-ms 1700003600000
//! ```

#![doc(html_root_url = "https://docs.tokenscout.io/discovery")]

pub mod config;
pub mod detectors;
pub mod error;
pub mod metadata;
pub mod parsers;
pub mod ports;
pub mod runner;
pub mod sources;
pub mod store;
pub mod types;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the library version string
#[must_use]
pub const fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
        assert!(version().starts_with("0."));
    }
}
