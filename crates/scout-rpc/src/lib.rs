//! Solana JSON-RPC wire clients for the TOKENSCOUT stack.
//!
//! This crate provides the two wire clients the discovery service is built
//! on:
//!
//! - [`RpcClient`] - request/response JSON-RPC over HTTP with
//!   exponential-backoff retry on transient failures and 429-class responses
//! - [`PushClient`] - `logsSubscribe` push notifications over WebSocket with
//!   automatic reconnect, transparent resubscription, and back-pressure that
//!   reaches the transport instead of dropping events
//!
//! # Crate Relationships
//!
//! This is a **low-level crate** in the TOKENSCOUT stack:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Service Layer (tokenscout-discovery)                    │
//! │  └─ event sources, ordering runner, detectors            │
//! └────────────────────────────┬─────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │  RPC Layer (scout-rpc) ◄── YOU ARE HERE                  │
//! │  └─ direct JSON-RPC / WebSocket access                   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use scout_rpc::{ClientConfig, PushClient, PushConfig, RpcClient};
//!
//! let rpc = RpcClient::new("https://api.mainnet-beta.solana.com")?;
//! let push = PushClient::connect("wss://api.mainnet-beta.solana.com", PushConfig::default())?;
//!
//! let mut stream = push.subscribe_logs(&[program_id]).await?;
//! while let Some(notification) = stream.recv().await {
//!     let tx = rpc.get_transaction(&notification.signature).await?;
//!     // ...
//! }
//! ```
//!
//! # Why Two Connections Per Concern
//!
//! Some providers deduplicate identical subscriptions on one connection and
//! return the same subscription id, which collapses downstream channels.
//! Consumers that need independent streams for the same program (the
//! discovery service's swap and liquidity pipelines) therefore open one
//! [`PushClient`] per stream.
//!
//! # Methods Spoken
//!
//! | Method | Client |
//! |--------|--------|
//! | `getTransaction` | [`RpcClient`] |
//! | `getSignaturesForAddress` | [`RpcClient`] |
//! | `getBlock` / `getBlockTime` | [`RpcClient`] |
//! | `getAccountInfo` / `getSlot` | [`RpcClient`] |
//! | `logsSubscribe` | [`PushClient`] |
//!
//! # Modules
//!
//! - [`client`] - the request/response [`RpcClient`]
//! - [`push`] - the WebSocket [`PushClient`]
//! - [`config`] - [`ClientConfig`] and [`PushConfig`]
//! - [`types`] - typed views over the node's JSON payloads
//! - [`error`] - [`RpcError`] with retryability classification

#![doc(html_root_url = "https://docs.tokenscout.io/scout-rpc")]

// ═══════════════════════════════════════════════════════════════════════════════
// MODULES
// ═══════════════════════════════════════════════════════════════════════════════

pub mod client;
pub mod config;
pub mod error;
pub mod push;
pub mod types;

// ═══════════════════════════════════════════════════════════════════════════════
// RE-EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

// Primary types - what most users need
pub use client::RpcClient;
pub use config::{ClientConfig, PushConfig};
pub use error::{Result, RpcError};
pub use push::PushClient;
pub use types::{
    AccountInfo, BlockInfo, LogNotification, SignatureInfo, SignaturesQuery, TokenBalance,
    TransactionInfo,
};

// ═══════════════════════════════════════════════════════════════════════════════
// CRATE INFO
// ═══════════════════════════════════════════════════════════════════════════════

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the crate version string.
#[must_use]
pub const fn version() -> &'static str {
    VERSION
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!version().is_empty());
        assert!(version().starts_with("0."));
    }

    #[test]
    fn exports_are_available() {
        let _: fn() -> Result<RpcClient> = || RpcClient::new("http://localhost");
        let _: ClientConfig = ClientConfig::default();
        let _: PushConfig = PushConfig::default();
    }
}
