//! Storage port traits for the discovery pipeline.
//!
//! All stores are append-oriented: inserts and bulk inserts with a typed
//! duplicate-key signal, lookups, and the range queries the detectors need.
//! Implementations provide their own atomicity for single-row inserts and
//! all-or-nothing semantics for bulk inserts, and are safe for concurrent
//! use (the duplicate-key signal is what makes racing inserters correct).
//!
//! Every time range in these contracts is left-inclusive, right-exclusive:
//! `[from_ms, to_ms)`. An event stamped exactly `to_ms` is outside the
//! range; one stamped exactly `from_ms` is inside.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::entities::{DiscoveryProgress, TokenCandidate, TokenMetadata};
use crate::types::events::{LiquidityEvent, SwapEvent};

/// Result alias for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

// ═══════════════════════════════════════════════════════════════════════════════
// CANDIDATE STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for candidate persistence.
///
/// Candidates are append-only and unique per `candidate_id`; the service
/// additionally enforces at most one candidate per mint via
/// lookup-before-insert plus the duplicate-key race fallback.
#[async_trait]
pub trait CandidateStore: Send + Sync {
    /// Insert a candidate.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateKey`] when the id already exists.
    async fn insert(&self, candidate: &TokenCandidate) -> StoreResult<()>;

    /// Insert a batch of candidates, all-or-nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateKey`] and leaves the store unchanged
    /// when any row in the batch already exists.
    async fn insert_bulk(&self, candidates: &[TokenCandidate]) -> StoreResult<()>;

    /// Look up a candidate by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    async fn get_by_id(&self, candidate_id: &str) -> StoreResult<Option<TokenCandidate>>;

    /// All candidates for a mint (at most one on the happy path).
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    async fn get_by_mint(&self, mint: &str) -> StoreResult<Vec<TokenCandidate>>;

    /// The earliest-discovered candidate for a mint, tie-broken by
    /// `candidate_id` ascending. Used for deferred liquidity association.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    async fn earliest_for_mint(&self, mint: &str) -> StoreResult<Option<TokenCandidate>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// SWAP EVENT STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for raw swap event persistence.
///
/// Insertion is idempotent on `(slot, tx_signature, event_index)`.
#[async_trait]
pub trait SwapEventStore: Send + Sync {
    /// Insert a swap event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateKey`] when the identifying triple
    /// already exists.
    async fn insert(&self, event: &SwapEvent) -> StoreResult<()>;

    /// Insert a batch of swap events, all-or-nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateKey`] and leaves the store unchanged
    /// when any row in the batch already exists.
    async fn insert_bulk(&self, events: &[SwapEvent]) -> StoreResult<()>;

    /// All events in `[from_ms, to_ms)`, any mint.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    async fn get_by_time_range(&self, from_ms: i64, to_ms: i64) -> StoreResult<Vec<SwapEvent>>;

    /// Distinct mints with at least one event in `[from_ms, to_ms)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    async fn get_distinct_mints_by_time_range(
        &self,
        from_ms: i64,
        to_ms: i64,
    ) -> StoreResult<Vec<String>>;

    /// Events of one mint in `[from_ms, to_ms)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    async fn get_by_mint_time_range(
        &self,
        mint: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> StoreResult<Vec<SwapEvent>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDITY EVENT STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for raw liquidity event persistence.
#[async_trait]
pub trait LiquidityEventStore: Send + Sync {
    /// Insert a liquidity event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateKey`] when the identifying triple
    /// already exists.
    async fn insert(&self, event: &LiquidityEvent) -> StoreResult<()>;

    /// Insert a batch of liquidity events, all-or-nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateKey`] and leaves the store unchanged
    /// when any row in the batch already exists.
    async fn insert_bulk(&self, events: &[LiquidityEvent]) -> StoreResult<()>;

    /// Events of one mint in `[from_ms, to_ms)`, keyed by mint rather than
    /// candidate id because the candidate may not exist yet at discovery
    /// time.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    async fn get_by_mint_time_range(
        &self,
        mint: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> StoreResult<Vec<LiquidityEvent>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// TOKEN METADATA STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for token metadata persistence. One row per candidate.
#[async_trait]
pub trait TokenMetadataStore: Send + Sync {
    /// Insert metadata for a candidate.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateKey`] when the candidate already has
    /// metadata; callers treat that as success.
    async fn insert(&self, metadata: &TokenMetadata) -> StoreResult<()>;

    /// Look up metadata by candidate id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    async fn get_by_candidate_id(&self, candidate_id: &str) -> StoreResult<Option<TokenMetadata>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROGRESS STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for the optional resumability checkpoint.
///
/// Absence of an implementation (or an empty store) must not impair
/// correctness; the first-sight detector falls back on the candidate
/// store's uniqueness check.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Load the last saved checkpoint, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    async fn load(&self) -> StoreResult<Option<DiscoveryProgress>>;

    /// Overwrite the checkpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    async fn save(&self, progress: &DiscoveryProgress) -> StoreResult<()>;
}
