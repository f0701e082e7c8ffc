//! In-memory storage adapter.
//!
//! Implements every storage port over `parking_lot`-guarded maps. Semantics
//! match the contracts exactly: typed duplicate-key signals, all-or-nothing
//! bulk inserts, and left-inclusive/right-exclusive time ranges, so the
//! adapter doubles as the executable reference for backend implementations.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::StoreError;
use crate::ports::store::{
    CandidateStore, LiquidityEventStore, ProgressStore, StoreResult, SwapEventStore,
    TokenMetadataStore,
};
use crate::types::entities::{DiscoveryProgress, TokenCandidate, TokenMetadata};
use crate::types::events::{LiquidityEvent, SwapEvent};

/// Identifying triple used as the raw-event primary key.
type EventTriple = (i64, String, i64);

fn swap_key(event: &SwapEvent) -> EventTriple {
    (event.slot, event.tx_signature.clone(), event.event_index)
}

fn liquidity_key(event: &LiquidityEvent) -> EventTriple {
    (event.slot, event.tx_signature.clone(), event.event_index)
}

// ═══════════════════════════════════════════════════════════════════════════════
// MEMORY STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Shared in-memory store implementing all storage ports.
///
/// Cloning is cheap; clones share the same underlying maps.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    candidates: RwLock<HashMap<String, TokenCandidate>>,
    swaps: RwLock<BTreeMap<EventTriple, SwapEvent>>,
    liquidity: RwLock<BTreeMap<EventTriple, LiquidityEvent>>,
    metadata: RwLock<HashMap<String, TokenMetadata>>,
    progress: RwLock<Option<DiscoveryProgress>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored candidates.
    #[must_use]
    pub fn candidate_count(&self) -> usize {
        self.inner.candidates.read().len()
    }

    /// Number of stored swap events.
    #[must_use]
    pub fn swap_count(&self) -> usize {
        self.inner.swaps.read().len()
    }

    /// Number of stored liquidity events.
    #[must_use]
    pub fn liquidity_count(&self) -> usize {
        self.inner.liquidity.read().len()
    }

    /// All stored swap events in canonical `(slot, signature, index)` order.
    #[must_use]
    pub fn swaps_in_order(&self) -> Vec<SwapEvent> {
        self.inner.swaps.read().values().cloned().collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CANDIDATE STORE
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl CandidateStore for MemoryStore {
    async fn insert(&self, candidate: &TokenCandidate) -> StoreResult<()> {
        if candidate.candidate_id.is_empty() {
            return Err(StoreError::InvalidInput("empty candidate_id".into()));
        }
        let mut candidates = self.inner.candidates.write();
        if candidates.contains_key(&candidate.candidate_id) {
            return Err(StoreError::DuplicateKey);
        }
        candidates.insert(candidate.candidate_id.clone(), candidate.clone());
        Ok(())
    }

    async fn insert_bulk(&self, batch: &[TokenCandidate]) -> StoreResult<()> {
        let mut candidates = self.inner.candidates.write();
        if batch.iter().any(|c| candidates.contains_key(&c.candidate_id)) {
            return Err(StoreError::DuplicateKey);
        }
        for candidate in batch {
            candidates.insert(candidate.candidate_id.clone(), candidate.clone());
        }
        Ok(())
    }

    async fn get_by_id(&self, candidate_id: &str) -> StoreResult<Option<TokenCandidate>> {
        Ok(self.inner.candidates.read().get(candidate_id).cloned())
    }

    async fn get_by_mint(&self, mint: &str) -> StoreResult<Vec<TokenCandidate>> {
        Ok(self
            .inner
            .candidates
            .read()
            .values()
            .filter(|c| c.mint == mint)
            .cloned()
            .collect())
    }

    async fn earliest_for_mint(&self, mint: &str) -> StoreResult<Option<TokenCandidate>> {
        let candidates = self.inner.candidates.read();
        let mut matches: Vec<&TokenCandidate> =
            candidates.values().filter(|c| c.mint == mint).collect();
        matches.sort_by(|a, b| {
            a.discovered_at
                .cmp(&b.discovered_at)
                .then_with(|| a.candidate_id.cmp(&b.candidate_id))
        });
        Ok(matches.first().map(|c| (*c).clone()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SWAP EVENT STORE
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl SwapEventStore for MemoryStore {
    async fn insert(&self, event: &SwapEvent) -> StoreResult<()> {
        let mut swaps = self.inner.swaps.write();
        let key = swap_key(event);
        if swaps.contains_key(&key) {
            return Err(StoreError::DuplicateKey);
        }
        swaps.insert(key, event.clone());
        Ok(())
    }

    async fn insert_bulk(&self, batch: &[SwapEvent]) -> StoreResult<()> {
        let mut swaps = self.inner.swaps.write();
        if batch.iter().any(|e| swaps.contains_key(&swap_key(e))) {
            return Err(StoreError::DuplicateKey);
        }
        for event in batch {
            swaps.insert(swap_key(event), event.clone());
        }
        Ok(())
    }

    async fn get_by_time_range(&self, from_ms: i64, to_ms: i64) -> StoreResult<Vec<SwapEvent>> {
        Ok(self
            .inner
            .swaps
            .read()
            .values()
            .filter(|e| e.timestamp >= from_ms && e.timestamp < to_ms)
            .cloned()
            .collect())
    }

    async fn get_distinct_mints_by_time_range(
        &self,
        from_ms: i64,
        to_ms: i64,
    ) -> StoreResult<Vec<String>> {
        let swaps = self.inner.swaps.read();
        let mut mints: Vec<String> = swaps
            .values()
            .filter(|e| e.timestamp >= from_ms && e.timestamp < to_ms)
            .map(|e| e.mint.clone())
            .collect();
        mints.sort();
        mints.dedup();
        Ok(mints)
    }

    async fn get_by_mint_time_range(
        &self,
        mint: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> StoreResult<Vec<SwapEvent>> {
        Ok(self
            .inner
            .swaps
            .read()
            .values()
            .filter(|e| e.mint == mint && e.timestamp >= from_ms && e.timestamp < to_ms)
            .cloned()
            .collect())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDITY EVENT STORE
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl LiquidityEventStore for MemoryStore {
    async fn insert(&self, event: &LiquidityEvent) -> StoreResult<()> {
        let mut liquidity = self.inner.liquidity.write();
        let key = liquidity_key(event);
        if liquidity.contains_key(&key) {
            return Err(StoreError::DuplicateKey);
        }
        liquidity.insert(key, event.clone());
        Ok(())
    }

    async fn insert_bulk(&self, batch: &[LiquidityEvent]) -> StoreResult<()> {
        let mut liquidity = self.inner.liquidity.write();
        if batch.iter().any(|e| liquidity.contains_key(&liquidity_key(e))) {
            return Err(StoreError::DuplicateKey);
        }
        for event in batch {
            liquidity.insert(liquidity_key(event), event.clone());
        }
        Ok(())
    }

    async fn get_by_mint_time_range(
        &self,
        mint: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> StoreResult<Vec<LiquidityEvent>> {
        Ok(self
            .inner
            .liquidity
            .read()
            .values()
            .filter(|e| e.mint == mint && e.timestamp >= from_ms && e.timestamp < to_ms)
            .cloned()
            .collect())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TOKEN METADATA STORE
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl TokenMetadataStore for MemoryStore {
    async fn insert(&self, metadata: &TokenMetadata) -> StoreResult<()> {
        let mut rows = self.inner.metadata.write();
        if rows.contains_key(&metadata.candidate_id) {
            return Err(StoreError::DuplicateKey);
        }
        rows.insert(metadata.candidate_id.clone(), metadata.clone());
        Ok(())
    }

    async fn get_by_candidate_id(&self, candidate_id: &str) -> StoreResult<Option<TokenMetadata>> {
        Ok(self.inner.metadata.read().get(candidate_id).cloned())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROGRESS STORE
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn load(&self) -> StoreResult<Option<DiscoveryProgress>> {
        Ok(self.inner.progress.read().clone())
    }

    async fn save(&self, progress: &DiscoveryProgress) -> StoreResult<()> {
        *self.inner.progress.write() = Some(progress.clone());
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
