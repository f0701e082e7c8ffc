//! First-sight detector: one NEW_TOKEN candidate per newly observed mint.
//!
//! The in-memory seen-set is an optimization; correctness rests on the
//! candidate store's per-mint uniqueness check plus the duplicate-key
//! insert race. On restart the set may be rehydrated from a persisted
//! progress row, and its absence costs only extra store lookups.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::ports::store::CandidateStore;
use crate::types::entities::{CandidateSource, TokenCandidate};
use crate::types::events::SwapEvent;
use crate::types::identity::candidate_id;

// ═══════════════════════════════════════════════════════════════════════════════
// FIRST-SIGHT DETECTOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Emits a candidate the first time a token mint is observed trading.
///
/// The seen-set is guarded by a reader/writer lock: reads happen on every
/// swap, writes only when a mint graduates. Metadata enrichment and spike
/// detection may consult the candidate store from other workers while this
/// detector runs, which is exactly the race the duplicate-key fallback
/// absorbs.
pub struct FirstSightDetector {
    seen_mints: RwLock<HashSet<String>>,
    candidates: Arc<dyn CandidateStore>,
}

impl std::fmt::Debug for FirstSightDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirstSightDetector")
            .field("seen_mints", &self.seen_mints.read().len())
            .finish_non_exhaustive()
    }
}

impl FirstSightDetector {
    /// Create a detector over a candidate store.
    #[must_use]
    pub fn new(candidates: Arc<dyn CandidateStore>) -> Self {
        Self {
            seen_mints: RwLock::new(HashSet::new()),
            candidates,
        }
    }

    /// Pre-populate the seen-set, typically from a progress checkpoint.
    pub fn hydrate<I>(&self, mints: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.seen_mints.write().extend(mints);
    }

    /// Number of mints currently marked seen.
    #[must_use]
    pub fn seen_count(&self) -> usize {
        self.seen_mints.read().len()
    }

    /// Snapshot of the seen-set, for checkpointing.
    #[must_use]
    pub fn seen_mints(&self) -> Vec<String> {
        self.seen_mints.read().iter().cloned().collect()
    }

    /// Process one swap in canonical stream order.
    ///
    /// Returns the new candidate when this is the first sighting of the
    /// mint, `None` otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error when the candidate store fails with anything other
    /// than the duplicate-key signal.
    #[instrument(skip(self, event), fields(mint = %event.mint, slot = event.slot))]
    pub async fn process(&self, event: &SwapEvent) -> Result<Option<TokenCandidate>> {
        if self.seen_mints.read().contains(&event.mint) {
            return Ok(None);
        }

        // Not in the cache; the store decides. Another worker (or an
        // earlier run) may already hold a candidate for this mint.
        if !self.candidates.get_by_mint(&event.mint).await?.is_empty() {
            self.seen_mints.write().insert(event.mint.clone());
            return Ok(None);
        }

        let candidate = TokenCandidate {
            candidate_id: candidate_id(
                &event.mint,
                event.pool.as_deref(),
                CandidateSource::NewToken,
                &event.tx_signature,
                event.event_index,
                event.slot,
            ),
            source: CandidateSource::NewToken,
            mint: event.mint.clone(),
            pool: event.pool.clone(),
            tx_signature: event.tx_signature.clone(),
            event_index: event.event_index,
            slot: event.slot,
            discovered_at: event.timestamp,
        };

        match self.candidates.insert(&candidate).await {
            Ok(()) => {
                self.seen_mints.write().insert(event.mint.clone());
                Ok(Some(candidate))
            }
            Err(e) if e.is_duplicate() => {
                // A concurrent worker raced ahead; theirs stands.
                debug!(mint = %event.mint, "lost candidate insert race");
                self.seen_mints.write().insert(event.mint.clone());
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Process a batch of swaps deterministically.
    ///
    /// Events are first sorted by the canonical
    /// `(slot, tx_signature, event_index)` order, so the produced candidate
    /// set does not depend on the caller's arrival order.
    ///
    /// # Errors
    ///
    /// Returns the first store error encountered.
    pub async fn process_events(
        &self,
        mut events: Vec<SwapEvent>,
    ) -> Result<Vec<TokenCandidate>> {
        events.sort_by(|a, b| {
            a.slot
                .cmp(&b.slot)
                .then_with(|| a.tx_signature.cmp(&b.tx_signature))
                .then_with(|| a.event_index.cmp(&b.event_index))
        });

        let mut candidates = Vec::new();
        for event in &events {
            if let Some(candidate) = self.process(event).await? {
                candidates.push(candidate);
            }
        }
        Ok(candidates)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
