//! Spike detector: ACTIVE_TOKEN candidates for mints whose last hour of
//! activity spikes against their own history.
//!
//! The detector is evaluation-driven: the runner invokes it at
//! `eval_timestamp = last_event_time_ms`, never at wall-clock time, so live
//! runs and replays see identical windows.
//!
//! # Normalization by available history
//!
//! A fixed 24-hour divisor would flag every young token, so per-hour
//! averages divide by the observed history clamped to `[1 h, 24 h]`, and a
//! mint with less than one hour of history is never evaluated.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::ports::store::{CandidateStore, LiquidityEventStore, SwapEventStore};
use crate::types::entities::{CandidateSource, TokenCandidate};
use crate::types::identity::candidate_id;

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// One hour in milliseconds.
pub const WINDOW_1H_MS: i64 = 3_600_000;

/// Twenty-four hours in milliseconds.
pub const WINDOW_24H_MS: i64 = 86_400_000;

/// Thresholds and windows for spike evaluation.
#[derive(Debug, Clone)]
pub struct SpikeConfig {
    /// Volume multiplier: the last hour must exceed `k_vol` times the
    /// per-hour volume average.
    pub k_vol: f64,

    /// Swap-count multiplier: the last hour must exceed `k_swaps` times the
    /// per-hour count average.
    pub k_swaps: f64,

    /// Short window (the "last hour").
    pub window_1h_ms: i64,

    /// History window (the lookback).
    pub window_24h_ms: i64,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            k_vol: 3.0,
            k_swaps: 5.0,
            window_1h_ms: WINDOW_1H_MS,
            window_24h_ms: WINDOW_24H_MS,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SPIKE DETECTOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Periodic scanner producing ACTIVE_TOKEN candidates.
pub struct SpikeDetector {
    config: SpikeConfig,
    swaps: Arc<dyn SwapEventStore>,
    candidates: Arc<dyn CandidateStore>,
    liquidity: Option<Arc<dyn LiquidityEventStore>>,
    /// Mints already resolved (candidate exists or was just emitted).
    seen_mints: RwLock<HashSet<String>>,
}

impl std::fmt::Debug for SpikeDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpikeDetector")
            .field("config", &self.config)
            .field("seen_mints", &self.seen_mints.read().len())
            .finish_non_exhaustive()
    }
}

impl SpikeDetector {
    /// Create a detector over the given stores.
    #[must_use]
    pub fn new(
        config: SpikeConfig,
        swaps: Arc<dyn SwapEventStore>,
        candidates: Arc<dyn CandidateStore>,
    ) -> Self {
        Self {
            config,
            swaps,
            candidates,
            liquidity: None,
            seen_mints: RwLock::new(HashSet::new()),
        }
    }

    /// Also evaluate liquidity flow (`amount_quote`) for mints whose swaps
    /// did not spike.
    #[must_use]
    pub fn with_liquidity_store(mut self, liquidity: Arc<dyn LiquidityEventStore>) -> Self {
        self.liquidity = Some(liquidity);
        self
    }

    /// Run one evaluation at `eval_ts` (milliseconds).
    ///
    /// Scans every mint active in `[eval_ts - 24 h, eval_ts)` and returns
    /// the candidates emitted this round.
    ///
    /// # Errors
    ///
    /// Returns an error when a store fails with anything other than the
    /// duplicate-key signal.
    #[instrument(skip(self), fields(eval_ts))]
    pub async fn detect(&self, eval_ts: i64) -> Result<Vec<TokenCandidate>> {
        let from = eval_ts - self.config.window_24h_ms;
        let mints = self.swaps.get_distinct_mints_by_time_range(from, eval_ts).await?;
        debug!(mints = mints.len(), eval_ts, "spike evaluation round");

        let mut emitted = Vec::new();
        for mint in mints {
            if self.seen_mints.read().contains(&mint) {
                continue;
            }
            if !self.candidates.get_by_mint(&mint).await?.is_empty() {
                self.seen_mints.write().insert(mint);
                continue;
            }

            let mut candidate = self.evaluate_swaps(&mint, eval_ts).await?;
            if candidate.is_none() {
                if let Some(liquidity) = &self.liquidity {
                    candidate = self.evaluate_liquidity(liquidity.as_ref(), &mint, eval_ts).await?;
                }
            }

            let Some(candidate) = candidate else {
                continue;
            };

            match self.candidates.insert(&candidate).await {
                Ok(()) => {
                    info!(
                        mint = %candidate.mint,
                        candidate_id = %candidate.candidate_id,
                        "activity spike detected"
                    );
                    self.seen_mints.write().insert(candidate.mint.clone());
                    emitted.push(candidate);
                }
                Err(e) if e.is_duplicate() => {
                    // A racing discoverer persisted this mint first.
                    debug!(mint = %candidate.mint, "spike candidate lost insert race");
                    self.seen_mints.write().insert(candidate.mint.clone());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(emitted)
    }

    /// Evaluate one mint's swap activity at `eval_ts`.
    async fn evaluate_swaps(&self, mint: &str, eval_ts: i64) -> Result<Option<TokenCandidate>> {
        let from = eval_ts - self.config.window_24h_ms;
        let events = self.swaps.get_by_mint_time_range(mint, from, eval_ts).await?;
        if events.is_empty() {
            return Ok(None);
        }

        let observations: Vec<Observation> = events
            .iter()
            .map(|e| Observation {
                timestamp: e.timestamp,
                amount: e.amount_out,
                slot: e.slot,
                tx_signature: e.tx_signature.clone(),
                event_index: e.event_index,
                pool: e.pool.clone(),
            })
            .collect();

        Ok(self.evaluate(mint, eval_ts, &observations))
    }

    /// Evaluate one mint's liquidity flow at `eval_ts`, keyed by mint
    /// because the candidate does not exist yet at discovery time.
    async fn evaluate_liquidity(
        &self,
        liquidity: &dyn LiquidityEventStore,
        mint: &str,
        eval_ts: i64,
    ) -> Result<Option<TokenCandidate>> {
        let from = eval_ts - self.config.window_24h_ms;
        let events = liquidity.get_by_mint_time_range(mint, from, eval_ts).await?;
        if events.is_empty() {
            return Ok(None);
        }

        let observations: Vec<Observation> = events
            .iter()
            .map(|e| Observation {
                timestamp: e.timestamp,
                amount: e.amount_quote,
                slot: e.slot,
                tx_signature: e.tx_signature.clone(),
                event_index: e.event_index,
                pool: e.pool.clone(),
            })
            .collect();

        Ok(self.evaluate(mint, eval_ts, &observations))
    }

    /// The shared spike test over either observation kind.
    fn evaluate(
        &self,
        mint: &str,
        eval_ts: i64,
        observations: &[Observation],
    ) -> Option<TokenCandidate> {
        let first_event_ms = observations.iter().map(|o| o.timestamp).min()?;
        let actual_history_ms = (eval_ts - first_event_ms).min(self.config.window_24h_ms);
        if actual_history_ms < self.config.window_1h_ms {
            // Too young for a meaningful average.
            return None;
        }
        let actual_hours = actual_history_ms as f64 / self.config.window_1h_ms as f64;

        let volume_total: f64 = observations.iter().map(|o| o.amount).sum();
        let count_total = observations.len() as f64;
        let volume_avg = volume_total / actual_hours;
        let count_avg = count_total / actual_hours;

        let cutoff = eval_ts - self.config.window_1h_ms;
        let volume_recent: f64 = observations
            .iter()
            .filter(|o| o.timestamp >= cutoff)
            .map(|o| o.amount)
            .sum();
        let count_recent = observations.iter().filter(|o| o.timestamp >= cutoff).count() as f64;

        let volume_spike = volume_recent > self.config.k_vol * volume_avg;
        let swaps_spike = count_recent > self.config.k_swaps * count_avg;
        if !volume_spike && !swaps_spike {
            return None;
        }

        // Triggering event: maximum timestamp within the recent window,
        // ties broken by ascending (slot, signature, index) so the
        // canonically-first event at the peak instant wins everywhere.
        let trigger = observations
            .iter()
            .filter(|o| o.timestamp >= cutoff)
            .fold(None::<&Observation>, |best, o| match best {
                None => Some(o),
                Some(b) if o.timestamp > b.timestamp => Some(o),
                Some(b) if o.timestamp == b.timestamp && o.order_key() < b.order_key() => Some(o),
                Some(b) => Some(b),
            })?;

        Some(TokenCandidate {
            candidate_id: candidate_id(
                mint,
                trigger.pool.as_deref(),
                CandidateSource::ActiveToken,
                &trigger.tx_signature,
                trigger.event_index,
                trigger.slot,
            ),
            source: CandidateSource::ActiveToken,
            mint: mint.into(),
            pool: trigger.pool.clone(),
            tx_signature: trigger.tx_signature.clone(),
            event_index: trigger.event_index,
            slot: trigger.slot,
            discovered_at: trigger.timestamp,
        })
    }
}

/// One event reduced to what spike evaluation needs.
struct Observation {
    timestamp: i64,
    amount: f64,
    slot: i64,
    tx_signature: String,
    event_index: i64,
    pool: Option<String>,
}

impl Observation {
    fn order_key(&self) -> (i64, &str, i64) {
        (self.slot, &self.tx_signature, self.event_index)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::ports::store::StoreResult;
    use crate::store::MemoryStore;
    use crate::types::events::SwapEvent;

    const HOUR: i64 = WINDOW_1H_MS;
    const DAY: i64 = WINDOW_24H_MS;

    fn swap(mint: &str, slot: i64, sig: &str, timestamp: i64, amount_out: f64) -> SwapEvent {
        SwapEvent {
            mint: mint.into(),
            pool: Some("Pool".into()),
            tx_signature: sig.into(),
            event_index: 0,
            slot,
            timestamp,
            amount_out,
        }
    }

    async fn store_with(events: Vec<SwapEvent>) -> MemoryStore {
        let store = MemoryStore::new();
        for event in &events {
            SwapEventStore::insert(&store, event).await.expect("insert failed");
        }
        store
    }

    fn detector(store: &MemoryStore) -> SpikeDetector {
        SpikeDetector::new(
            SpikeConfig::default(),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
        )
    }

    /// Uniform hourly baseline plus one large trade in the last hour.
    #[tokio::test]
    async fn uniform_baseline_with_burst_spikes() {
        let mut events: Vec<SwapEvent> = (0..24)
            .map(|i| swap("MintA", i, &format!("Sig{i:02}"), i * HOUR, 10.0))
            .collect();
        let t = DAY;
        events.push(swap("MintA", 99, "SigBurst", t - 1000, 100.0));

        let store = store_with(events).await;
        let candidates = detector(&store).detect(t).await.expect("detect failed");

        assert_eq!(candidates.len(), 1);
        let candidate = &candidates[0];
        assert_eq!(candidate.source, CandidateSource::ActiveToken);
        assert_eq!(candidate.mint, "MintA");
        assert_eq!(candidate.tx_signature, "SigBurst", "trigger is the peak-time event");
        // The detector persists its own candidates.
        let stored = store.get_by_mint("MintA").await.expect("query failed");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].candidate_id, candidate.candidate_id);
    }

    /// Uniform activity alone never spikes.
    #[tokio::test]
    async fn uniform_baseline_alone_is_quiet() {
        let events: Vec<SwapEvent> = (0..24)
            .map(|i| swap("MintA", i, &format!("Sig{i:02}"), i * HOUR, 10.0))
            .collect();
        let t = 23 * HOUR;

        let store = store_with(events).await;
        let candidates = detector(&store).detect(t).await.expect("detect failed");
        assert!(candidates.is_empty());
    }

    /// Two hours of history normalize the average; no false positive.
    #[tokio::test]
    async fn partial_history_prevents_false_positive() {
        let t = 3 * HOUR;
        let events = vec![
            swap("MintA", 1, "Sig1", t - 2 * HOUR, 10.0),
            swap("MintA", 2, "Sig2", t - HOUR - HOUR / 2, 5.0),
            swap("MintA", 3, "Sig3", t - 500, 100.0),
        ];
        // actual_hours = 2, volume_avg = 57.5, threshold = 172.5 > 100.

        let store = store_with(events).await;
        let candidates = detector(&store).detect(t).await.expect("detect failed");
        assert!(candidates.is_empty());
    }

    /// Less than one hour of history never produces a candidate.
    #[tokio::test]
    async fn short_history_is_never_evaluated() {
        let t = HOUR;
        let events = vec![
            swap("MintA", 1, "Sig1", t - HOUR / 2, 1.0),
            swap("MintA", 2, "Sig2", t - 1000, 1_000_000.0),
        ];

        let store = store_with(events).await;
        let candidates = detector(&store).detect(t).await.expect("detect failed");
        assert!(candidates.is_empty());
    }

    /// Boundary rule: an event at exactly `t` is outside the window, one at
    /// exactly `t - 24 h` is inside.
    #[tokio::test]
    async fn lookback_window_boundaries() {
        let t = 2 * DAY;
        let events = vec![
            swap("MintA", 1, "SigOld", t - DAY, 10.0), // included
            swap("MintA", 2, "SigMid", t - 2 * HOUR, 10.0),
            swap("MintA", 3, "SigNow", t, 1_000_000.0), // excluded
        ];

        let store = store_with(events).await;
        let candidates = detector(&store).detect(t).await.expect("detect failed");
        assert!(
            candidates.is_empty(),
            "the huge trade at exactly t must not be part of the window"
        );
    }

    /// A mint already discovered as NEW_TOKEN is never re-emitted.
    #[tokio::test]
    async fn existing_candidate_blocks_active_token() {
        let mut events: Vec<SwapEvent> = (0..24)
            .map(|i| swap("MintA", i, &format!("Sig{i:02}"), i * HOUR, 10.0))
            .collect();
        let t = DAY;
        events.push(swap("MintA", 99, "SigBurst", t - 1000, 100.0));
        let store = store_with(events).await;

        CandidateStore::insert(
            &store,
            &TokenCandidate {
                candidate_id: "existing".into(),
                source: CandidateSource::NewToken,
                mint: "MintA".into(),
                pool: None,
                tx_signature: "Sig00".into(),
                event_index: 0,
                slot: 0,
                discovered_at: 0,
            },
        )
        .await
        .expect("insert failed");

        let candidates = detector(&store).detect(t).await.expect("detect failed");
        assert!(candidates.is_empty());
    }

    /// Ties at the peak timestamp resolve to the canonically-first event.
    #[tokio::test]
    async fn trigger_tie_break_is_ascending() {
        let t = DAY;
        let peak = t - 1000;
        let mut events: Vec<SwapEvent> = (0..24)
            .map(|i| swap("MintA", i, &format!("Sig{i:02}"), i * HOUR, 10.0))
            .collect();
        // Three events share the peak instant; slot 50 < 60 < 70.
        events.push(swap("MintA", 70, "SigC", peak, 40.0));
        events.push(swap("MintA", 50, "SigA", peak, 40.0));
        events.push(swap("MintA", 60, "SigB", peak, 40.0));

        let store = store_with(events).await;
        let candidates = detector(&store).detect(t).await.expect("detect failed");

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].slot, 50);
        assert_eq!(candidates[0].tx_signature, "SigA");
    }

    /// The candidate id is reproducible from the trigger tuple.
    #[tokio::test]
    async fn candidate_id_matches_trigger_tuple() {
        let mut events: Vec<SwapEvent> = (0..24)
            .map(|i| swap("MintA", i, &format!("Sig{i:02}"), i * HOUR, 10.0))
            .collect();
        let t = DAY;
        events.push(swap("MintA", 777, "SigBurst", t - 1000, 100.0));

        let store = store_with(events).await;
        let candidates = detector(&store).detect(t).await.expect("detect failed");

        let candidate = &candidates[0];
        assert_eq!(
            candidate.candidate_id,
            candidate_id(
                "MintA",
                Some("Pool"),
                CandidateSource::ActiveToken,
                "SigBurst",
                0,
                777
            )
        );
    }

    /// Re-detection within one process is suppressed by the seen cache.
    #[tokio::test]
    async fn second_round_is_suppressed() {
        let mut events: Vec<SwapEvent> = (0..24)
            .map(|i| swap("MintA", i, &format!("Sig{i:02}"), i * HOUR, 10.0))
            .collect();
        let t = DAY;
        events.push(swap("MintA", 99, "SigBurst", t - 1000, 100.0));

        let store = store_with(events).await;
        let spike = detector(&store);

        let first = spike.detect(t).await.expect("detect failed");
        assert_eq!(first.len(), 1);
        let second = spike.detect(t).await.expect("detect failed");
        assert!(second.is_empty());
    }

    /// Store failures other than duplicates surface.
    #[tokio::test]
    async fn store_error_propagates() {
        struct FailingCandidates;

        #[async_trait::async_trait]
        impl CandidateStore for FailingCandidates {
            async fn insert(&self, _c: &TokenCandidate) -> StoreResult<()> {
                Err(StoreError::Storage("down".into()))
            }
            async fn insert_bulk(&self, _c: &[TokenCandidate]) -> StoreResult<()> {
                Err(StoreError::Storage("down".into()))
            }
            async fn get_by_id(&self, _id: &str) -> StoreResult<Option<TokenCandidate>> {
                Err(StoreError::Storage("down".into()))
            }
            async fn get_by_mint(&self, _mint: &str) -> StoreResult<Vec<TokenCandidate>> {
                Err(StoreError::Storage("down".into()))
            }
            async fn earliest_for_mint(
                &self,
                _mint: &str,
            ) -> StoreResult<Option<TokenCandidate>> {
                Err(StoreError::Storage("down".into()))
            }
        }

        let store = store_with(vec![swap("MintA", 1, "Sig1", HOUR, 1.0)]).await;
        let spike = SpikeDetector::new(
            SpikeConfig::default(),
            Arc::new(store),
            Arc::new(FailingCandidates),
        );

        assert!(spike.detect(2 * HOUR).await.is_err());
    }
}
