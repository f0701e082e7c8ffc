//! The ordering pipeline: slot-buffered, lag-windowed, deterministic.
//!
//! The runner is the coordinator between the push sources and the
//! detectors. It buffers arriving events per slot, tracks the highest slot
//! observed, and only emits a slot once it is at least `lag_window_slots`
//! behind the head ("finalized"). Within a slot, events are emitted in
//! `(tx_signature ASC, event_index ASC)` order, which together with the
//! ascending slot drain yields the canonical total order downstream
//! detectors rely on.
//!
//! # Concurrency model
//!
//! The event loop is cooperative and single-threaded: exactly one task
//! selects over the swap stream, the liquidity stream, the wall-clock flush
//! ticker, and the detection ticker, and owns all buffer state. No locks
//! guard the buffers.
//!
//! ```text
//!  swap stream ──┐                            ┌──▶ swap store
//!                ├──▶ per-slot buffers ──drain┤
//!  liq stream  ──┘      (lag window)          ├──▶ first-sight detector
//!  flush tick  ───────────▶ drain             └──▶ liquidity store
//!  detect tick ───────────▶ spike detector over storage
//! ```
//!
//! # Arrival semantics
//!
//! 1. Every event is appended to its slot's buffer.
//! 2. A slot above the previous head advances the head and triggers a
//!    drain of everything at or below the new finalization horizon.
//! 3. A "late" event for a slot already past the horizon is processed
//!    immediately and singly; its slot was drained long ago.
//!
//! On shutdown the lag window is ignored and every buffered slot drains in
//! order: late data may be incomplete, but nothing in flight is lost.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::detectors::{FirstSightDetector, SpikeDetector};
use crate::error::{Result, absorb_duplicate};
use crate::metadata::MetadataEnricher;
use crate::ports::store::{LiquidityEventStore, ProgressStore, SwapEventStore};
use crate::types::entities::DiscoveryProgress;
use crate::types::events::{LiquidityEvent, SwapEvent};

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Slots a slot must trail the head before it is finalized.
    pub lag_window_slots: i64,

    /// Wall-clock drain cadence, so idle streams still make progress.
    pub flush_interval: Duration,

    /// Spike detection cadence.
    pub detection_interval: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            lag_window_slots: 5,
            flush_interval: Duration::from_secs(5),
            detection_interval: Duration::from_secs(3600),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RUNNER
// ═══════════════════════════════════════════════════════════════════════════════

/// The slot-buffered ordering pipeline.
pub struct Runner {
    config: RunnerConfig,

    // Buffer state; owned exclusively by the event loop.
    swap_buffer: BTreeMap<i64, Vec<SwapEvent>>,
    liq_buffer: BTreeMap<i64, Vec<LiquidityEvent>>,
    highest_slot: i64,
    last_event_time_ms: i64,
    last_processed: Option<(i64, String)>,

    // Collaborators.
    swap_store: Arc<dyn SwapEventStore>,
    liquidity_store: Arc<dyn LiquidityEventStore>,
    first_sight: Arc<FirstSightDetector>,
    spike: Arc<SpikeDetector>,
    enricher: Option<Arc<MetadataEnricher>>,
    progress: Option<Arc<dyn ProgressStore>>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("config", &self.config)
            .field("buffered_swap_slots", &self.swap_buffer.len())
            .field("buffered_liq_slots", &self.liq_buffer.len())
            .field("highest_slot", &self.highest_slot)
            .finish_non_exhaustive()
    }
}

impl Runner {
    /// Create a runner over its stores and detectors.
    #[must_use]
    pub fn new(
        config: RunnerConfig,
        swap_store: Arc<dyn SwapEventStore>,
        liquidity_store: Arc<dyn LiquidityEventStore>,
        first_sight: Arc<FirstSightDetector>,
        spike: Arc<SpikeDetector>,
    ) -> Self {
        Self {
            config,
            swap_buffer: BTreeMap::new(),
            liq_buffer: BTreeMap::new(),
            highest_slot: -1,
            last_event_time_ms: 0,
            last_processed: None,
            swap_store,
            liquidity_store,
            first_sight,
            spike,
            enricher: None,
            progress: None,
        }
    }

    /// Attach metadata enrichment, fired for every new candidate.
    #[must_use]
    pub fn with_enricher(mut self, enricher: Arc<MetadataEnricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Attach a progress store for resumability checkpoints.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressStore>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Rehydrate the first-sight seen-cache from a saved checkpoint.
    ///
    /// A missing or empty checkpoint is fine; correctness never depends on
    /// it.
    pub async fn restore_progress(&self) {
        let Some(progress) = &self.progress else {
            return;
        };
        match progress.load().await {
            Ok(Some(checkpoint)) => {
                info!(
                    slot = checkpoint.slot,
                    seen = checkpoint.seen_mints.len(),
                    "restored discovery progress"
                );
                self.first_sight.hydrate(checkpoint.seen_mints);
            }
            Ok(None) => debug!("no saved progress"),
            Err(e) => warn!(error = %e, "progress restore failed, starting cold"),
        }
    }

    /// Run the event loop until cancellation or until both input streams
    /// end. On exit every buffered slot is drained in order.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error (store or detector failure). Duplicate
    /// keys, parse misses, and enrichment failures are counted and logged,
    /// never returned.
    #[instrument(skip_all)]
    pub async fn run(
        mut self,
        mut swap_rx: mpsc::Receiver<SwapEvent>,
        mut liq_rx: mpsc::Receiver<LiquidityEvent>,
        cancel: CancellationToken,
    ) -> Result<()> {
        info!(
            lag = self.config.lag_window_slots,
            flush_interval = ?self.config.flush_interval,
            detection_interval = ?self.config.detection_interval,
            "runner started"
        );

        let mut flush = interval_at(
            Instant::now() + self.config.flush_interval,
            self.config.flush_interval,
        );
        flush.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut detection = interval_at(
            Instant::now() + self.config.detection_interval,
            self.config.detection_interval,
        );
        detection.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut swap_open = true;
        let mut liq_open = true;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("shutdown requested, draining buffers");
                    self.flush_all().await?;
                    self.checkpoint().await;
                    return Ok(());
                }

                event = swap_rx.recv(), if swap_open => match event {
                    Some(event) => self.on_swap(event).await?,
                    None => {
                        warn!("swap stream ended");
                        swap_open = false;
                    }
                },

                event = liq_rx.recv(), if liq_open => match event {
                    Some(event) => self.on_liquidity(event).await?,
                    None => {
                        warn!("liquidity stream ended");
                        liq_open = false;
                    }
                },

                _ = flush.tick() => self.drain().await?,

                _ = detection.tick() => self.run_detection().await?,
            }

            if !swap_open && !liq_open {
                warn!("both streams ended, draining and exiting");
                self.flush_all().await?;
                self.checkpoint().await;
                return Ok(());
            }
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // ARRIVAL
    // ───────────────────────────────────────────────────────────────────────────

    async fn on_swap(&mut self, event: SwapEvent) -> Result<()> {
        let slot = event.slot;
        self.swap_buffer.entry(slot).or_default().push(event);
        self.observe_slot(slot).await
    }

    async fn on_liquidity(&mut self, event: LiquidityEvent) -> Result<()> {
        let slot = event.slot;
        self.liq_buffer.entry(slot).or_default().push(event);
        self.observe_slot(slot).await
    }

    async fn observe_slot(&mut self, slot: i64) -> Result<()> {
        if slot > self.highest_slot {
            self.highest_slot = slot;
            return self.drain().await;
        }
        if slot <= self.highest_slot - self.config.lag_window_slots {
            // Late arrival for an already-finalized slot: its cohort has
            // been emitted, so this one goes through immediately and singly.
            debug!(slot, highest = self.highest_slot, "late event past the horizon");
            metrics::counter!("late_events_total").increment(1);
            return self.process_slot(slot).await;
        }
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────────
    // DRAIN
    // ───────────────────────────────────────────────────────────────────────────

    /// Emit every buffered slot at or below the finalization horizon, in
    /// ascending slot order.
    async fn drain(&mut self) -> Result<()> {
        if self.highest_slot < 0 {
            return Ok(());
        }
        let finalized = self.highest_slot - self.config.lag_window_slots;

        let ready: BTreeSet<i64> = self
            .swap_buffer
            .range(..=finalized)
            .map(|(slot, _)| *slot)
            .chain(self.liq_buffer.range(..=finalized).map(|(slot, _)| *slot))
            .collect();

        for slot in ready {
            self.process_slot(slot).await?;
        }
        self.checkpoint().await;
        Ok(())
    }

    /// Drain everything regardless of the lag window. Shutdown path.
    async fn flush_all(&mut self) -> Result<()> {
        let all: BTreeSet<i64> = self
            .swap_buffer
            .keys()
            .copied()
            .chain(self.liq_buffer.keys().copied())
            .collect();

        for slot in all {
            self.process_slot(slot).await?;
        }
        Ok(())
    }

    /// Emit one slot: swaps first, then liquidity, each sorted stably by
    /// `(tx_signature, event_index)`.
    async fn process_slot(&mut self, slot: i64) -> Result<()> {
        if let Some(mut events) = self.swap_buffer.remove(&slot) {
            events.sort_by(|a, b| {
                a.tx_signature
                    .cmp(&b.tx_signature)
                    .then_with(|| a.event_index.cmp(&b.event_index))
            });
            for event in events {
                self.handle_swap(event).await?;
            }
        }

        if let Some(mut events) = self.liq_buffer.remove(&slot) {
            events.sort_by(|a, b| {
                a.tx_signature
                    .cmp(&b.tx_signature)
                    .then_with(|| a.event_index.cmp(&b.event_index))
            });
            for event in events {
                self.handle_liquidity(event).await?;
            }
        }

        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────────
    // HANDLERS
    // ───────────────────────────────────────────────────────────────────────────

    async fn handle_swap(&mut self, event: SwapEvent) -> Result<()> {
        self.last_event_time_ms = self.last_event_time_ms.max(event.timestamp);

        if !absorb_duplicate(self.swap_store.insert(&event).await)? {
            metrics::counter!("duplicate_events_total", "kind" => "swap").increment(1);
        }

        if let Some(candidate) = self.first_sight.process(&event).await? {
            info!(
                mint = %candidate.mint,
                candidate_id = %candidate.candidate_id,
                slot = candidate.slot,
                "new token discovered"
            );
            self.enrich(&candidate).await;
        }

        self.last_processed = Some((event.slot, event.tx_signature));
        Ok(())
    }

    async fn handle_liquidity(&mut self, event: LiquidityEvent) -> Result<()> {
        if !absorb_duplicate(self.liquidity_store.insert(&event).await)? {
            metrics::counter!("duplicate_events_total", "kind" => "liquidity").increment(1);
        }
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────────
    // DETECTION & ENRICHMENT
    // ───────────────────────────────────────────────────────────────────────────

    async fn run_detection(&mut self) -> Result<()> {
        // Never evaluated against wall-clock time: replays with the same
        // events must see the same windows. No events yet means no clock.
        if self.last_event_time_ms <= 0 {
            debug!("no events seen yet, skipping spike detection");
            return Ok(());
        }

        let candidates = self.spike.detect(self.last_event_time_ms).await?;
        for candidate in &candidates {
            self.enrich(candidate).await;
        }
        Ok(())
    }

    /// Best-effort: the candidate is already committed, so a failed fetch
    /// only costs the metadata row.
    async fn enrich(&self, candidate: &crate::types::entities::TokenCandidate) {
        let Some(enricher) = &self.enricher else {
            return;
        };
        if let Err(e) = enricher.enrich(candidate).await {
            warn!(mint = %candidate.mint, error = %e, "metadata enrichment failed");
            metrics::counter!("enrichment_failures_total").increment(1);
        }
    }

    async fn checkpoint(&self) {
        let (Some(progress), Some((slot, tx_signature))) = (&self.progress, &self.last_processed)
        else {
            return;
        };
        let checkpoint = DiscoveryProgress {
            slot: *slot,
            tx_signature: tx_signature.clone(),
            seen_mints: self.first_sight.seen_mints(),
        };
        if let Err(e) = progress.save(&checkpoint).await {
            warn!(error = %e, "progress checkpoint failed");
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
