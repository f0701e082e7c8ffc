//! Live push sources over `logsSubscribe`.
//!
//! For each configured program an independent subscription is opened; a
//! fan-in forwarder task merges the per-program streams into one channel.
//! Each notification is reconciled against the authoritative transaction:
//!
//! 1. Notifications for failed transactions are discarded.
//! 2. The full transaction is fetched (with the wire client's retry).
//! 3. The canonical timestamp is `blockTime × 1000`, falling back to
//!    `getBlockTime(slot) × 1000` through a small slot cache.
//! 4. The dialect parser runs over the logs plus the full account-key
//!    vector.
//!
//! When the fetch fails, a dialect that needs the transaction (the AMM)
//! logs a warning and drops the event; the log-only bonding-curve dialect
//! still emits what it can from the notification's own logs.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache as MokaCache;
use scout_rpc::{LogNotification, PushClient, RpcClient};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{AppError, Result};
use crate::parsers::{DexEvent, DexParser, ParserRegistry, TxContext};
use crate::ports::store::CandidateStore;
use crate::types::events::{LiquidityEvent, SwapEvent};

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Capacity of the merged notification channel.
const MERGED_CHANNEL_CAPACITY: usize = 10_000;

/// Maximum number of slot→time entries to cache.
const BLOCK_TIME_CACHE_CAPACITY: u64 = 10_000;

/// Time-to-live for cached block times. Slot times are immutable, the TTL
/// only bounds memory.
const BLOCK_TIME_CACHE_TTL: Duration = Duration::from_secs(3600);

// ═══════════════════════════════════════════════════════════════════════════════
// SHARED INGEST CORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Subscription, reconciliation, and decoding shared by both push sources.
struct IngestCore {
    rpc: Arc<RpcClient>,
    push: Arc<PushClient>,
    registry: Arc<ParserRegistry>,
    programs: Vec<String>,
    block_time_cache: MokaCache<i64, i64>,
}

impl IngestCore {
    fn new(
        rpc: Arc<RpcClient>,
        push: Arc<PushClient>,
        registry: Arc<ParserRegistry>,
        programs: Vec<String>,
    ) -> Self {
        let block_time_cache = MokaCache::builder()
            .max_capacity(BLOCK_TIME_CACHE_CAPACITY)
            .time_to_live(BLOCK_TIME_CACHE_TTL)
            .build();
        Self {
            rpc,
            push,
            registry,
            programs,
            block_time_cache,
        }
    }

    /// Open one subscription per program and merge them. Each subscription
    /// gets its own forwarder task tagging notifications with the program.
    async fn subscribe_all(&self) -> Result<mpsc::Receiver<(String, LogNotification)>> {
        let (merged_tx, merged_rx) = mpsc::channel(MERGED_CHANNEL_CAPACITY);

        for program in &self.programs {
            let mut stream = self
                .push
                .subscribe_logs(std::slice::from_ref(program))
                .await
                .map_err(|e| AppError::Subscription(format!("{program}: {e}")))?;
            info!(program = %program, "push subscription established");

            let forward = merged_tx.clone();
            let program = program.clone();
            tokio::spawn(async move {
                while let Some(notification) = stream.recv().await {
                    if forward.send((program.clone(), notification)).await.is_err() {
                        break;
                    }
                }
                debug!(program = %program, "forwarder stopped");
            });
        }

        Ok(merged_rx)
    }

    /// Reconcile one notification and decode its events.
    async fn decode(&self, program: &str, notification: &LogNotification) -> Result<Vec<DexEvent>> {
        if notification.err.is_some() {
            debug!(signature = %notification.signature, "failed transaction, skipping");
            return Ok(Vec::new());
        }
        let Some(parser) = self.registry.get(program) else {
            warn!(program, "notification for unregistered program");
            return Ok(Vec::new());
        };

        match self.rpc.get_transaction(&notification.signature).await {
            Ok(Some(tx)) => {
                if tx.is_failed() {
                    return Ok(Vec::new());
                }
                let timestamp_ms = self.canonical_timestamp(tx.block_time, tx.slot).await;
                let account_keys = tx.account_keys();
                let context = TxContext {
                    signature: &notification.signature,
                    slot: tx.slot,
                    timestamp_ms,
                    logs: tx.logs(),
                    account_keys: &account_keys,
                    token_balances: tx.token_balances(),
                };
                Ok(parser.parse(&context))
            }
            Ok(None) => {
                debug!(signature = %notification.signature, "transaction not found yet");
                self.decode_from_logs(parser.as_ref(), notification).await
            }
            Err(e) => {
                warn!(
                    signature = %notification.signature,
                    error = %e,
                    "transaction fetch failed"
                );
                metrics::counter!("transaction_fetch_failures_total").increment(1);
                self.decode_from_logs(parser.as_ref(), notification).await
            }
        }
    }

    /// Degraded path without the authoritative transaction.
    async fn decode_from_logs(
        &self,
        parser: &dyn DexParser,
        notification: &LogNotification,
    ) -> Result<Vec<DexEvent>> {
        if parser.requires_transaction() {
            warn!(
                signature = %notification.signature,
                program = parser.program_id(),
                "dropping event, dialect needs the full transaction"
            );
            metrics::counter!("dropped_events_total", "reason" => "no_transaction").increment(1);
            return Ok(Vec::new());
        }

        let timestamp_ms = self.canonical_timestamp(None, notification.slot).await;
        let context = TxContext {
            signature: &notification.signature,
            slot: notification.slot,
            timestamp_ms,
            logs: &notification.logs,
            account_keys: &[],
            token_balances: &[],
        };
        Ok(parser.parse(&context))
    }

    /// `blockTime × 1000`, else `getBlockTime(slot) × 1000` through the
    /// cache, else zero (stamped unknown, never wall clock).
    async fn canonical_timestamp(&self, block_time: Option<i64>, slot: i64) -> i64 {
        if let Some(seconds) = block_time {
            return seconds * 1000;
        }
        if let Some(cached) = self.block_time_cache.get(&slot).await {
            return cached;
        }
        match self.rpc.get_block_time(slot).await {
            Ok(Some(seconds)) => {
                let ms = seconds * 1000;
                self.block_time_cache.insert(slot, ms).await;
                ms
            }
            Ok(None) => {
                warn!(slot, "no block time known for slot");
                0
            }
            Err(e) => {
                warn!(slot, error = %e, "block time fetch failed");
                0
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PUSH SWAP SOURCE
// ═══════════════════════════════════════════════════════════════════════════════

/// Live swap stream over one dedicated push connection.
pub struct PushSwapSource {
    core: IngestCore,
}

impl std::fmt::Debug for PushSwapSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushSwapSource")
            .field("programs", &self.core.programs)
            .finish_non_exhaustive()
    }
}

impl PushSwapSource {
    /// Create a swap source over its wire clients and parser registry.
    #[must_use]
    pub fn new(
        rpc: Arc<RpcClient>,
        push: Arc<PushClient>,
        registry: Arc<ParserRegistry>,
        programs: Vec<String>,
    ) -> Self {
        Self {
            core: IngestCore::new(rpc, push, registry, programs),
        }
    }

    /// Subscribe and pump decoded swap events into `out` until cancellation
    /// or until the push client closes.
    ///
    /// # Errors
    ///
    /// Returns an error when a subscription cannot be established or the
    /// output channel closes while events are still flowing.
    #[instrument(skip_all)]
    pub async fn run(self, out: mpsc::Sender<SwapEvent>, cancel: CancellationToken) -> Result<()> {
        let mut merged = self.core.subscribe_all().await?;

        loop {
            let (program, notification) = tokio::select! {
                () = cancel.cancelled() => {
                    info!("swap source stopping");
                    return Ok(());
                }
                next = merged.recv() => match next {
                    Some(item) => item,
                    None => {
                        warn!("all swap subscriptions ended");
                        return Ok(());
                    }
                },
            };

            for event in self.core.decode(&program, &notification).await? {
                if let DexEvent::Swap(swap) = event {
                    out.send(swap)
                        .await
                        .map_err(|_| AppError::ChannelClosed("swap output".into()))?;
                }
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PUSH LIQUIDITY SOURCE
// ═══════════════════════════════════════════════════════════════════════════════

/// Live liquidity stream over its own dedicated push connection.
pub struct PushLiquiditySource {
    core: IngestCore,
    candidates: Option<Arc<dyn CandidateStore>>,
}

impl std::fmt::Debug for PushLiquiditySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushLiquiditySource")
            .field("programs", &self.core.programs)
            .field("resolves_candidates", &self.candidates.is_some())
            .finish_non_exhaustive()
    }
}

impl PushLiquiditySource {
    /// Create a liquidity source over its wire clients and parser registry.
    #[must_use]
    pub fn new(
        rpc: Arc<RpcClient>,
        push: Arc<PushClient>,
        registry: Arc<ParserRegistry>,
        programs: Vec<String>,
    ) -> Self {
        Self {
            core: IngestCore::new(rpc, push, registry, programs),
            candidates: None,
        }
    }

    /// Resolve `candidate_id` on emitted events through the candidate store
    /// (earliest-discovered candidate for the mint).
    #[must_use]
    pub fn with_candidate_store(mut self, candidates: Arc<dyn CandidateStore>) -> Self {
        self.candidates = Some(candidates);
        self
    }

    /// Subscribe and pump decoded liquidity events into `out` until
    /// cancellation or until the push client closes.
    ///
    /// # Errors
    ///
    /// Returns an error when a subscription cannot be established or the
    /// output channel closes while events are still flowing.
    #[instrument(skip_all)]
    pub async fn run(
        self,
        out: mpsc::Sender<LiquidityEvent>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut merged = self.core.subscribe_all().await?;

        loop {
            let (program, notification) = tokio::select! {
                () = cancel.cancelled() => {
                    info!("liquidity source stopping");
                    return Ok(());
                }
                next = merged.recv() => match next {
                    Some(item) => item,
                    None => {
                        warn!("all liquidity subscriptions ended");
                        return Ok(());
                    }
                },
            };

            for event in self.core.decode(&program, &notification).await? {
                let DexEvent::Liquidity(mut liquidity) = event else {
                    continue;
                };

                // An event identifying neither a mint nor a pool cannot be
                // associated with anything downstream.
                if liquidity.mint.is_empty() && liquidity.pool.is_none() {
                    debug!(signature = %liquidity.tx_signature, "unidentifiable liquidity event");
                    continue;
                }

                if let Some(candidates) = &self.candidates {
                    if !liquidity.mint.is_empty() {
                        liquidity.candidate_id = candidates
                            .earliest_for_mint(&liquidity.mint)
                            .await?
                            .map(|c| c.candidate_id);
                    }
                }

                out.send(liquidity)
                    .await
                    .map_err(|_| AppError::ChannelClosed("liquidity output".into()))?;
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::parsers::curve::CurveLogParser;

    const CURVE_PROGRAM: &str = "CurveProg1111111111111111111111111111111111";

    fn registry() -> Arc<ParserRegistry> {
        let mut registry = ParserRegistry::new();
        registry.register(Arc::new(CurveLogParser::new(CURVE_PROGRAM)));
        Arc::new(registry)
    }

    fn notification(signature: &str, slot: i64, logs: Vec<String>) -> LogNotification {
        LogNotification {
            slot,
            signature: signature.into(),
            err: None,
            logs,
        }
    }

    fn curve_logs() -> Vec<String> {
        vec![
            format!("Program {CURVE_PROGRAM} invoke [1]"),
            "Program log: mint=MintFromLogs".to_string(),
            "Program log: Instruction: Buy".to_string(),
            format!("Program {CURVE_PROGRAM} success"),
        ]
    }

    async fn core_against(server: &MockServer) -> IngestCore {
        let rpc = Arc::new(RpcClient::new(server.uri()).expect("client failed"));
        let push = Arc::new(
            PushClient::connect("ws://127.0.0.1:1", scout_rpc::PushConfig::default())
                .expect("push client failed"),
        );
        IngestCore::new(rpc, push, registry(), vec![CURVE_PROGRAM.into()])
    }

    #[tokio::test]
    async fn failed_transactions_are_discarded() {
        let server = MockServer::start().await;
        let core = core_against(&server).await;

        let mut failed = notification("Sig", 5, curve_logs());
        failed.err = Some(serde_json::json!({"InstructionError": [0, "Custom"]}));

        let events = core.decode(CURVE_PROGRAM, &failed).await.expect("decode failed");
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn fetched_transaction_supplies_the_timestamp() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(serde_json::json!({"method": "getTransaction"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 1,
                "result": {
                    "slot": 5,
                    "blockTime": 1_700_000_000,
                    "meta": {
                        "err": null,
                        "logMessages": curve_logs_json(),
                        "preTokenBalances": [],
                        "postTokenBalances": []
                    },
                    "transaction": {
                        "signatures": ["Sig"],
                        "message": {"accountKeys": ["Key0"]}
                    }
                }
            })))
            .mount(&server)
            .await;

        let core = core_against(&server).await;
        let events = core
            .decode(CURVE_PROGRAM, &notification("Sig", 5, vec![]))
            .await
            .expect("decode failed");

        assert_eq!(events.len(), 1);
        let DexEvent::Swap(swap) = &events[0] else {
            panic!("expected swap");
        };
        assert_eq!(swap.mint, "MintFromLogs");
        assert_eq!(swap.timestamp, 1_700_000_000_000, "blockTime seconds × 1000");
    }

    fn curve_logs_json() -> serde_json::Value {
        serde_json::json!([
            format!("Program {CURVE_PROGRAM} invoke [1]"),
            "Program log: mint=MintFromLogs",
            "Program log: Instruction: Buy",
            format!("Program {CURVE_PROGRAM} success"),
        ])
    }

    #[tokio::test]
    async fn log_only_dialect_survives_missing_transaction() {
        let server = MockServer::start().await;
        // getTransaction unknown, getBlockTime supplies the fallback stamp.
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(serde_json::json!({"method": "getTransaction"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 1, "result": null
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(serde_json::json!({"method": "getBlockTime"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 1, "result": 1_600_000_000
            })))
            .mount(&server)
            .await;

        let core = core_against(&server).await;
        let events = core
            .decode(CURVE_PROGRAM, &notification("Sig", 9, curve_logs()))
            .await
            .expect("decode failed");

        assert_eq!(events.len(), 1);
        let DexEvent::Swap(swap) = &events[0] else {
            panic!("expected swap");
        };
        assert_eq!(swap.slot, 9, "slot comes from the notification");
        assert_eq!(swap.timestamp, 1_600_000_000_000, "getBlockTime fallback");
    }

    #[tokio::test]
    async fn transaction_needing_dialect_is_dropped_without_fetch() {
        use crate::parsers::amm::AmmLogParser;

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 1, "result": null
            })))
            .mount(&server)
            .await;

        let rpc = Arc::new(RpcClient::new(server.uri()).expect("client failed"));
        let push = Arc::new(
            PushClient::connect("ws://127.0.0.1:1", scout_rpc::PushConfig::default())
                .expect("push client failed"),
        );
        let mut amm_registry = ParserRegistry::new();
        amm_registry.register(Arc::new(
            AmmLogParser::new("AmmProg", "So11111111111111111111111111111111111111112")
                .expect("parser failed"),
        ));
        let core = IngestCore::new(rpc, push, Arc::new(amm_registry), vec!["AmmProg".into()]);

        let events = core
            .decode("AmmProg", &notification("Sig", 5, vec!["anything".into()]))
            .await
            .expect("decode failed");
        assert!(events.is_empty(), "AMM events without the transaction are dropped");
    }
}
