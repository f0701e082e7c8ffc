//! Historical (pull) source: paginate signatures for a time window.
//!
//! Walks `getSignaturesForAddress` pages backward in time with the node's
//! maximum page size, converts each signature's block time from seconds to
//! milliseconds, skips failed transactions, fetches and parses the rest,
//! and accumulates the decoded events in canonical order.
//!
//! Pagination terminates once a page's last (oldest) signature sits at or
//! before the window start: everything on later pages is older still.
//! Events stamped exactly at the window start are collected before the
//! loop stops (left-inclusive window).

use std::sync::Arc;

use scout_rpc::{RpcClient, SignaturesQuery};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::parsers::{DexEvent, ParserRegistry, TxContext};

/// Node-side maximum page size for signature listings.
const SIGNATURE_PAGE_LIMIT: usize = 1000;

// ═══════════════════════════════════════════════════════════════════════════════
// BACKFILL SOURCE
// ═══════════════════════════════════════════════════════════════════════════════

/// Pull source over the request/response client.
pub struct BackfillSource {
    rpc: Arc<RpcClient>,
    registry: Arc<ParserRegistry>,
}

impl std::fmt::Debug for BackfillSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackfillSource").finish_non_exhaustive()
    }
}

impl BackfillSource {
    /// Create a backfill source.
    #[must_use]
    pub fn new(rpc: Arc<RpcClient>, registry: Arc<ParserRegistry>) -> Self {
        Self { rpc, registry }
    }

    /// Fetch and decode every event of `address` in `[from_ms, to_ms)`.
    ///
    /// The result is sorted in canonical
    /// `(slot, tx_signature, event_index)` order, so feeding it to the
    /// detectors reproduces the live pipeline's behavior.
    ///
    /// # Errors
    ///
    /// Returns an error when the wire client exhausts its retry budget or
    /// the operation is cancelled.
    #[instrument(skip(self, cancel), fields(address, from_ms, to_ms))]
    pub async fn fetch_range(
        &self,
        address: &str,
        from_ms: i64,
        to_ms: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<DexEvent>> {
        let mut events = Vec::new();
        let mut before: Option<String> = None;
        let mut pages = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(scout_rpc::RpcError::Cancelled.into());
            }

            let query = SignaturesQuery {
                before: before.clone(),
                until: None,
                limit: Some(SIGNATURE_PAGE_LIMIT),
            };
            let page = self.rpc.get_signatures_for_address(address, &query).await?;
            if page.is_empty() {
                break;
            }
            pages += 1;
            debug!(page = pages, signatures = page.len(), "signature page fetched");

            for info in &page {
                if info.err.is_some() {
                    continue;
                }
                let Some(block_time) = info.block_time else {
                    continue;
                };
                let timestamp_ms = block_time * 1000;
                if timestamp_ms >= to_ms || timestamp_ms < from_ms {
                    continue;
                }

                let Some(tx) = self.rpc.get_transaction(&info.signature).await? else {
                    continue;
                };
                if tx.is_failed() {
                    continue;
                }

                let account_keys = tx.account_keys();
                let context = TxContext {
                    signature: &info.signature,
                    slot: tx.slot,
                    timestamp_ms,
                    logs: tx.logs(),
                    account_keys: &account_keys,
                    token_balances: tx.token_balances(),
                };
                events.extend(self.registry.parse_transaction(&context));
            }

            // The page is ordered newest → oldest; once its tail reaches
            // the window start, older pages cannot contribute. A tail
            // sitting exactly at the start terminates too - its events
            // were just collected above.
            let Some(last) = page.last() else { break };
            if last.block_time.is_some_and(|bt| bt * 1000 <= from_ms) {
                break;
            }
            before = Some(last.signature.clone());
        }

        events.sort_by(|a, b| a.key().cmp(&b.key()));
        info!(events = events.len(), pages, "backfill range complete");
        Ok(events)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};
    use wiremock::matchers::{method, path};

    use super::*;
    use crate::parsers::curve::CurveLogParser;

    const CURVE_PROGRAM: &str = "CurveProg1111111111111111111111111111111111";

    fn registry() -> Arc<ParserRegistry> {
        let mut registry = ParserRegistry::new();
        registry.register(Arc::new(CurveLogParser::new(CURVE_PROGRAM)));
        Arc::new(registry)
    }

    fn signature_entry(signature: &str, slot: i64, block_time: i64) -> serde_json::Value {
        serde_json::json!({
            "signature": signature,
            "slot": slot,
            "err": null,
            "blockTime": block_time
        })
    }

    fn transaction_result(signature: &str, slot: i64, block_time: i64, mint: &str) -> serde_json::Value {
        serde_json::json!({
            "slot": slot,
            "blockTime": block_time,
            "meta": {
                "err": null,
                "logMessages": [
                    format!("Program {CURVE_PROGRAM} invoke [1]"),
                    format!("Program log: mint={mint}"),
                    "Program log: Instruction: Buy",
                    format!("Program {CURVE_PROGRAM} success"),
                ],
                "preTokenBalances": [],
                "postTokenBalances": []
            },
            "transaction": {
                "signatures": [signature],
                "message": {"accountKeys": ["Key0"]}
            }
        })
    }

    /// Dispatches on the JSON-RPC method and the `before` cursor, emulating
    /// two signature pages plus transaction lookups.
    struct PagedNode;

    impl Respond for PagedNode {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let body: serde_json::Value =
                serde_json::from_slice(&request.body).expect("request body is json");
            let reply = |result: serde_json::Value| {
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "jsonrpc": "2.0", "id": body["id"], "result": result
                }))
            };

            match body["method"].as_str() {
                Some("getSignaturesForAddress") => {
                    let before = body["params"][1]["before"].as_str();
                    match before {
                        // Newest page: one in-window signature, one failed,
                        // one newer than the window.
                        None => reply(serde_json::json!([
                            signature_entry("SigTooNew", 30, 4000),
                            signature_entry("SigB", 20, 2500),
                            {
                                "signature": "SigFailed",
                                "slot": 19,
                                "err": {"InstructionError": [0, "Custom"]},
                                "blockTime": 2400
                            },
                            signature_entry("SigA", 15, 2000),
                        ])),
                        // Older page: tail lands exactly on the window
                        // start, so pagination must stop after it.
                        Some("SigA") => reply(serde_json::json!([
                            signature_entry("SigEdge", 10, 1000),
                        ])),
                        Some(other) => panic!("unexpected pagination past {other}"),
                    }
                }
                Some("getTransaction") => {
                    let signature = body["params"][0].as_str().expect("signature param");
                    match signature {
                        "SigA" => reply(transaction_result("SigA", 15, 2000, "MintA")),
                        "SigB" => reply(transaction_result("SigB", 20, 2500, "MintB")),
                        "SigEdge" => reply(transaction_result("SigEdge", 10, 1000, "MintEdge")),
                        other => panic!("unexpected transaction fetch for {other}"),
                    }
                }
                other => panic!("unexpected method {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn paginates_filters_and_terminates_at_window_start() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(PagedNode)
            .mount(&server)
            .await;

        let rpc = Arc::new(RpcClient::new(server.uri()).expect("client failed"));
        let source = BackfillSource::new(rpc, registry());

        // Window [1000 s, 3000 s) in milliseconds.
        let events = source
            .fetch_range("SomeAddress", 1_000_000, 3_000_000, &CancellationToken::new())
            .await
            .expect("fetch failed");

        // SigTooNew is outside the window, SigFailed errored; SigEdge sits
        // exactly at the start and is included.
        let mints: Vec<String> = events
            .iter()
            .map(|e| match e {
                DexEvent::Swap(s) => s.mint.clone(),
                DexEvent::Liquidity(l) => l.mint.clone(),
            })
            .collect();
        assert_eq!(mints, vec!["MintEdge", "MintA", "MintB"], "canonical slot order");

        let timestamps: Vec<i64> = events
            .iter()
            .map(|e| match e {
                DexEvent::Swap(s) => s.timestamp,
                DexEvent::Liquidity(l) => l.timestamp,
            })
            .collect();
        assert_eq!(timestamps, vec![1_000_000, 2_000_000, 2_500_000], "seconds × 1000");
    }

    #[tokio::test]
    async fn cancellation_aborts_before_the_first_page() {
        let server = MockServer::start().await;
        let rpc = Arc::new(RpcClient::new(server.uri()).expect("client failed"));
        let source = BackfillSource::new(rpc, registry());

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = source.fetch_range("Addr", 0, 1000, &cancel).await;
        assert!(result.is_err());
    }
}
