//! Request/response JSON-RPC client with exponential-backoff retry.
//!
//! This module provides [`RpcClient`], the HTTP side of the wire layer. Every
//! call retries transient transport failures and 429-class responses with
//! exponential backoff (500 ms → 1 s → 2 s by default), and aborts
//! immediately on cancellation.
//!
//! # Example
//!
//! ```ignore
//! use scout_rpc::{ClientConfig, RpcClient};
//!
//! let client = RpcClient::new("https://api.mainnet-beta.solana.com")?;
//! let tx = client.get_transaction("5j7s...").await?;
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::config::ClientConfig;
use crate::error::{Result, RpcError};
use crate::types::{
    AccountInfo, BlockInfo, JsonRpcRequest, JsonRpcResponse, SignatureInfo, SignaturesQuery,
    TransactionInfo, WithContext,
};

// ═══════════════════════════════════════════════════════════════════════════════
// RPC CLIENT
// ═══════════════════════════════════════════════════════════════════════════════

/// Solana JSON-RPC request/response client.
///
/// # Thread Safety
///
/// The client is `Send + Sync` and can be shared across tasks; the internal
/// `reqwest::Client` is designed for concurrent use.
///
/// # Retry Behavior
///
/// Each call makes an initial attempt plus up to
/// [`ClientConfig::max_retries`] retries. An attempt is retried when the
/// error is transient ([`RpcError::is_retryable`]); other errors surface
/// immediately. After the budget is spent the last error is wrapped in
/// [`RpcError::RetriesExhausted`].
#[derive(Debug)]
pub struct RpcClient {
    /// HTTP client for JSON-RPC requests.
    client: reqwest::Client,

    /// RPC endpoint URL.
    rpc_url: String,

    /// Request ID counter for JSON-RPC correlation.
    request_id: AtomicU64,

    /// Client configuration.
    config: ClientConfig,

    /// Cancellation handle; aborts in-flight retries immediately.
    cancel: CancellationToken,
}

impl RpcClient {
    /// Create a new client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(rpc_url: impl Into<String>) -> Result<Self> {
        Self::with_config(rpc_url, ClientConfig::default())
    }

    /// Create a new client with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be created.
    pub fn with_config(rpc_url: impl Into<String>, config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RpcError::Connection(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            rpc_url: rpc_url.into(),
            request_id: AtomicU64::new(1),
            config,
            cancel: CancellationToken::new(),
        })
    }

    /// Attach a cancellation token. Cancelling it aborts retry waits and
    /// fails pending calls with [`RpcError::Cancelled`].
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Get the RPC URL this client is connected to.
    #[must_use]
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Get the current configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn next_request_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }

    // ───────────────────────────────────────────────────────────────────────────
    // RPC METHODS
    // ───────────────────────────────────────────────────────────────────────────

    /// Fetch a confirmed transaction by signature.
    ///
    /// Returns `None` when the node does not know the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error after the retry budget is spent or on a non-transient
    /// RPC error.
    #[instrument(skip(self))]
    pub async fn get_transaction(&self, signature: &str) -> Result<Option<TransactionInfo>> {
        let params = json!([
            signature,
            {
                "encoding": "json",
                "commitment": self.config.commitment,
                "maxSupportedTransactionVersion": 0
            }
        ]);
        self.call("getTransaction", params).await
    }

    /// Fetch a page of signatures for an address, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error after the retry budget is spent.
    #[instrument(skip(self, query), fields(before = ?query.before, limit = ?query.limit))]
    pub async fn get_signatures_for_address(
        &self,
        address: &str,
        query: &SignaturesQuery,
    ) -> Result<Vec<SignatureInfo>> {
        let params = json!([address, query]);
        let page: Option<Vec<SignatureInfo>> =
            self.call("getSignaturesForAddress", params).await?;
        Ok(page.unwrap_or_default())
    }

    /// Fetch a block by slot.
    ///
    /// # Errors
    ///
    /// Returns an error when the slot is unknown or after the retry budget
    /// is spent.
    #[instrument(skip(self))]
    pub async fn get_block(&self, slot: i64) -> Result<BlockInfo> {
        let params = json!([
            slot,
            {
                "encoding": "json",
                "transactionDetails": "none",
                "rewards": false,
                "maxSupportedTransactionVersion": 0
            }
        ]);
        let block: Option<BlockInfo> = self.call("getBlock", params).await?;
        block.ok_or_else(|| RpcError::InvalidResponse(format!("no block at slot {slot}")))
    }

    /// Fetch the estimated production time of a slot, in epoch seconds.
    ///
    /// Returns `None` when the node has no timestamp for the slot.
    ///
    /// # Errors
    ///
    /// Returns an error after the retry budget is spent.
    #[instrument(skip(self))]
    pub async fn get_block_time(&self, slot: i64) -> Result<Option<i64>> {
        self.call("getBlockTime", json!([slot])).await
    }

    /// Fetch account data (base64 encoding).
    ///
    /// Returns `None` when the account does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error after the retry budget is spent.
    #[instrument(skip(self))]
    pub async fn get_account_info(&self, pubkey: &str) -> Result<Option<AccountInfo>> {
        let params = json!([pubkey, {"encoding": "base64", "commitment": self.config.commitment}]);
        let wrapped: Option<WithContext<AccountInfo>> =
            self.call("getAccountInfo", params).await?;
        Ok(wrapped.and_then(|w| w.value))
    }

    /// Fetch the current slot.
    ///
    /// # Errors
    ///
    /// Returns an error after the retry budget is spent.
    #[instrument(skip(self))]
    pub async fn get_slot(&self) -> Result<i64> {
        let slot: Option<i64> = self
            .call("getSlot", json!([{"commitment": self.config.commitment}]))
            .await?;
        slot.ok_or_else(|| RpcError::InvalidResponse("getSlot returned null".into()))
    }

    // ───────────────────────────────────────────────────────────────────────────
    // INTERNAL: RETRY LOOP
    // ───────────────────────────────────────────────────────────────────────────

    /// Issue a request with retry. `Option<R>` results absorb JSON nulls.
    ///
    /// The initial attempt plus up to `max_retries` retries, sleeping the
    /// doubling backoff between attempts (500 ms → 1 s → 2 s by default,
    /// a cumulative worst case of about 3.5 s).
    async fn call<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize + Sync,
        R: DeserializeOwned,
    {
        let mut delay = self.config.retry_base_delay;
        let mut attempt = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(RpcError::Cancelled);
            }
            attempt += 1;

            match self.send_once(method, &params).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt <= self.config.max_retries => {
                    warn!(method, attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying RPC call");

                    tokio::select! {
                        () = self.cancel.cancelled() => return Err(RpcError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                    delay = (delay * 2).min(self.config.retry_max_delay);
                }
                Err(e) if e.is_retryable() => {
                    // Budget spent on a still-transient error.
                    return Err(RpcError::RetriesExhausted {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Execute a single JSON-RPC request and parse the response.
    async fn send_once<P, R>(&self, method: &str, params: &P) -> Result<R>
    where
        P: Serialize + Sync,
        R: DeserializeOwned,
    {
        let request = JsonRpcRequest::new(method, params, self.next_request_id());

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(RpcError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(RpcError::Http(format!("HTTP status {}", response.status())));
        }

        let body: JsonRpcResponse<serde_json::Value> = response.json().await?;

        if let Some(error) = body.error {
            debug!(method, code = error.code, "RPC error response");
            return Err(error.into_error());
        }

        // A JSON null result is legitimate for the `Option`-returning
        // methods (unknown transaction, missing account), so deserialize
        // through Value instead of treating null as a protocol violation.
        let result = body.result.unwrap_or(serde_json::Value::Null);
        serde_json::from_value(result)
            .map_err(|e| RpcError::InvalidResponse(format!("{method}: {e}")))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn fast_config() -> ClientConfig {
        ClientConfig::default()
            .with_retry_base_delay(Duration::from_millis(5))
            .with_retry_max_delay(Duration::from_millis(20))
    }

    #[tokio::test]
    async fn get_block_time_parses_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(serde_json::json!({"method": "getBlockTime"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 1, "result": 1_700_000_000
            })))
            .mount(&server)
            .await;

        let client = RpcClient::new(server.uri()).expect("client creation failed");
        let time = client.get_block_time(100).await.expect("call failed");
        assert_eq!(time, Some(1_700_000_000));
    }

    #[tokio::test]
    async fn get_transaction_null_result_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 1, "result": null
            })))
            .mount(&server)
            .await;

        let client = RpcClient::new(server.uri()).expect("client creation failed");
        let tx = client.get_transaction("UnknownSig").await.expect("call failed");
        assert!(tx.is_none());
    }

    #[tokio::test]
    async fn retries_on_429_then_succeeds() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicU32, Ordering};
        use wiremock::{Request, Respond};

        struct FlakyResponder {
            calls: Arc<AtomicU32>,
        }

        impl Respond for FlakyResponder {
            fn respond(&self, _request: &Request) -> ResponseTemplate {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    ResponseTemplate::new(429)
                } else {
                    ResponseTemplate::new(200).set_body_json(serde_json::json!({
                        "jsonrpc": "2.0", "id": 1, "result": 555
                    }))
                }
            }
        }

        let server = MockServer::start().await;
        let calls = Arc::new(AtomicU32::new(0));
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(FlakyResponder { calls: calls.clone() })
            .mount(&server)
            .await;

        let client =
            RpcClient::with_config(server.uri(), fast_config()).expect("client creation failed");
        let slot = client.get_slot().await.expect("call failed");

        assert_eq!(slot, 555);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_budget_exhausted_surfaces_last_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client =
            RpcClient::with_config(server.uri(), fast_config()).expect("client creation failed");
        let err = client.get_slot().await.expect_err("should fail");

        // Initial attempt plus three retries.
        assert!(matches!(err, RpcError::RetriesExhausted { attempts: 4, .. }));
    }

    #[tokio::test]
    async fn non_retryable_rpc_error_fails_fast() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 1,
                "error": {"code": -32601, "message": "Method not found"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            RpcClient::with_config(server.uri(), fast_config()).expect("client creation failed");
        let err = client.get_slot().await.expect_err("should fail");

        assert!(matches!(err, RpcError::Rpc { code: -32601, .. }));
    }

    #[tokio::test]
    async fn cancellation_aborts_retry_wait() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let config = ClientConfig::default()
            .with_retry_base_delay(Duration::from_secs(30))
            .with_retry_max_delay(Duration::from_secs(30));
        let client = RpcClient::with_config(server.uri(), config)
            .expect("client creation failed")
            .with_cancellation(cancel.clone());

        let handle = tokio::spawn(async move { client.get_slot().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let err = handle.await.expect("task panicked").expect_err("should fail");
        assert!(matches!(err, RpcError::Cancelled));
    }

    #[tokio::test]
    async fn get_account_info_unwraps_context() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 1,
                "result": {
                    "context": {"slot": 1},
                    "value": {
                        "data": ["aGVsbG8=", "base64"],
                        "owner": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
                        "lamports": 2_039_280
                    }
                }
            })))
            .mount(&server)
            .await;

        let client = RpcClient::new(server.uri()).expect("client creation failed");
        let account = client
            .get_account_info("SomeMint")
            .await
            .expect("call failed")
            .expect("account present");

        assert_eq!(account.decode_data().as_deref(), Some(b"hello".as_slice()));
    }
}
