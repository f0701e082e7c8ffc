//! Request and response types for the Solana JSON-RPC methods the clients speak.
//!
//! This module defines typed views over the node's JSON payloads:
//!
//! - [`TransactionInfo`] - result of `getTransaction` (json encoding)
//! - [`SignatureInfo`] - entries of `getSignaturesForAddress`
//! - [`BlockInfo`] - slim result of `getBlock`
//! - [`AccountInfo`] - result of `getAccountInfo` (base64 encoding)
//! - [`LogNotification`] - the per-subscription push payload

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::RpcErrorDetail;

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSACTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// A confirmed transaction as returned by `getTransaction`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInfo {
    /// Slot the transaction was processed in.
    pub slot: i64,

    /// Block time in seconds since the Unix epoch, when the node knows it.
    #[serde(default)]
    pub block_time: Option<i64>,

    /// Status metadata: error flag, log messages, token balances.
    #[serde(default)]
    pub meta: Option<TransactionMeta>,

    /// The transaction payload (signatures + message).
    pub transaction: TransactionPayload,
}

impl TransactionInfo {
    /// The first signature, which identifies the transaction.
    #[must_use]
    pub fn signature(&self) -> Option<&str> {
        self.transaction.signatures.first().map(String::as_str)
    }

    /// Whether the transaction failed on chain.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.meta.as_ref().is_some_and(|m| m.err.is_some())
    }

    /// Log messages, empty when the node pruned them.
    #[must_use]
    pub fn logs(&self) -> &[String] {
        self.meta
            .as_ref()
            .and_then(|m| m.log_messages.as_deref())
            .unwrap_or(&[])
    }

    /// The full ordered account-key vector.
    ///
    /// For versioned transactions the node splits keys between the static
    /// message list and the looked-up address tables; token-balance
    /// `account_index` values count across the concatenation, so this
    /// helper appends `loaded_addresses` (writable then readonly) to the
    /// static keys.
    #[must_use]
    pub fn account_keys(&self) -> Vec<String> {
        let mut keys = self.transaction.message.account_keys.clone();
        if let Some(loaded) = self.meta.as_ref().and_then(|m| m.loaded_addresses.as_ref()) {
            keys.extend(loaded.writable.iter().cloned());
            keys.extend(loaded.readonly.iter().cloned());
        }
        keys
    }

    /// Token-balance entries (post-state preferred, pre-state as fallback).
    ///
    /// These map token-account indices in the key vector to their mints.
    #[must_use]
    pub fn token_balances(&self) -> &[TokenBalance] {
        let Some(meta) = self.meta.as_ref() else {
            return &[];
        };
        match (&meta.post_token_balances, &meta.pre_token_balances) {
            (Some(post), _) if !post.is_empty() => post,
            (_, Some(pre)) => pre,
            _ => &[],
        }
    }
}

/// Transaction status metadata.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    /// Execution error, `None` on success.
    #[serde(default)]
    pub err: Option<serde_json::Value>,

    /// Program log messages in execution order.
    #[serde(default)]
    pub log_messages: Option<Vec<String>>,

    /// Token balances before execution.
    #[serde(default)]
    pub pre_token_balances: Option<Vec<TokenBalance>>,

    /// Token balances after execution.
    #[serde(default)]
    pub post_token_balances: Option<Vec<TokenBalance>>,

    /// Keys resolved from address lookup tables (versioned transactions).
    #[serde(default)]
    pub loaded_addresses: Option<LoadedAddresses>,
}

/// A token-account balance entry; maps an account index to its mint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    /// Index of the token account in the transaction's key vector.
    pub account_index: usize,

    /// Mint of the token account.
    pub mint: String,
}

/// Keys resolved via address lookup tables.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedAddresses {
    /// Writable looked-up keys, appended after the static keys.
    #[serde(default)]
    pub writable: Vec<String>,

    /// Readonly looked-up keys, appended last.
    #[serde(default)]
    pub readonly: Vec<String>,
}

/// Signatures plus the (partially decoded) message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPayload {
    /// Transaction signatures; the first is the transaction id.
    pub signatures: Vec<String>,

    /// The message body.
    pub message: TransactionMessage,
}

/// The subset of the transaction message the parsers need.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMessage {
    /// Static ordered account keys.
    pub account_keys: Vec<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SIGNATURES
// ═══════════════════════════════════════════════════════════════════════════════

/// One entry of a `getSignaturesForAddress` page.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    /// The transaction signature.
    pub signature: String,

    /// Slot the transaction landed in.
    pub slot: i64,

    /// Execution error, `None` on success.
    #[serde(default)]
    pub err: Option<serde_json::Value>,

    /// Block time in seconds, when known.
    #[serde(default)]
    pub block_time: Option<i64>,
}

/// Optional arguments for `getSignaturesForAddress`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignaturesQuery {
    /// Start the page before this signature (exclusive), walking backward.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,

    /// Stop at this signature (exclusive).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<String>,

    /// Page size (node-side maximum is 1000).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// BLOCKS & ACCOUNTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Slim view of a `getBlock` result.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockInfo {
    /// Block hash.
    pub blockhash: String,

    /// Parent slot.
    pub parent_slot: i64,

    /// Block time in seconds, when known.
    #[serde(default)]
    pub block_time: Option<i64>,

    /// Block height, when known.
    #[serde(default)]
    pub block_height: Option<i64>,
}

/// Result of `getAccountInfo` with base64 encoding.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    /// Account data as `[payload, encoding]`.
    pub data: (String, String),

    /// Owning program.
    pub owner: String,

    /// Balance in lamports.
    pub lamports: u64,
}

impl AccountInfo {
    /// Decode the base64 account data into raw bytes.
    ///
    /// Returns `None` when the payload is not valid base64 or the encoding
    /// tag is not `base64`.
    #[must_use]
    pub fn decode_data(&self) -> Option<Vec<u8>> {
        if self.data.1 != "base64" {
            return None;
        }
        base64::engine::general_purpose::STANDARD.decode(&self.data.0).ok()
    }
}

/// Wrapper used by methods that return `{ context, value }`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WithContext<T> {
    pub value: Option<T>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PUSH NOTIFICATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// A decoded `logsNotification` delivered to a subscription consumer.
#[derive(Debug, Clone)]
pub struct LogNotification {
    /// Slot the transaction was observed in.
    pub slot: i64,

    /// The transaction signature.
    pub signature: String,

    /// Execution error, `None` on success.
    pub err: Option<serde_json::Value>,

    /// Program log messages.
    pub logs: Vec<String>,
}

/// Incoming WebSocket frame, before routing.
///
/// A frame is either a response to one of our requests (`id` is set) or a
/// server-initiated notification (`method` is set).
#[derive(Debug, Deserialize)]
pub(crate) struct WsEnvelope {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<RpcErrorDetail>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<WsNotificationParams>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WsNotificationParams {
    pub subscription: u64,
    pub result: LogsNotificationResult,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LogsNotificationResult {
    pub context: SlotContext,
    pub value: LogsNotificationValue,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SlotContext {
    pub slot: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LogsNotificationValue {
    pub signature: String,
    #[serde(default)]
    pub err: Option<serde_json::Value>,
    #[serde(default)]
    pub logs: Vec<String>,
}

impl From<WsNotificationParams> for LogNotification {
    fn from(params: WsNotificationParams) -> Self {
        Self {
            slot: params.result.context.slot,
            signature: params.result.value.signature,
            err: params.result.value.err,
            logs: params.result.value.logs,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INTERNAL JSON-RPC ENVELOPE
// ═══════════════════════════════════════════════════════════════════════════════

/// JSON-RPC request structure.
#[derive(Debug, Serialize)]
pub(crate) struct JsonRpcRequest<'a, P: Serialize> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    pub params: P,
    pub id: u64,
}

impl<'a, P: Serialize> JsonRpcRequest<'a, P> {
    pub fn new(method: &'a str, params: P, id: u64) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
            id,
        }
    }
}

/// JSON-RPC response wrapper for extracting result or error.
#[derive(Debug, Deserialize)]
pub(crate) struct JsonRpcResponse<T> {
    #[allow(dead_code)]
    pub id: Option<u64>,
    pub result: Option<T>,
    pub error: Option<RpcErrorDetail>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn transaction_deserialization() {
        let json = r#"{
            "slot": 5208469,
            "blockTime": 1700000000,
            "meta": {
                "err": null,
                "logMessages": ["Program X invoke [1]", "Program X success"],
                "preTokenBalances": [{"accountIndex": 5, "mint": "MintA"}],
                "postTokenBalances": [{"accountIndex": 5, "mint": "MintA"}]
            },
            "transaction": {
                "signatures": ["SigOne"],
                "message": {"accountKeys": ["Key0", "Key1"]}
            }
        }"#;

        let tx: TransactionInfo = serde_json::from_str(json).expect("parse failed");
        assert_eq!(tx.slot, 5_208_469);
        assert_eq!(tx.signature(), Some("SigOne"));
        assert!(!tx.is_failed());
        assert_eq!(tx.logs().len(), 2);
        assert_eq!(tx.token_balances()[0].mint, "MintA");
    }

    #[test]
    fn account_keys_append_loaded_addresses() {
        let json = r#"{
            "slot": 1,
            "meta": {
                "err": null,
                "loadedAddresses": {"writable": ["W0"], "readonly": ["R0"]}
            },
            "transaction": {
                "signatures": ["Sig"],
                "message": {"accountKeys": ["K0", "K1"]}
            }
        }"#;

        let tx: TransactionInfo = serde_json::from_str(json).expect("parse failed");
        assert_eq!(tx.account_keys(), vec!["K0", "K1", "W0", "R0"]);
    }

    #[test]
    fn failed_transaction_is_flagged() {
        let json = r#"{
            "slot": 1,
            "meta": {"err": {"InstructionError": [0, "Custom"]}},
            "transaction": {"signatures": ["Sig"], "message": {"accountKeys": []}}
        }"#;

        let tx: TransactionInfo = serde_json::from_str(json).expect("parse failed");
        assert!(tx.is_failed());
    }

    #[test]
    fn account_info_decodes_base64() {
        let account = AccountInfo {
            data: ("aGVsbG8=".into(), "base64".into()),
            owner: "Owner".into(),
            lamports: 1,
        };
        assert_eq!(account.decode_data().as_deref(), Some(b"hello".as_slice()));
    }

    #[test]
    fn account_info_rejects_other_encodings() {
        let account = AccountInfo {
            data: ("deadbeef".into(), "base58".into()),
            owner: "Owner".into(),
            lamports: 1,
        };
        assert!(account.decode_data().is_none());
    }

    #[test]
    fn notification_envelope_routing_fields() {
        let json = r#"{
            "jsonrpc": "2.0",
            "method": "logsNotification",
            "params": {
                "result": {
                    "context": {"slot": 42},
                    "value": {"signature": "Sig", "err": null, "logs": ["a", "b"]}
                },
                "subscription": 7
            }
        }"#;

        let envelope: WsEnvelope = serde_json::from_str(json).expect("parse failed");
        assert_eq!(envelope.method.as_deref(), Some("logsNotification"));
        let params = envelope.params.expect("params present");
        assert_eq!(params.subscription, 7);

        let notification = LogNotification::from(params);
        assert_eq!(notification.slot, 42);
        assert_eq!(notification.logs, vec!["a", "b"]);
    }

    #[test]
    fn confirmation_envelope_routing_fields() {
        let json = r#"{"jsonrpc": "2.0", "result": 23784, "id": 1}"#;
        let envelope: WsEnvelope = serde_json::from_str(json).expect("parse failed");
        assert_eq!(envelope.id, Some(1));
        assert_eq!(envelope.result.and_then(|v| v.as_u64()), Some(23784));
        assert!(envelope.method.is_none());
    }

    #[test]
    fn signatures_query_skips_unset_fields() {
        let query = SignaturesQuery {
            limit: Some(1000),
            ..SignaturesQuery::default()
        };
        let json = serde_json::to_string(&query).expect("serialize failed");
        assert!(json.contains("\"limit\":1000"));
        assert!(!json.contains("before"));
        assert!(!json.contains("until"));
    }
}
