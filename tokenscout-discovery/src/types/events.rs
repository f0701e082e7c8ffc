//! Raw DEX events decoded from transaction logs.
//!
//! Both event kinds share the identifying triple
//! `(slot, tx_signature, event_index)`, which is also the canonical sort
//! key. `event_index` is the position of the decoded event's log line within
//! its transaction's log array. All timestamps are milliseconds since the
//! Unix epoch.

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// CANONICAL ORDERING KEY
// ═══════════════════════════════════════════════════════════════════════════════

/// The canonical total order over raw events:
/// `(slot ASC, tx_signature ASC, event_index ASC)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    /// Slot the transaction landed in.
    pub slot: i64,
    /// The transaction signature.
    pub tx_signature: String,
    /// Log-line index of the event within its transaction.
    pub event_index: i64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SWAP EVENT
// ═══════════════════════════════════════════════════════════════════════════════

/// A trade decoded from a DEX program's logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapEvent {
    /// Mint of the traded (non-quote) token.
    pub mint: String,

    /// AMM pool backing the pair, when the dialect exposes one.
    pub pool: Option<String>,

    /// Signature of the transaction the event was decoded from.
    pub tx_signature: String,

    /// Log-line index of the event within its transaction.
    pub event_index: i64,

    /// Slot the transaction landed in.
    pub slot: i64,

    /// Event timestamp in milliseconds since the Unix epoch.
    pub timestamp: i64,

    /// Raw (un-normalized) output quantity of the swap.
    pub amount_out: f64,
}

impl SwapEvent {
    /// The canonical ordering key of this event.
    #[must_use]
    pub fn key(&self) -> EventKey {
        EventKey {
            slot: self.slot,
            tx_signature: self.tx_signature.clone(),
            event_index: self.event_index,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDITY EVENT
// ═══════════════════════════════════════════════════════════════════════════════

/// Direction of a liquidity change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiquidityKind {
    /// Liquidity added to a pool.
    Add,
    /// Liquidity removed from a pool.
    Remove,
}

impl LiquidityKind {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
        }
    }
}

/// A liquidity add/remove decoded from a DEX program's logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityEvent {
    /// AMM pool, when the dialect exposes one.
    pub pool: Option<String>,

    /// Mint of the pool's non-quote token.
    pub mint: String,

    /// Add or remove.
    pub event_type: LiquidityKind,

    /// Signature of the transaction the event was decoded from.
    pub tx_signature: String,

    /// Log-line index of the event within its transaction.
    pub event_index: i64,

    /// Slot the transaction landed in.
    pub slot: i64,

    /// Event timestamp in milliseconds since the Unix epoch.
    pub timestamp: i64,

    /// Token-side quantity.
    pub amount_token: f64,

    /// Quote-side quantity.
    pub amount_quote: f64,

    /// Candidate this event belongs to; empty at ingest time and resolved
    /// later once the mint has a discovered candidate.
    pub candidate_id: Option<String>,
}

impl LiquidityEvent {
    /// The canonical ordering key of this event.
    #[must_use]
    pub fn key(&self) -> EventKey {
        EventKey {
            slot: self.slot,
            tx_signature: self.tx_signature.clone(),
            event_index: self.event_index,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn swap(slot: i64, sig: &str, index: i64) -> SwapEvent {
        SwapEvent {
            mint: "Mint".into(),
            pool: None,
            tx_signature: sig.into(),
            event_index: index,
            slot,
            timestamp: 0,
            amount_out: 1.0,
        }
    }

    #[test]
    fn event_key_orders_by_slot_then_signature_then_index() {
        let mut keys = vec![
            swap(2, "A", 0).key(),
            swap(1, "B", 1).key(),
            swap(1, "B", 0).key(),
            swap(1, "A", 5).key(),
        ];
        keys.sort();

        assert_eq!(
            keys,
            vec![
                swap(1, "A", 5).key(),
                swap(1, "B", 0).key(),
                swap(1, "B", 1).key(),
                swap(2, "A", 0).key(),
            ]
        );
    }

    #[test]
    fn liquidity_kind_round_trips_through_serde() {
        let json = serde_json::to_string(&LiquidityKind::Add).expect("serialize failed");
        assert_eq!(json, "\"add\"");
        let kind: LiquidityKind = serde_json::from_str("\"remove\"").expect("parse failed");
        assert_eq!(kind, LiquidityKind::Remove);
    }
}
