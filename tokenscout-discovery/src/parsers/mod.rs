//! Per-program DEX decoders and the registry that dispatches to them.
//!
//! A parser turns one transaction's log messages (plus its ordered
//! account-key vector) into typed [`DexEvent`]s. Two dialects ship built
//! in:
//!
//! - [`amm::AmmLogParser`] - scans for a tagged base64 blob (binary packed
//!   records with a leading discriminator byte)
//! - [`curve::CurveLogParser`] - a line-oriented state machine over the
//!   bonding-curve program's plain-text logs
//!
//! Every emitted event carries `event_index` = the position of its log line
//! in the transaction's log array, which makes the merged output of all
//! parsers totally ordered within a transaction.

pub mod amm;
pub mod curve;

use std::collections::HashMap;
use std::sync::Arc;

use scout_rpc::TokenBalance;

use crate::types::events::{EventKey, LiquidityEvent, SwapEvent};

// ═══════════════════════════════════════════════════════════════════════════════
// PARSER INPUT & OUTPUT
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything a parser may inspect about one transaction.
///
/// `account_keys` and `token_balances` are empty when only the push
/// notification's logs are available (the transaction fetch failed); the
/// log-only dialect still decodes what it can.
#[derive(Debug, Clone, Copy)]
pub struct TxContext<'a> {
    /// The transaction signature.
    pub signature: &'a str,
    /// Slot the transaction landed in.
    pub slot: i64,
    /// Canonical timestamp in milliseconds.
    pub timestamp_ms: i64,
    /// Log messages in execution order.
    pub logs: &'a [String],
    /// Full ordered account-key vector (static + looked-up).
    pub account_keys: &'a [String],
    /// Token-balance entries mapping account indices to mints.
    pub token_balances: &'a [TokenBalance],
}

/// A decoded DEX event of either kind.
#[derive(Debug, Clone, PartialEq)]
pub enum DexEvent {
    /// A trade.
    Swap(SwapEvent),
    /// A liquidity add/remove.
    Liquidity(LiquidityEvent),
}

impl DexEvent {
    /// Log-line index of the event within its transaction.
    #[must_use]
    pub const fn event_index(&self) -> i64 {
        match self {
            Self::Swap(e) => e.event_index,
            Self::Liquidity(e) => e.event_index,
        }
    }

    /// The canonical ordering key of this event.
    #[must_use]
    pub fn key(&self) -> EventKey {
        match self {
            Self::Swap(e) => e.key(),
            Self::Liquidity(e) => e.key(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSER TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// A per-program decoder.
pub trait DexParser: Send + Sync {
    /// Program id this parser decodes.
    fn program_id(&self) -> &str;

    /// Whether decoding needs the authoritative transaction (account keys,
    /// token balances). Log-only dialects return `false` and can decode
    /// straight from a push notification when the fetch fails.
    fn requires_transaction(&self) -> bool;

    /// Decode all events of this dialect from one transaction.
    fn parse(&self, tx: &TxContext<'_>) -> Vec<DexEvent>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSER REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Maps program ids to parsers and merges their output deterministically.
#[derive(Clone, Default)]
pub struct ParserRegistry {
    parsers: HashMap<String, Arc<dyn DexParser>>,
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("programs", &self.parsers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ParserRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parser under its program id.
    pub fn register(&mut self, parser: Arc<dyn DexParser>) {
        self.parsers.insert(parser.program_id().to_string(), parser);
    }

    /// Look up the parser for a program id.
    #[must_use]
    pub fn get(&self, program_id: &str) -> Option<&Arc<dyn DexParser>> {
        self.parsers.get(program_id)
    }

    /// All registered program ids.
    #[must_use]
    pub fn program_ids(&self) -> Vec<String> {
        self.parsers.keys().cloned().collect()
    }

    /// Decode one transaction with every registered parser and merge the
    /// results, sorted by `event_index`. The merged list is deterministic
    /// regardless of registration order.
    #[must_use]
    pub fn parse_transaction(&self, tx: &TxContext<'_>) -> Vec<DexEvent> {
        let mut events: Vec<DexEvent> = self
            .parsers
            .values()
            .flat_map(|parser| parser.parse(tx))
            .collect();
        events.sort_by_key(DexEvent::event_index);
        events
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
