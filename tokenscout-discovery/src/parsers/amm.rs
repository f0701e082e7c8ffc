//! Binary-log parser for the AMM dialect.
//!
//! The AMM program tags one log line per instruction with a base64 blob:
//! a little-endian packed record whose first byte is a discriminator.
//! Swap discriminators are `{0x09, 0x0b, 0x0d, 0x0e}`; `0x03`/`0x04` are
//! add/remove liquidity.
//!
//! Record layouts:
//!
//! ```text
//! swap (full, 113 bytes):
//!   disc(1) | amm_id(32) | input_mint(32) | output_mint(32) | amount_in(8) | amount_out(8)
//! swap (compact, 49 bytes, no mints):
//!   disc(1) | amm_id(32) | amount_in(8) | amount_out(8)
//! liquidity (81 bytes):
//!   disc(1) | amm_id(32) | mint(32) | amount_token(8) | amount_quote(8)
//! ```
//!
//! Mint selection skips the well-known quote-currency mint: the non-quote
//! side of the pair is the token being discovered. When the blob carries no
//! mints (compact layout), the parser probes the transaction instead: the
//! pool sits at account-key index 1, and the candidate mints are resolved
//! through the token-balance entries for key indices 5 and 6.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::types::events::{LiquidityEvent, LiquidityKind, SwapEvent};

use super::{DexEvent, DexParser, TxContext};

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Tag preceding the base64 blob in the AMM program's logs.
const AMM_LOG_TAG: &str = "ray_log: ";

/// Discriminators indicating swap variants.
const SWAP_DISCRIMINATORS: [u8; 4] = [0x09, 0x0b, 0x0d, 0x0e];

/// Discriminator for add-liquidity records.
const LIQUIDITY_ADD_DISCRIMINATOR: u8 = 0x03;

/// Discriminator for remove-liquidity records.
const LIQUIDITY_REMOVE_DISCRIMINATOR: u8 = 0x04;

/// Full swap record: disc + amm_id + two mints + two amounts.
const SWAP_FULL_LEN: usize = 1 + 32 + 32 + 32 + 8 + 8;

/// Compact swap record: disc + amm_id + two amounts, no mints.
const SWAP_COMPACT_LEN: usize = 1 + 32 + 8 + 8;

/// Liquidity record: disc + amm_id + mint + two amounts.
const LIQUIDITY_LEN: usize = 1 + 32 + 32 + 8 + 8;

/// Account-key index of the pool in the AMM instruction layout.
const POOL_KEY_INDEX: usize = 1;

/// Account-key indices of the pair's vault token accounts.
const VAULT_KEY_INDICES: [usize; 2] = [5, 6];

// ═══════════════════════════════════════════════════════════════════════════════
// AMM LOG PARSER
// ═══════════════════════════════════════════════════════════════════════════════

/// Decoder for the AMM dialect's tagged binary logs.
#[derive(Debug, Clone)]
pub struct AmmLogParser {
    program_id: String,
    quote_mint: String,
    quote_mint_bytes: [u8; 32],
}

impl AmmLogParser {
    /// Create a parser for one AMM program.
    ///
    /// # Errors
    ///
    /// Returns an error when `quote_mint` is not a valid 32-byte base58
    /// address.
    pub fn new(program_id: impl Into<String>, quote_mint: impl Into<String>) -> Result<Self> {
        let quote_mint = quote_mint.into();
        let decoded = bs58::decode(&quote_mint)
            .into_vec()
            .map_err(|e| AppError::Initialization(format!("invalid quote mint: {e}")))?;
        let quote_mint_bytes: [u8; 32] = decoded
            .try_into()
            .map_err(|_| AppError::Initialization("quote mint is not 32 bytes".into()))?;

        Ok(Self {
            program_id: program_id.into(),
            quote_mint,
            quote_mint_bytes,
        })
    }

    /// The quote-currency mint this parser skips during mint selection.
    #[must_use]
    pub fn quote_mint(&self) -> &str {
        &self.quote_mint
    }

    fn decode_record(&self, tx: &TxContext<'_>, line_index: i64, blob: &[u8]) -> Option<DexEvent> {
        let disc = *blob.first()?;
        if SWAP_DISCRIMINATORS.contains(&disc) {
            return self.decode_swap(tx, line_index, blob);
        }
        match disc {
            LIQUIDITY_ADD_DISCRIMINATOR => {
                self.decode_liquidity(tx, line_index, blob, LiquidityKind::Add)
            }
            LIQUIDITY_REMOVE_DISCRIMINATOR => {
                self.decode_liquidity(tx, line_index, blob, LiquidityKind::Remove)
            }
            _ => {
                debug!(disc, "unknown AMM log discriminator");
                None
            }
        }
    }

    fn decode_swap(&self, tx: &TxContext<'_>, line_index: i64, blob: &[u8]) -> Option<DexEvent> {
        let (mint, pool, amount_out) = if blob.len() >= SWAP_FULL_LEN {
            let pool = bs58::encode(&blob[1..33]).into_string();
            let input_mint: &[u8] = &blob[33..65];
            let output_mint: &[u8] = &blob[65..97];
            let amount_out = read_u64_le(blob, 105)?;

            // The non-quote side is the token being traded.
            let mint = if output_mint != self.quote_mint_bytes.as_slice() {
                output_mint
            } else if input_mint != self.quote_mint_bytes.as_slice() {
                input_mint
            } else {
                debug!("swap between quote and quote, skipping");
                return None;
            };
            (bs58::encode(mint).into_string(), Some(pool), amount_out)
        } else if blob.len() >= SWAP_COMPACT_LEN {
            let amount_out = read_u64_le(blob, 41)?;
            let pool = tx.account_keys.get(POOL_KEY_INDEX).cloned();
            let mint = self.probe_vault_mints(tx)?;
            (mint, pool, amount_out)
        } else {
            warn!(len = blob.len(), "AMM swap record too short");
            return None;
        };

        Some(DexEvent::Swap(SwapEvent {
            mint,
            pool,
            tx_signature: tx.signature.into(),
            event_index: line_index,
            slot: tx.slot,
            timestamp: tx.timestamp_ms,
            amount_out: amount_out as f64,
        }))
    }

    fn decode_liquidity(
        &self,
        tx: &TxContext<'_>,
        line_index: i64,
        blob: &[u8],
        kind: LiquidityKind,
    ) -> Option<DexEvent> {
        if blob.len() < LIQUIDITY_LEN {
            warn!(len = blob.len(), "AMM liquidity record too short");
            return None;
        }
        let pool = bs58::encode(&blob[1..33]).into_string();
        let mint = bs58::encode(&blob[33..65]).into_string();
        let amount_token = read_u64_le(blob, 65)?;
        let amount_quote = read_u64_le(blob, 73)?;

        Some(DexEvent::Liquidity(LiquidityEvent {
            pool: Some(pool),
            mint,
            event_type: kind,
            tx_signature: tx.signature.into(),
            event_index: line_index,
            slot: tx.slot,
            timestamp: tx.timestamp_ms,
            amount_token: amount_token as f64,
            amount_quote: amount_quote as f64,
            candidate_id: None,
        }))
    }

    /// Resolve the traded mint through the pair's vault token accounts.
    fn probe_vault_mints(&self, tx: &TxContext<'_>) -> Option<String> {
        for index in VAULT_KEY_INDICES {
            let Some(balance) = tx.token_balances.iter().find(|b| b.account_index == index)
            else {
                continue;
            };
            if balance.mint != self.quote_mint {
                return Some(balance.mint.clone());
            }
        }
        debug!(signature = tx.signature, "no non-quote vault mint found");
        None
    }
}

impl DexParser for AmmLogParser {
    fn program_id(&self) -> &str {
        &self.program_id
    }

    fn requires_transaction(&self) -> bool {
        // Compact records need the account-key vector; without the fetched
        // transaction there is nothing reliable to emit.
        true
    }

    fn parse(&self, tx: &TxContext<'_>) -> Vec<DexEvent> {
        let mut events = Vec::new();

        for (line_index, line) in tx.logs.iter().enumerate() {
            let Some(tag_pos) = line.find(AMM_LOG_TAG) else {
                continue;
            };
            let encoded = line[tag_pos + AMM_LOG_TAG.len()..].trim();

            let blob = match BASE64.decode(encoded) {
                Ok(blob) => blob,
                Err(e) => {
                    warn!(
                        signature = tx.signature,
                        line_index,
                        error = %e,
                        "non-decodable AMM log blob, skipping"
                    );
                    metrics::counter!("parse_failures_total", "dialect" => "amm").increment(1);
                    continue;
                }
            };

            if let Some(event) = self.decode_record(tx, line_index as i64, &blob) {
                events.push(event);
            }
        }

        events
    }
}

fn read_u64_le(blob: &[u8], offset: usize) -> Option<u64> {
    let bytes: [u8; 8] = blob.get(offset..offset + 8)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
