//! Log-state parser for the bonding-curve dialect.
//!
//! The bonding-curve program logs plain text, so decoding is a line-oriented
//! state machine rather than a blob decode:
//!
//! ```text
//! outside ── "Program <P> invoke"  ──▶ inside   (per-invocation state reset)
//! inside  ── "Program <P> success" ──▶ outside  (carried mint cleared)
//!         ── "Program <P> failed"  ──▶ outside
//! ```
//!
//! Inside an invocation, a `mint=<base58>` line sets the carried mint;
//! `Instruction: Buy|Sell` lines emit a swap for it, `Instruction: Create`
//! emits a liquidity add and `Instruction: Migrate` a liquidity remove.
//! Amounts are not present in this dialect's logs and stay zero; the swap
//! count still drives spike detection.
//!
//! The dialect is fully decodable from a push notification's logs alone,
//! which is why a failed transaction fetch only degrades (no account keys)
//! instead of dropping the event.

use tracing::debug;

use crate::types::events::{LiquidityEvent, LiquidityKind, SwapEvent};

use super::{DexEvent, DexParser, TxContext};

/// Prefix of mint-carrying log lines.
const MINT_PREFIX: &str = "mint=";

// ═══════════════════════════════════════════════════════════════════════════════
// CURVE LOG PARSER
// ═══════════════════════════════════════════════════════════════════════════════

/// Decoder for the bonding-curve dialect's plain-text logs.
#[derive(Debug, Clone)]
pub struct CurveLogParser {
    program_id: String,
    invoke_prefix: String,
    success_prefix: String,
    failed_prefix: String,
}

impl CurveLogParser {
    /// Create a parser for one bonding-curve program.
    #[must_use]
    pub fn new(program_id: impl Into<String>) -> Self {
        let program_id = program_id.into();
        Self {
            invoke_prefix: format!("Program {program_id} invoke"),
            success_prefix: format!("Program {program_id} success"),
            failed_prefix: format!("Program {program_id} failed"),
            program_id,
        }
    }

    fn swap(&self, tx: &TxContext<'_>, line_index: i64, mint: &str) -> DexEvent {
        DexEvent::Swap(SwapEvent {
            mint: mint.into(),
            pool: None,
            tx_signature: tx.signature.into(),
            event_index: line_index,
            slot: tx.slot,
            timestamp: tx.timestamp_ms,
            amount_out: 0.0,
        })
    }

    fn liquidity(
        &self,
        tx: &TxContext<'_>,
        line_index: i64,
        mint: &str,
        kind: LiquidityKind,
    ) -> DexEvent {
        DexEvent::Liquidity(LiquidityEvent {
            pool: None,
            mint: mint.into(),
            event_type: kind,
            tx_signature: tx.signature.into(),
            event_index: line_index,
            slot: tx.slot,
            timestamp: tx.timestamp_ms,
            amount_token: 0.0,
            amount_quote: 0.0,
            candidate_id: None,
        })
    }
}

impl DexParser for CurveLogParser {
    fn program_id(&self) -> &str {
        &self.program_id
    }

    fn requires_transaction(&self) -> bool {
        false
    }

    fn parse(&self, tx: &TxContext<'_>) -> Vec<DexEvent> {
        let mut events = Vec::new();
        let mut inside = false;
        let mut carried_mint: Option<String> = None;

        for (line_index, line) in tx.logs.iter().enumerate() {
            let line_index = line_index as i64;

            if line.starts_with(&self.invoke_prefix) {
                inside = true;
                carried_mint = None;
                continue;
            }
            if line.starts_with(&self.success_prefix) || line.starts_with(&self.failed_prefix) {
                inside = false;
                carried_mint = None;
                continue;
            }
            if !inside {
                continue;
            }

            if let Some(pos) = line.find(MINT_PREFIX) {
                let rest = &line[pos + MINT_PREFIX.len()..];
                let mint: String = rest
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric())
                    .collect();
                if mint.is_empty() {
                    debug!(line_index, "empty mint= value");
                } else {
                    carried_mint = Some(mint);
                }
                continue;
            }

            let kind = if line.contains("Instruction: Buy") || line.contains("Instruction: Sell") {
                None
            } else if line.contains("Instruction: Create") {
                Some(LiquidityKind::Add)
            } else if line.contains("Instruction: Migrate") {
                Some(LiquidityKind::Remove)
            } else {
                continue;
            };

            let Some(mint) = carried_mint.as_deref() else {
                debug!(line_index, "instruction without a carried mint, skipping");
                continue;
            };

            events.push(match kind {
                None => self.swap(tx, line_index, mint),
                Some(kind) => self.liquidity(tx, line_index, mint, kind),
            });
        }

        events
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
