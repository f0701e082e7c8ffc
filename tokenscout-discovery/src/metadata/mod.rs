//! Token metadata enrichment.
//!
//! Fired as a side-effect of every newly emitted candidate: fetch the mint
//! account for decimals and supply, derive the metadata PDA, and parse
//! name/symbol out of the metadata account. One row lands per candidate;
//! a duplicate-key on insert means another worker enriched first and is
//! silently absorbed.

pub mod pda;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use scout_rpc::RpcClient;
use tracing::{debug, instrument, warn};

use crate::error::Result;
use crate::ports::store::TokenMetadataStore;
use crate::types::entities::{TokenCandidate, TokenMetadata};

pub use pda::{find_metadata_address, find_program_address};

// ═══════════════════════════════════════════════════════════════════════════════
// MINT ACCOUNT LAYOUT
// ═══════════════════════════════════════════════════════════════════════════════

/// Size of a token mint account.
const MINT_ACCOUNT_LEN: usize = 82;

/// Byte offset of the little-endian u64 raw supply.
const SUPPLY_OFFSET: usize = 36;

/// Byte offset of the decimals byte.
const DECIMALS_OFFSET: usize = 44;

/// Longest name the metadata account may carry.
const MAX_NAME_LEN: usize = 100;

/// Longest symbol the metadata account may carry.
const MAX_SYMBOL_LEN: usize = 20;

/// Decode decimals and UI supply out of a raw mint account.
///
/// Returns `None` when the buffer is too short to be a mint account.
#[must_use]
pub fn decode_mint_account(data: &[u8]) -> Option<(u8, f64)> {
    if data.len() < MINT_ACCOUNT_LEN {
        return None;
    }
    let supply_raw = u64::from_le_bytes(
        data.get(SUPPLY_OFFSET..SUPPLY_OFFSET + 8)?.try_into().ok()?,
    );
    let decimals = *data.get(DECIMALS_OFFSET)?;
    let supply = supply_raw as f64 / 10f64.powi(i32::from(decimals));
    Some((decimals, supply))
}

/// Parse name and symbol out of a metadata account.
///
/// Layout: `key(1) | update_auth(32) | mint(32) | name(4+len) |
/// symbol(4+len) | …` with length-prefixed little-endian strings. Lengths
/// outside sanity bounds (name ≤ 100, symbol ≤ 20) abort the parse;
/// trailing NUL padding is trimmed.
#[must_use]
pub fn parse_metadata_account(data: &[u8]) -> (Option<String>, Option<String>) {
    let mut offset = 1 + 32 + 32;
    let name = read_prefixed_string(data, &mut offset, MAX_NAME_LEN);
    if name.is_none() {
        return (None, None);
    }
    let symbol = read_prefixed_string(data, &mut offset, MAX_SYMBOL_LEN);
    (name.filter(|s| !s.is_empty()), symbol.filter(|s| !s.is_empty()))
}

fn read_prefixed_string(data: &[u8], offset: &mut usize, max_len: usize) -> Option<String> {
    let len_bytes: [u8; 4] = data.get(*offset..*offset + 4)?.try_into().ok()?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > max_len {
        return None;
    }
    let raw = data.get(*offset + 4..*offset + 4 + len)?;
    *offset += 4 + len;

    let text = String::from_utf8_lossy(raw);
    Some(text.trim_end_matches('\0').to_string())
}

// ═══════════════════════════════════════════════════════════════════════════════
// METADATA FETCHER
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything fetched for one mint, before it is tied to a candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedMetadata {
    /// The mint the data belongs to.
    pub mint: String,
    /// Token name, when the metadata account carries one.
    pub name: Option<String>,
    /// Token symbol, when the metadata account carries one.
    pub symbol: Option<String>,
    /// Decimal places of the mint.
    pub decimals: u8,
    /// UI supply, when decodable.
    pub supply: Option<f64>,
}

/// Fetches and decodes on-chain token metadata.
#[derive(Debug)]
pub struct MetadataFetcher {
    rpc: Arc<RpcClient>,
    metadata_program: String,
}

impl MetadataFetcher {
    /// Create a fetcher against the given metadata program.
    #[must_use]
    pub fn new(rpc: Arc<RpcClient>, metadata_program: impl Into<String>) -> Self {
        Self {
            rpc,
            metadata_program: metadata_program.into(),
        }
    }

    /// Fetch metadata for a mint.
    ///
    /// Returns `None` when the mint account does not exist or is not
    /// decodable. A missing metadata account only leaves name/symbol unset.
    ///
    /// # Errors
    ///
    /// Returns an error when the RPC client exhausts its retry budget.
    #[instrument(skip(self))]
    pub async fn fetch(&self, mint: &str) -> Result<Option<FetchedMetadata>> {
        let Some(account) = self.rpc.get_account_info(mint).await? else {
            debug!(mint, "mint account not found");
            return Ok(None);
        };
        let Some((decimals, supply)) = account.decode_data().as_deref().and_then(decode_mint_account)
        else {
            warn!(mint, "mint account not decodable");
            return Ok(None);
        };

        let mut fetched = FetchedMetadata {
            mint: mint.into(),
            name: None,
            symbol: None,
            decimals,
            supply: Some(supply),
        };

        let Some(metadata_address) = find_metadata_address(mint, &self.metadata_program) else {
            warn!(mint, "metadata address derivation failed, skipping name/symbol");
            return Ok(Some(fetched));
        };

        if let Some(account) = self.rpc.get_account_info(&metadata_address).await? {
            if let Some(data) = account.decode_data() {
                let (name, symbol) = parse_metadata_account(&data);
                fetched.name = name;
                fetched.symbol = symbol;
            }
        } else {
            debug!(mint, metadata_address, "no metadata account");
        }

        Ok(Some(fetched))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// METADATA ENRICHER
// ═══════════════════════════════════════════════════════════════════════════════

/// Ties fetched metadata to a candidate and persists it.
pub struct MetadataEnricher {
    fetcher: MetadataFetcher,
    store: Arc<dyn TokenMetadataStore>,
}

impl std::fmt::Debug for MetadataEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataEnricher")
            .field("fetcher", &self.fetcher)
            .finish_non_exhaustive()
    }
}

impl MetadataEnricher {
    /// Create an enricher over a metadata store.
    #[must_use]
    pub fn new(fetcher: MetadataFetcher, store: Arc<dyn TokenMetadataStore>) -> Self {
        Self { fetcher, store }
    }

    /// Fetch and persist metadata for a freshly emitted candidate.
    ///
    /// Duplicate-key on insert is expected (another worker was faster) and
    /// silent.
    ///
    /// # Errors
    ///
    /// Returns an error when the fetch or a non-duplicate insert fails.
    #[instrument(skip(self, candidate), fields(mint = %candidate.mint))]
    pub async fn enrich(&self, candidate: &TokenCandidate) -> Result<()> {
        let Some(fetched) = self.fetcher.fetch(&candidate.mint).await? else {
            return Ok(());
        };

        let row = TokenMetadata {
            candidate_id: candidate.candidate_id.clone(),
            mint: fetched.mint,
            name: fetched.name,
            symbol: fetched.symbol,
            decimals: fetched.decimals,
            supply: fetched.supply,
            fetched_at: now_ms(),
        };

        match self.store.insert(&row).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_duplicate() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as BASE64;

    use super::*;

    // 82-byte mint account: supply 1_000_000_000_000 raw, 6 decimals.
    const MINT_ACCOUNT_B64: &str = "AQAAAAICAgICAgICAgICAgICAgICAgICAgICAgICAgICAgICABCl1OgAAAAGAQAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA==";

    // Metadata account: name "Test Token" (NUL-padded), symbol "TEST".
    const METADATA_ACCOUNT_B64: &str = "BAMDAwMDAwMDAwMDAwMDAwMDAwMDAwMDAwMDAwMDAwMDBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcPAAAAVGVzdCBUb2tlbgAAAAAABgAAAFRFU1QAAB0AAABodHRwczovL2V4YW1wbGUuY29tL21ldGEuanNvbg==";

    #[test]
    fn mint_account_decodes_supply_and_decimals() {
        let data = BASE64.decode(MINT_ACCOUNT_B64).expect("decode failed");
        let (decimals, supply) = decode_mint_account(&data).expect("mint account expected");

        assert_eq!(decimals, 6);
        assert!((supply - 1_000_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn short_mint_account_is_rejected() {
        assert!(decode_mint_account(&[0u8; 40]).is_none());
    }

    #[test]
    fn metadata_account_parses_name_and_symbol() {
        let data = BASE64.decode(METADATA_ACCOUNT_B64).expect("decode failed");
        let (name, symbol) = parse_metadata_account(&data);

        assert_eq!(name.as_deref(), Some("Test Token"), "trailing NULs trimmed");
        assert_eq!(symbol.as_deref(), Some("TEST"));
    }

    #[test]
    fn oversized_name_length_aborts_parse() {
        // Prefix claims a 5000-byte name.
        let mut data = vec![0u8; 1 + 32 + 32];
        data.extend_from_slice(&5000u32.to_le_bytes());
        data.extend_from_slice(&[b'x'; 64]);

        let (name, symbol) = parse_metadata_account(&data);
        assert!(name.is_none());
        assert!(symbol.is_none());
    }

    #[test]
    fn truncated_metadata_account_yields_nothing() {
        let (name, symbol) = parse_metadata_account(&[4u8; 40]);
        assert!(name.is_none());
        assert!(symbol.is_none());
    }
}
