//! The deterministic candidate identifier.
//!
//! Independent observers replaying the same input must produce the same
//! candidate rows, so the identifier is a pure hash over a documented field
//! tuple rather than a generated key.

use sha2::{Digest, Sha256};

use super::entities::CandidateSource;

/// Compute the stable candidate identifier.
///
/// The identifier is the hex-lowercase SHA-256 over
/// `"mint|pool|source|tx_signature|event_index|slot"` with `|` separators,
/// decimal integer encoding, and a missing pool rendered as the empty
/// string.
#[must_use]
pub fn candidate_id(
    mint: &str,
    pool: Option<&str>,
    source: CandidateSource,
    tx_signature: &str,
    event_index: i64,
    slot: i64,
) -> String {
    let preimage = format!(
        "{mint}|{pool}|{source}|{tx_signature}|{event_index}|{slot}",
        pool = pool.unwrap_or(""),
        source = source.as_str(),
    );
    let digest = Sha256::digest(preimage.as_bytes());
    hex::encode(digest)
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
