//! Persisted entities: discovered candidates, token metadata, and progress.
//!
//! Raw events are immutable once stored; candidates are append-only;
//! metadata is one-shot per candidate. Nothing is deleted on the happy
//! path.

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// CANDIDATE SOURCE
// ═══════════════════════════════════════════════════════════════════════════════

/// How a candidate was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandidateSource {
    /// First observed swap of a mint.
    NewToken,
    /// Recent activity spiked against the mint's own history.
    ActiveToken,
}

impl CandidateSource {
    /// Stable string form; feeds the candidate identity hash, so it must
    /// never change.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NewToken => "NEW_TOKEN",
            Self::ActiveToken => "ACTIVE_TOKEN",
        }
    }
}

impl std::fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TOKEN CANDIDATE
// ═══════════════════════════════════════════════════════════════════════════════

/// A discovered token of interest.
///
/// `candidate_id` is the deterministic SHA-256 over the identifying field
/// tuple (see [`crate::types::identity::candidate_id`]); replaying the same
/// input stream reproduces it byte for byte. At most one candidate exists
/// per mint across all sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenCandidate {
    /// Deterministic identifier (hex-lowercase SHA-256).
    pub candidate_id: String,

    /// Discovery mode that produced this candidate.
    pub source: CandidateSource,

    /// Mint of the discovered token.
    pub mint: String,

    /// Pool of the triggering event, when known.
    pub pool: Option<String>,

    /// Signature of the triggering transaction.
    pub tx_signature: String,

    /// Log-line index of the triggering event.
    pub event_index: i64,

    /// Slot of the triggering event.
    pub slot: i64,

    /// Discovery timestamp in milliseconds since the Unix epoch.
    pub discovered_at: i64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TOKEN METADATA
// ═══════════════════════════════════════════════════════════════════════════════

/// On-chain metadata fetched once per candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenMetadata {
    /// Candidate this metadata belongs to.
    pub candidate_id: String,

    /// Mint the metadata was fetched for.
    pub mint: String,

    /// Token name, when the metadata account carries one.
    pub name: Option<String>,

    /// Token symbol, when the metadata account carries one.
    pub symbol: Option<String>,

    /// Decimal places of the mint.
    pub decimals: u8,

    /// UI supply (raw supply scaled by decimals), when decodable.
    pub supply: Option<f64>,

    /// Fetch timestamp in milliseconds since the Unix epoch.
    pub fetched_at: i64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// DISCOVERY PROGRESS
// ═══════════════════════════════════════════════════════════════════════════════

/// Resumability checkpoint: the highest processed position plus the mints
/// already marked seen by the first-sight detector.
///
/// Purely an optimization. Correctness falls back on the candidate store's
/// uniqueness check and the duplicate-key insert race, so a missing
/// progress row never impairs a restart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryProgress {
    /// Highest fully processed slot.
    pub slot: i64,

    /// Signature of the last processed transaction in that slot.
    pub tx_signature: String,

    /// Mints the first-sight detector has already seen.
    pub seen_mints: Vec<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_strings_are_stable() {
        // These strings feed the identity hash; changing them silently
        // changes every candidate id.
        assert_eq!(CandidateSource::NewToken.as_str(), "NEW_TOKEN");
        assert_eq!(CandidateSource::ActiveToken.as_str(), "ACTIVE_TOKEN");
    }
}
