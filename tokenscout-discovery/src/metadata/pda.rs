//! Program-derived address computation.
//!
//! A PDA is the first SHA-256 of `seeds || bump || program_id ||
//! "ProgramDerivedAddress"` (bump iterating from 255 downward) whose 32
//! bytes are NOT a valid Edwards curve point, which guarantees no private
//! key exists for it. The metadata account of a mint lives at the PDA of
//! `["metadata", metadata_program, mint]` under the metadata program.

use curve25519_dalek::edwards::CompressedEdwardsY;
use sha2::{Digest, Sha256};
use tracing::warn;

/// Domain separator appended to every PDA hash.
const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Literal first seed of metadata accounts.
const METADATA_SEED: &[u8] = b"metadata";

/// Whether 32 bytes decompress to a valid Edwards point.
fn is_on_curve(bytes: &[u8; 32]) -> bool {
    CompressedEdwardsY(*bytes).decompress().is_some()
}

/// Find the program-derived address for `seeds` under `program_id`.
///
/// Returns the address and the bump that produced it, or `None` in the
/// (astronomically unlikely) case that every bump lands on the curve.
#[must_use]
pub fn find_program_address(seeds: &[&[u8]], program_id: &[u8; 32]) -> Option<([u8; 32], u8)> {
    for bump in (0..=255u8).rev() {
        let mut hasher = Sha256::new();
        for seed in seeds {
            hasher.update(seed);
        }
        hasher.update([bump]);
        hasher.update(program_id);
        hasher.update(PDA_MARKER);

        let digest: [u8; 32] = hasher.finalize().into();
        if !is_on_curve(&digest) {
            return Some((digest, bump));
        }
    }
    None
}

/// Derive the metadata account address for a mint.
///
/// Malformed inputs (addresses that are not 32-byte base58) yield `None`
/// and a WARN; the metadata fetch then simply skips.
#[must_use]
pub fn find_metadata_address(mint: &str, metadata_program: &str) -> Option<String> {
    let mint_bytes = decode_key(mint)?;
    let program_bytes = decode_key(metadata_program)?;

    let (address, _bump) = find_program_address(
        &[METADATA_SEED, &program_bytes, &mint_bytes],
        &program_bytes,
    )?;
    Some(bs58::encode(address).into_string())
}

fn decode_key(address: &str) -> Option<[u8; 32]> {
    let decoded = match bs58::decode(address).into_vec() {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!(address, error = %e, "malformed base58 address in PDA derivation");
            return None;
        }
    };
    match <[u8; 32]>::try_from(decoded) {
        Ok(bytes) => Some(bytes),
        Err(_) => {
            warn!(address, "address is not 32 bytes in PDA derivation");
            None
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

    const METADATA_PROGRAM: &str = "metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s";

    #[test]
    fn usdc_metadata_address_matches_mainnet() {
        // Fixed mainnet vector: the metadata PDA of the USDC mint.
        let address = find_metadata_address(
            "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
            METADATA_PROGRAM,
        )
        .expect("derivation failed");
        assert_eq!(address, "5x38Kp4hvdomTCnCrAny4UtMUt5rQBdB6px2K1Ui45Wq");
    }

    #[test]
    fn synthetic_mint_vector() {
        // bs58 of [7u8; 32]; expected PDA computed independently.
        let address = find_metadata_address(
            "US517G5965aydkZ46HS38QLi7UQiSojurfbQfKCELFx",
            METADATA_PROGRAM,
        )
        .expect("derivation failed");
        assert_eq!(address, "ujra22P6fooR9bYj8aMN7hqB5EcXizecG4pWQXNqa1C");
    }

    #[test]
    fn derivation_is_deterministic_and_mint_sensitive() {
        let a = find_metadata_address("US517G5965aydkZ46HS38QLi7UQiSojurfbQfKCELFx", METADATA_PROGRAM);
        let b = find_metadata_address("US517G5965aydkZ46HS38QLi7UQiSojurfbQfKCELFx", METADATA_PROGRAM);
        let c = find_metadata_address("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", METADATA_PROGRAM);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn malformed_inputs_yield_none() {
        assert!(find_metadata_address("0OIl-not-base58", METADATA_PROGRAM).is_none());
        assert!(find_metadata_address("abc", METADATA_PROGRAM).is_none());
        assert!(find_metadata_address("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", "short").is_none());
    }

    #[test]
    fn derived_addresses_are_off_curve() {
        let program = [42u8; 32];
        let (address, _bump) =
            find_program_address(&[b"seed"], &program).expect("derivation failed");
        assert!(!is_on_curve(&address));
    }
}
