//! Layered error types for the TOKENSCOUT discovery service.
//!
//! This module provides a two-layer error system:
//!
//! - [`StoreError`] - Storage contract errors, with a typed duplicate-key
//!   signal callers interpret as "already processed"
//! - [`AppError`] - Application-level errors combining storage, wire, and
//!   lifecycle failures
//!
//! # Error Philosophy
//!
//! - Duplicate keys are an expected signal, not a failure; every handler
//!   that inserts raw events or candidates treats them as success
//! - Parse failures never surface as errors; a non-decodable log blob is
//!   skipped at WARN
//! - The runner never swallows a fatal error; it is returned from the loop

use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// STORE ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Errors produced by storage implementations.
///
/// These are the only errors the storage contracts may return; backends map
/// their native failures onto them.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The row (or, for bulk inserts, some row in the batch) already
    /// exists. Bulk inserts are all-or-nothing: nothing was written.
    #[error("duplicate key")]
    DuplicateKey,

    /// The row failed validation before hitting the backend.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The backend failed; fatal for the run.
    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    /// Whether this is the expected duplicate-key signal.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateKey)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// APPLICATION ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Application-level errors.
///
/// This is the primary error type used throughout the service.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppError {
    /// Storage failure that was not a duplicate-key signal.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Wire-client failure that outlived its retry budget.
    #[error(transparent)]
    Rpc(#[from] scout_rpc::RpcError),

    /// A push subscription could not be established.
    #[error("subscription error: {0}")]
    Subscription(String),

    /// An internal channel closed while the pipeline still needed it.
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    /// Configuration file error.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Startup failed before the pipeline was running.
    #[error("initialization error: {0}")]
    Initialization(String),
}

/// Type alias for application Results.
pub type Result<T> = std::result::Result<T, AppError>;

// ═══════════════════════════════════════════════════════════════════════════════
// CONVENIENCE HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Collapse a store result, treating duplicate-key as success.
///
/// Returns `Ok(true)` when the row was written, `Ok(false)` on a duplicate,
/// and the error otherwise.
///
/// # Errors
///
/// Propagates any [`StoreError`] other than [`StoreError::DuplicateKey`].
pub fn absorb_duplicate(result: std::result::Result<(), StoreError>) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(StoreError::DuplicateKey) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_is_flagged() {
        assert!(StoreError::DuplicateKey.is_duplicate());
        assert!(!StoreError::Storage("down".into()).is_duplicate());
    }

    #[test]
    fn absorb_duplicate_collapses_to_false() {
        assert!(absorb_duplicate(Ok(())).expect("should be ok"));
        assert!(!absorb_duplicate(Err(StoreError::DuplicateKey)).expect("should be ok"));
        assert!(absorb_duplicate(Err(StoreError::Storage("down".into()))).is_err());
    }

    #[test]
    fn app_error_from_store() {
        let app: AppError = StoreError::Storage("down".into()).into();
        assert!(matches!(app, AppError::Store(_)));
    }
}
