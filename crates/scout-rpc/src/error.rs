//! Error types for the Solana RPC clients.
//!
//! This module provides the error hierarchy for both wire clients:
//!
//! - [`RpcError`] - The primary error type for all client operations
//! - [`RpcErrorDetail`] - The raw JSON-RPC error object from the server
//!
//! # Error Philosophy
//!
//! These errors are designed to be:
//! - **Actionable**: each variant tells you what went wrong
//! - **Convertible**: easy to wrap into an application's error types
//! - **Informative**: carries the remote error code and message verbatim

use std::fmt;

use thiserror::Error;

/// Result type alias using [`RpcError`].
pub type Result<T> = std::result::Result<T, RpcError>;

/// Errors that can occur when using the Solana RPC clients.
///
/// # Categories
///
/// | Category | Variants | Typical Cause |
/// |----------|----------|---------------|
/// | Network | `Connection`, `Timeout`, `Http` | Network issues, node down |
/// | Protocol | `Rpc`, `RateLimited` | Node rejected the request |
/// | Push | `SubscribeTimeout`, `SubscriptionClosed` | WebSocket lifecycle |
/// | Data | `Serialization`, `InvalidResponse` | Malformed data |
/// | Usage | `InvalidConfig`, `Cancelled` | Caller-side conditions |
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RpcError {
    /// Failed to establish a connection to the RPC endpoint.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Request timed out waiting for a response.
    #[error("request timed out")]
    Timeout,

    /// HTTP-level error (non-2xx status code, TLS issues, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The node returned an HTTP 429 (rate limit). Retryable with backoff.
    #[error("rate limited by remote (HTTP 429)")]
    RateLimited,

    /// JSON-RPC error returned by the node.
    ///
    /// Contains the error code and message from the RPC response.
    #[error("RPC error ({code}): {message}")]
    Rpc {
        /// JSON-RPC error code (e.g., -32601 for method not found).
        code: i64,
        /// Human-readable error message from the node.
        message: String,
        /// Optional additional data from the error response.
        data: Option<String>,
    },

    /// Retry budget exhausted; the final attempt's error is carried inside.
    #[error("retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Number of attempts made before giving up.
        attempts: u32,
        /// The error from the final attempt.
        #[source]
        source: Box<RpcError>,
    },

    /// A subscription confirmation did not arrive within the deadline.
    #[error("subscription confirmation timed out after {0:?}")]
    SubscribeTimeout(std::time::Duration),

    /// The push connection is closed and will not be re-established.
    #[error("subscription closed: {0}")]
    SubscriptionClosed(String),

    /// Failed to serialize a request or deserialize a response.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Response was valid JSON but had an unexpected structure.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Invalid configuration provided to the client.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The operation was aborted by cancellation.
    #[error("operation cancelled")]
    Cancelled,
}

impl RpcError {
    /// Create an RPC error from code and message.
    #[must_use]
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Check if this error is transient and worth retrying.
    ///
    /// Returns `true` for network issues, timeouts, HTTP 429, and 429-class
    /// JSON-RPC responses (some providers surface rate limiting as a
    /// `-32429` code or a generic `-32005` limit-exceeded).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout | Self::RateLimited => true,
            Self::Http(msg) => {
                msg.contains("429")
                    || msg.contains("500")
                    || msg.contains("502")
                    || msg.contains("503")
                    || msg.contains("504")
            }
            Self::Rpc { code, .. } => *code == -32429 || *code == -32005,
            _ => false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONVERSIONS FROM reqwest ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection(err.to_string())
        } else if err.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
            Self::RateLimited
        } else {
            Self::Http(err.to_string())
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RPC ERROR DETAILS
// ═══════════════════════════════════════════════════════════════════════════════

/// Detailed information from a JSON-RPC error response.
///
/// Used for parsing error objects out of node responses.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RpcErrorDetail {
    /// JSON-RPC error code.
    pub code: i64,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional error data.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl RpcErrorDetail {
    /// Convert this detail into an [`RpcError`].
    #[must_use]
    pub fn into_error(self) -> RpcError {
        RpcError::Rpc {
            code: self.code,
            message: self.message,
            data: self.data.map(|v| v.to_string()),
        }
    }
}

impl fmt::Display for RpcErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RPC error ({}): {}", self.code, self.message)
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
    fn error_is_retryable() {
        assert!(RpcError::Timeout.is_retryable());
        assert!(RpcError::Connection("refused".into()).is_retryable());
        assert!(RpcError::RateLimited.is_retryable());
        assert!(RpcError::Http("HTTP status 429 Too Many Requests".into()).is_retryable());
        assert!(RpcError::rpc(-32429, "rate limited").is_retryable());
        assert!(RpcError::rpc(-32005, "limit exceeded").is_retryable());

        assert!(!RpcError::rpc(-32601, "method not found").is_retryable());
        assert!(!RpcError::InvalidResponse("missing field".into()).is_retryable());
        assert!(!RpcError::Cancelled.is_retryable());
    }

    #[test]
    fn rpc_error_detail_deserialization() {
        let json = r#"{"code": -32601, "message": "Method not found"}"#;
        let detail: RpcErrorDetail = serde_json::from_str(json).expect("parse failed");
        assert_eq!(detail.code, -32601);
        assert_eq!(detail.message, "Method not found");
        assert!(detail.data.is_none());
    }

    #[test]
    fn rpc_error_detail_into_error_keeps_code() {
        let detail = RpcErrorDetail {
            code: -32005,
            message: "limit exceeded".into(),
            data: None,
        };
        let error = detail.into_error();
        assert!(matches!(error, RpcError::Rpc { code: -32005, .. }));
    }

    #[test]
    fn retries_exhausted_carries_source() {
        let inner = RpcError::RateLimited;
        let err = RpcError::RetriesExhausted {
            attempts: 3,
            source: Box::new(inner),
        };
        assert!(err.to_string().contains("3 attempts"));
        assert!(err.to_string().contains("429"));
    }
}
