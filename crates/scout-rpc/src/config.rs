//! Configuration for the Solana RPC clients.
//!
//! This module provides [`ClientConfig`] for the request/response client and
//! [`PushConfig`] for the WebSocket push client.
//!
//! # Example
//!
//! ```
//! use scout_rpc::ClientConfig;
//! use std::time::Duration;
//!
//! let config = ClientConfig::default()
//!     .with_timeout(Duration::from_secs(60))
//!     .with_max_retries(5);
//! ```

use std::time::Duration;

use crate::error::{Result, RpcError};

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Default timeout for HTTP requests to the RPC endpoint.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff between retries.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Default cap for the exponential backoff delay.
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(8);

/// Deadline for a subscription confirmation to arrive.
pub const DEFAULT_SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Keep-alive ping interval on the push connection.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Read deadline on the push connection; a silent socket past this is dead.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Initial reconnect backoff delay for the push connection.
pub const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Cap for the reconnect backoff delay.
pub const DEFAULT_RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Buffer size of each per-subscription notification channel.
///
/// Sends into a full channel block the reader, pushing back-pressure onto
/// the transport rather than dropping events.
pub const DEFAULT_NOTIFICATION_BUFFER: usize = 10_000;

// ═══════════════════════════════════════════════════════════════════════════════
// REQUEST/RESPONSE CLIENT CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration options for [`RpcClient`](crate::RpcClient).
///
/// The default retry schedule is an initial attempt plus three retries
/// sleeping 500 ms → 1 s → 2 s, capped at
/// [`retry_max_delay`](Self::retry_max_delay).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request timeout for HTTP calls.
    pub timeout: Duration,

    /// Retries after the initial attempt (0 disables retrying).
    pub max_retries: u32,

    /// Base delay for exponential backoff. Doubles after each attempt.
    pub retry_base_delay: Duration,

    /// Upper bound on the backoff delay.
    pub retry_max_delay: Duration,

    /// Commitment level sent with requests that accept one.
    pub commitment: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            retry_max_delay: DEFAULT_RETRY_MAX_DELAY,
            commitment: "confirmed".into(),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry attempt budget.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the backoff base delay.
    #[must_use]
    pub const fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Set the backoff delay cap.
    #[must_use]
    pub const fn with_retry_max_delay(mut self, delay: Duration) -> Self {
        self.retry_max_delay = delay;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::InvalidConfig`] when a value is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.retry_base_delay > self.retry_max_delay {
            return Err(RpcError::InvalidConfig(
                "retry_base_delay cannot exceed retry_max_delay".into(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(RpcError::InvalidConfig("timeout must be non-zero".into()));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PUSH CLIENT CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration options for [`PushClient`](crate::PushClient).
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Deadline for a subscription confirmation.
    pub subscribe_timeout: Duration,

    /// Keep-alive ping interval.
    pub ping_interval: Duration,

    /// Read deadline; a read that stalls past this triggers reconnection.
    pub read_timeout: Duration,

    /// Initial reconnect backoff delay. Doubles per failed attempt.
    pub reconnect_base_delay: Duration,

    /// Reconnect backoff cap. The delay resets to the base after any
    /// successful read.
    pub reconnect_max_delay: Duration,

    /// Buffer size of each subscription's notification channel.
    pub notification_buffer: usize,

    /// Commitment level sent with `logsSubscribe`.
    pub commitment: String,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            subscribe_timeout: DEFAULT_SUBSCRIBE_TIMEOUT,
            ping_interval: DEFAULT_PING_INTERVAL,
            read_timeout: DEFAULT_READ_TIMEOUT,
            reconnect_base_delay: DEFAULT_RECONNECT_BASE_DELAY,
            reconnect_max_delay: DEFAULT_RECONNECT_MAX_DELAY,
            notification_buffer: DEFAULT_NOTIFICATION_BUFFER,
            commitment: "confirmed".into(),
        }
    }
}

impl PushConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the subscription confirmation deadline.
    #[must_use]
    pub const fn with_subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.subscribe_timeout = timeout;
        self
    }

    /// Set the notification channel buffer size.
    #[must_use]
    pub const fn with_notification_buffer(mut self, buffer: usize) -> Self {
        self.notification_buffer = buffer;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::InvalidConfig`] when a value is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.notification_buffer == 0 {
            return Err(RpcError::InvalidConfig(
                "notification_buffer must be non-zero".into(),
            ));
        }
        if self.reconnect_base_delay > self.reconnect_max_delay {
            return Err(RpcError::InvalidConfig(
                "reconnect_base_delay cannot exceed reconnect_max_delay".into(),
            ));
        }
        if self.read_timeout <= self.ping_interval {
            return Err(RpcError::InvalidConfig(
                "read_timeout must exceed ping_interval".into(),
            ));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_defaults_match_retry_schedule() {
        let config = ClientConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_base_delay, Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn client_config_rejects_inverted_backoff() {
        let config = ClientConfig::default()
            .with_retry_base_delay(Duration::from_secs(10))
            .with_retry_max_delay(Duration::from_secs(1));
        assert!(config.validate().is_err());
    }

    #[test]
    fn push_defaults_are_consistent() {
        let config = PushConfig::default();
        assert!(config.read_timeout > config.ping_interval);
        assert!(config.notification_buffer >= 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn push_config_rejects_tight_read_timeout() {
        let config = PushConfig {
            read_timeout: Duration::from_secs(10),
            ..PushConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
