//! Settings structs and loading logic.
//!
//! All settings have sensible defaults and can be overridden via
//! environment variables or configuration files.

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Wire client configuration.
    pub rpc: RpcSettings,
    /// Monitored DEX programs and protocol constants.
    pub programs: ProgramSettings,
    /// Ordering runner configuration.
    pub runner: RunnerSettings,
    /// Spike detection thresholds.
    pub detection: DetectionSettings,
    /// Internal channel sizing.
    pub channels: ChannelSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
    /// Metrics configuration.
    pub metrics: MetricsSettings,
}

impl Settings {
    /// Load settings from configuration files and environment variables.
    ///
    /// Files are loaded in this order (later overrides earlier):
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (if exists)
    /// 3. Environment variables with `TOKENSCOUT_` prefix
    ///
    /// # Arguments
    /// * `environment` - Environment name (e.g., "development", "production")
    ///
    /// # Errors
    /// Returns `ConfigError` if configuration is invalid or cannot be loaded.
    pub fn load(environment: &str) -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("rpc.http_url", "https://api.mainnet-beta.solana.com")?
            .set_default("rpc.ws_url", "wss://api.mainnet-beta.solana.com")?
            .set_default("rpc.max_retries", 3)?
            .set_default("rpc.retry_base_delay_ms", 500)?
            .set_default("rpc.retry_max_delay_ms", 8000)?
            .set_default("rpc.request_timeout_ms", 30_000)?
            .set_default("rpc.commitment", "confirmed")?
            .set_default(
                "programs.amm_program",
                "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8",
            )?
            .set_default(
                "programs.curve_program",
                "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P",
            )?
            .set_default(
                "programs.quote_mint",
                "So11111111111111111111111111111111111111112",
            )?
            .set_default(
                "programs.metadata_program",
                "metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s",
            )?
            .set_default("runner.lag_window_slots", 5)?
            .set_default("runner.flush_interval_ms", 5000)?
            .set_default("runner.detection_interval_ms", 3_600_000)?
            .set_default("detection.volume_multiplier", 3.0)?
            .set_default("detection.swap_count_multiplier", 5.0)?
            .set_default("detection.liquidity_spike", true)?
            .set_default("channels.event_buffer", 10_000)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "text")?
            .set_default("metrics.enabled", false)?
            .set_default("metrics.host", "0.0.0.0")?
            .set_default("metrics.port", 9090)?
            // Load default configuration file
            .add_source(File::with_name(&format!("{config_dir}/default")).required(false))
            // Load environment-specific file
            .add_source(File::with_name(&format!("{config_dir}/{environment}")).required(false))
            // Override with environment variables (TOKENSCOUT_ prefix)
            .add_source(
                Environment::with_prefix("TOKENSCOUT")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Load settings from a specific file path.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()
    }

    /// Validate settings and return any validation errors.
    ///
    /// # Errors
    /// Returns a list of validation error messages.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.rpc.http_url.is_empty() {
            errors.push("rpc.http_url cannot be empty".into());
        }
        if self.rpc.ws_url.is_empty() {
            errors.push("rpc.ws_url cannot be empty".into());
        }

        if self.programs.amm_program.is_empty() && self.programs.curve_program.is_empty() {
            errors.push("at least one DEX program must be configured".into());
        }
        if self.programs.quote_mint.is_empty() {
            errors.push("programs.quote_mint cannot be empty".into());
        }

        if self.runner.lag_window_slots < 0 {
            errors.push("runner.lag_window_slots cannot be negative".into());
        }
        if self.runner.flush_interval_ms == 0 {
            errors.push("runner.flush_interval_ms must be non-zero".into());
        }
        if self.runner.detection_interval_ms == 0 {
            errors.push("runner.detection_interval_ms must be non-zero".into());
        }

        if self.detection.volume_multiplier <= 0.0 {
            errors.push("detection.volume_multiplier must be positive".into());
        }
        if self.detection.swap_count_multiplier <= 0.0 {
            errors.push("detection.swap_count_multiplier must be positive".into());
        }

        if self.channels.event_buffer == 0 {
            errors.push("channels.event_buffer must be non-zero".into());
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Wire client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcSettings {
    /// HTTP JSON-RPC endpoint URL.
    pub http_url: String,
    /// WebSocket endpoint URL (for push subscriptions).
    pub ws_url: String,
    /// Retries after the initial attempt for transient failures.
    pub max_retries: u32,
    /// Base backoff delay in milliseconds.
    pub retry_base_delay_ms: u64,
    /// Backoff delay cap in milliseconds.
    pub retry_max_delay_ms: u64,
    /// Request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Commitment level for requests and subscriptions.
    pub commitment: String,
}

impl RpcSettings {
    /// Get the base retry delay as a `Duration`.
    #[must_use]
    pub const fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Get the retry delay cap as a `Duration`.
    #[must_use]
    pub const fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Monitored DEX programs and protocol constants.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgramSettings {
    /// AMM dialect program id (empty disables the dialect).
    pub amm_program: String,
    /// Bonding-curve dialect program id (empty disables the dialect).
    pub curve_program: String,
    /// Quote-currency mint skipped during mint selection.
    pub quote_mint: String,
    /// Metadata program id for enrichment.
    pub metadata_program: String,
}

impl ProgramSettings {
    /// All configured (non-empty) program ids.
    #[must_use]
    pub fn configured_programs(&self) -> Vec<String> {
        [&self.amm_program, &self.curve_program]
            .into_iter()
            .filter(|p| !p.is_empty())
            .cloned()
            .collect()
    }
}

/// Ordering runner configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerSettings {
    /// Slots a slot must trail the head before finalization.
    pub lag_window_slots: i64,
    /// Wall-clock drain cadence in milliseconds.
    pub flush_interval_ms: u64,
    /// Spike detection cadence in milliseconds.
    pub detection_interval_ms: u64,
}

impl RunnerSettings {
    /// Get the flush interval as a `Duration`.
    #[must_use]
    pub const fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Get the detection interval as a `Duration`.
    #[must_use]
    pub const fn detection_interval(&self) -> Duration {
        Duration::from_millis(self.detection_interval_ms)
    }
}

/// Spike detection thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionSettings {
    /// Last-hour volume must exceed this multiple of the hourly average.
    pub volume_multiplier: f64,
    /// Last-hour swap count must exceed this multiple of the hourly average.
    pub swap_count_multiplier: f64,
    /// Whether liquidity flow is evaluated as a parallel spike signal.
    pub liquidity_spike: bool,
}

/// Internal channel sizing.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelSettings {
    /// Capacity of the source→runner event channels. Sends block when
    /// full; nothing is dropped.
    pub event_buffer: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (e.g., "info", "debug").
    pub level: String,
    /// Output format: "text" or "json".
    pub format: String,
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSettings {
    /// Whether the Prometheus exporter is started.
    pub enabled: bool,
    /// Exporter bind host.
    pub host: String,
    /// Exporter bind port.
    pub port: u16,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn defaults() -> Settings {
        Settings::load("test").expect("defaults must load")
    }

    #[test]
    fn defaults_load_and_validate() {
        let settings = defaults();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.runner.lag_window_slots, 5);
        assert_eq!(settings.runner.flush_interval(), Duration::from_secs(5));
        assert_eq!(settings.runner.detection_interval(), Duration::from_secs(3600));
        assert!((settings.detection.volume_multiplier - 3.0).abs() < f64::EPSILON);
        assert!((settings.detection.swap_count_multiplier - 5.0).abs() < f64::EPSILON);
        assert_eq!(settings.channels.event_buffer, 10_000);
    }

    #[test]
    fn both_dialects_configured_by_default() {
        let settings = defaults();
        assert_eq!(settings.programs.configured_programs().len(), 2);
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut settings = defaults();
        settings.rpc.http_url.clear();
        settings.runner.flush_interval_ms = 0;
        settings.detection.volume_multiplier = -1.0;

        let errors = settings.validate().expect_err("validation must fail");
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn disabling_one_dialect_is_allowed() {
        let mut settings = defaults();
        settings.programs.amm_program.clear();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.programs.configured_programs().len(), 1);

        settings.programs.curve_program.clear();
        assert!(settings.validate().is_err(), "no dialect at all is invalid");
    }
}
