//! Configuration loading and validation for the discovery service.
//!
//! Configuration is loaded from multiple sources in order of precedence:
//! 1. Environment variables (highest)
//! 2. Environment-specific file (e.g., `development.toml`)
//! 3. Default file (`default.toml`)
//!
//! # Example
//!
//! ```ignore
//! use tokenscout_discovery::config::Settings;
//!
//! let settings = Settings::load("development")?;
//! println!("RPC URL: {}", settings.rpc.http_url);
//! ```

mod settings;

pub use settings::{
    ChannelSettings, DetectionSettings, LoggingSettings, MetricsSettings, ProgramSettings,
    RpcSettings, RunnerSettings, Settings,
};
