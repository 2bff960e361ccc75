use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::sync::Stop;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address the HTTP server binds to
    #[serde(default = "Config::default_bind_address")]
    pub bind_address: String,
    /// Stop key -> stop descriptor. The keys are the opaque identifiers
    /// the display client queries by.
    pub stops: HashMap<String, Stop>,
    /// Provider name -> access token
    pub keys: HashMap<String, String>,
    /// IANA timezone the display hangs in. Schedule rules evaluate
    /// time-of-day and day-of-week in this zone.
    #[serde(default = "Config::default_timezone")]
    pub timezone: String,
    /// Refresh loop configuration
    #[serde(default)]
    pub refresh: RefreshConfig,
    /// Allowed CORS origins. Required unless cors_permissive is true.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Explicitly allow all origins (development only). Defaults to false.
    #[serde(default)]
    pub cors_permissive: bool,
}

/// Configuration for the prediction refresh loop
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    /// Seconds between schedule checks (default: 1). Much finer-grained
    /// than any rule cadence so a due refresh starts promptly.
    #[serde(default = "RefreshConfig::default_check_interval_secs")]
    pub check_interval_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: Self::default_check_interval_secs(),
        }
    }
}

impl RefreshConfig {
    fn default_check_interval_secs() -> u64 {
        1
    }
}

impl Config {
    fn default_bind_address() -> String {
        "0.0.0.0:3000".to_string()
    }

    fn default_timezone() -> String {
        "America/Los_Angeles".to_string()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Access token for the named provider. A missing credential is a
    /// fatal startup error.
    pub fn provider_key(&self, provider: &str) -> Result<&str, ConfigError> {
        self.keys
            .get(provider)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::MissingKey(provider.to_string()))
    }

    pub fn display_timezone(&self) -> Result<chrono_tz::Tz, ConfigError> {
        self.timezone
            .parse()
            .map_err(|_| ConfigError::InvalidTimezone(self.timezone.clone()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
    #[error("No access token for provider {0} in config keys")]
    MissingKey(String),
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),
}
