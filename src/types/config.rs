//! Configuration structures.
//!
//! Configuration is loaded from an optional JSON file, then overridden by
//! environment variables.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::errors::{Error, Result};

/// Environment variable overriding `backend.base_url`.
pub const ENV_API_URL: &str = "FSFVI_API_URL";
/// Environment variable overriding `auth.token_file`.
pub const ENV_TOKEN_FILE: &str = "FSFVI_TOKEN_FILE";
/// Environment variable overriding `backend.timeout` (humantime, e.g. `90s`).
pub const ENV_TIMEOUT: &str = "FSFVI_TIMEOUT";
/// Environment variable switching log output to JSON when set to `json`.
pub const ENV_LOG_FORMAT: &str = "FSFVI_LOG_FORMAT";

/// Global orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Analysis backend configuration.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Credential storage configuration.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load from a JSON file (if given) and apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    Error::config(format!("cannot read {}: {}", path.display(), e))
                })?;
                serde_json::from_str(&raw).map_err(|e| {
                    Error::config(format!("cannot parse {}: {}", path.display(), e))
                })?
            }
            None => Config::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL) {
            self.backend.base_url = url;
        }
        if let Some(path) = lookup(ENV_TOKEN_FILE) {
            self.auth.token_file = PathBuf::from(path);
        }
        if let Some(raw) = lookup(ENV_TIMEOUT) {
            self.backend.timeout = humantime_serde::re::humantime::parse_duration(&raw)
                .map_err(|e| Error::config(format!("{}={:?}: {}", ENV_TIMEOUT, raw, e)))?;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            self.observability.json_logs = format.eq_ignore_ascii_case("json");
        }
        Ok(())
    }
}

/// Analysis backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the analysis service.
    pub base_url: String,

    /// Per-request timeout. Optimization calls can take several seconds.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Endpoint path overrides keyed by tool id.
    pub endpoints: HashMap<String, String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            timeout: Duration::from_secs(120),
            endpoints: HashMap::new(),
        }
    }
}

/// Credential storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// File holding the bearer token.
    pub token_file: PathBuf,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_file: PathBuf::from(".fsfvi/token"),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
