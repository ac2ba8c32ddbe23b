//! Configuration for cleaning runs.
//!
//! This module provides the run configuration (checkpoint location, pacing,
//! retry ceiling, worker count) plus the externally supplied settings for the
//! chat-completion endpoint and the remote table store.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default chat-completion endpoint base URL.
pub const DEFAULT_API_BASE: &str = "https://api.pawan.krd/v1";

/// Default chat model used for cleaning.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for a cleaning run.
#[derive(Debug, Clone)]
pub struct CleanerConfig {
    /// Root directory for per-run checkpoints (`{steps_dir}/{run_id}/{stage}`).
    pub steps_dir: PathBuf,
    /// Append-only audit log of raw classifier responses.
    pub audit_log_path: PathBuf,
    /// Pause before every classifier call inside a shard.
    pub request_delay: Duration,
    /// Retries after the first failed classifier call.
    pub max_retries: u32,
    /// Number of shards processed concurrently.
    pub workers: usize,
    /// How often the progress monitor logs counters.
    pub progress_interval: Duration,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            steps_dir: PathBuf::from("./steps"),
            audit_log_path: PathBuf::from("./log.txt"),
            request_delay: Duration::from_millis(500),
            max_retries: 3,
            workers: 4,
            progress_interval: Duration::from_secs(10),
        }
    }
}

impl CleanerConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::ValidationFailed(
                "workers must be greater than 0".to_string(),
            ));
        }

        if self.progress_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "progress_interval must be greater than 0".to_string(),
            ));
        }

        if self.steps_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "steps_dir cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set the checkpoint root directory.
    pub fn with_steps_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.steps_dir = dir.into();
        self
    }

    /// Builder method to set the audit log path.
    pub fn with_audit_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.audit_log_path = path.into();
        self
    }

    /// Builder method to set the inter-request delay.
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Builder method to set the retry ceiling.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Builder method to set the worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Builder method to set the progress logging interval.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }
}

/// HTTP proxy used for every chat-completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxySettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxySettings {
    /// Proxy URL in `http://host:port` form.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Settings for the chat-completion endpoint.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub proxy: Option<ProxySettings>,
}

impl LlmSettings {
    /// Creates settings from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `LLM_API_KEY`: bearer token (required)
    /// - `LLM_API_BASE`: endpoint base URL (default: https://api.pawan.krd/v1)
    /// - `LLM_MODEL`: chat model (default: gpt-3.5-turbo)
    /// - `PROXY_HOST`: proxy host, enables the proxy when set
    /// - `PROXY_PORT`: proxy port (default: 80)
    /// - `PROXY_USER` / `PROXY_PASS`: proxy basic auth
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Creates settings from an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("LLM_API_KEY")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("LLM_API_KEY".to_string()))?;
        let api_base = lookup("LLM_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let model = lookup("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let proxy = match lookup("PROXY_HOST").filter(|h| !h.is_empty()) {
            Some(host) => {
                let port = match lookup("PROXY_PORT") {
                    Some(val) => parse_env_value(&val, "PROXY_PORT")?,
                    None => 80,
                };
                Some(ProxySettings {
                    host,
                    port,
                    username: lookup("PROXY_USER"),
                    password: lookup("PROXY_PASS"),
                })
            }
            None => None,
        };

        Ok(Self {
            api_base,
            api_key,
            model,
            proxy,
        })
    }
}

/// Credentials for the remote table store.
#[derive(Debug, Clone)]
pub struct TableSettings {
    pub url: String,
    pub key: String,
}

impl TableSettings {
    /// Reads `SUPABASE_URL` and `SUPABASE_KEY`; both are required.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Creates settings from an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("SUPABASE_URL")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("SUPABASE_URL".to_string()))?;
        let key = lookup("SUPABASE_KEY")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("SUPABASE_KEY".to_string()))?;
        Ok(Self { url, key })
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}
