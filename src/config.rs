//! Configuration module for the relay.
//!
//! Loads an optional TOML file with `${VAR}` substitution, then applies the
//! environment overrides, then validates.
//!
//! # Example
//!
//! ```toml
//! [server]
//! port = 3000
//! shutdown_timeout_secs = 30
//!
//! [store]
//! capacity = 100
//!
//! [forward]
//! enabled = true
//! url = "${DOWNSTREAM_URL}"
//! timeout_ms = 5000
//! retry_attempts = 3
//! retry_delay_base_ms = 1000
//! ```
//!
//! # Environment overrides
//!
//! | Variable | Field |
//! |---|---|
//! | `PORT` | `server.port` |
//! | `FORWARD_ENABLED` | `forward.enabled` |
//! | `FORWARD_URL` | `forward.url` |
//! | `FORWARD_TIMEOUT` | `forward.timeout_ms` |
//! | `RETRY_ATTEMPTS` | `forward.retry_attempts` |
//! | `RETRY_DELAY_BASE` | `forward.retry_delay_base_ms` |

use regex::Regex;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Env var naming the config file
pub const CONFIG_PATH_VAR: &str = "RELAY_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config/relay.toml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: String, value: String },
}

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub live: LiveConfig,

    #[serde(default)]
    pub forward: ForwardConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds to wait for open connections after a shutdown signal
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

fn default_port() -> u16 {
    3000
}

fn default_shutdown_timeout_secs() -> u64 {
    crate::shutdown::DEFAULT_SHUTDOWN_TIMEOUT.as_secs()
}

/// Event history configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

fn default_capacity() -> usize {
    crate::store::DEFAULT_CAPACITY
}

/// Live push configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LiveConfig {
    /// Events a subscriber may lag behind before it starts missing some
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    crate::broadcast::DEFAULT_QUEUE_CAPACITY
}

/// Downstream forwarding configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ForwardConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_forward_url")]
    pub url: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_delay_base_ms")]
    pub retry_delay_base_ms: u64,

    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_forward_url(),
            timeout_ms: default_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            retry_delay_base_ms: default_retry_delay_base_ms(),
            health_timeout_ms: default_health_timeout_ms(),
        }
    }
}

fn default_forward_url() -> String {
    "http://localhost:3001/webhook".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_base_ms() -> u64 {
    1000
}

fn default_health_timeout_ms() -> u64 {
    3000
}

impl RelayConfig {
    /// Load configuration from the default path or `RELAY_CONFIG`, then
    /// apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path, then apply environment
    /// overrides.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path.as_ref())?;
        config.apply_overrides(|var| env::var(var).ok())?;
        config.validate()?;

        info!(
            port = config.server.port,
            store_capacity = config.store.capacity,
            forward_enabled = config.forward.enabled,
            forward_url = %config.forward.url,
            "Configuration loaded"
        );

        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }

        info!(path = %path.display(), "Loading configuration");

        let content = fs::read_to_string(path)?;
        let content = substitute_env_vars(&content);

        debug!("Parsing TOML configuration");
        Ok(toml::from_str(&content)?)
    }

    /// Apply environment-style overrides, reading variables through `lookup`.
    ///
    /// A variable set to an empty string counts as unset.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |var: &str| lookup(var).filter(|value| !value.trim().is_empty());

        if let Some(port) = parse_var(&lookup, "PORT")? {
            self.server.port = port;
        }

        if let Some(raw) = lookup("FORWARD_ENABLED") {
            self.forward.enabled = parse_bool(&raw).ok_or(ConfigError::InvalidEnv {
                var: "FORWARD_ENABLED".to_string(),
                value: raw,
            })?;
        }

        if let Some(url) = lookup("FORWARD_URL") {
            self.forward.url = url;
        }

        if let Some(timeout_ms) = parse_var(&lookup, "FORWARD_TIMEOUT")? {
            self.forward.timeout_ms = timeout_ms;
        }

        if let Some(attempts) = parse_var(&lookup, "RETRY_ATTEMPTS")? {
            self.forward.retry_attempts = attempts;
        }

        if let Some(base_ms) = parse_var(&lookup, "RETRY_DELAY_BASE")? {
            self.forward.retry_delay_base_ms = base_ms;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let forward = &self.forward;

        if forward.url.is_empty() {
            return Err(ConfigError::ValidationError(
                "forward URL must not be empty".to_string(),
            ));
        }

        // Check for unsubstituted env vars
        if forward.url.contains("${") {
            if forward.enabled {
                return Err(ConfigError::ValidationError(format!(
                    "forward URL contains an unsubstituted variable: {}",
                    forward.url
                )));
            }
            warn!(
                url = %forward.url,
                "Forward URL contains unsubstituted environment variable"
            );
        } else {
            if !forward.url.starts_with("http://") && !forward.url.starts_with("https://") {
                return Err(ConfigError::ValidationError(
                    "forward URL must start with http:// or https://".to_string(),
                ));
            }

            crate::forwarder::health_url(&forward.url)
                .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        }

        if forward.retry_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry_attempts must be at least 1".to_string(),
            ));
        }

        if forward.timeout_ms == 0 || forward.health_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "timeouts must be greater than zero".to_string(),
            ));
        }

        if self.store.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "store capacity must be at least 1".to_string(),
            ));
        }

        if self.live.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "live queue_capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, var: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                var: var.to_string(),
                value: raw,
            }),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
    })
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(content: &str) -> String {
    placeholder_pattern()
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            match env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    debug!(var = %var_name, "Environment variable not set, keeping placeholder");
                    caps[0].to_string()
                }
            }
        })
        .to_string()
}
