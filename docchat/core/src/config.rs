//! Client Configuration
//!
//! Endpoint and streaming settings for talking to the answer service, loaded
//! from an optional TOML file at `$XDG_CONFIG_HOME/docchat/config.toml`.
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI arguments (applied by the caller through [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [api]
//! base_url = "https://docs.example.com/api/v1"
//! connect_timeout_secs = 10
//! request_timeout_secs = 120
//!
//! [stream]
//! channel_capacity = 100
//! max_line_bytes = 1048576
//!
//! [session]
//! identity = "ada@example.com"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default API base URL
pub const DEFAULT_API_URL: &str = "http://localhost:8080/api/v1";

/// Default cap on a single unterminated event line (1 MiB)
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Tracks where the configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[api]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiToml {
    /// Base URL of the answer service
    pub base_url: Option<String>,
    /// TCP connect timeout in seconds
    pub connect_timeout_secs: Option<u64>,
    /// Timeout for non-streaming requests in seconds
    pub request_timeout_secs: Option<u64>,
}

/// `[stream]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamToml {
    /// Capacity of the channel between stream task and dispatcher
    pub channel_capacity: Option<usize>,
    /// Longest unterminated line kept in the decode buffer
    pub max_line_bytes: Option<usize>,
}

/// `[session]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionToml {
    /// Identity sent with every query
    pub identity: Option<String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocChatToml {
    /// API section
    pub api: ApiToml,
    /// Streaming section
    pub stream: StreamToml,
    /// Session section
    pub session: SessionToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the answer service (no trailing slash)
    pub api_base_url: String,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Timeout for non-streaming requests (upload-and-query, history)
    pub request_timeout: Duration,
    /// Capacity of the stream update channel
    pub stream_channel_capacity: usize,
    /// Longest unterminated line kept in the decode buffer
    pub max_line_bytes: usize,
    /// Identity to use when none is given on the command line
    pub identity: Option<String>,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    source: ConfigSource,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
            stream_channel_capacity: 100,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            identity: None,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ClientConfig {
    /// Create configuration with an explicit base URL and default settings
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: normalize_base_url(&base_url.into()),
            ..Default::default()
        }
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Check values that would make every request fail
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://"))
        {
            return Err(ConfigError::ValidationError(format!(
                "api base URL must be http(s): {}",
                self.api_base_url
            )));
        }
        if self.stream_channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "stream channel capacity must be at least 1".to_string(),
            ));
        }
        if self.max_line_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "max line bytes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/docchat/config.toml` or
/// `~/.config/docchat/config.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("docchat").join("config.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if the
/// resulting configuration is invalid. A missing file is not an error.
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path, then the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration using `env` to look up environment variables
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<ClientConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ClientConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: DocChatToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);
    config.validate()?;

    Ok(config)
}

fn apply_toml_config(config: &mut ClientConfig, toml: &DocChatToml) {
    if let Some(ref url) = toml.api.base_url {
        config.api_base_url = normalize_base_url(url);
    }
    if let Some(secs) = toml.api.connect_timeout_secs {
        config.connect_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.api.request_timeout_secs {
        config.request_timeout = Duration::from_secs(secs);
    }
    if let Some(capacity) = toml.stream.channel_capacity {
        config.stream_channel_capacity = capacity;
    }
    if let Some(bytes) = toml.stream.max_line_bytes {
        config.max_line_bytes = bytes;
    }
    if let Some(ref identity) = toml.session.identity {
        config.identity = Some(identity.clone());
    }
}

fn apply_env_config<F>(config: &mut ClientConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = env("DOCCHAT_API_URL") {
        config.api_base_url = normalize_base_url(&url);
        config.source = ConfigSource::Env;
    }
    if let Some(secs) = env("DOCCHAT_CONNECT_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        config.connect_timeout = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }
    if let Some(secs) = env("DOCCHAT_REQUEST_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        config.request_timeout = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }
    if let Some(identity) = env("DOCCHAT_IDENTITY") {
        config.identity = Some(identity);
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Command-line overrides, applied after [`load_config`]
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Base URL override
    pub api_base_url: Option<String>,
    /// Identity override
    pub identity: Option<String>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set base URL override
    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    /// Set identity override
    #[must_use]
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Apply overrides to a configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if an override makes the
    /// configuration invalid.
    pub fn apply(&self, config: &mut ClientConfig) -> Result<(), ConfigError> {
        if let Some(ref url) = self.api_base_url {
            config.api_base_url = normalize_base_url(url);
            config.source = ConfigSource::Cli;
        }
        if let Some(ref identity) = self.identity {
            config.identity = Some(identity.clone());
            config.source = ConfigSource::Cli;
        }
        config.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================
