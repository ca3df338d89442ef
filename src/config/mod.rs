pub mod validation;

use serde::{Deserialize, Serialize};
use std::fmt;

use self::validation::validate_config;

/// Environment variable that overrides `upstream.api_key`.
pub const DEFAULT_CREDENTIAL_ENV: &str = "OPENROUTER_API_KEY";

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Provider API key. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub base_path: String,
    #[serde(default)]
    pub runtime_worker_threads: Option<usize>,
    #[serde(default = "default_max_blocking_threads")]
    pub runtime_max_blocking_threads: Option<usize>,
}

fn default_port() -> u16 {
    5000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
#[allow(clippy::unnecessary_wraps)]
fn default_max_blocking_threads() -> Option<usize> {
    Some(8)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            base_path: String::new(),
            runtime_worker_threads: None,
            runtime_max_blocking_threads: default_max_blocking_threads(),
        }
    }
}

/// Completion provider configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Default credential used when the caller does not supply one.
    #[serde(default)]
    pub api_key: Option<Credential>,
    #[serde(default = "default_referer")]
    pub referer: String,
    #[serde(default = "default_title")]
    pub title: String,
    /// Whole-request bound for non-streaming calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Bound on waiting for streaming response headers; the body itself is unbounded.
    #[serde(default = "default_stream_handshake_timeout_secs")]
    pub stream_handshake_timeout_secs: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default)]
    pub http_use_env_proxy: bool,
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}
fn default_model() -> String {
    "openai/gpt-3.5-turbo".to_string()
}
fn default_referer() -> String {
    "https://speech-rho.vercel.app".to_string()
}
fn default_title() -> String {
    "SpeechToTextApp".to_string()
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_stream_handshake_timeout_secs() -> u64 {
    10
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            referer: default_referer(),
            title: default_title(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            stream_handshake_timeout_secs: default_stream_handshake_timeout_secs(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            http_use_env_proxy: false,
        }
    }
}

/// Cross-origin allow-list.
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "https://speech-rho.vercel.app".to_string(),
        "http://localhost:3000".to_string(),
    ]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

impl AppConfig {
    /// Replace the default credential with `value` when it is non-blank.
    pub fn apply_credential_override(&mut self, value: Option<String>) {
        if let Some(value) = value {
            let credential = Credential::new(value.trim());
            if !credential.is_blank() {
                self.upstream.api_key = Some(credential);
            }
        }
    }

    /// The configured default credential, ignoring blank values.
    #[must_use]
    pub fn default_credential(&self) -> Option<&Credential> {
        self.upstream
            .api_key
            .as_ref()
            .filter(|credential| !credential.is_blank())
    }
}

/// Load configuration from a YAML file, apply the environment override and
/// validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let mut config: AppConfig = serde_yaml::from_str(&contents)?;
    config.apply_credential_override(std::env::var(DEFAULT_CREDENTIAL_ENV).ok());
    validate_config(&config)?;
    Ok(config)
}

/// Like [`load_config`], but a missing file yields the built-in defaults.
///
/// # Errors
///
/// Same as [`load_config`], except that a missing file is not an error.
pub fn load_config_or_default(path: &str) -> Result<AppConfig, ConfigError> {
    match load_config(path) {
        Err(ConfigError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            let mut config = AppConfig::default();
            config.apply_credential_override(std::env::var(DEFAULT_CREDENTIAL_ENV).ok());
            validate_config(&config)?;
            Ok(config)
        }
        other => other,
    }
}
