mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

pub use loader::load_config;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "default_routes")]
    pub routes: Vec<RouteConfig>,
    #[serde(default)]
    pub stats: StatsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            retry: RetryConfig::default(),
            routes: default_routes(),
            stats: StatsConfig::default(),
        }
    }
}

/// Relay server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    /// Largest inbound request body accepted, in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_port() -> u16 {
    3000
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Upstream generation API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Base URL of the generation API (e.g., "https://generativelanguage.googleapis.com")
    #[serde(default = "default_upstream_url")]
    pub url: String,
    /// API version path segment
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Model used by routes that don't name their own
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Inline API key, takes precedence over `api_key_env`
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Per-attempt request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// TLS configuration options
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

/// TLS configuration for upstream connections
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Accept invalid certificates (self-signed, expired)
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Path to custom CA certificate (PEM format)
    pub ca_cert_path: Option<String>,
    /// Path to client certificate for mTLS
    pub client_cert_path: Option<String>,
    /// Path to client private key for mTLS
    pub client_key_path: Option<String>,
}

fn default_upstream_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_api_version() -> String {
    "v1beta".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash-preview-05-20".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_timeout() -> u64 {
    60
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            api_version: default_api_version(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            api_key: None,
            timeout_seconds: default_timeout(),
            tls: None,
        }
    }
}

impl UpstreamConfig {
    /// Returns the base URL with trailing slash stripped
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Returns true if the URL uses HTTPS
    pub fn is_tls(&self) -> bool {
        self.url.to_lowercase().starts_with("https://")
    }

    /// Resolve the API key: inline value first, then the configured environment variable.
    /// Empty values count as missing.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(ref key) = self.api_key {
            if !key.trim().is_empty() {
                return Some(key.clone());
            }
        }
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

/// Retry and backoff configuration for upstream calls
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay after the first failed attempt, in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Factor applied to the delay after each failed attempt
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Retry upstream 4xx responses as well (408 and 429 are always retried)
    #[serde(default)]
    pub retry_client_errors: bool,
    /// Overall wall-clock bound across all attempts, in milliseconds
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            retry_client_errors: false,
            deadline_ms: None,
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

/// A generation endpoint exposed by the relay
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Path the route is mounted on (e.g., "/api/generate")
    pub path: String,
    /// Upstream model for this route, falls back to `upstream.model`
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub mode: ResponseMode,
}

impl RouteConfig {
    /// The model this route sends prompts to
    pub fn model_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.model.as_deref().unwrap_or(default)
    }
}

fn default_routes() -> Vec<RouteConfig> {
    vec![RouteConfig {
        path: "/api/generate".to_string(),
        model: None,
        mode: ResponseMode::Text,
    }]
}

/// How a route shapes the upstream response
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// Extract the generated text and return `{"generatedText": ...}`
    #[default]
    Text,
    /// Relay the upstream JSON document unchanged
    Raw,
}

/// Stats logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatsConfig {
    #[serde(default = "default_stats_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub format: StatsFormat,
}

fn default_stats_enabled() -> bool {
    true
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: default_stats_enabled(),
            format: StatsFormat::default(),
        }
    }
}

/// Stats output format
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StatsFormat {
    Pretty,
    Json,
    #[default]
    Compact,
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        load_config(path)
    }

    /// Load configuration with fallback to default path
    pub fn load_or_default(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        match config_path {
            Some(path) => Self::from_file(path),
            None => {
                // Try default locations
                let default_paths = ["config.yaml", "config.yml", "./config/config.yaml"];
                for p in default_paths {
                    let path = Path::new(p);
                    if path.exists() {
                        return Self::from_file(path);
                    }
                }
                Err(ConfigError::NotFound(
                    "No config file found. Tried: config.yaml, config.yml, ./config/config.yaml"
                        .to_string(),
                ))
            }
        }
    }

    /// Semantic checks that serde can't express
    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.upstream.url).map_err(|e| {
            ConfigError::Validation(format!("invalid upstream url '{}': {}", self.upstream.url, e))
        })?;

        if self.upstream.model.trim().is_empty() {
            return Err(ConfigError::Validation("upstream.model must not be empty".to_string()));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        let multiplier = self.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::Validation(format!(
                "retry.backoff_multiplier must be a finite number >= 1, got {}",
                multiplier
            )));
        }

        if let Some(deadline_ms) = self.retry.deadline_ms {
            if deadline_ms == 0 {
                return Err(ConfigError::Validation(
                    "retry.deadline_ms must be greater than 0".to_string(),
                ));
            }
            if self.retry.max_attempts > 1 && deadline_ms < self.retry.initial_delay_ms {
                return Err(ConfigError::Validation(format!(
                    "retry.deadline_ms ({}) is shorter than retry.initial_delay_ms ({}); no retry could ever run",
                    deadline_ms, self.retry.initial_delay_ms
                )));
            }
        }

        if self.routes.is_empty() {
            return Err(ConfigError::Validation("at least one route is required".to_string()));
        }

        let mut seen = HashSet::new();
        for route in &self.routes {
            if !route.path.starts_with('/') {
                return Err(ConfigError::Validation(format!(
                    "route path '{}' must start with '/'",
                    route.path
                )));
            }
            // Routes are literal paths
            if route.path.contains([':', '*']) {
                return Err(ConfigError::Validation(format!(
                    "route path '{}' must be a literal path without ':' or '*'",
                    route.path
                )));
            }
            if route.path == "/health" {
                return Err(ConfigError::Validation(
                    "route path '/health' is reserved".to_string(),
                ));
            }
            if !seen.insert(route.path.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate route path '{}'",
                    route.path
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}
