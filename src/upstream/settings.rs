//! Upstream settings resolved once at startup

use crate::config::UpstreamConfig;

/// API key with a redacted `Debug`
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Read-only view of the upstream the relay talks to
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub base_url: String,
    pub api_version: String,
    pub default_model: String,
    /// `None` when no key was configured; generation then fails without a network call
    pub api_key: Option<ApiKey>,
}

impl UpstreamSettings {
    /// Resolve settings from configuration, looking the key up in the environment
    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self {
            base_url: config.base_url().to_string(),
            api_version: config.api_version.trim_matches('/').to_string(),
            default_model: config.model.clone(),
            api_key: config.resolve_api_key().map(ApiKey::new),
        }
    }

    /// The requested model, or the configured default
    pub fn resolve_model<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .filter(|model| !model.trim().is_empty())
            .unwrap_or(self.default_model.as_str())
    }

    /// `{base}/{version}/models/{model}:generateContent`
    pub fn generate_url(&self, model: &str) -> String {
        format!(
            "{}/{}/models/{}:generateContent",
            self.base_url,
            self.api_version,
            model.trim_start_matches("models/")
        )
    }

    /// `{base}/{version}/models`
    pub fn models_url(&self) -> String {
        format!("{}/{}/models", self.base_url, self.api_version)
    }
}
