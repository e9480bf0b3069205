//! Upstream generation API client

mod generation;
mod settings;

pub use generation::{GenerateError, Generated, GenerationClient, API_KEY_HEADER};
pub use settings::{ApiKey, UpstreamSettings};

use std::sync::Arc;

use crate::config::AppConfig;
use crate::invoker::{HttpTransport, ResilientInvoker, RetryPolicy};

/// Build the generation client from configuration: HTTP transport, retry
/// policy and the credential, resolved once.
pub fn build_generation_client(
    config: &AppConfig,
) -> Result<GenerationClient, Box<dyn std::error::Error>> {
    let transport = HttpTransport::from_config(&config.upstream)?;
    let policy = RetryPolicy::try_from(&config.retry)?;
    let settings = UpstreamSettings::from_config(&config.upstream);

    if settings.api_key.is_none() {
        tracing::warn!(
            env = %config.upstream.api_key_env,
            "No upstream API key configured; generation requests will fail"
        );
    }

    Ok(GenerationClient::new(
        settings,
        ResilientInvoker::new(Arc::new(transport)),
        policy,
    ))
}
