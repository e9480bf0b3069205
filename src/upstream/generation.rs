//! Prompt generation against the Gemini API

use serde_json::Value;

use super::UpstreamSettings;
use crate::api::{extract_text, GenerateContentRequest, ModelsResponse};
use crate::invoker::{InvocationFailure, RequestDescriptor, ResilientInvoker, RetryPolicy};

/// Header carrying the API key; keeps the key out of URLs and their logs
pub const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("upstream API key is not configured")]
    MissingCredential,

    #[error("failed to encode upstream request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Upstream(#[from] InvocationFailure),
}

/// A payload and the number of attempts it took
#[derive(Debug, Clone, PartialEq)]
pub struct Generated<T> {
    pub value: T,
    pub attempts: u32,
}

/// Sends prompts upstream through the resilient invoker.
///
/// Built once from `UpstreamSettings` and a `RetryPolicy`; immutable afterwards.
pub struct GenerationClient {
    settings: UpstreamSettings,
    invoker: ResilientInvoker,
    policy: RetryPolicy,
}

impl GenerationClient {
    pub fn new(settings: UpstreamSettings, invoker: ResilientInvoker, policy: RetryPolicy) -> Self {
        Self {
            settings,
            invoker,
            policy,
        }
    }

    pub fn settings(&self) -> &UpstreamSettings {
        &self.settings
    }

    pub fn has_credential(&self) -> bool {
        self.settings.api_key.is_some()
    }

    /// Generate text for `prompt`, failing on responses without generated text
    pub async fn generate_text(
        &self,
        model: &str,
        prompt: &str,
    ) -> Result<Generated<String>, GenerateError> {
        let request = self.generate_request(model, prompt)?;
        let (value, attempts) = self
            .invoker
            .invoke(&request, &self.policy, extract_text)
            .await
            .into_result()?;
        Ok(Generated { value, attempts })
    }

    /// Generate for `prompt` and return the upstream document untouched
    pub async fn generate_raw(
        &self,
        model: &str,
        prompt: &str,
    ) -> Result<Generated<Value>, GenerateError> {
        let request = self.generate_request(model, prompt)?;
        let (value, attempts) = self
            .invoker
            .invoke_json(&request, &self.policy)
            .await
            .into_result()?;
        Ok(Generated { value, attempts })
    }

    /// List the models visible to the configured key
    pub async fn list_models(
        &self,
        policy: &RetryPolicy,
    ) -> Result<Generated<ModelsResponse>, GenerateError> {
        let key = self.api_key()?;
        let request = RequestDescriptor::get(self.settings.models_url())
            .with_header(API_KEY_HEADER, key);
        let (value, attempts) = self
            .invoker
            .invoke(&request, policy, |document| {
                serde_json::from_value::<ModelsResponse>(document.clone()).ok()
            })
            .await
            .into_result()?;
        Ok(Generated { value, attempts })
    }

    fn api_key(&self) -> Result<&str, GenerateError> {
        self.settings
            .api_key
            .as_ref()
            .map(|key| key.expose())
            .ok_or(GenerateError::MissingCredential)
    }

    fn generate_request(&self, model: &str, prompt: &str) -> Result<RequestDescriptor, GenerateError> {
        let key = self.api_key()?;
        let request = RequestDescriptor::post(self.settings.generate_url(model))
            .with_header(API_KEY_HEADER, key)
            .with_json(&GenerateContentRequest::from_prompt(prompt))?;
        Ok(request)
    }
}
