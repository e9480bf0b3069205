//! Relay endpoint request and response bodies

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound body: `{"prompt": "..."}`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerateRequest {
    pub prompt: String,
}

impl GenerateRequest {
    /// Read the prompt out of a parsed body.
    ///
    /// Missing, non-string and empty prompts are all rejected. Whitespace-only
    /// prompts count as empty, which is stricter than a plain falsy check.
    pub fn from_json(body: &Value) -> Option<Self> {
        let prompt = body.get("prompt")?.as_str()?;
        if prompt.trim().is_empty() {
            return None;
        }
        Some(Self {
            prompt: prompt.to_string(),
        })
    }
}

/// Successful text-mode response
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub generated_text: String,
}

/// Body of every error response
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prompt_present() {
        let req = GenerateRequest::from_json(&json!({"prompt": "Write a haiku"})).unwrap();
        assert_eq!(req.prompt, "Write a haiku");
    }

    #[test]
    fn test_prompt_missing_or_invalid() {
        assert!(GenerateRequest::from_json(&json!({})).is_none());
        assert!(GenerateRequest::from_json(&json!({"prompt": ""})).is_none());
        assert!(GenerateRequest::from_json(&json!({"prompt": "   "})).is_none());
        assert!(GenerateRequest::from_json(&json!({"prompt": null})).is_none());
        assert!(GenerateRequest::from_json(&json!({"prompt": 7})).is_none());
        assert!(GenerateRequest::from_json(&json!(["prompt"])).is_none());
    }

    #[test]
    fn test_response_field_name() {
        let body = GenerateResponse {
            generated_text: "hi".to_string(),
        };
        assert_eq!(serde_json::to_value(&body).unwrap(), json!({"generatedText": "hi"}));
    }
}
