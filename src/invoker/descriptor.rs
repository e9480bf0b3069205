//! Immutable description of one upstream HTTP call

use bytes::Bytes;
use reqwest::Method;
use serde::Serialize;
use std::collections::BTreeMap;

/// Everything needed to issue (and re-issue) an upstream request.
///
/// Built with the consuming `with_*` methods and never mutated afterwards,
/// so every retry sends exactly the same request.
#[derive(Clone)]
pub struct RequestDescriptor {
    url: String,
    method: Method,
    headers: BTreeMap<String, String>,
    body: Bytes,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: BTreeMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Serialize `payload` as the body and set `Content-Type: application/json`
    pub fn with_json<T: Serialize>(self, payload: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(payload)?;
        Ok(self
            .with_header("Content-Type", "application/json")
            .with_body(body))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

// Header values may carry credentials, so only their names are printed
impl std::fmt::Debug for RequestDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDescriptor")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("body_len", &self.body.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_post_json_sets_body_and_content_type() {
        let desc = RequestDescriptor::post("http://localhost/generate")
            .with_json(&json!({"prompt": "hi"}))
            .unwrap();

        assert_eq!(desc.method(), &Method::POST);
        assert_eq!(desc.url(), "http://localhost/generate");
        assert_eq!(
            desc.headers().get("Content-Type").map(String::as_str),
            Some("application/json")
        );
        let body: serde_json::Value = serde_json::from_slice(desc.body()).unwrap();
        assert_eq!(body["prompt"], "hi");
    }

    #[test]
    fn test_get_has_empty_body() {
        let desc = RequestDescriptor::get("http://localhost/models");
        assert_eq!(desc.method(), &Method::GET);
        assert!(desc.body().is_empty());
        assert!(desc.headers().is_empty());
    }

    #[test]
    fn test_debug_redacts_header_values() {
        let desc = RequestDescriptor::get("http://localhost/models")
            .with_header("x-goog-api-key", "super-secret");
        let debug = format!("{:?}", desc);
        assert!(debug.contains("x-goog-api-key"));
        assert!(!debug.contains("super-secret"));
    }
}
