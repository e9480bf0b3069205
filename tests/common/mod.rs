//! Mock Gemini upstream and relay harness
//!
//! Tests queue responses on the mock before each request; once the queue is
//! empty the mock keeps answering with the fallback response.

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

use prompt_relay::config::{AppConfig, ResponseMode, RouteConfig};
use prompt_relay::{build_generation_client, build_router, ProxyState};

/// A canned upstream response
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: StatusCode,
    pub body: String,
}

impl MockResponse {
    pub fn json(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    /// Successful generateContent reply carrying `text`
    pub fn text(text: &str) -> Self {
        Self::json(
            StatusCode::OK,
            json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": text}]},
                    "finishReason": "STOP"
                }],
                "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 6, "totalTokenCount": 10},
                "modelVersion": "gemini-test"
            }),
        )
    }

    pub fn status(status: StatusCode) -> Self {
        Self::json(status, json!({"error": {"code": status.as_u16(), "message": "mock failure"}}))
    }
}

/// What the mock saw
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub method: String,
    pub path: String,
    pub api_key: Option<String>,
    pub body: Value,
}

#[derive(Debug)]
pub struct UpstreamState {
    pub response_queue: VecDeque<MockResponse>,
    pub fallback: MockResponse,
    pub received_requests: Vec<ReceivedRequest>,
}

pub type SharedUpstreamState = Arc<Mutex<UpstreamState>>;

/// Handle for a running mock upstream
#[derive(Clone)]
pub struct MockUpstream {
    pub addr: SocketAddr,
    state: SharedUpstreamState,
}

impl MockUpstream {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn push(&self, response: MockResponse) {
        self.state.lock().unwrap().response_queue.push_back(response);
    }

    pub fn set_fallback(&self, response: MockResponse) {
        self.state.lock().unwrap().fallback = response;
    }

    pub fn received(&self) -> Vec<ReceivedRequest> {
        self.state.lock().unwrap().received_requests.clone()
    }

    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().received_requests.len()
    }
}

async fn handle_any(State(state): State<SharedUpstreamState>, request: Request<Body>) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let api_key = request
        .headers()
        .get("x-goog-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body_bytes = axum::body::to_bytes(request.into_body(), 10 * 1024 * 1024)
        .await
        .unwrap_or_default();
    let body = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);

    let mock_response = {
        let mut state = state.lock().unwrap();
        state.received_requests.push(ReceivedRequest {
            method,
            path,
            api_key,
            body,
        });
        let fallback = state.fallback.clone();
        state.response_queue.pop_front().unwrap_or(fallback)
    };

    Response::builder()
        .status(mock_response.status)
        .header("Content-Type", "application/json")
        .body(Body::from(mock_response.body))
        .unwrap()
}

/// Start the mock upstream on an ephemeral port
pub async fn start_upstream() -> MockUpstream {
    let state: SharedUpstreamState = Arc::new(Mutex::new(UpstreamState {
        response_queue: VecDeque::new(),
        fallback: MockResponse::text("Default response (no mock queued)"),
        received_requests: Vec::new(),
    }));

    let app = Router::new().fallback(handle_any).with_state(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockUpstream { addr, state }
}

/// Relay configuration pointed at `upstream` with short backoff delays
pub fn relay_config(upstream: &MockUpstream, api_key: Option<&str>) -> AppConfig {
    let mut config = AppConfig::default();
    config.upstream.url = upstream.url();
    config.upstream.api_key = api_key.map(str::to_string);
    config.upstream.api_key_env = "PROMPT_RELAY_TEST_KEY_NEVER_SET".to_string();
    config.upstream.timeout_seconds = 5;
    config.retry.initial_delay_ms = 10;
    config.stats.enabled = false;
    config.routes.push(RouteConfig {
        path: "/api/raw".to_string(),
        model: Some("gemini-raw".to_string()),
        mode: ResponseMode::Raw,
    });
    config
}

/// Start the relay with `config` on an ephemeral port, returning its base URL
pub async fn start_relay(config: AppConfig) -> String {
    let generator = build_generation_client(&config).unwrap();
    let app = build_router(ProxyState::new(config, generator));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// POST `body` to `path` on the relay
pub async fn post_raw(relay: &str, path: &str, body: &str) -> (u16, Value) {
    let response = reqwest::Client::new()
        .post(format!("{}{}", relay, path))
        .header("Content-Type", "application/json")
        .body(body.to_string())
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    let body = response.json::<Value>().await.unwrap_or(Value::Null);
    (status, body)
}

/// POST `{"prompt": prompt}` to the default route
pub async fn post_prompt(relay: &str, prompt: &str) -> (u16, Value) {
    post_raw(relay, "/api/generate", &json!({"prompt": prompt}).to_string()).await
}
