//! Request handler for generation routes

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    response::{IntoResponse, Response},
    Json,
};
use http_body_util::LengthLimitError;
use serde_json::Value;
use std::error::Error as _;
use std::sync::Arc;
use std::time::Instant;

use super::error::ApiError;
use super::server::ProxyState;
use crate::api::{GenerateRequest, GenerateResponse};
use crate::config::{ResponseMode, RouteConfig};
use crate::stats::{format_request_log, format_stats, InvocationStats, Outcome};

/// A configured route, resolved against the default model
#[derive(Debug, Clone, PartialEq)]
pub struct RouteTarget {
    pub path: String,
    pub model: String,
    pub mode: ResponseMode,
}

impl RouteTarget {
    pub fn from_config(route: &RouteConfig, default_model: &str) -> Self {
        Self {
            path: route.path.clone(),
            model: route.model_or(default_model).to_string(),
            mode: route.mode,
        }
    }
}

/// Handles one inbound prompt on one route
pub struct GenerateHandler {
    state: ProxyState,
    target: Arc<RouteTarget>,
}

impl GenerateHandler {
    pub fn new(state: ProxyState, target: Arc<RouteTarget>) -> Self {
        Self { state, target }
    }

    /// Handle an incoming request
    pub async fn handle(&self, req: Request<Body>) -> Response {
        let start = Instant::now();
        let mut stats = InvocationStats::new(&self.target.path, &self.target.model, self.target.mode);

        tracing::debug!(method = %req.method(), path = %self.target.path, "Processing request");

        let response = match self.process(req, &mut stats).await {
            Ok(response) => response,
            Err(err) => {
                stats.outcome = err.outcome();
                stats.attempts = err.attempts();
                stats.status = err.status().as_u16();
                if err.status().is_server_error() {
                    tracing::error!(error = %err, attempts = stats.attempts, "Generation failed");
                } else {
                    tracing::warn!(error = %err, "Request refused");
                }
                err.into_response()
            }
        };

        stats.duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        if self.state.config.stats.enabled {
            tracing::info!("{}", format_stats(&stats, self.state.config.stats.format));
        }

        response
    }

    async fn process(
        &self,
        req: Request<Body>,
        stats: &mut InvocationStats,
    ) -> Result<Response, ApiError> {
        if req.method() != Method::POST {
            return Err(ApiError::MethodNotAllowed);
        }

        // Refuse before touching the body or the network
        if !self.state.generator.has_credential() {
            return Err(ApiError::MissingCredential);
        }

        let prompt = self.read_prompt(req).await?;
        stats.prompt_len = prompt.chars().count();
        tracing::info!(
            "{}",
            format_request_log(&self.target.path, &self.target.model, &prompt)
        );

        let generator = &self.state.generator;
        match self.target.mode {
            ResponseMode::Text => {
                let generated = generator.generate_text(&self.target.model, &prompt).await?;
                stats.attempts = generated.attempts;
                stats.outcome = Outcome::Success;
                stats.output_len = generated.value.chars().count();
                Ok(Json(GenerateResponse {
                    generated_text: generated.value,
                })
                .into_response())
            }
            ResponseMode::Raw => {
                let generated = generator.generate_raw(&self.target.model, &prompt).await?;
                stats.attempts = generated.attempts;
                stats.outcome = Outcome::Success;
                Ok(Json(generated.value).into_response())
            }
        }
    }

    async fn read_prompt(&self, req: Request<Body>) -> Result<String, ApiError> {
        let limit = self.state.config.server.max_body_bytes;
        let body = to_bytes(req.into_body(), limit).await.map_err(|e| {
            if exceeds_limit(&e) {
                ApiError::PayloadTooLarge { limit }
            } else {
                ApiError::InvalidInboundPayload(format!("failed to read request body: {}", e))
            }
        })?;

        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(ApiError::InvalidInboundPayload(
                "request body is empty".to_string(),
            ));
        }

        let json: Value = serde_json::from_slice(&body).map_err(|e| {
            ApiError::InvalidInboundPayload(format!("request body is not valid JSON: {}", e))
        })?;

        GenerateRequest::from_json(&json)
            .map(|request| request.prompt)
            .ok_or_else(|| ApiError::InvalidInboundPayload("prompt is required".to_string()))
    }
}

/// Whether a body read failed on the size limit rather than on I/O
fn exceeds_limit(err: &axum::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if cause.is::<LengthLimitError>() {
            return true;
        }
        source = cause.source();
    }
    false
}
