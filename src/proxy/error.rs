//! Errors returned to relay callers

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::api::ErrorBody;
use crate::invoker::{FailureKind, InvocationFailure};
use crate::stats::Outcome;
use crate::upstream::GenerateError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("method not supported; use POST")]
    MethodNotAllowed,

    #[error("API key not configured")]
    MissingCredential,

    #[error("{0}")]
    InvalidInboundPayload(String),

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("unexpected response structure from upstream: {cause}")]
    MalformedUpstreamResponse { attempts: u32, cause: String },

    #[error("failed to reach upstream after {attempts} attempts: {cause}")]
    RetriesExhausted { attempts: u32, cause: String },

    #[error("upstream rejected the request with status {status}: {cause}")]
    UpstreamRejected {
        status: u16,
        attempts: u32,
        cause: String,
    },

    #[error("upstream deadline exceeded after {attempts} attempts: {cause}")]
    DeadlineExceeded { attempts: u32, cause: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::InvalidInboundPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UpstreamRejected { .. } => StatusCode::BAD_GATEWAY,
            ApiError::DeadlineExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
            ApiError::MissingCredential
            | ApiError::MalformedUpstreamResponse { .. }
            | ApiError::RetriesExhausted { .. }
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Upstream attempts behind this error, zero when none were made
    pub fn attempts(&self) -> u32 {
        match self {
            ApiError::RetriesExhausted { attempts, .. }
            | ApiError::MalformedUpstreamResponse { attempts, .. }
            | ApiError::UpstreamRejected { attempts, .. }
            | ApiError::DeadlineExceeded { attempts, .. } => *attempts,
            _ => 0,
        }
    }

    /// Invoker failure class behind this error, `None` when refused locally
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ApiError::RetriesExhausted { .. } => Some(FailureKind::Exhausted),
            ApiError::MalformedUpstreamResponse { .. } => Some(FailureKind::Malformed),
            ApiError::UpstreamRejected { status, .. } => Some(FailureKind::Rejected { status: *status }),
            ApiError::DeadlineExceeded { .. } => Some(FailureKind::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn outcome(&self) -> Outcome {
        self.failure_kind().map_or(Outcome::NotAttempted, Outcome::from)
    }
}

impl From<InvocationFailure> for ApiError {
    fn from(failure: InvocationFailure) -> Self {
        match failure.kind {
            FailureKind::Exhausted => ApiError::RetriesExhausted {
                attempts: failure.attempts_made,
                cause: failure.reason,
            },
            FailureKind::Malformed => ApiError::MalformedUpstreamResponse {
                attempts: failure.attempts_made,
                cause: failure.reason,
            },
            FailureKind::Rejected { status } => ApiError::UpstreamRejected {
                status,
                attempts: failure.attempts_made,
                cause: failure.reason,
            },
            FailureKind::DeadlineExceeded => ApiError::DeadlineExceeded {
                attempts: failure.attempts_made,
                cause: failure.reason,
            },
        }
    }
}

impl From<GenerateError> for ApiError {
    fn from(err: GenerateError) -> Self {
        match err {
            GenerateError::MissingCredential => ApiError::MissingCredential,
            GenerateError::Encode(e) => ApiError::Internal(e.to_string()),
            GenerateError::Upstream(failure) => failure.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
