//! Stats collected for each relayed prompt

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::ResponseMode;
use crate::invoker::FailureKind;

/// How a relayed prompt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    /// Refused before any upstream call
    NotAttempted,
    Exhausted,
    Malformed,
    Rejected,
    DeadlineExceeded,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::NotAttempted => "not_attempted",
            Outcome::Exhausted => "exhausted",
            Outcome::Malformed => "malformed",
            Outcome::Rejected => "rejected",
            Outcome::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

impl From<FailureKind> for Outcome {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::Exhausted => Outcome::Exhausted,
            FailureKind::Malformed => Outcome::Malformed,
            FailureKind::Rejected { .. } => Outcome::Rejected,
            FailureKind::DeadlineExceeded => Outcome::DeadlineExceeded,
        }
    }
}

/// One prompt's trip through the relay
#[derive(Debug, Clone, Serialize)]
pub struct InvocationStats {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    /// Route path the prompt arrived on
    pub route: String,
    pub model: String,
    pub mode: ResponseMode,
    /// Upstream attempts made, zero when rejected before any call
    pub attempts: u32,
    pub outcome: Outcome,
    /// Status returned to the caller
    pub status: u16,
    /// Prompt length in characters
    pub prompt_len: usize,
    /// Generated text length in characters (text mode only)
    pub output_len: usize,
    pub duration_ms: f64,
}

impl InvocationStats {
    pub fn new(route: impl Into<String>, model: impl Into<String>, mode: ResponseMode) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            route: route.into(),
            model: model.into(),
            mode,
            attempts: 0,
            outcome: Outcome::Success,
            status: 200,
            prompt_len: 0,
            output_len: 0,
            duration_ms: 0.0,
        }
    }
}
