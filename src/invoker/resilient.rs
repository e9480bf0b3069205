//! Retry loop around a single upstream call

use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use tokio::time::{sleep, timeout_at, Duration, Instant};

use super::{RequestDescriptor, RetryPolicy, Transport, UpstreamResponse};

/// Longest slice of an upstream error body carried into failure reasons
const ERROR_BODY_PREVIEW: usize = 200;

/// Phase of an invocation.
///
/// ```text
/// Attempting ─ok────────────────▶ Succeeded
/// Attempting ─shape mismatch────▶ MalformedFailed
/// Attempting ─non-retryable 4xx─▶ RejectedFailed
/// Attempting ─transient, budget─▶ Waiting ─delay─▶ Attempting
/// Attempting ─transient, spent──▶ ExhaustedFailed
/// Attempting/Waiting ─deadline──▶ DeadlineFailed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Attempting,
    Waiting,
    Succeeded,
    ExhaustedFailed,
    MalformedFailed,
    RejectedFailed,
    DeadlineFailed,
}

impl InvocationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, InvocationState::Attempting | InvocationState::Waiting)
    }
}

/// Why a single attempt failed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AttemptError {
    /// Connection error, non-success status or unreadable body; retried
    #[error("{0}")]
    Transient(String),

    /// Success status but the expected payload is missing; never retried
    #[error("{0}")]
    Malformed(String),

    /// Client error the upstream will repeat on every attempt
    #[error("{reason}")]
    Rejected { status: StatusCode, reason: String },
}

/// Terminal failure class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Exhausted,
    Malformed,
    Rejected { status: u16 },
    DeadlineExceeded,
}

impl FailureKind {
    pub fn state(&self) -> InvocationState {
        match self {
            FailureKind::Exhausted => InvocationState::ExhaustedFailed,
            FailureKind::Malformed => InvocationState::MalformedFailed,
            FailureKind::Rejected { .. } => InvocationState::RejectedFailed,
            FailureKind::DeadlineExceeded => InvocationState::DeadlineFailed,
        }
    }
}

/// Terminal failure of an invocation, with the last attempt's cause
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationFailure {
    pub kind: FailureKind,
    pub reason: String,
    pub attempts_made: u32,
}

impl std::fmt::Display for InvocationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            FailureKind::Exhausted => write!(
                f,
                "failed after {} attempts: {}",
                self.attempts_made, self.reason
            ),
            FailureKind::Malformed => write!(f, "unexpected response structure: {}", self.reason),
            FailureKind::Rejected { status } => write!(
                f,
                "upstream rejected the request with status {}: {}",
                status, self.reason
            ),
            FailureKind::DeadlineExceeded => write!(
                f,
                "deadline exceeded after {} attempts: {}",
                self.attempts_made, self.reason
            ),
        }
    }
}

impl std::error::Error for InvocationFailure {}

/// Outcome of one attempt sequence
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationResult<T> {
    Success { body: T, attempts: u32 },
    Failure(InvocationFailure),
}

impl<T> InvocationResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, InvocationResult::Success { .. })
    }

    /// Attempts issued, including the successful one
    pub fn attempts(&self) -> u32 {
        match self {
            InvocationResult::Success { attempts, .. } => *attempts,
            InvocationResult::Failure(failure) => failure.attempts_made,
        }
    }

    /// Terminal state reached
    pub fn state(&self) -> InvocationState {
        match self {
            InvocationResult::Success { .. } => InvocationState::Succeeded,
            InvocationResult::Failure(failure) => failure.kind.state(),
        }
    }

    pub fn into_result(self) -> Result<(T, u32), InvocationFailure> {
        match self {
            InvocationResult::Success { body, attempts } => Ok((body, attempts)),
            InvocationResult::Failure(failure) => Err(failure),
        }
    }
}

/// Issues a request, retrying transient failures with exponential backoff.
///
/// Holds no per-call state: the attempt counter and current delay live in
/// each `invoke` future, so one invoker serves any number of concurrent
/// calls. Waits are `tokio::time::sleep`, which yields the worker thread.
#[derive(Clone)]
pub struct ResilientInvoker {
    transport: Arc<dyn Transport>,
}

impl ResilientInvoker {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Invoke and accept any JSON document as the payload
    pub async fn invoke_json(
        &self,
        request: &RequestDescriptor,
        policy: &RetryPolicy,
    ) -> InvocationResult<Value> {
        self.invoke(request, policy, |document| Some(document.clone()))
            .await
    }

    /// Invoke and pull the payload out of the JSON document with `extract`.
    ///
    /// `extract` returning `None` is a structural mismatch: the call ends
    /// with `FailureKind::Malformed` without further attempts.
    pub async fn invoke<T, F>(
        &self,
        request: &RequestDescriptor,
        policy: &RetryPolicy,
        extract: F,
    ) -> InvocationResult<T>
    where
        T: Send,
        F: Fn(&Value) -> Option<T> + Send + Sync,
    {
        let deadline = policy
            .deadline()
            .and_then(|limit| Instant::now().checked_add(limit));
        let mut attempt: u32 = 0;

        loop {
            tracing::debug!(
                state = ?InvocationState::Attempting,
                attempt = attempt + 1,
                max_attempts = policy.max_attempts(),
                method = %request.method(),
                url = %request.url(),
                "Calling upstream"
            );

            let outcome = match deadline {
                Some(at) => match timeout_at(at, self.attempt(request, policy, &extract)).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        return failure(
                            FailureKind::DeadlineExceeded,
                            "deadline elapsed while waiting for the upstream".to_string(),
                            attempt + 1,
                        );
                    }
                },
                None => self.attempt(request, policy, &extract).await,
            };

            let reason = match outcome {
                Ok(body) => {
                    tracing::debug!(
                        state = ?InvocationState::Succeeded,
                        attempts = attempt + 1,
                        "Upstream call succeeded"
                    );
                    return InvocationResult::Success {
                        body,
                        attempts: attempt + 1,
                    };
                }
                Err(AttemptError::Malformed(reason)) => {
                    return failure(FailureKind::Malformed, reason, attempt + 1);
                }
                Err(AttemptError::Rejected { status, reason }) => {
                    return failure(
                        FailureKind::Rejected {
                            status: status.as_u16(),
                        },
                        reason,
                        attempt + 1,
                    );
                }
                Err(AttemptError::Transient(reason)) => reason,
            };

            if !policy.has_attempt_after(attempt) {
                return failure(FailureKind::Exhausted, reason, attempt + 1);
            }

            let delay = policy.delay_after(attempt);
            if let Some(at) = deadline {
                let wakes_past_deadline = Instant::now()
                    .checked_add(delay)
                    .map_or(true, |wake| wake >= at);
                if wakes_past_deadline {
                    return failure(FailureKind::DeadlineExceeded, reason, attempt + 1);
                }
            }

            tracing::warn!(
                state = ?InvocationState::Waiting,
                attempt = attempt + 1,
                max_attempts = policy.max_attempts(),
                delay_ms = saturating_millis(delay),
                error = %reason,
                "Upstream attempt failed, backing off"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }

    async fn attempt<T, F>(
        &self,
        request: &RequestDescriptor,
        policy: &RetryPolicy,
        extract: &F,
    ) -> Result<T, AttemptError>
    where
        F: Fn(&Value) -> Option<T> + Send + Sync,
    {
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| AttemptError::Transient(e.to_string()))?;
        classify(response, policy, extract)
    }
}

/// Turn one upstream response into a payload or an attempt error
fn classify<T, F>(
    response: UpstreamResponse,
    policy: &RetryPolicy,
    extract: &F,
) -> Result<T, AttemptError>
where
    F: Fn(&Value) -> Option<T>,
{
    let status = response.status;

    if !status.is_success() {
        let reason = format!(
            "upstream returned status {}{}",
            status,
            body_preview(&response.body)
        );
        if is_retryable_status(status, policy) {
            return Err(AttemptError::Transient(reason));
        }
        return Err(AttemptError::Rejected { status, reason });
    }

    let document: Value = serde_json::from_slice(&response.body).map_err(|e| {
        AttemptError::Transient(format!("invalid JSON in upstream response: {}", e))
    })?;

    extract(&document).ok_or_else(|| {
        AttemptError::Malformed("expected payload missing from upstream response".to_string())
    })
}

/// 5xx and other non-4xx statuses are always retried; 4xx only when it can change
fn is_retryable_status(status: StatusCode, policy: &RetryPolicy) -> bool {
    if !status.is_client_error() {
        return true;
    }
    policy.retry_client_errors()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

/// Milliseconds for log fields, pinned at `u64::MAX` for saturated delays
fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn body_preview(body: &[u8]) -> String {
    if body.is_empty() {
        return String::new();
    }
    let text = String::from_utf8_lossy(&body[..body.len().min(ERROR_BODY_PREVIEW)]);
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    format!(" ({})", text)
}

fn failure<T>(kind: FailureKind, reason: String, attempts_made: u32) -> InvocationResult<T> {
    tracing::error!(
        state = ?kind.state(),
        attempts = attempts_made,
        error = %reason,
        "Upstream call failed"
    );
    InvocationResult::Failure(InvocationFailure {
        kind,
        reason,
        attempts_made,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::TransportError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    type Scripted = Result<UpstreamResponse, TransportError>;

    /// Replays queued outcomes and records when each call happened
    struct ScriptedTransport {
        script: Mutex<VecDeque<Scripted>>,
        fallback: Scripted,
        calls: Mutex<Vec<Instant>>,
        latency: Duration,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Scripted>, fallback: Scripted) -> Arc<Self> {
            Self::with_latency(script, fallback, Duration::ZERO)
        }

        fn with_latency(script: Vec<Scripted>, fallback: Scripted, latency: Duration) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                fallback,
                calls: Mutex::new(Vec::new()),
                latency,
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn gaps(&self) -> Vec<Duration> {
            let calls = self.calls.lock().unwrap();
            calls.windows(2).map(|w| w[1] - w[0]).collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, _request: &RequestDescriptor) -> Result<UpstreamResponse, TransportError> {
            self.calls.lock().unwrap().push(Instant::now());
            if !self.latency.is_zero() {
                sleep(self.latency).await;
            }
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| self.fallback.clone())
        }
    }

    fn refused() -> Scripted {
        Err(TransportError("connection failed: connection refused".to_string()))
    }

    fn status(code: u16) -> Scripted {
        Ok(UpstreamResponse::new(
            StatusCode::from_u16(code).unwrap(),
            format!("{{\"error\":{{\"code\":{}}}}}", code),
        ))
    }

    fn ok_json(value: Value) -> Scripted {
        Ok(UpstreamResponse::new(StatusCode::OK, value.to_string()))
    }

    fn hello() -> Value {
        json!({"candidates": [{"content": {"parts": [{"text": "hello"}]}}]})
    }

    fn first_text(document: &Value) -> Option<String> {
        document
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn policy(max_attempts: u32, initial_ms: u64) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(initial_ms), 2.0).unwrap()
    }

    fn request() -> RequestDescriptor {
        RequestDescriptor::post("http://upstream.test/v1beta/models/m:generateContent")
            .with_json(&json!({"contents": []}))
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_transport_failure_exhausts_all_attempts() {
        let transport = ScriptedTransport::new(vec![], refused());
        let invoker = ResilientInvoker::new(transport.clone());

        let started = Instant::now();
        let result = invoker.invoke_json(&request(), &policy(5, 1000)).await;
        let waited = started.elapsed();

        assert_eq!(transport.call_count(), 5);
        assert_eq!(result.state(), InvocationState::ExhaustedFailed);
        let failure = result.into_result().unwrap_err();
        assert_eq!(failure.kind, FailureKind::Exhausted);
        assert_eq!(failure.attempts_made, 5);
        assert!(failure.reason.contains("connection refused"));
        assert!(failure.to_string().contains("after 5 attempts"));
        assert!(waited >= Duration::from_millis(15000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_doubles_between_attempts() {
        let transport = ScriptedTransport::new(vec![], refused());
        let invoker = ResilientInvoker::new(transport.clone());

        invoker.invoke_json(&request(), &policy(5, 1000)).await;

        let gaps = transport.gaps();
        let expected = [1000u64, 2000, 4000, 8000];
        assert_eq!(gaps.len(), expected.len());
        for (gap, want) in gaps.iter().zip(expected) {
            let want = Duration::from_millis(want);
            // the paused clock lands on the timer tick, at most a millisecond late
            assert!(*gap >= want && *gap <= want + Duration::from_millis(5), "gap {:?}", gap);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_third_attempt_short_circuits() {
        let transport = ScriptedTransport::new(vec![refused(), status(503), ok_json(hello())], refused());
        let invoker = ResilientInvoker::new(transport.clone());

        let result = invoker.invoke(&request(), &policy(5, 1000), first_text).await;

        assert_eq!(transport.call_count(), 3);
        assert_eq!(result.state(), InvocationState::Succeeded);
        assert_eq!(
            result,
            InvocationResult::Success {
                body: "hello".to_string(),
                attempts: 3
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success_never_waits() {
        let transport = ScriptedTransport::new(vec![ok_json(hello())], refused());
        let invoker = ResilientInvoker::new(transport.clone());

        let started = Instant::now();
        let result = invoker.invoke(&request(), &policy(5, 1000), first_text).await;

        assert_eq!(result.attempts(), 1);
        assert!(result.is_success());
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_response_is_not_retried() {
        let transport = ScriptedTransport::new(
            vec![ok_json(json!({"candidates": []}))],
            ok_json(hello()),
        );
        let invoker = ResilientInvoker::new(transport.clone());

        let result = invoker.invoke(&request(), &policy(5, 1000), first_text).await;

        assert_eq!(transport.call_count(), 1);
        assert_eq!(result.state(), InvocationState::MalformedFailed);
        let failure = result.into_result().unwrap_err();
        assert_eq!(failure.kind, FailureKind::Malformed);
        assert_eq!(failure.attempts_made, 1);
        assert!(failure.to_string().contains("unexpected response structure"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_after_transient_failures_stops_immediately() {
        let transport = ScriptedTransport::new(
            vec![status(500), ok_json(json!({"unexpected": true}))],
            ok_json(hello()),
        );
        let invoker = ResilientInvoker::new(transport.clone());

        let result = invoker.invoke(&request(), &policy(5, 10), first_text).await;

        assert_eq!(transport.call_count(), 2);
        assert_eq!(result.state(), InvocationState::MalformedFailed);
        assert_eq!(result.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_json_is_transient() {
        let transport = ScriptedTransport::new(
            vec![Ok(UpstreamResponse::new(StatusCode::OK, "<html>busy</html>"))],
            ok_json(hello()),
        );
        let invoker = ResilientInvoker::new(transport.clone());

        let result = invoker.invoke(&request(), &policy(3, 10), first_text).await;

        assert_eq!(transport.call_count(), 2);
        assert_eq!(result.into_result().unwrap(), ("hello".to_string(), 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_errors_are_retried_until_exhausted() {
        let transport = ScriptedTransport::new(vec![], status(503));
        let invoker = ResilientInvoker::new(transport.clone());

        let failure = invoker
            .invoke_json(&request(), &policy(3, 10))
            .await
            .into_result()
            .unwrap_err();

        assert_eq!(transport.call_count(), 3);
        assert_eq!(failure.kind, FailureKind::Exhausted);
        assert!(failure.reason.contains("503"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_rejected_without_retry() {
        let transport = ScriptedTransport::new(vec![], status(400));
        let invoker = ResilientInvoker::new(transport.clone());

        let result = invoker.invoke_json(&request(), &policy(5, 10)).await;

        assert_eq!(transport.call_count(), 1);
        assert_eq!(result.state(), InvocationState::RejectedFailed);
        let failure = result.into_result().unwrap_err();
        assert_eq!(failure.kind, FailureKind::Rejected { status: 400 });
        assert!(failure.to_string().contains("status 400"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_and_request_timeout_are_retried() {
        let transport = ScriptedTransport::new(vec![status(429), status(408)], ok_json(hello()));
        let invoker = ResilientInvoker::new(transport.clone());

        let result = invoker.invoke(&request(), &policy(5, 10), first_text).await;

        assert_eq!(transport.call_count(), 3);
        assert!(result.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_client_errors_opt_in() {
        let transport = ScriptedTransport::new(vec![], status(404));
        let invoker = ResilientInvoker::new(transport.clone());
        let policy = policy(4, 10).with_retry_client_errors(true);

        let failure = invoker
            .invoke_json(&request(), &policy)
            .await
            .into_result()
            .unwrap_err();

        assert_eq!(transport.call_count(), 4);
        assert_eq!(failure.kind, FailureKind::Exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_policy() {
        let transport = ScriptedTransport::new(vec![], refused());
        let invoker = ResilientInvoker::new(transport.clone());

        let result = invoker
            .invoke_json(&request(), &RetryPolicy::single_attempt())
            .await;

        assert_eq!(transport.call_count(), 1);
        assert_eq!(result.attempts(), 1);
        assert_eq!(result.state(), InvocationState::ExhaustedFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_stops_before_oversized_wait() {
        let transport = ScriptedTransport::new(vec![], refused());
        let invoker = ResilientInvoker::new(transport.clone());
        // Waits would be 1000 + 2000 + 4000; the third wait crosses the deadline
        let policy = policy(5, 1000).with_deadline(Some(Duration::from_millis(5000)));

        let started = Instant::now();
        let result = invoker.invoke_json(&request(), &policy).await;

        assert_eq!(transport.call_count(), 3);
        assert_eq!(result.state(), InvocationState::DeadlineFailed);
        assert_eq!(result.attempts(), 3);
        assert!(started.elapsed() < Duration::from_millis(5000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cuts_a_slow_attempt() {
        let transport =
            ScriptedTransport::with_latency(vec![], ok_json(hello()), Duration::from_secs(30));
        let invoker = ResilientInvoker::new(transport.clone());
        let policy = policy(3, 10).with_deadline(Some(Duration::from_secs(2)));

        let failure = invoker
            .invoke(&request(), &policy, first_text)
            .await
            .into_result()
            .unwrap_err();

        assert_eq!(transport.call_count(), 1);
        assert_eq!(failure.kind, FailureKind::DeadlineExceeded);
        assert!(failure.to_string().contains("deadline exceeded"));
    }

    #[test]
    fn test_body_preview_is_bounded_and_single_line() {
        let long = "x ".repeat(500);
        let preview = body_preview(long.as_bytes());
        assert!(preview.len() <= ERROR_BODY_PREVIEW + 3);
        assert!(!preview.contains('\n'));
        assert_eq!(body_preview(b""), "");
    }

    #[test]
    fn test_saturating_millis() {
        assert_eq!(saturating_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(saturating_millis(Duration::ZERO), 0);
        assert_eq!(saturating_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!InvocationState::Attempting.is_terminal());
        assert!(!InvocationState::Waiting.is_terminal());
        assert!(InvocationState::Succeeded.is_terminal());
        assert!(InvocationState::ExhaustedFailed.is_terminal());
        assert!(InvocationState::MalformedFailed.is_terminal());
    }
}
