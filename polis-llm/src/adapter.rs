//! The retrying adapter every model-facing component calls through.

use crate::source::{CompletionRequest, ResponseSource};
use polis_core::config::LlmConfig;
use polis_core::error::LlmError;
use rand::Rng;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// Default per-call timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// Jittered backoff window between the first failure and the retry.
const BACKOFF_MIN: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(5);

/// Structured LLM calls with the framework's retry policy.
///
/// Policy, in order:
/// 1. each attempt runs under the per-call timeout;
/// 2. a transient failure (timeout, network, 429, 5xx, schema
///    mismatch) sleeps a jittered backoff in `[1 s, 5 s]` and retries
///    exactly once;
/// 3. a permanent failure (other 4xx) never retries;
/// 4. exhaustion surfaces as [`LlmError::Exhausted`] with the
///    component name and attempt count, plus a prominent ERROR
///    record — the caller aborts the turn.
///
/// Responses are parsed into the caller's type; when a model wraps
/// its JSON in prose, the largest balanced `{…}` substring is
/// extracted and reparsed once before the attempt counts as a schema
/// failure.
pub struct LlmAdapter {
    source: Arc<dyn ResponseSource>,
    component: String,
    timeout: Duration,
    max_retries: u32,
    backoff: (Duration, Duration),
}

impl LlmAdapter {
    /// Create an adapter for one component (`agent`, `validator`,
    /// `engine` — the name appears in failure records).
    pub fn new(source: Arc<dyn ResponseSource>, component: impl Into<String>) -> Self {
        Self {
            source,
            component: component.into(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: 1,
            backoff: (BACKOFF_MIN, BACKOFF_MAX),
        }
    }

    /// Apply the run's `llm` section: per-call timeout and retry
    /// count. (Model and temperature belong to the source; see
    /// `OllamaSource::from_config`.)
    #[must_use]
    pub fn with_config(self, config: &LlmConfig) -> Self {
        self.timeout(Duration::from_secs(config.timeout))
            .max_retries(config.max_retries)
    }

    /// Override the per-call timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Disable the retry (`0`) — the policy never allows more than
    /// one.
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.min(1);
        self
    }

    /// Override the backoff window. Tests shrink it to keep failure
    /// paths fast.
    #[must_use]
    pub fn backoff(mut self, min: Duration, max: Duration) -> Self {
        self.backoff = (min, max);
        self
    }

    /// Call the model and parse the response as `T`.
    pub async fn call_with_retry<T: DeserializeOwned>(&self, prompt: &str) -> Result<T, LlmError> {
        let request = CompletionRequest::new(prompt);
        let attempts_allowed = 1 + self.max_retries;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let failure = match self.attempt::<T>(&request).await {
                Ok(value) => return Ok(value),
                Err(failure) => failure,
            };

            if failure.is_retryable() && attempt < attempts_allowed {
                let backoff = self.jittered_backoff();
                warn!(
                    component = %self.component,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    reason = %failure,
                    "llm call failed, retrying once"
                );
                tokio::time::sleep(backoff).await;
                continue;
            }

            error!(
                component = %self.component,
                attempts = attempt,
                reason = %failure,
                "llm call failed"
            );
            return Err(LlmError::Exhausted {
                component: self.component.clone(),
                attempts: attempt,
                reason: failure.to_string(),
            });
        }
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        request: &CompletionRequest,
    ) -> Result<T, LlmError> {
        let text = tokio::time::timeout(self.timeout, self.source.complete(request))
            .await
            .map_err(|_| LlmError::Timeout(self.timeout))??;
        parse_response(&text)
    }

    fn jittered_backoff(&self) -> Duration {
        let (min, max) = self.backoff;
        if max <= min {
            return min;
        }
        let jitter = rand::thread_rng().gen_range(0.0..1.0);
        min + Duration::from_secs_f64((max - min).as_secs_f64() * jitter)
    }
}

/// Parse a response as `T`, falling back to the largest balanced
/// `{…}` substring when the model wrapped its JSON in prose.
fn parse_response<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    match serde_json::from_str(text) {
        Ok(value) => Ok(value),
        Err(first_error) => {
            let Some(extracted) = largest_balanced_object(text) else {
                return Err(LlmError::MalformedResponse(first_error.to_string()));
            };
            serde_json::from_str(extracted)
                .map_err(|e| LlmError::MalformedResponse(e.to_string()))
        }
    }
}

/// The largest balanced `{…}` substring, brace-matching outside
/// string literals.
fn largest_balanced_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut best: Option<(usize, usize)> = None;
    let mut stack: Vec<usize> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &byte) in bytes.iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => stack.push(i),
            b'}' => {
                if let Some(start) = stack.pop() {
                    // Only outermost spans compete for "largest".
                    if stack.is_empty() {
                        let len = i - start + 1;
                        if best.is_none_or(|(s, e)| len > e - s + 1) {
                            best = Some((start, i));
                        }
                    }
                }
            }
            _ => {}
        }
    }
    best.map(|(start, end)| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Verdict {
        is_valid: bool,
        reason: String,
    }

    struct NullSource;

    #[async_trait::async_trait]
    impl ResponseSource for NullSource {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, LlmError> {
            Ok(String::new())
        }
    }

    #[test]
    fn with_config_applies_timeout_and_caps_retries() {
        let config = LlmConfig {
            timeout: 10,
            max_retries: 0,
            ..LlmConfig::default()
        };
        let adapter = LlmAdapter::new(Arc::new(NullSource), "agent").with_config(&config);
        assert_eq!(adapter.timeout, Duration::from_secs(10));
        assert_eq!(adapter.max_retries, 0);
    }

    #[test]
    fn retries_never_exceed_one() {
        let adapter = LlmAdapter::new(Arc::new(NullSource), "agent").max_retries(5);
        assert_eq!(adapter.max_retries, 1);
    }

    #[test]
    fn clean_json_parses_directly() {
        let verdict: Verdict =
            parse_response(r#"{"is_valid": true, "reason": "ok"}"#).unwrap();
        assert!(verdict.is_valid);
    }

    #[test]
    fn prose_wrapped_json_is_extracted() {
        let text = r#"Sure! Here is my verdict:
{"is_valid": false, "reason": "out of domain"}
Let me know if you need anything else."#;
        let verdict: Verdict = parse_response(text).unwrap();
        assert_eq!(verdict.reason, "out of domain");
    }

    #[test]
    fn extraction_picks_the_largest_object() {
        let text = r#"{"a": 1} and then {"is_valid": true, "reason": "the bigger one"}"#;
        let verdict: Verdict = parse_response(text).unwrap();
        assert_eq!(verdict.reason, "the bigger one");
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_matching() {
        let text = r#"note: {"is_valid": true, "reason": "set {x} to {y}"} done"#;
        let verdict: Verdict = parse_response(text).unwrap();
        assert_eq!(verdict.reason, "set {x} to {y}");
    }

    #[test]
    fn unbalanced_text_is_a_schema_failure() {
        let err = parse_response::<Verdict>("no json here {").unwrap_err();
        assert!(matches!(err, LlmError::MalformedResponse(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn extraction_failure_reports_malformed() {
        let err =
            parse_response::<Verdict>(r#"{"wrong_field": 1}"#).unwrap_err();
        assert!(matches!(err, LlmError::MalformedResponse(_)));
    }

    #[test]
    fn nested_objects_count_as_one_span() {
        let text = r#"{"is_valid": true, "reason": "x", "extra": {"nested": {"deep": 1}}}"#;
        assert_eq!(largest_balanced_object(text), Some(text));
    }
}
