//! Scripted response sources for the determinism harness.

use crate::source::{CompletionRequest, ResponseSource};
use async_trait::async_trait;
use polis_core::error::LlmError;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Replays a fixed sequence of outcomes, one per call, optionally
/// falling back to a constant response once the queue drains.
///
/// Without a fallback, exhausting the script is a permanent
/// [`LlmError::InvalidRequest`], so a test that makes more calls than
/// it scripted fails loudly instead of silently improvising.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: Option<String>,
}

impl ScriptedSource {
    /// Replay the given outcomes in order, then fail.
    #[must_use]
    pub fn new(script: impl IntoIterator<Item = Result<String, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback: None,
        }
    }

    /// Answer every call with the same text, forever.
    pub fn always(text: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(text.into()),
        }
    }

    /// Keep answering with `text` once the script drains.
    #[must_use]
    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    /// Outcomes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.script.lock().expect("unpoisoned").len()
    }
}

#[async_trait]
impl ResponseSource for ScriptedSource {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String, LlmError> {
        if let Some(outcome) = self.script.lock().expect("unpoisoned").pop_front() {
            return outcome;
        }
        match &self.fallback {
            Some(text) => Ok(text.clone()),
            None => Err(LlmError::InvalidRequest(
                "scripted source exhausted".to_owned(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_in_order_then_fails() {
        let source = ScriptedSource::new([
            Ok("first".to_owned()),
            Err(LlmError::ServiceUnavailable("500".to_owned())),
        ]);
        let request = CompletionRequest::new("p");
        assert_eq!(source.complete(&request).await.unwrap(), "first");
        assert!(source.complete(&request).await.is_err());
        // Exhausted: a permanent error, not a hang.
        let err = source.complete(&request).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn fallback_answers_forever() {
        let source = ScriptedSource::always(r#"{"ok": true}"#);
        let request = CompletionRequest::new("p");
        for _ in 0..3 {
            assert_eq!(source.complete(&request).await.unwrap(), r#"{"ok": true}"#);
        }
    }
}
