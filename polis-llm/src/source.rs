//! The response-source seam the adapter retries over.

use async_trait::async_trait;
use polis_core::error::LlmError;

/// One structured-reasoning request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// The full prompt, including any response-shape instructions.
    pub prompt: String,
}

impl CompletionRequest {
    /// Create a request.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

/// Where completions come from: a live model server or a scripted
/// replay.
///
/// The adapter owns the retry policy, the timeout, and response
/// parsing; sources only perform one raw completion and classify
/// their failures via [`LlmError`] variants (the classification
/// decides retryability). Injecting the source is what makes the
/// determinism harness possible — identical scripts produce identical
/// runs.
#[async_trait]
pub trait ResponseSource: Send + Sync {
    /// Perform one completion, returning the raw response text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}
