#![deny(missing_docs)]
//! LLM adapter for polis: structured calls with the framework's
//! one-retry policy, plus the Ollama response source.
//!
//! The adapter/source split keeps nondeterminism at the edge: agents,
//! validators, and engines call [`LlmAdapter::call_with_retry`] with
//! a typed response, the adapter handles timeouts, backoff, and
//! JSON-extraction fallback, and the [`ResponseSource`] underneath is
//! either a live server or (behind `test-utils`) a scripted replay.

pub mod adapter;
pub mod ollama;
pub mod source;

#[cfg(feature = "test-utils")]
pub mod scripted;

pub use adapter::LlmAdapter;
pub use ollama::OllamaSource;
pub use source::{CompletionRequest, ResponseSource};

#[cfg(feature = "test-utils")]
pub use scripted::ScriptedSource;
