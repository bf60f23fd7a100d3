//! Ollama-backed response source.

use crate::source::{CompletionRequest, ResponseSource};
use async_trait::async_trait;
use polis_core::config::LlmConfig;
use polis_core::error::LlmError;
use serde_json::json;
use tracing::debug;

/// Default model used when none is configured.
const DEFAULT_MODEL: &str = "llama3.2";

/// Default Ollama API base URL (local server).
const DEFAULT_HOST: &str = "http://localhost:11434";

/// Client for the Ollama Chat API.
///
/// Resolution order for the base URL: explicit [`OllamaSource::host`]
/// override, then the `OLLAMA_HOST` environment variable, then the
/// local default. Responses are requested in JSON mode since every
/// caller parses them against a schema.
pub struct OllamaSource {
    model: String,
    host: String,
    temperature: f64,
    client: reqwest::Client,
}

impl OllamaSource {
    /// Create a source with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            model: DEFAULT_MODEL.into(),
            host: std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_HOST.into()),
            temperature: 0.7,
            client: reqwest::Client::new(),
        }
    }

    /// Build a source from the run's `llm` config section.
    #[must_use]
    pub fn from_config(config: &LlmConfig) -> Self {
        let mut source = Self::new().model(&config.model).temperature(config.temperature);
        if let Some(host) = &config.host {
            source = source.host(host);
        }
        source
    }

    /// Override the model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the base URL (testing, remote instances).
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Override the sampling temperature.
    #[must_use]
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.host)
    }
}

impl Default for OllamaSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Map an HTTP status from the Ollama API to an [`LlmError`].
/// 429 and 5xx are transient; other 4xx are permanent.
fn map_http_status(status: reqwest::StatusCode, body: &str) -> LlmError {
    match status.as_u16() {
        404 => LlmError::ModelNotFound(body.to_owned()),
        429 => LlmError::RateLimited(body.to_owned()),
        400..=499 => LlmError::InvalidRequest(format!("HTTP {status}: {body}")),
        500..=599 => LlmError::ServiceUnavailable(format!("HTTP {status}: {body}")),
        _ => LlmError::InvalidRequest(format!("HTTP {status}: {body}")),
    }
}

fn map_reqwest_error(err: reqwest::Error) -> LlmError {
    LlmError::Network(err.to_string())
}

#[async_trait]
impl ResponseSource for OllamaSource {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let url = self.chat_url();
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": request.prompt}],
            "stream": false,
            "format": "json",
            "options": {"temperature": self.temperature},
        });
        debug!(url = %url, model = %self.model, "sending completion request to Ollama");

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let text = response.text().await.map_err(map_reqwest_error)?;
        if !status.is_success() {
            return Err(map_http_status(status, &text));
        }

        let parsed: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| LlmError::MalformedResponse(format!("invalid JSON envelope: {e}")))?;
        parsed["message"]["content"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| {
                LlmError::MalformedResponse("response has no message.content".to_owned())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_apply() {
        let source = OllamaSource::new()
            .model("mistral")
            .host("http://remote:11434")
            .temperature(0.0);
        assert_eq!(source.model, "mistral");
        assert_eq!(source.chat_url(), "http://remote:11434/api/chat");
    }

    #[test]
    fn from_config_picks_up_every_field() {
        let config = LlmConfig {
            model: "qwen".into(),
            host: Some("http://box:11434".into()),
            timeout: 10,
            max_retries: 1,
            temperature: 0.2,
        };
        let source = OllamaSource::from_config(&config);
        assert_eq!(source.model, "qwen");
        assert_eq!(source.host, "http://box:11434");
        assert_eq!(source.temperature, 0.2);
    }

    #[test]
    fn status_429_is_transient() {
        let err = map_http_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(err.is_retryable());
        assert!(matches!(err, LlmError::RateLimited(_)));
    }

    #[test]
    fn status_5xx_is_transient() {
        let err = map_http_status(reqwest::StatusCode::BAD_GATEWAY, "upstream died");
        assert!(err.is_retryable());
    }

    #[test]
    fn status_400_is_permanent() {
        let err = map_http_status(reqwest::StatusCode::BAD_REQUEST, "bad body");
        assert!(!err.is_retryable());
    }

    #[test]
    fn status_404_maps_to_model_not_found() {
        let err = map_http_status(reqwest::StatusCode::NOT_FOUND, "model 'x' not found");
        assert!(matches!(err, LlmError::ModelNotFound(_)));
        assert!(!err.is_retryable());
    }
}
