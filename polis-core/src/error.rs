//! Error types for each concern, plus the `SimError` umbrella.

use std::time::Duration;
use thiserror::Error;

/// Configuration errors. Never recovered — a run is refused at load.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading a config or data file failed.
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    /// The YAML (or embedded JSON) could not be parsed. Unknown keys
    /// surface here — all config structs reject unrecognized fields.
    #[error("config parse error: {0}")]
    Parse(String),

    /// The config parsed but violates a structural rule.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Schema violations — a proposed value does not satisfy its declared
/// variable definition, or references an undeclared variable.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SchemaError {
    /// No definition for this variable in the given scope.
    #[error("unknown {scope} variable: {name}")]
    UnknownVariable {
        /// `agent` or `global`.
        scope: &'static str,
        /// The undeclared name.
        name: String,
    },

    /// The value's kind does not match the declaration.
    #[error("variable {name}: expected {expected}, got {got}")]
    KindMismatch {
        /// The variable name.
        name: String,
        /// The declared kind.
        expected: &'static str,
        /// The kind of the rejected value.
        got: &'static str,
    },

    /// A numeric value lies outside its inclusive bounds. Out-of-range
    /// values are rejected, never clamped.
    #[error("variable {name}: {value} outside [{min}, {max}]")]
    OutOfBounds {
        /// The variable name.
        name: String,
        /// The rejected value.
        value: f64,
        /// Inclusive lower bound (`-inf` when unbounded).
        min: f64,
        /// Inclusive upper bound (`inf` when unbounded).
        max: f64,
    },

    /// A categorical value is not one of the allowed values.
    #[error("variable {name}: \"{value}\" not in allowed values {allowed:?}")]
    NotAllowed {
        /// The variable name.
        name: String,
        /// The rejected value.
        value: String,
        /// The declared allowed values, in order.
        allowed: Vec<String>,
    },
}

/// State-model errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StateError {
    /// A snapshot-wide invariant does not hold (population cap, pause
    /// set membership, spatial referential integrity).
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A value failed schema validation during an update.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Spatial subsystem errors. Raised only by engine-side mutations;
/// queries are total and return safe defaults instead.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SpatialError {
    /// A mutation referenced a location id that does not exist.
    #[error("unknown location: {0}")]
    UnknownLocation(String),

    /// A mutation referenced a network that does not exist.
    #[error("unknown network: {0}")]
    UnknownNetwork(String),

    /// A mutation referenced a connection that does not exist.
    #[error("no connection between {0}")]
    UnknownConnection(String),

    /// The `"default"` network may not be removed.
    #[error("the \"default\" network cannot be removed")]
    ProtectedNetwork,

    /// A network with this name already exists.
    #[error("network already exists: {0}")]
    DuplicateNetwork(String),
}

/// LLM call failures.
///
/// The transient variants are retried exactly once by the adapter;
/// the permanent ones are not. `Exhausted` is what callers observe
/// after the policy gives up.
#[non_exhaustive]
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// The call exceeded its per-call timeout.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// Network-level error (connection refused, reset, DNS failure).
    #[error("network error: {0}")]
    Network(String),

    /// Rate limited by the model server (HTTP 429).
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The model server failed transiently (HTTP 5xx).
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The request was rejected (HTTP 4xx other than 429).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The requested model does not exist.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The response did not match the expected schema, even after the
    /// balanced-brace extraction fallback.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The retry policy is exhausted. This is the error that aborts a
    /// turn.
    #[error("llm failure in {component} after {attempts} attempt(s): {reason}")]
    Exhausted {
        /// Which component's call failed (`agent`, `validator`, `engine`).
        component: String,
        /// Total attempts made, including the retry.
        attempts: u32,
        /// The last underlying failure.
        reason: String,
    },
}

impl LlmError {
    /// Whether this failure is likely transient and worth one retry.
    /// Schema-validation failures count as transient — the model may
    /// produce valid output on a second attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_)
                | Self::Network(_)
                | Self::RateLimited(_)
                | Self::ServiceUnavailable(_)
                | Self::MalformedResponse(_)
        )
    }
}

/// Checkpoint store errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Writing a checkpoint failed. Fatal to the run; the previous
    /// `last.json` is left intact.
    #[error("checkpoint save failed at {path}: {message}")]
    Save {
        /// Target path of the failed write.
        path: String,
        /// The underlying I/O failure.
        message: String,
    },

    /// The requested checkpoint file does not exist.
    #[error("checkpoint not found: {path} ({hint})")]
    Missing {
        /// The path that was probed.
        path: String,
        /// Remediation hint for the operator.
        hint: String,
    },

    /// The checkpoint file exists but could not be decoded.
    #[error("checkpoint corrupt at {path}: {message}")]
    Corrupt {
        /// The unreadable file.
        path: String,
        /// Decoder error.
        message: String,
    },

    /// The checkpoint was written under a different variable schema.
    /// There is no migration path — resume requires the same config.
    #[error("schema fingerprint mismatch: checkpoint has {found}, config has {expected}")]
    FingerprintMismatch {
        /// Fingerprint of the current config.
        expected: String,
        /// Fingerprint recorded in the checkpoint.
        found: String,
    },

    /// All 99 run-id sequence slots for this prefix are taken.
    #[error("run id space exhausted for prefix {prefix}")]
    RunIdExhausted {
        /// The `{name}_{N}agents_{date}_{time}` prefix.
        prefix: String,
    },
}

/// Umbrella error for the simulation core. Component traits return
/// this so concrete agents, validators, and engines can surface any
/// class of failure; the orchestrator maps each kind to its §7
/// propagation policy (everything here is fail-fast except
/// cancellation).
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SimError {
    /// Configuration rejected at load.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A schema violation mid-operation.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A state invariant violation.
    #[error(transparent)]
    State(#[from] StateError),

    /// A spatial mutation error.
    #[error(transparent)]
    Spatial(#[from] SpatialError),

    /// An LLM failure that survived the retry policy.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// A checkpoint save or load failure.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// The run was cancelled between steps.
    #[error("cancelled")]
    Cancelled,

    /// Catch-all for component-specific failures. Include context.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_retryable() {
        assert!(LlmError::Timeout(Duration::from_secs(60)).is_retryable());
    }

    #[test]
    fn rate_limit_is_retryable() {
        assert!(LlmError::RateLimited("slow down".into()).is_retryable());
    }

    #[test]
    fn malformed_response_is_retryable() {
        assert!(LlmError::MalformedResponse("not json".into()).is_retryable());
    }

    #[test]
    fn invalid_request_is_not_retryable() {
        assert!(!LlmError::InvalidRequest("bad prompt".into()).is_retryable());
    }

    #[test]
    fn model_not_found_is_not_retryable() {
        assert!(!LlmError::ModelNotFound("llama9".into()).is_retryable());
    }

    #[test]
    fn exhausted_is_not_retryable() {
        let err = LlmError::Exhausted {
            component: "validator".into(),
            attempts: 2,
            reason: "500".into(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn sim_error_converts_from_parts() {
        fn takes(_: SimError) {}
        takes(
            SchemaError::UnknownVariable {
                scope: "global",
                name: "gdp".into(),
            }
            .into(),
        );
        takes(SpatialError::ProtectedNetwork.into());
    }
}
