//! Actions, validation results, and lifecycle requests.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether an action is a domain action or a population change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// A domain action reduced by the engine.
    Regular,
    /// A population change carried as a buffered lifecycle request.
    Lifecycle,
}

/// The validator's verdict on one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the action may be applied.
    pub is_valid: bool,
    /// Short human-readable verdict.
    pub reason: String,
    /// Validator confidence in `[0, 1]`.
    pub confidence: f64,
    /// Full reasoning text.
    pub reasoning: String,
}

impl ValidationResult {
    /// An accepting verdict.
    pub fn accept(reason: impl Into<String>, confidence: f64) -> Self {
        let reason = reason.into();
        Self {
            is_valid: true,
            reasoning: reason.clone(),
            reason,
            confidence,
        }
    }

    /// A rejecting verdict.
    pub fn reject(reason: impl Into<String>, confidence: f64) -> Self {
        let reason = reason.into();
        Self {
            is_valid: false,
            reasoning: reason.clone(),
            reason,
            confidence,
        }
    }
}

/// One agent's proposal for a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// The proposing agent. Must be a current, non-paused agent at
    /// emission time.
    pub agent_name: String,
    /// Domain action or lifecycle request.
    pub kind: ActionKind,
    /// Free-form domain descriptor: a policy statement for regular
    /// actions, a tagged lifecycle variant otherwise.
    pub payload: serde_json::Value,
    /// Set by the validator. Unvalidated actions are skipped by the
    /// reduction with an INFO record.
    #[serde(default)]
    pub validated: bool,
    /// The verdict, once the validator has run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_result: Option<ValidationResult>,
}

impl Action {
    /// A fresh, unvalidated regular action.
    pub fn regular(agent_name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            agent_name: agent_name.into(),
            kind: ActionKind::Regular,
            payload,
            validated: false,
            validation_result: None,
        }
    }

    /// Attach a verdict, setting the `validated` flag accordingly.
    #[must_use]
    pub fn with_verdict(mut self, verdict: ValidationResult) -> Self {
        self.validated = verdict.is_valid;
        self.validation_result = Some(verdict);
        self
    }
}

/// A buffered population change, applied atomically after regular
/// reduction. Lifecycle changes become visible from the next turn.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleRequest {
    /// Spawn a new agent. The name is resolved deterministically on
    /// collision (`name_1`, `name_2`, …); the record starts from
    /// schema defaults merged with `initial_state`.
    Add {
        /// Requested agent name.
        name: String,
        /// Variable overrides, schema-validated.
        #[serde(default)]
        initial_state: BTreeMap<String, serde_json::Value>,
    },
    /// Remove an agent and all references to it.
    Remove {
        /// The agent to remove.
        name: String,
    },
    /// Pause an agent, optionally for a bounded number of turns.
    Pause {
        /// The agent to pause.
        name: String,
        /// Automatically resume after this many turns (positive).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auto_resume_turns: Option<u32>,
    },
    /// Resume a paused agent. Idempotent.
    Resume {
        /// The agent to resume.
        name: String,
    },
}

impl LifecycleRequest {
    /// The agent name the request concerns.
    #[must_use]
    pub fn agent_name(&self) -> &str {
        match self {
            Self::Add { name, .. }
            | Self::Remove { name }
            | Self::Pause { name, .. }
            | Self::Resume { name } => name,
        }
    }
}
