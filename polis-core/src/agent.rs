//! The Agent contract — what one participant does per turn.

use crate::action::{Action, LifecycleRequest};
use crate::error::SimError;
use crate::view::AgentView;
use async_trait::async_trait;

/// An agent's decision for one turn: the proposed action plus its
/// replacement private memory.
///
/// Memory is committed before validation runs, so an agent remembers
/// what it tried even when the validator rejects the attempt.
#[derive(Debug, Clone)]
pub struct Decision {
    /// The proposed action.
    pub action: Action,
    /// The agent's next memory blob (must be JSON; the type enforces
    /// it).
    pub memory: serde_json::Value,
}

/// An autonomous participant.
///
/// `decide` is pure with respect to shared state: it reads the view,
/// never mutates it, and returns its decision. Agents run
/// concurrently — one tokio task each — so implementations must not
/// rely on cross-agent ordering. An agent must be deterministic given
/// `(view, memory, view.seed)`; model nondeterminism enters only
/// through the LLM adapter's response source, which the determinism
/// harness replaces with a script.
///
/// Implementations are external to the core: a random strategy, a
/// rule table, an LLM-backed reasoner atop the adapter. An
/// `LlmError` returned here aborts the turn.
#[async_trait]
pub trait Agent: Send + Sync {
    /// The agent's unique name within the run.
    fn name(&self) -> &str;

    /// Observe the view and produce this turn's decision.
    async fn decide(&self, view: &AgentView) -> Result<Decision, SimError>;

    /// Optional hook: population change requests, collected alongside
    /// the regular decision and buffered for the lifecycle phase.
    async fn emit_lifecycle(&self, _view: &AgentView) -> Result<Vec<LifecycleRequest>, SimError> {
        Ok(Vec::new())
    }
}
