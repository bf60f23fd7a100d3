//! The per-turn pipeline: Observe → Decide → Validate → Reduce.

use crate::observe::ObservabilityFilter;
use polis_core::action::{Action, LifecycleRequest};
use polis_core::agent::Agent;
use polis_core::engine::Engine;
use polis_core::error::{SimError, StateError};
use polis_core::lifecycle::{self, LifecycleOutcome};
use polis_core::schema::VariableSchema;
use polis_core::state::{ReasoningRecord, StateSnapshot};
use polis_core::validator::Validator;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A completed turn: the committed-candidate snapshot plus what the
/// lifecycle phase did.
#[derive(Debug)]
pub struct TurnOutput {
    /// The post-turn snapshot (turn incremented, auto-resume ticked).
    pub snapshot: StateSnapshot,
    /// Per-request lifecycle outcomes, for logging and tests.
    pub lifecycle: Vec<LifecycleOutcome>,
}

/// Run one full turn against `snapshot`.
///
/// Agents decide concurrently (one tokio task each); everything after
/// is sequential in lexicographic agent-name order, the canonical
/// ordering used downstream. The cancellation token is honored
/// between steps only — a step in flight always completes, and a
/// cancelled turn commits nothing.
pub async fn run_turn(
    snapshot: &StateSnapshot,
    agents: &BTreeMap<String, Arc<dyn Agent>>,
    validator: &dyn Validator,
    engine: &dyn Engine,
    schema: &VariableSchema,
    filter: &ObservabilityFilter,
    cancel: &CancellationToken,
) -> Result<TurnOutput, SimError> {
    // Turn ingress: the trail only ever carries this turn's records.
    let mut draft = snapshot.with_cleared_reasoning();

    // Paused at turn start means paused for the whole turn; the
    // auto-resume tick deliberately waits until the end and only
    // counts turns actually sat out.
    let paused_at_start = snapshot.paused_agents.clone();
    let active = draft.active_agents();

    // Decide (parallel). Tasks are spawned and awaited in name order,
    // so results come back canonically ordered regardless of
    // completion order.
    let mut handles = Vec::with_capacity(active.len());
    for name in &active {
        let agent = agents
            .get(name)
            .ok_or_else(|| {
                StateError::InvariantViolation(format!("no implementation registered for {name}"))
            })
            .map_err(SimError::State)?;
        let agent = Arc::clone(agent);
        let view = filter.view(name, &draft);
        handles.push(tokio::spawn(async move {
            let decision = agent.decide(&view).await?;
            let lifecycle = agent.emit_lifecycle(&view).await?;
            Ok::<_, SimError>((decision, lifecycle))
        }));
    }

    let mut actions: Vec<Action> = Vec::with_capacity(active.len());
    let mut lifecycle_requests: Vec<LifecycleRequest> = Vec::new();
    let mut memories: Vec<(String, serde_json::Value)> = Vec::with_capacity(active.len());
    for (name, handle) in active.iter().zip(handles) {
        let (decision, requests) = handle
            .await
            .map_err(|e| SimError::Other(Box::new(e)))??;
        if decision.action.agent_name != *name {
            return Err(StateError::InvariantViolation(format!(
                "agent {name} emitted an action for {}",
                decision.action.agent_name
            ))
            .into());
        }
        memories.push((name.clone(), decision.memory));
        actions.push(decision.action);
        lifecycle_requests.extend(requests);
    }

    if cancel.is_cancelled() {
        return Err(SimError::Cancelled);
    }

    // Memory commits before validation: an agent remembers what it
    // tried even when the verdict rejects it.
    for (name, memory) in memories {
        draft = draft.with_memory(&name, memory).map_err(SimError::State)?;
    }

    // Validate. The validator returns the same list, annotated.
    let validated = validator.validate(actions, &draft).await?;
    if validated.len() != active.len()
        || validated
            .iter()
            .zip(&active)
            .any(|(action, name)| action.agent_name != *name)
    {
        return Err(StateError::InvariantViolation(
            "validator changed the action list".to_owned(),
        )
        .into());
    }

    if cancel.is_cancelled() {
        return Err(SimError::Cancelled);
    }

    // Reduce: sequential application, skipping unvalidated actions.
    let mut trail: Vec<ReasoningRecord> = Vec::new();
    for action in &validated {
        if let Some(verdict) = &action.validation_result {
            let record = ReasoningRecord::new("validator", verdict.reasoning.clone(), verdict.confidence)
                .for_agent(action.agent_name.clone());
            debug!(agent = %record.agent.as_deref().unwrap_or(""), confidence = record.confidence, "validator reasoning");
            trail.push(record);
        }
        if !action.validated {
            info!(
                agent_name = %action.agent_name,
                reason = "unvalidated",
                "agent_skipped"
            );
            continue;
        }
        let applied = engine.apply_action(action, draft).await?;
        draft = applied.snapshot;
        for record in applied.reasoning {
            debug!(component = %record.component, confidence = record.confidence, "engine reasoning");
            trail.push(record);
        }
    }
    draft = draft.with_reasoning(trail);

    if cancel.is_cancelled() {
        return Err(SimError::Cancelled);
    }

    // Lifecycle: one atomic batch, validated against the
    // pre-application draft.
    let accepted = lifecycle::validate_requests(&lifecycle_requests, &draft, schema);
    let (after_lifecycle, outcomes) =
        lifecycle::apply_requests(&draft, &accepted, schema).map_err(SimError::State)?;
    draft = after_lifecycle;

    // Turn egress: advance the counter, then tick auto-resume for the
    // agents that sat this turn out.
    draft = draft.with_turn(snapshot.turn + 1);
    draft = lifecycle::tick_auto_resume(&draft, &paused_at_start);
    draft.check_invariants(schema).map_err(SimError::State)?;

    Ok(TurnOutput {
        snapshot: draft,
        lifecycle: outcomes,
    })
}
