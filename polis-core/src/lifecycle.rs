//! Lifecycle management — buffered population changes applied as one
//! atomic phase per turn.
//!
//! Requests are validated against the pre-application snapshot;
//! user-intent errors (unknown agent, cap overflow, non-positive
//! pause) are WARN-and-continue, the only error class the core
//! tolerates. A failure *during* application is defensive evidence of
//! a bug and fails the whole batch.

use crate::action::LifecycleRequest;
use crate::error::StateError;
use crate::schema::{VarScope, VariableSchema};
use crate::state::{AgentRecord, POPULATION_CAP, StateSnapshot};
use crate::value::ScalarValue;
use tracing::{info, warn};

/// What happened to one applied request.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleOutcome {
    /// An agent was added, possibly under a collision-resolved name.
    Added {
        /// The name the request asked for.
        requested: String,
        /// The name actually used.
        resolved: String,
    },
    /// An agent was removed.
    Removed(String),
    /// An agent was paused.
    Paused(String),
    /// An agent was resumed (possibly a no-op).
    Resumed(String),
    /// The request was rejected at application time (cap overflow).
    Rejected {
        /// The agent name in the rejected request.
        name: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Filter a turn's buffered requests against the pre-application
/// snapshot, dropping (with a WARN) the ones that cannot apply.
///
/// The population cap is *not* checked here: it depends on how many
/// adds precede a given add within the batch, so it is enforced
/// during application.
#[must_use]
pub fn validate_requests(
    requests: &[LifecycleRequest],
    snapshot: &StateSnapshot,
    schema: &VariableSchema,
) -> Vec<LifecycleRequest> {
    let mut accepted = Vec::with_capacity(requests.len());
    for request in requests {
        match request {
            LifecycleRequest::Add {
                name,
                initial_state,
            } => {
                if name.is_empty() {
                    warn!(reason = "empty name", "lifecycle add rejected");
                    continue;
                }
                let bad_var = initial_state.iter().find_map(|(var, raw)| {
                    match ScalarValue::from_json(raw) {
                        None => Some(format!("{var}: non-scalar initial value")),
                        Some(value) => schema
                            .validate(VarScope::Agent, var, &value)
                            .err()
                            .map(|e| e.to_string()),
                    }
                });
                if let Some(reason) = bad_var {
                    warn!(agent = %name, %reason, "lifecycle add rejected");
                    continue;
                }
                accepted.push(request.clone());
            }
            LifecycleRequest::Remove { name } => {
                if snapshot.agents.contains_key(name) {
                    accepted.push(request.clone());
                } else {
                    warn!(agent = %name, reason = "unknown agent", "lifecycle remove ignored");
                }
            }
            LifecycleRequest::Pause {
                name,
                auto_resume_turns,
            } => {
                if !snapshot.agents.contains_key(name) {
                    warn!(agent = %name, reason = "unknown agent", "lifecycle pause ignored");
                    continue;
                }
                if auto_resume_turns == &Some(0) {
                    warn!(agent = %name, reason = "auto_resume_turns must be positive", "lifecycle pause ignored");
                    continue;
                }
                accepted.push(request.clone());
            }
            // Resume of an unknown or non-paused agent is an
            // idempotent no-op, kept so application returns an equal
            // state rather than warning.
            LifecycleRequest::Resume { name } => {
                if snapshot.agents.contains_key(name) {
                    accepted.push(request.clone());
                } else {
                    warn!(agent = %name, reason = "unknown agent", "lifecycle resume ignored");
                }
            }
        }
    }
    accepted
}

/// Resolve an add-request name against the names already taken:
/// `name`, then `name_1`, `name_2`, … until free.
#[must_use]
pub fn resolve_name(snapshot_agents: &std::collections::BTreeMap<String, AgentRecord>, requested: &str) -> String {
    if !snapshot_agents.contains_key(requested) {
        return requested.to_owned();
    }
    let mut suffix = 1u32;
    loop {
        let candidate = format!("{requested}_{suffix}");
        if !snapshot_agents.contains_key(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

/// Apply a validated batch, returning the new snapshot and per-request
/// outcomes. Nothing is committed on error — the caller fails the
/// turn and keeps the input snapshot.
pub fn apply_requests(
    snapshot: &StateSnapshot,
    requests: &[LifecycleRequest],
    schema: &VariableSchema,
) -> Result<(StateSnapshot, Vec<LifecycleOutcome>), StateError> {
    let mut next = snapshot.clone();
    let mut outcomes = Vec::with_capacity(requests.len());

    for request in requests {
        match request {
            LifecycleRequest::Add {
                name,
                initial_state,
            } => {
                if next.agents.len() >= POPULATION_CAP {
                    warn!(
                        agent = %name,
                        cap = POPULATION_CAP,
                        "population cap reached, add rejected"
                    );
                    outcomes.push(LifecycleOutcome::Rejected {
                        name: name.clone(),
                        reason: format!("population cap {POPULATION_CAP} reached"),
                    });
                    continue;
                }
                let resolved = resolve_name(&next.agents, name);
                let mut vars = schema.agent_defaults();
                for (var, raw) in initial_state {
                    // Pre-validated; a failure here is a defensive
                    // check tripping, which fails the batch.
                    let value = ScalarValue::from_json(raw).ok_or_else(|| {
                        StateError::InvariantViolation(format!(
                            "add {resolved}: non-scalar initial value for {var}"
                        ))
                    })?;
                    let stored = schema.validate(VarScope::Agent, var, &value)?;
                    vars.insert(var.clone(), stored);
                }
                next.agents.insert(resolved.clone(), AgentRecord::new(vars));
                info!(requested = %name, agent = %resolved, "agent added");
                outcomes.push(LifecycleOutcome::Added {
                    requested: name.clone(),
                    resolved,
                });
            }
            LifecycleRequest::Remove { name } => {
                next.agents.remove(name);
                next.paused_agents.remove(name);
                next.auto_resume.remove(name);
                if let Some(spatial) = next.spatial_state.as_mut() {
                    spatial.agent_positions.remove(name);
                }
                info!(agent = %name, "agent removed");
                outcomes.push(LifecycleOutcome::Removed(name.clone()));
            }
            LifecycleRequest::Pause {
                name,
                auto_resume_turns,
            } => {
                next.paused_agents.insert(name.clone());
                if let Some(turns) = auto_resume_turns {
                    next.auto_resume.insert(name.clone(), *turns);
                }
                info!(agent = %name, auto_resume = ?auto_resume_turns, "agent paused");
                outcomes.push(LifecycleOutcome::Paused(name.clone()));
            }
            LifecycleRequest::Resume { name } => {
                next.paused_agents.remove(name);
                next.auto_resume.remove(name);
                outcomes.push(LifecycleOutcome::Resumed(name.clone()));
            }
        }
    }

    next.check_invariants(schema)?;
    Ok((next, outcomes))
}

/// End-of-turn auto-resume tick.
///
/// `sat_out` is the set of agents that were paused at turn start: a
/// countdown only decrements for a turn the agent actually sat out,
/// so a pause issued during this turn's lifecycle phase still covers
/// its full duration. Counters that reach zero leave both
/// `paused_agents` and `auto_resume`.
#[must_use]
pub fn tick_auto_resume(
    snapshot: &StateSnapshot,
    sat_out: &std::collections::BTreeSet<String>,
) -> StateSnapshot {
    let mut next = snapshot.clone();
    let mut expired = Vec::new();
    for (name, remaining) in next.auto_resume.iter_mut() {
        if !sat_out.contains(name) {
            continue;
        }
        *remaining -= 1;
        if *remaining == 0 {
            expired.push(name.clone());
        }
    }
    for name in expired {
        next.auto_resume.remove(&name);
        next.paused_agents.remove(&name);
        info!(agent = %name, "auto-resume elapsed, agent resumed");
    }
    next
}
