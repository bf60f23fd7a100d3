//! Per-agent views — the filtered projection of a snapshot one agent
//! is allowed to observe.

use crate::spatial::SpatialState;
use crate::state::AgentRecord;
use crate::value::ScalarValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What one agent sees at the start of a turn.
///
/// Built by the observability filter: the agent's own complete record
/// (including memory), global state in full, other agents' public
/// variables only, and the spatial layer restricted to the configured
/// radius. Another agent's memory is never present. Views are
/// immutable — agents read, decide, and return a new action + memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentView {
    /// The observing agent.
    pub agent_name: String,
    /// The turn being decided.
    pub turn: u64,
    /// Decision seed, derived from the run seed and the agent name.
    /// Deterministic agents draw all randomness from it.
    pub seed: u64,
    /// The observer's own record: declared variables plus memory.
    pub own: AgentRecord,
    /// Global state, unrestricted.
    pub global_state: BTreeMap<String, ScalarValue>,
    /// Other agents' public variables. Spatially filtered agents are
    /// absent entirely (radius dominates the visibility bits).
    pub visible_agents: BTreeMap<String, BTreeMap<String, ScalarValue>>,
    /// The spatial layer restricted to the observer's radius, absent
    /// for aspatial runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial_state: Option<SpatialState>,
}

impl AgentView {
    /// The observer's private memory.
    #[must_use]
    pub fn memory(&self) -> &serde_json::Value {
        &self.own.memory
    }

    /// One of the observer's own variables.
    #[must_use]
    pub fn own_var(&self, name: &str) -> Option<&ScalarValue> {
        self.own.vars.get(name)
    }

    /// A global variable.
    #[must_use]
    pub fn global_var(&self, name: &str) -> Option<&ScalarValue> {
        self.global_state.get(name)
    }

    /// Another agent's public variable, if that agent is visible.
    #[must_use]
    pub fn visible_var(&self, agent: &str, name: &str) -> Option<&ScalarValue> {
        self.visible_agents.get(agent)?.get(name)
    }

    /// Names of the other agents this observer can see.
    #[must_use]
    pub fn visible_agent_names(&self) -> Vec<&str> {
        self.visible_agents.keys().map(String::as_str).collect()
    }
}
