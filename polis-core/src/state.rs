//! The immutable world snapshot and its copy-on-write operations.

use crate::config::SimulationConfig;
use crate::error::{ConfigError, SimError, StateError};
use crate::schema::{MEMORY_KEY, VarScope, VariableSchema};
use crate::spatial::SpatialState;
use crate::value::ScalarValue;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Hard population cap. Lifecycle `Add` requests beyond it are
/// rejected with a WARN; initial populations beyond it are a config
/// error.
pub const POPULATION_CAP: usize = 25;

/// One agent's slot in the snapshot: declared game values plus the
/// opaque memory blob only the owning agent may interpret.
///
/// Serialized flat — variables as top-level keys with `memory`
/// alongside them — which is why `memory` is a reserved variable name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Declared agent-scope variables.
    #[serde(flatten)]
    pub vars: BTreeMap<String, ScalarValue>,
    /// Opaque, JSON-serializable private memory. Read by other
    /// components only as bytes; never interpreted.
    #[serde(default)]
    pub memory: serde_json::Value,
}

impl AgentRecord {
    /// A record with the given variables and null memory.
    #[must_use]
    pub fn new(vars: BTreeMap<String, ScalarValue>) -> Self {
        Self {
            vars,
            memory: serde_json::Value::Null,
        }
    }
}

/// An audit record attached by a component during the producing turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningRecord {
    /// Which component reasoned: `agent`, `validator`, or `engine`.
    pub component: String,
    /// The agent concerned, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// Free-form reasoning text.
    pub reasoning: String,
    /// Self-reported confidence in `[0, 1]`.
    pub confidence: f64,
}

impl ReasoningRecord {
    /// Create a record for the given component.
    pub fn new(component: impl Into<String>, reasoning: impl Into<String>, confidence: f64) -> Self {
        Self {
            component: component.into(),
            agent: None,
            reasoning: reasoning.into(),
            confidence,
        }
    }

    /// Attach the concerned agent.
    #[must_use]
    pub fn for_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }
}

/// A batch of validated updates for [`StateSnapshot::with_updates`].
#[derive(Debug, Clone, Default)]
pub struct StateUpdates {
    /// Global variable writes.
    pub global: BTreeMap<String, ScalarValue>,
    /// Per-agent variable writes, keyed by agent name.
    pub agent_vars: BTreeMap<String, BTreeMap<String, ScalarValue>>,
    /// Replacement spatial state, when the engine mutated topology.
    pub spatial: Option<SpatialState>,
}

impl StateUpdates {
    /// Whether the batch writes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.agent_vars.is_empty() && self.spatial.is_none()
    }
}

/// The immutable world state at one point in time.
///
/// Snapshots are persistent values: every operation that would change
/// one returns a new snapshot and leaves the input untouched. The
/// orchestrator owns the current snapshot; during agent decisions it
/// is shared read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Turn counter; 0 at construction, +1 per successful reduction.
    pub turn: u64,
    /// Global variable values.
    pub global_state: BTreeMap<String, ScalarValue>,
    /// Agent name → record. At most [`POPULATION_CAP`] entries.
    pub agents: BTreeMap<String, AgentRecord>,
    /// Agents sitting out their turns. Always a subset of `agents`.
    #[serde(default)]
    pub paused_agents: BTreeSet<String>,
    /// Paused agent → remaining paused turns (always positive).
    #[serde(default)]
    pub auto_resume: BTreeMap<String, u32>,
    /// The spatial layer, absent for aspatial simulations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial_state: Option<SpatialState>,
    /// Reasoning appended during the turn that produced this snapshot.
    /// Cleared at the next turn's ingress; audit-only.
    #[serde(default)]
    pub reasoning_trail: Vec<ReasoningRecord>,
    /// Fingerprint of the schema this snapshot was built under.
    pub schema_fingerprint: String,
}

impl StateSnapshot {
    /// Construct turn 0 from config defaults.
    ///
    /// The spatial state comes pre-built from the topology factory
    /// (it lives outside this crate); agent `initial_location`s are
    /// applied here so position integrity is checked against it.
    pub fn initial(
        config: &SimulationConfig,
        schema: &VariableSchema,
        spatial: Option<SpatialState>,
    ) -> Result<Self, SimError> {
        let mut agents = BTreeMap::new();
        let mut spatial = spatial;

        for agent_config in &config.agents {
            let name = agent_config.name.as_str();
            if name.is_empty() {
                return Err(ConfigError::Invalid("agent name must be non-empty".into()).into());
            }
            let mut vars = schema.agent_defaults();
            for (var, raw) in &agent_config.initial_state {
                let value = ScalarValue::from_json(raw).ok_or_else(|| {
                    ConfigError::Invalid(format!(
                        "agent {name}: initial_state.{var} is not a scalar"
                    ))
                })?;
                let stored = schema
                    .validate(VarScope::Agent, var, &value)
                    .map_err(StateError::Schema)?;
                vars.insert(var.clone(), stored);
            }
            if agents.insert(name.to_owned(), AgentRecord::new(vars)).is_some() {
                return Err(ConfigError::Invalid(format!("duplicate agent name: {name}")).into());
            }

            if let Some(location) = &agent_config.initial_location {
                let Some(space) = spatial.as_mut() else {
                    return Err(ConfigError::Invalid(format!(
                        "agent {name} has initial_location but no spatial topology is configured"
                    ))
                    .into());
                };
                if !space.locations.contains_key(location) {
                    return Err(ConfigError::Invalid(format!(
                        "agent {name}: initial_location {location} does not exist"
                    ))
                    .into());
                }
                space
                    .agent_positions
                    .insert(name.to_owned(), location.clone());
            }
        }

        if agents.len() > POPULATION_CAP {
            return Err(ConfigError::Invalid(format!(
                "initial population {} exceeds cap {POPULATION_CAP}",
                agents.len()
            ))
            .into());
        }

        let snapshot = Self {
            turn: 0,
            global_state: schema.global_defaults(),
            agents,
            paused_agents: BTreeSet::new(),
            auto_resume: BTreeMap::new(),
            spatial_state: spatial,
            reasoning_trail: Vec::new(),
            schema_fingerprint: schema.fingerprint(),
        };
        snapshot.check_invariants(schema).map_err(SimError::State)?;
        Ok(snapshot)
    }

    /// Apply a validated batch of writes, returning the new snapshot.
    ///
    /// Every value is checked against the schema; the result is
    /// checked against all snapshot invariants. Nothing is applied on
    /// failure.
    pub fn with_updates(
        &self,
        updates: StateUpdates,
        schema: &VariableSchema,
    ) -> Result<Self, StateError> {
        let mut next = self.clone();

        for (name, value) in updates.global {
            let stored = schema.validate(VarScope::Global, &name, &value)?;
            next.global_state.insert(name, stored);
        }
        for (agent, writes) in updates.agent_vars {
            let record = next.agents.get_mut(&agent).ok_or_else(|| {
                StateError::InvariantViolation(format!("write to unknown agent {agent}"))
            })?;
            for (name, value) in writes {
                let stored = schema.validate(VarScope::Agent, &name, &value)?;
                record.vars.insert(name, stored);
            }
        }
        if let Some(spatial) = updates.spatial {
            next.spatial_state = Some(spatial);
        }

        next.check_invariants(schema)?;
        Ok(next)
    }

    /// New snapshot with one agent's memory replaced. Memory is owned
    /// by the agent — this is the only write path for it, and it does
    /// not require validation beyond JSON-serializability (guaranteed
    /// by the type).
    pub fn with_memory(
        &self,
        agent: &str,
        memory: serde_json::Value,
    ) -> Result<Self, StateError> {
        let mut next = self.clone();
        let record = next.agents.get_mut(agent).ok_or_else(|| {
            StateError::InvariantViolation(format!("memory write to unknown agent {agent}"))
        })?;
        record.memory = memory;
        Ok(next)
    }

    /// New snapshot with the turn counter set.
    #[must_use]
    pub fn with_turn(&self, turn: u64) -> Self {
        let mut next = self.clone();
        next.turn = turn;
        next
    }

    /// New snapshot with reasoning records appended.
    #[must_use]
    pub fn with_reasoning(&self, records: impl IntoIterator<Item = ReasoningRecord>) -> Self {
        let mut next = self.clone();
        next.reasoning_trail.extend(records);
        next
    }

    /// New snapshot with an empty reasoning trail (turn ingress).
    #[must_use]
    pub fn with_cleared_reasoning(&self) -> Self {
        let mut next = self.clone();
        next.reasoning_trail.clear();
        next
    }

    /// Active agents this turn: population minus the paused set.
    #[must_use]
    pub fn active_agents(&self) -> Vec<String> {
        self.agents
            .keys()
            .filter(|name| !self.paused_agents.contains(*name))
            .cloned()
            .collect()
    }

    /// Check every snapshot-wide invariant.
    pub fn check_invariants(&self, schema: &VariableSchema) -> Result<(), StateError> {
        let fail = |msg: String| Err(StateError::InvariantViolation(msg));

        if self.agents.len() > POPULATION_CAP {
            return fail(format!(
                "population {} exceeds cap {POPULATION_CAP}",
                self.agents.len()
            ));
        }
        if self.schema_fingerprint != schema.fingerprint() {
            return fail("snapshot schema fingerprint disagrees with config".into());
        }
        for name in &self.paused_agents {
            if !self.agents.contains_key(name) {
                return fail(format!("paused agent {name} is not in the population"));
            }
        }
        for (name, remaining) in &self.auto_resume {
            if !self.paused_agents.contains(name) {
                return fail(format!("auto-resume entry {name} is not paused"));
            }
            if *remaining == 0 {
                return fail(format!("auto-resume entry {name} has zero turns left"));
            }
        }
        for (name, value) in &self.global_state {
            schema.validate(VarScope::Global, name, value)?;
        }
        for (agent, record) in self.agents.iter() {
            if agent.is_empty() {
                return fail("empty agent name".into());
            }
            if record.vars.contains_key(MEMORY_KEY) {
                return fail(format!("agent {agent} has a variable shadowing {MEMORY_KEY}"));
            }
            for (name, value) in &record.vars {
                schema.validate(VarScope::Agent, name, value)?;
            }
        }
        if let Some(spatial) = &self.spatial_state {
            spatial.check_integrity()?;
            for positioned in spatial.agent_positions.keys() {
                if !self.agents.contains_key(positioned) {
                    return fail(format!(
                        "position recorded for unknown agent {positioned}"
                    ));
                }
            }
        }
        Ok(())
    }

    /// Content hash of the snapshot: SHA-256 over the canonical JSON
    /// encoding, prefixed `sha256:`.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let canonical =
            serde_json::to_vec(self).expect("snapshot serialization is infallible");
        format!("sha256:{}", hex::encode(Sha256::digest(&canonical)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{VarKind, VariableDefinition};
    use serde_json::json;

    fn schema() -> VariableSchema {
        let float = |default: f64| VariableDefinition {
            kind: VarKind::Float,
            min: Some(0.0),
            max: Some(100.0),
            allowed_values: None,
            default: ScalarValue::Float(default),
        };
        VariableSchema::new(
            BTreeMap::from([("wealth".to_owned(), float(10.0))]),
            BTreeMap::from([("gdp".to_owned(), float(50.0))]),
        )
        .unwrap()
    }

    fn base_snapshot(schema: &VariableSchema, names: &[&str]) -> StateSnapshot {
        StateSnapshot {
            turn: 0,
            global_state: schema.global_defaults(),
            agents: names
                .iter()
                .map(|n| ((*n).to_owned(), AgentRecord::new(schema.agent_defaults())))
                .collect(),
            paused_agents: BTreeSet::new(),
            auto_resume: BTreeMap::new(),
            spatial_state: None,
            reasoning_trail: Vec::new(),
            schema_fingerprint: schema.fingerprint(),
        }
    }

    #[test]
    fn updates_produce_a_new_value() {
        let schema = schema();
        let snapshot = base_snapshot(&schema, &["ada"]);
        let updates = StateUpdates {
            global: BTreeMap::from([("gdp".to_owned(), ScalarValue::Float(60.0))]),
            ..Default::default()
        };
        let next = snapshot.with_updates(updates, &schema).unwrap();
        assert_eq!(snapshot.global_state["gdp"], ScalarValue::Float(50.0));
        assert_eq!(next.global_state["gdp"], ScalarValue::Float(60.0));
    }

    #[test]
    fn out_of_bounds_update_is_rejected_whole() {
        let schema = schema();
        let snapshot = base_snapshot(&schema, &["ada"]);
        let updates = StateUpdates {
            global: BTreeMap::from([("gdp".to_owned(), ScalarValue::Float(101.0))]),
            ..Default::default()
        };
        assert!(snapshot.with_updates(updates, &schema).is_err());
    }

    #[test]
    fn write_to_unknown_agent_is_rejected() {
        let schema = schema();
        let snapshot = base_snapshot(&schema, &["ada"]);
        let updates = StateUpdates {
            agent_vars: BTreeMap::from([(
                "ghost".to_owned(),
                BTreeMap::from([("wealth".to_owned(), ScalarValue::Float(1.0))]),
            )]),
            ..Default::default()
        };
        assert!(snapshot.with_updates(updates, &schema).is_err());
    }

    #[test]
    fn memory_roundtrips_flat_in_the_record() {
        let schema = schema();
        let snapshot = base_snapshot(&schema, &["ada"]);
        let next = snapshot
            .with_memory("ada", json!({"plans": ["expand"]}))
            .unwrap();
        let encoded = serde_json::to_value(&next.agents["ada"]).unwrap();
        assert_eq!(encoded["wealth"], json!(10.0));
        assert_eq!(encoded["memory"], json!({"plans": ["expand"]}));
        let decoded: AgentRecord = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, next.agents["ada"]);
    }

    #[test]
    fn paused_agent_must_exist() {
        let schema = schema();
        let mut snapshot = base_snapshot(&schema, &["ada"]);
        snapshot.paused_agents.insert("ghost".into());
        assert!(snapshot.check_invariants(&schema).is_err());
    }

    #[test]
    fn auto_resume_requires_paused_and_positive() {
        let schema = schema();
        let mut snapshot = base_snapshot(&schema, &["ada"]);
        snapshot.auto_resume.insert("ada".into(), 2);
        assert!(snapshot.check_invariants(&schema).is_err());

        snapshot.paused_agents.insert("ada".into());
        assert!(snapshot.check_invariants(&schema).is_ok());

        snapshot.auto_resume.insert("ada".into(), 0);
        assert!(snapshot.check_invariants(&schema).is_err());
    }

    #[test]
    fn snapshot_json_roundtrip_is_identity() {
        let schema = schema();
        let mut snapshot = base_snapshot(&schema, &["ada", "bob"]);
        snapshot.paused_agents.insert("bob".into());
        snapshot.auto_resume.insert("bob".into(), 3);
        snapshot
            .reasoning_trail
            .push(ReasoningRecord::new("engine", "applied tariff", 0.8).for_agent("ada"));

        let bytes = serde_json::to_vec(&snapshot).unwrap();
        let back: StateSnapshot = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, snapshot);
        assert_eq!(serde_json::to_vec(&back).unwrap(), bytes);
    }

    #[test]
    fn fingerprint_tracks_content() {
        let schema = schema();
        let a = base_snapshot(&schema, &["ada"]);
        let b = a.with_turn(1);
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
    }

    #[test]
    fn cleared_reasoning_is_empty() {
        let schema = schema();
        let snapshot = base_snapshot(&schema, &["ada"])
            .with_reasoning([ReasoningRecord::new("validator", "looks fine", 0.9)]);
        assert_eq!(snapshot.reasoning_trail.len(), 1);
        assert!(snapshot.with_cleared_reasoning().reasoning_trail.is_empty());
    }
}
