//! Per-agent view construction: access control composed with spatial
//! proximity.

use polis_core::config::ObservabilityConfig;
use polis_core::spatial::DEFAULT_NETWORK;
use polis_core::state::StateSnapshot;
use polis_core::view::AgentView;
use polis_spatial::SpatialQuery;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Builds the view each agent observes.
///
/// Composition order is fixed: the spatial radius filter runs first
/// and removes unobservable agents entirely; the public/private
/// variable projection then applies to whoever remains. An agent the
/// radius excludes is gone before visibility bits are consulted —
/// radius dominates.
pub struct ObservabilityFilter {
    radius: Option<u32>,
    private_agent_vars: BTreeSet<String>,
    run_seed: u64,
}

impl ObservabilityFilter {
    /// Build from the run's `observability` section (absent = fully
    /// open views) and the run seed.
    #[must_use]
    pub fn new(config: Option<&ObservabilityConfig>, run_seed: u64) -> Self {
        Self {
            radius: config.and_then(|c| c.radius),
            private_agent_vars: config
                .map(|c| c.private_agent_vars.iter().cloned().collect())
                .unwrap_or_default(),
            run_seed,
        }
    }

    /// The decision seed for one agent: SHA-256 over the run seed and
    /// the agent name, truncated to 64 bits. Stable across runs and
    /// independent of population order.
    #[must_use]
    pub fn seed_for(&self, agent: &str) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(self.run_seed.to_le_bytes());
        hasher.update(agent.as_bytes());
        let digest = hasher.finalize();
        u64::from_le_bytes(digest[..8].try_into().expect("digest is 32 bytes"))
    }

    /// Construct `agent`'s view of the snapshot.
    ///
    /// The view contains the observer's complete record, the full
    /// global state, other agents' public variables, and the spatial
    /// substate within the configured radius. With a radius
    /// configured, another agent is visible only while it stands on a
    /// kept location — unpositioned agents are unobservable.
    #[must_use]
    pub fn view(&self, agent: &str, snapshot: &StateSnapshot) -> AgentView {
        let spatial_state = match self.radius {
            Some(radius) => SpatialQuery::new(snapshot.spatial_state.as_ref())
                .filter_by_proximity(agent, radius, DEFAULT_NETWORK),
            None => snapshot.spatial_state.clone(),
        };

        let spatially_visible = |other: &str| -> bool {
            match (self.radius, &spatial_state) {
                (Some(_), Some(filtered)) => filtered.agent_positions.contains_key(other),
                _ => true,
            }
        };

        let visible_agents: BTreeMap<String, BTreeMap<String, _>> = snapshot
            .agents
            .iter()
            .filter(|(name, _)| name.as_str() != agent)
            .filter(|(name, _)| spatially_visible(name))
            .map(|(name, record)| {
                let public: BTreeMap<_, _> = record
                    .vars
                    .iter()
                    .filter(|(var, _)| !self.private_agent_vars.contains(*var))
                    .map(|(var, value)| (var.clone(), value.clone()))
                    .collect();
                (name.clone(), public)
            })
            .collect();

        AgentView {
            agent_name: agent.to_owned(),
            turn: snapshot.turn,
            seed: self.seed_for(agent),
            own: snapshot
                .agents
                .get(agent)
                .cloned()
                .unwrap_or_else(|| polis_core::state::AgentRecord::new(BTreeMap::new())),
            global_state: snapshot.global_state.clone(),
            visible_agents,
            spatial_state,
        }
    }
}
