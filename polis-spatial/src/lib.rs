#![deny(missing_docs)]
//! Spatial subsystem for polis: topology construction, read-only
//! queries, and engine-only mutations over the spatial types declared
//! in `polis-core`.
//!
//! The split mirrors the rest of the workspace: data shapes live in
//! the core crate so snapshots can carry them, behavior lives here.
//! Queries are total functions with safe defaults; mutations return
//! new states and reserve errors for unknown ids, which abort the
//! turn.

pub mod factory;
pub mod mutate;
pub mod query;

pub use query::SpatialQuery;

use polis_core::state::StateSnapshot;
use polis_core::view::AgentView;

/// Anything that can expose its spatial layer as a query surface.
///
/// Implemented for both the full snapshot (orchestrator/engine side)
/// and the per-agent view (agent side, already proximity-filtered),
/// so the same query code runs on either.
pub trait SpatialRead {
    /// The query surface over this value's spatial layer.
    fn spatial(&self) -> SpatialQuery<'_>;
}

impl SpatialRead for StateSnapshot {
    fn spatial(&self) -> SpatialQuery<'_> {
        SpatialQuery::new(self.spatial_state.as_ref())
    }
}

impl SpatialRead for AgentView {
    fn spatial(&self) -> SpatialQuery<'_> {
        SpatialQuery::new(self.spatial_state.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polis_core::spatial::{DEFAULT_NETWORK, SpatialState, TopologyKind};
    use std::collections::BTreeMap;

    #[test]
    fn snapshot_without_spatial_state_queries_safely() {
        let schema =
            polis_core::schema::VariableSchema::new(BTreeMap::new(), BTreeMap::new()).unwrap();
        let snapshot = StateSnapshot {
            turn: 0,
            global_state: BTreeMap::new(),
            agents: BTreeMap::new(),
            paused_agents: Default::default(),
            auto_resume: BTreeMap::new(),
            spatial_state: None,
            reasoning_trail: Vec::new(),
            schema_fingerprint: schema.fingerprint(),
        };
        assert_eq!(snapshot.spatial().get_agent_position("ada"), None);
        assert_eq!(snapshot.spatial().get_distance("a", "b", DEFAULT_NETWORK), -1);
    }

    #[test]
    fn view_exposes_its_filtered_substate() {
        let mut spatial = SpatialState::empty(TopologyKind::Network);
        spatial
            .locations
            .insert("hub".into(), polis_core::spatial::Location::new("hub"));
        spatial.agent_positions.insert("ada".into(), "hub".into());

        let view = AgentView {
            agent_name: "ada".into(),
            turn: 0,
            seed: 0,
            own: polis_core::state::AgentRecord::new(BTreeMap::new()),
            global_state: BTreeMap::new(),
            visible_agents: BTreeMap::new(),
            spatial_state: Some(spatial),
        };
        assert_eq!(view.spatial().get_agent_position("ada"), Some("hub"));
        assert_eq!(view.spatial().get_agents_at("hub"), vec!["ada"]);
    }
}
