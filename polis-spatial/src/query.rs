//! Read-only spatial queries.
//!
//! Every query is a total function: missing spatial state, unknown
//! ids, and unknown networks yield safe defaults (empty collection,
//! `None`, `-1`) — never an error. Only the documented tie-breaks
//! make iteration order observable, and those are lexicographic.

use polis_core::spatial::{SpatialState, connection_key};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// The read surface over an optional spatial state.
///
/// Wraps `Option<&SpatialState>` so views over aspatial runs answer
/// every query with its safe default instead of branching at each
/// call site.
#[derive(Debug, Clone, Copy)]
pub struct SpatialQuery<'a> {
    state: Option<&'a SpatialState>,
}

impl<'a> SpatialQuery<'a> {
    /// Wrap a possibly-absent spatial state.
    #[must_use]
    pub fn new(state: Option<&'a SpatialState>) -> Self {
        Self { state }
    }

    /// Where an agent stands, if positioned.
    #[must_use]
    pub fn get_agent_position(&self, agent: &str) -> Option<&'a str> {
        self.state?
            .agent_positions
            .get(agent)
            .map(String::as_str)
    }

    /// Sorted neighbours of a location on the named network.
    #[must_use]
    pub fn get_neighbors(&self, location: &str, network: &str) -> Vec<String> {
        let Some(state) = self.state else {
            return Vec::new();
        };
        let Some(net) = state.networks.get(network) else {
            return Vec::new();
        };
        let mut neighbors = BTreeSet::new();
        for (a, b) in &net.edges {
            if a == location {
                neighbors.insert(b.clone());
            } else if b == location {
                neighbors.insert(a.clone());
            }
        }
        neighbors.into_iter().collect()
    }

    /// Hop count between two locations on the named network (BFS over
    /// unweighted edges). `-1` when either endpoint is unknown or no
    /// path exists.
    #[must_use]
    pub fn get_distance(&self, from: &str, to: &str, network: &str) -> i64 {
        match self.distances_from(from, network) {
            Some(distances) => distances.get(to).map_or(-1, |d| i64::from(*d)),
            None => -1,
        }
    }

    /// Whether two locations share an edge on the named network.
    #[must_use]
    pub fn is_adjacent(&self, a: &str, b: &str, network: &str) -> bool {
        self.state
            .and_then(|state| state.networks.get(network))
            .is_some_and(|net| net.has_edge(a, b))
    }

    /// A shortest path from `from` to `to`, endpoints included.
    ///
    /// Deterministic: among equally short paths, each step picks the
    /// lexicographically earliest predecessor. Empty when either
    /// endpoint is unknown or no path exists; `[from]` when the
    /// endpoints coincide.
    #[must_use]
    pub fn shortest_path(&self, from: &str, to: &str, network: &str) -> Vec<String> {
        let Some(distances) = self.distances_from(from, network) else {
            return Vec::new();
        };
        let Some(total) = distances.get(to) else {
            return Vec::new();
        };

        // Walk backwards, taking the first (lexicographically
        // smallest) neighbour one layer closer each step.
        let mut path = vec![to.to_owned()];
        let mut current = to.to_owned();
        let mut remaining = *total;
        while remaining > 0 {
            let predecessor = self
                .get_neighbors(&current, network)
                .into_iter()
                .find(|n| distances.get(n) == Some(&(remaining - 1)));
            match predecessor {
                Some(p) => {
                    path.push(p.clone());
                    current = p;
                    remaining -= 1;
                }
                // Unreachable given a consistent distance map.
                None => return Vec::new(),
            }
        }
        path.reverse();
        path
    }

    /// Sorted names of agents standing at a location.
    #[must_use]
    pub fn get_agents_at(&self, location: &str) -> Vec<String> {
        let Some(state) = self.state else {
            return Vec::new();
        };
        state
            .agent_positions
            .iter()
            .filter(|(_, at)| at.as_str() == location)
            .map(|(agent, _)| agent.clone())
            .collect()
    }

    /// Sorted names of agents within `radius` hops of a location on
    /// the named network (radius 0 = that location only).
    #[must_use]
    pub fn get_agents_within(&self, location: &str, radius: u32, network: &str) -> Vec<String> {
        let Some(state) = self.state else {
            return Vec::new();
        };
        let Some(distances) = self.distances_from(location, network) else {
            return Vec::new();
        };
        state
            .agent_positions
            .iter()
            .filter(|(_, at)| distances.get(at.as_str()).is_some_and(|d| *d <= radius))
            .map(|(agent, _)| agent.clone())
            .collect()
    }

    /// One attribute of a location.
    #[must_use]
    pub fn get_location_attribute(&self, location: &str, key: &str) -> Option<&'a serde_json::Value> {
        self.state?.locations.get(location)?.attributes.get(key)
    }

    /// Sorted ids of locations whose attribute `key` equals `value`.
    #[must_use]
    pub fn get_locations_by_attribute(&self, key: &str, value: &serde_json::Value) -> Vec<String> {
        let Some(state) = self.state else {
            return Vec::new();
        };
        state
            .locations
            .iter()
            .filter(|(_, loc)| loc.attributes.get(key) == Some(value))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Whether a typed connection exists between two locations.
    #[must_use]
    pub fn has_connection(&self, a: &str, b: &str) -> bool {
        self.state
            .is_some_and(|state| state.connections.contains_key(&connection_key(a, b)))
    }

    /// One attribute of the connection between two locations.
    #[must_use]
    pub fn get_connection_attribute(
        &self,
        a: &str,
        b: &str,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        self.state?
            .connections
            .get(&connection_key(a, b))?
            .attributes
            .get(key)
    }

    /// Restrict the state to what `agent` can observe within `radius`
    /// hops of its position: kept locations, positions of agents on
    /// them, and networks/connections with both endpoints kept.
    ///
    /// An unpositioned observer keeps nothing; the result still
    /// carries the (empty) `"default"` network so it is a valid
    /// spatial state.
    #[must_use]
    pub fn filter_by_proximity(
        &self,
        agent: &str,
        radius: u32,
        network: &str,
    ) -> Option<SpatialState> {
        let state = self.state?;
        let mut filtered = state.clone();

        let kept: BTreeSet<String> = match state.agent_positions.get(agent) {
            Some(position) => self
                .distances_from(position, network)
                .unwrap_or_default()
                .into_iter()
                .filter(|(_, d)| *d <= radius)
                .map(|(id, _)| id)
                .collect(),
            None => BTreeSet::new(),
        };

        filtered.locations.retain(|id, _| kept.contains(id));
        filtered.agent_positions.retain(|_, at| kept.contains(at));
        for net in filtered.networks.values_mut() {
            net.edges
                .retain(|(a, b)| kept.contains(a) && kept.contains(b));
        }
        filtered.connections.retain(|key, _| {
            key.split_once('|')
                .is_some_and(|(a, b)| kept.contains(a) && kept.contains(b))
        });
        Some(filtered)
    }

    /// BFS distance map from `from` over the named network. `None`
    /// when the state, the network, or the start location is missing.
    fn distances_from(&self, from: &str, network: &str) -> Option<BTreeMap<String, u32>> {
        let state = self.state?;
        state.networks.get(network)?;
        if !state.locations.contains_key(from) {
            return None;
        }

        let mut distances = BTreeMap::from([(from.to_owned(), 0u32)]);
        let mut queue = VecDeque::from([from.to_owned()]);
        while let Some(current) = queue.pop_front() {
            let next = distances[&current] + 1;
            for neighbor in self.get_neighbors(&current, network) {
                if !distances.contains_key(&neighbor) {
                    distances.insert(neighbor.clone(), next);
                    queue.push_back(neighbor);
                }
            }
        }
        Some(distances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polis_core::config::{SpatialConfig, TopologyConfig};
    use polis_core::spatial::{Connection, DEFAULT_NETWORK, TopologyKind};
    use serde_json::json;

    fn grid_3x3() -> SpatialState {
        crate::factory::build(&SpatialConfig {
            topology: TopologyConfig::Grid {
                width: 3,
                height: 3,
                connectivity: 4,
                wrapping: false,
            },
            location_attributes: std::collections::BTreeMap::new(),
            additional_networks: Vec::new(),
        })
        .unwrap()
    }

    #[test]
    fn absent_state_yields_safe_defaults() {
        let query = SpatialQuery::new(None);
        assert_eq!(query.get_agent_position("ada"), None);
        assert!(query.get_neighbors("0,0", DEFAULT_NETWORK).is_empty());
        assert_eq!(query.get_distance("0,0", "1,1", DEFAULT_NETWORK), -1);
        assert!(query.shortest_path("0,0", "1,1", DEFAULT_NETWORK).is_empty());
        assert!(query.get_agents_at("0,0").is_empty());
        assert!(!query.has_connection("0,0", "0,1"));
        assert!(query.filter_by_proximity("ada", 1, DEFAULT_NETWORK).is_none());
    }

    #[test]
    fn unknown_ids_never_panic() {
        let state = grid_3x3();
        let query = SpatialQuery::new(Some(&state));
        assert_eq!(query.get_distance("0,0", "9,9", DEFAULT_NETWORK), -1);
        assert_eq!(query.get_distance("9,9", "0,0", DEFAULT_NETWORK), -1);
        assert!(query.get_neighbors("9,9", DEFAULT_NETWORK).is_empty());
        assert!(query.get_neighbors("0,0", "no-such-net").is_empty());
    }

    #[test]
    fn neighbors_are_sorted() {
        let state = grid_3x3();
        let query = SpatialQuery::new(Some(&state));
        assert_eq!(query.get_neighbors("1,1", DEFAULT_NETWORK), vec![
            "0,1", "1,0", "1,2", "2,1"
        ]);
    }

    #[test]
    fn distance_is_manhattan_on_an_open_grid() {
        let state = grid_3x3();
        let query = SpatialQuery::new(Some(&state));
        assert_eq!(query.get_distance("0,0", "2,2", DEFAULT_NETWORK), 4);
        assert_eq!(query.get_distance("0,0", "0,0", DEFAULT_NETWORK), 0);
    }

    #[test]
    fn shortest_path_takes_lexicographically_earliest_predecessors() {
        let state = grid_3x3();
        let query = SpatialQuery::new(Some(&state));
        assert_eq!(
            query.shortest_path("0,0", "2,2", DEFAULT_NETWORK),
            vec!["0,0", "0,1", "0,2", "1,2", "2,2"]
        );
    }

    #[test]
    fn shortest_path_of_coincident_endpoints_is_singleton() {
        let state = grid_3x3();
        let query = SpatialQuery::new(Some(&state));
        assert_eq!(query.shortest_path("1,1", "1,1", DEFAULT_NETWORK), vec!["1,1"]);
    }

    #[test]
    fn agents_within_radius_includes_the_center() {
        let mut state = grid_3x3();
        state.agent_positions.insert("ada".into(), "0,0".into());
        state.agent_positions.insert("bob".into(), "0,1".into());
        state.agent_positions.insert("carol".into(), "2,2".into());
        let query = SpatialQuery::new(Some(&state));
        assert_eq!(query.get_agents_within("0,0", 1, DEFAULT_NETWORK), vec![
            "ada", "bob"
        ]);
        assert_eq!(
            query.get_agents_within("0,0", 4, DEFAULT_NETWORK),
            vec!["ada", "bob", "carol"]
        );
    }

    #[test]
    fn locations_by_attribute_matches_exactly() {
        let mut state = grid_3x3();
        state
            .locations
            .get_mut("1,1")
            .unwrap()
            .attributes
            .insert("terrain".into(), json!("forest"));
        let query = SpatialQuery::new(Some(&state));
        assert_eq!(
            query.get_locations_by_attribute("terrain", &json!("forest")),
            vec!["1,1"]
        );
        assert!(
            query
                .get_locations_by_attribute("terrain", &json!("desert"))
                .is_empty()
        );
    }

    #[test]
    fn connection_queries_use_canonical_keys() {
        let mut state = grid_3x3();
        state.connections.insert(
            connection_key("1,0", "0,0"),
            Connection {
                kind: "road".into(),
                attributes: std::collections::BTreeMap::from([(
                    "toll".to_owned(),
                    json!(2),
                )]),
                bidirectional: true,
            },
        );
        let query = SpatialQuery::new(Some(&state));
        assert!(query.has_connection("0,0", "1,0"));
        assert!(query.has_connection("1,0", "0,0"));
        assert_eq!(
            query.get_connection_attribute("0,0", "1,0", "toll"),
            Some(&json!(2))
        );
    }

    #[test]
    fn proximity_filter_keeps_radius_and_default_network() {
        let mut state = grid_3x3();
        state.agent_positions.insert("ada".into(), "0,0".into());
        state.agent_positions.insert("bob".into(), "2,2".into());
        let query = SpatialQuery::new(Some(&state));
        let filtered = query.filter_by_proximity("ada", 1, DEFAULT_NETWORK).unwrap();

        assert_eq!(filtered.topology_type, TopologyKind::Grid);
        assert!(filtered.locations.contains_key("0,0"));
        assert!(filtered.locations.contains_key("0,1"));
        assert!(filtered.locations.contains_key("1,0"));
        assert!(!filtered.locations.contains_key("2,2"));
        assert!(filtered.agent_positions.contains_key("ada"));
        assert!(!filtered.agent_positions.contains_key("bob"));
        assert!(filtered.check_integrity().is_ok());
    }

    #[test]
    fn proximity_filter_for_unpositioned_agent_keeps_nothing() {
        let state = grid_3x3();
        let query = SpatialQuery::new(Some(&state));
        let filtered = query
            .filter_by_proximity("ghost", 2, DEFAULT_NETWORK)
            .unwrap();
        assert!(filtered.locations.is_empty());
        assert!(filtered.check_integrity().is_ok());
    }

    #[test]
    fn inputs_are_never_mutated() {
        let state = grid_3x3();
        let before = state.clone();
        let query = SpatialQuery::new(Some(&state));
        let _ = query.shortest_path("0,0", "2,2", DEFAULT_NETWORK);
        let _ = query.filter_by_proximity("ada", 1, DEFAULT_NETWORK);
        assert_eq!(state, before);
    }
}
