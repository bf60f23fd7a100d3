//! Spatial state types — the topology data carried inside a snapshot.
//!
//! Behavior lives in `polis-spatial`: the factory builds these values
//! from config, the query surface reads them, and engine-only
//! mutations produce new ones. This module only defines the wire
//! shape and its referential-integrity check.

use crate::error::StateError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The network every spatial state carries. It cannot be removed.
pub const DEFAULT_NETWORK: &str = "default";

/// Supported topology families.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyKind {
    /// Rectangular grid with 4- or 8-connectivity.
    Grid,
    /// Hexagonal grid in axial coordinates.
    HexGrid,
    /// Arbitrary node/edge graph loaded from JSON.
    Network,
    /// Named regions loaded from GeoJSON, adjacency by shared border.
    Regions,
}

/// A place agents can occupy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Unique non-empty id (`"x,y"`, `"q,r"`, node name, region name).
    pub id: String,
    /// Domain attributes, engine-writable.
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
    /// Construction metadata (coordinates, source feature), read-only.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Location {
    /// Create a location with no attributes or metadata.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }
}

/// A named edge set over locations. Edges are unordered pairs stored
/// in canonical (sorted) order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    /// The network name.
    pub name: String,
    /// Canonicalized unordered edges, serialized as `[["a","b"], …]`.
    #[serde(default)]
    pub edges: BTreeSet<(String, String)>,
    /// Domain attributes of the network itself.
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Network {
    /// Create an empty network.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            edges: BTreeSet::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Whether the canonical form of `(a, b)` is an edge.
    #[must_use]
    pub fn has_edge(&self, a: &str, b: &str) -> bool {
        self.edges.contains(&canonical_edge(a, b))
    }
}

/// Typed relation between two locations, keyed `"a|b"` (sorted).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    /// Domain type tag (`"road"`, `"border"`, …).
    #[serde(rename = "type")]
    pub kind: String,
    /// Domain attributes of the connection.
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
    /// Whether the relation reads the same in both directions.
    pub bidirectional: bool,
}

/// The spatial layer of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialState {
    /// Which topology family built this state.
    pub topology_type: TopologyKind,
    /// Agent name → location id. Every value must be a known location.
    #[serde(default)]
    pub agent_positions: BTreeMap<String, String>,
    /// Location id → location.
    pub locations: BTreeMap<String, Location>,
    /// Network name → network. Always contains `"default"`.
    pub networks: BTreeMap<String, Network>,
    /// `"a|b"` → connection.
    #[serde(default)]
    pub connections: BTreeMap<String, Connection>,
}

/// Canonical (sorted) form of an unordered location pair.
#[must_use]
pub fn canonical_edge(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_owned(), b.to_owned())
    } else {
        (b.to_owned(), a.to_owned())
    }
}

/// Canonical `"a|b"` connection key for an unordered location pair.
#[must_use]
pub fn connection_key(a: &str, b: &str) -> String {
    let (lo, hi) = canonical_edge(a, b);
    format!("{lo}|{hi}")
}

impl SpatialState {
    /// An empty state of the given topology with the `"default"`
    /// network present.
    #[must_use]
    pub fn empty(topology_type: TopologyKind) -> Self {
        Self {
            topology_type,
            agent_positions: BTreeMap::new(),
            locations: BTreeMap::new(),
            networks: BTreeMap::from([(
                DEFAULT_NETWORK.to_owned(),
                Network::new(DEFAULT_NETWORK),
            )]),
            connections: BTreeMap::new(),
        }
    }

    /// Referential integrity: positions and edge endpoints reference
    /// known locations, location ids are non-empty and match their
    /// keys, and the `"default"` network exists.
    pub fn check_integrity(&self) -> Result<(), StateError> {
        let fail = |msg: String| Err(StateError::InvariantViolation(msg));

        if !self.networks.contains_key(DEFAULT_NETWORK) {
            return fail("spatial state is missing the \"default\" network".into());
        }
        for (id, loc) in &self.locations {
            if id.is_empty() {
                return fail("empty location id".into());
            }
            if loc.id != *id {
                return fail(format!("location key {id} disagrees with id {}", loc.id));
            }
        }
        for (agent, loc) in &self.agent_positions {
            if !self.locations.contains_key(loc) {
                return fail(format!("agent {agent} positioned at unknown location {loc}"));
            }
        }
        for net in self.networks.values() {
            for (a, b) in &net.edges {
                if a > b {
                    return fail(format!(
                        "network {}: edge ({a}, {b}) is not canonicalized",
                        net.name
                    ));
                }
                for endpoint in [a, b] {
                    if !self.locations.contains_key(endpoint) {
                        return fail(format!(
                            "network {}: edge endpoint {endpoint} is not a location",
                            net.name
                        ));
                    }
                }
            }
        }
        for key in self.connections.keys() {
            let Some((a, b)) = key.split_once('|') else {
                return fail(format!("malformed connection key {key}"));
            };
            for endpoint in [a, b] {
                if !self.locations.contains_key(endpoint) {
                    return fail(format!(
                        "connection {key}: endpoint {endpoint} is not a location"
                    ));
                }
            }
        }
        Ok(())
    }
}
