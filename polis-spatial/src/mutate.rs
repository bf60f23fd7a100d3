//! Engine-only spatial mutations.
//!
//! Every function here returns a new `SpatialState` and leaves its
//! input untouched; the engine threads the result into the draft
//! snapshot via `StateUpdates::spatial`. Unknown ids are errors (they
//! abort the turn), unlike queries — an engine referencing a missing
//! location is a bug, not a user-intent mistake. Only
//! `remove_connection` is deliberately idempotent.

use polis_core::error::SpatialError;
use polis_core::spatial::{
    Connection, DEFAULT_NETWORK, Network, SpatialState, canonical_edge, connection_key,
};
use std::collections::BTreeMap;

fn require_location(state: &SpatialState, id: &str) -> Result<(), SpatialError> {
    if state.locations.contains_key(id) {
        Ok(())
    } else {
        Err(SpatialError::UnknownLocation(id.to_owned()))
    }
}

/// Move one agent to a location.
pub fn move_agent(
    state: &SpatialState,
    agent: &str,
    to: &str,
) -> Result<SpatialState, SpatialError> {
    require_location(state, to)?;
    let mut next = state.clone();
    next.agent_positions.insert(agent.to_owned(), to.to_owned());
    Ok(next)
}

/// Move several agents atomically: every target is validated before
/// any move applies, so the result is all-or-none.
pub fn move_agents_batch(
    state: &SpatialState,
    moves: &[(String, String)],
) -> Result<SpatialState, SpatialError> {
    for (_, to) in moves {
        require_location(state, to)?;
    }
    let mut next = state.clone();
    for (agent, to) in moves {
        next.agent_positions.insert(agent.clone(), to.clone());
    }
    Ok(next)
}

/// Set one attribute on a location.
pub fn set_location_attribute(
    state: &SpatialState,
    location: &str,
    key: &str,
    value: serde_json::Value,
) -> Result<SpatialState, SpatialError> {
    require_location(state, location)?;
    let mut next = state.clone();
    next.locations
        .get_mut(location)
        .expect("validated above")
        .attributes
        .insert(key.to_owned(), value);
    Ok(next)
}

/// Merge a batch of attributes into a location.
pub fn update_location_attributes(
    state: &SpatialState,
    location: &str,
    attributes: BTreeMap<String, serde_json::Value>,
) -> Result<SpatialState, SpatialError> {
    require_location(state, location)?;
    let mut next = state.clone();
    next.locations
        .get_mut(location)
        .expect("validated above")
        .attributes
        .extend(attributes);
    Ok(next)
}

/// Merge a batch of attributes into every listed location, atomically.
pub fn apply_to_region(
    state: &SpatialState,
    locations: &[String],
    attributes: BTreeMap<String, serde_json::Value>,
) -> Result<SpatialState, SpatialError> {
    for id in locations {
        require_location(state, id)?;
    }
    let mut next = state.clone();
    for id in locations {
        next.locations
            .get_mut(id)
            .expect("validated above")
            .attributes
            .extend(attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    Ok(next)
}

/// Create a typed connection between two locations (replacing any
/// existing one for the pair).
pub fn add_connection(
    state: &SpatialState,
    a: &str,
    b: &str,
    kind: &str,
    attributes: BTreeMap<String, serde_json::Value>,
    bidirectional: bool,
) -> Result<SpatialState, SpatialError> {
    require_location(state, a)?;
    require_location(state, b)?;
    let mut next = state.clone();
    next.connections.insert(
        connection_key(a, b),
        Connection {
            kind: kind.to_owned(),
            attributes,
            bidirectional,
        },
    );
    Ok(next)
}

/// Remove the connection between two locations. Idempotent: removing
/// an absent connection returns an equal state.
#[must_use]
pub fn remove_connection(state: &SpatialState, a: &str, b: &str) -> SpatialState {
    let mut next = state.clone();
    next.connections.remove(&connection_key(a, b));
    next
}

/// Set one attribute on an existing connection.
pub fn update_connection_attribute(
    state: &SpatialState,
    a: &str,
    b: &str,
    key: &str,
    value: serde_json::Value,
) -> Result<SpatialState, SpatialError> {
    let connection_id = connection_key(a, b);
    let mut next = state.clone();
    let connection = next
        .connections
        .get_mut(&connection_id)
        .ok_or(SpatialError::UnknownConnection(connection_id))?;
    connection.attributes.insert(key.to_owned(), value);
    Ok(next)
}

/// Create a named network over existing locations.
pub fn create_network(
    state: &SpatialState,
    name: &str,
    edges: &[(String, String)],
) -> Result<SpatialState, SpatialError> {
    if state.networks.contains_key(name) {
        return Err(SpatialError::DuplicateNetwork(name.to_owned()));
    }
    for (a, b) in edges {
        require_location(state, a)?;
        require_location(state, b)?;
    }
    let mut next = state.clone();
    let mut network = Network::new(name);
    for (a, b) in edges {
        network.edges.insert(canonical_edge(a, b));
    }
    next.networks.insert(name.to_owned(), network);
    Ok(next)
}

/// Remove a named network. The `"default"` network is protected.
pub fn remove_network(state: &SpatialState, name: &str) -> Result<SpatialState, SpatialError> {
    if name == DEFAULT_NETWORK {
        return Err(SpatialError::ProtectedNetwork);
    }
    if !state.networks.contains_key(name) {
        return Err(SpatialError::UnknownNetwork(name.to_owned()));
    }
    let mut next = state.clone();
    next.networks.remove(name);
    Ok(next)
}
