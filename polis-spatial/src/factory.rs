//! Topology construction from config.

use polis_core::config::{NetworkConfig, SpatialConfig, TopologyConfig};
use polis_core::error::ConfigError;
use polis_core::spatial::{
    DEFAULT_NETWORK, Location, Network, SpatialState, TopologyKind, canonical_edge,
};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

/// Build a spatial state from config: dispatch on the topology
/// family, then apply attribute overrides and additional networks.
pub fn build(config: &SpatialConfig) -> Result<SpatialState, ConfigError> {
    let mut state = match &config.topology {
        TopologyConfig::Grid {
            width,
            height,
            connectivity,
            wrapping,
        } => build_grid(*width, *height, *connectivity, *wrapping),
        TopologyConfig::HexGrid { radius } => build_hex(*radius),
        TopologyConfig::Network { edges_file } => build_network(edges_file)?,
        TopologyConfig::Regions { geojson_file } => build_regions(geojson_file)?,
    };

    for (id, attrs) in &config.location_attributes {
        let location = state.locations.get_mut(id).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "location_attributes override for unknown location {id}"
            ))
        })?;
        location
            .attributes
            .extend(attrs.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    for net in &config.additional_networks {
        state = add_network(state, net)?;
    }

    debug_assert!(state.check_integrity().is_ok());
    Ok(state)
}

fn build_grid(width: u32, height: u32, connectivity: u8, wrapping: bool) -> SpatialState {
    let mut state = SpatialState::empty(TopologyKind::Grid);
    let (width, height) = (i64::from(width), i64::from(height));

    for x in 0..width {
        for y in 0..height {
            let id = format!("{x},{y}");
            let mut location = Location::new(&id);
            location.metadata.insert("x".into(), x.into());
            location.metadata.insert("y".into(), y.into());
            state.locations.insert(id, location);
        }
    }

    let orthogonal: &[(i64, i64)] = &[(1, 0), (-1, 0), (0, 1), (0, -1)];
    let diagonal: &[(i64, i64)] = &[(1, 1), (1, -1), (-1, 1), (-1, -1)];
    let offsets: Vec<(i64, i64)> = if connectivity == 8 {
        orthogonal.iter().chain(diagonal).copied().collect()
    } else {
        orthogonal.to_vec()
    };

    let default = state
        .networks
        .get_mut(DEFAULT_NETWORK)
        .expect("empty state carries the default network");
    for x in 0..width {
        for y in 0..height {
            for (dx, dy) in &offsets {
                let (mut nx, mut ny) = (x + dx, y + dy);
                if wrapping {
                    nx = nx.rem_euclid(width);
                    ny = ny.rem_euclid(height);
                } else if nx < 0 || nx >= width || ny < 0 || ny >= height {
                    continue;
                }
                if (nx, ny) == (x, y) {
                    // A 1-wide wrapping axis folds onto itself.
                    continue;
                }
                default
                    .edges
                    .insert(canonical_edge(&format!("{x},{y}"), &format!("{nx},{ny}")));
            }
        }
    }
    state
}

fn build_hex(radius: u32) -> SpatialState {
    let mut state = SpatialState::empty(TopologyKind::HexGrid);
    let radius = i64::from(radius);
    let in_bounds =
        |q: i64, r: i64| q.abs().max(r.abs()).max((q + r).abs()) <= radius;

    for q in -radius..=radius {
        for r in -radius..=radius {
            if !in_bounds(q, r) {
                continue;
            }
            let id = format!("{q},{r}");
            let mut location = Location::new(&id);
            location.metadata.insert("q".into(), q.into());
            location.metadata.insert("r".into(), r.into());
            state.locations.insert(id, location);
        }
    }

    const NEIGHBORS: [(i64, i64); 6] = [(1, 0), (-1, 0), (0, 1), (0, -1), (1, -1), (-1, 1)];
    let default = state
        .networks
        .get_mut(DEFAULT_NETWORK)
        .expect("empty state carries the default network");
    for q in -radius..=radius {
        for r in -radius..=radius {
            if !in_bounds(q, r) {
                continue;
            }
            for (dq, dr) in NEIGHBORS {
                let (nq, nr) = (q + dq, r + dr);
                if in_bounds(nq, nr) {
                    default
                        .edges
                        .insert(canonical_edge(&format!("{q},{r}"), &format!("{nq},{nr}")));
                }
            }
        }
    }
    state
}

/// On-disk shape of a `network` edges file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NetworkFile {
    nodes: Vec<String>,
    #[serde(default)]
    edges: Vec<[String; 2]>,
    #[serde(default)]
    attributes: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
}

fn build_network(path: &Path) -> Result<SpatialState, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let file: NetworkFile = serde_json::from_str(&text)
        .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;

    let mut state = SpatialState::empty(TopologyKind::Network);
    for node in &file.nodes {
        if node.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "{}: empty node id",
                path.display()
            )));
        }
        if state
            .locations
            .insert(node.clone(), Location::new(node))
            .is_some()
        {
            return Err(ConfigError::Invalid(format!(
                "{}: duplicate node {node}",
                path.display()
            )));
        }
    }
    for (id, attrs) in file.attributes {
        let location = state.locations.get_mut(&id).ok_or_else(|| {
            ConfigError::Invalid(format!("{}: attributes for unknown node {id}", path.display()))
        })?;
        location.attributes.extend(attrs);
    }
    let default = state
        .networks
        .get_mut(DEFAULT_NETWORK)
        .expect("empty state carries the default network");
    for [a, b] in &file.edges {
        for endpoint in [a, b] {
            if !state.locations.contains_key(endpoint) {
                return Err(ConfigError::Invalid(format!(
                    "{}: edge endpoint {endpoint} is not a node",
                    path.display()
                )));
            }
        }
        default.edges.insert(canonical_edge(a, b));
    }
    Ok(state)
}

// ── GeoJSON regions ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(rename = "type")]
    kind: String,
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: BTreeMap<String, serde_json::Value>,
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    #[serde(rename = "type")]
    kind: String,
    coordinates: serde_json::Value,
}

/// A boundary segment as bit-exact coordinate pairs, canonicalized so
/// the same segment walked in either direction compares equal.
type Segment = ((u64, u64), (u64, u64));

fn segments_of(geometry: &Geometry, source: &str) -> Result<HashSet<Segment>, ConfigError> {
    let rings: Vec<&serde_json::Value> = match geometry.kind.as_str() {
        "Polygon" => geometry
            .coordinates
            .as_array()
            .map(|rings| rings.iter().collect())
            .unwrap_or_default(),
        "MultiPolygon" => geometry
            .coordinates
            .as_array()
            .map(|polys| {
                polys
                    .iter()
                    .flat_map(|poly| poly.as_array().into_iter().flatten())
                    .collect()
            })
            .unwrap_or_default(),
        other => {
            return Err(ConfigError::Invalid(format!(
                "{source}: unsupported geometry type {other} (Polygon or MultiPolygon required)"
            )));
        }
    };

    let mut segments = HashSet::new();
    for ring in rings {
        let points: Vec<(u64, u64)> = ring
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|pt| {
                let coords = pt.as_array()?;
                Some((
                    coords.first()?.as_f64()?.to_bits(),
                    coords.get(1)?.as_f64()?.to_bits(),
                ))
            })
            .collect();
        for pair in points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if a != b {
                segments.insert(if a <= b { (a, b) } else { (b, a) });
            }
        }
    }
    Ok(segments)
}

fn build_regions(path: &Path) -> Result<SpatialState, ConfigError> {
    let source = path.display().to_string();
    let text = std::fs::read_to_string(path)?;
    let collection: FeatureCollection = serde_json::from_str(&text)
        .map_err(|e| ConfigError::Parse(format!("{source}: {e}")))?;
    if collection.kind != "FeatureCollection" {
        return Err(ConfigError::Invalid(format!(
            "{source}: expected a FeatureCollection, got {}",
            collection.kind
        )));
    }

    let mut state = SpatialState::empty(TopologyKind::Regions);
    let mut boundaries: HashMap<String, HashSet<Segment>> = HashMap::new();

    for feature in &collection.features {
        let name = feature
            .properties
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "{source}: every feature requires properties.name"
                ))
            })?;
        if name.is_empty() {
            return Err(ConfigError::Invalid(format!("{source}: empty region name")));
        }
        let mut location = Location::new(name);
        for (key, value) in &feature.properties {
            if key != "name" {
                location.attributes.insert(key.clone(), value.clone());
            }
        }
        if state
            .locations
            .insert(name.to_owned(), location)
            .is_some()
        {
            return Err(ConfigError::Invalid(format!(
                "{source}: duplicate region name {name}"
            )));
        }
        boundaries.insert(name.to_owned(), segments_of(&feature.geometry, &source)?);
    }

    // Adjacency: two regions touch when they share a boundary segment.
    let names: Vec<&String> = state.locations.keys().collect();
    let default = state
        .networks
        .get_mut(DEFAULT_NETWORK)
        .expect("empty state carries the default network");
    for (i, a) in names.iter().enumerate() {
        for b in &names[i + 1..] {
            let touches = boundaries[*a]
                .iter()
                .any(|segment| boundaries[*b].contains(segment));
            if touches {
                default.edges.insert(canonical_edge(a, b));
            }
        }
    }
    Ok(state)
}

fn add_network(mut state: SpatialState, config: &NetworkConfig) -> Result<SpatialState, ConfigError> {
    if state.networks.contains_key(&config.name) {
        return Err(ConfigError::Invalid(format!(
            "additional network {} already exists",
            config.name
        )));
    }
    let mut network = Network::new(&config.name);
    network.attributes = config.attributes.clone();
    for [a, b] in &config.edges {
        for endpoint in [a, b] {
            if !state.locations.contains_key(endpoint) {
                return Err(ConfigError::Invalid(format!(
                    "network {}: edge endpoint {endpoint} is not a location",
                    config.name
                )));
            }
        }
        network.edges.insert(canonical_edge(a, b));
    }
    state.networks.insert(config.name.clone(), network);
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn grid_config(width: u32, height: u32, connectivity: u8, wrapping: bool) -> SpatialConfig {
        SpatialConfig {
            topology: TopologyConfig::Grid {
                width,
                height,
                connectivity,
                wrapping,
            },
            location_attributes: BTreeMap::new(),
            additional_networks: Vec::new(),
        }
    }

    #[test]
    fn grid_3x3_has_nine_locations_and_twelve_edges() {
        let state = build(&grid_config(3, 3, 4, false)).unwrap();
        assert_eq!(state.locations.len(), 9);
        assert_eq!(state.networks[DEFAULT_NETWORK].edges.len(), 12);
        assert!(state.networks[DEFAULT_NETWORK].has_edge("0,0", "0,1"));
        assert!(!state.networks[DEFAULT_NETWORK].has_edge("0,0", "1,1"));
    }

    #[test]
    fn grid_8_connectivity_adds_diagonals() {
        let state = build(&grid_config(3, 3, 8, false)).unwrap();
        assert!(state.networks[DEFAULT_NETWORK].has_edge("0,0", "1,1"));
        assert_eq!(state.networks[DEFAULT_NETWORK].edges.len(), 20);
    }

    #[test]
    fn wrapping_grid_connects_opposite_borders() {
        let state = build(&grid_config(3, 3, 4, true)).unwrap();
        assert!(state.networks[DEFAULT_NETWORK].has_edge("0,0", "2,0"));
        assert!(state.networks[DEFAULT_NETWORK].has_edge("0,0", "0,2"));
    }

    #[test]
    fn hex_radius_1_is_seven_cells_with_six_spokes() {
        let config = SpatialConfig {
            topology: TopologyConfig::HexGrid { radius: 1 },
            location_attributes: BTreeMap::new(),
            additional_networks: Vec::new(),
        };
        let state = build(&config).unwrap();
        assert_eq!(state.locations.len(), 7);
        let center_neighbors = state.networks[DEFAULT_NETWORK]
            .edges
            .iter()
            .filter(|(a, b)| a.as_str() == "0,0" || b.as_str() == "0,0")
            .count();
        assert_eq!(center_neighbors, 6);
        // Ring cells excluded by the cube bound: (1,1) is outside.
        assert!(!state.locations.contains_key("1,1"));
    }

    #[test]
    fn network_file_roundtrips_nodes_edges_attributes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"nodes": ["hub", "port"], "edges": [["hub", "port"]],
                "attributes": {{"hub": {{"capacity": 10}}}}}}"#
        )
        .unwrap();
        let config = SpatialConfig {
            topology: TopologyConfig::Network {
                edges_file: file.path().to_path_buf(),
            },
            location_attributes: BTreeMap::new(),
            additional_networks: Vec::new(),
        };
        let state = build(&config).unwrap();
        assert!(state.networks[DEFAULT_NETWORK].has_edge("hub", "port"));
        assert_eq!(
            state.locations["hub"].attributes["capacity"],
            serde_json::json!(10)
        );
    }

    #[test]
    fn network_file_rejects_dangling_edge() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"nodes": ["hub"], "edges": [["hub", "ghost"]]}}"#).unwrap();
        let config = SpatialConfig {
            topology: TopologyConfig::Network {
                edges_file: file.path().to_path_buf(),
            },
            location_attributes: BTreeMap::new(),
            additional_networks: Vec::new(),
        };
        assert!(build(&config).is_err());
    }

    fn square(name: &str, x0: f64) -> String {
        format!(
            r#"{{"type": "Feature", "properties": {{"name": "{name}"}},
                "geometry": {{"type": "Polygon", "coordinates":
                [[[{x0}, 0.0], [{x1}, 0.0], [{x1}, 1.0], [{x0}, 1.0], [{x0}, 0.0]]]}}}}"#,
            x1 = x0 + 1.0
        )
    }

    #[test]
    fn regions_sharing_a_border_segment_are_adjacent() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        // west and east share the x=1 edge; far is detached.
        write!(
            file,
            r#"{{"type": "FeatureCollection", "features": [{}, {}, {}]}}"#,
            square("west", 0.0),
            square("east", 1.0),
            square("far", 10.0),
        )
        .unwrap();
        let config = SpatialConfig {
            topology: TopologyConfig::Regions {
                geojson_file: file.path().to_path_buf(),
            },
            location_attributes: BTreeMap::new(),
            additional_networks: Vec::new(),
        };
        let state = build(&config).unwrap();
        assert!(state.networks[DEFAULT_NETWORK].has_edge("east", "west"));
        assert!(!state.networks[DEFAULT_NETWORK].has_edge("east", "far"));
        assert!(!state.networks[DEFAULT_NETWORK].has_edge("far", "west"));
    }

    #[test]
    fn region_without_name_is_fatal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"type": "FeatureCollection", "features": [
                {{"type": "Feature", "properties": {{}},
                  "geometry": {{"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]]}}}}]}}"#
        )
        .unwrap();
        let config = SpatialConfig {
            topology: TopologyConfig::Regions {
                geojson_file: file.path().to_path_buf(),
            },
            location_attributes: BTreeMap::new(),
            additional_networks: Vec::new(),
        };
        assert!(build(&config).is_err());
    }

    #[test]
    fn overrides_and_additional_networks_apply() {
        let mut config = grid_config(2, 2, 4, false);
        config.location_attributes.insert(
            "0,0".into(),
            BTreeMap::from([("terrain".to_owned(), serde_json::json!("forest"))]),
        );
        config.additional_networks.push(NetworkConfig {
            name: "rail".into(),
            edges: vec![["0,0".into(), "1,1".into()]],
            attributes: BTreeMap::new(),
        });
        let state = build(&config).unwrap();
        assert_eq!(
            state.locations["0,0"].attributes["terrain"],
            serde_json::json!("forest")
        );
        assert!(state.networks["rail"].has_edge("0,0", "1,1"));
    }

    #[test]
    fn override_for_unknown_location_is_fatal() {
        let mut config = grid_config(2, 2, 4, false);
        config
            .location_attributes
            .insert("9,9".into(), BTreeMap::new());
        assert!(build(&config).is_err());
    }
}
