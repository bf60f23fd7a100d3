//! Property tests for the grid topology and the query surface.

use polis_core::config::{SpatialConfig, TopologyConfig};
use polis_core::spatial::DEFAULT_NETWORK;
use polis_spatial::SpatialQuery;
use polis_spatial::factory;
use proptest::prelude::*;
use std::collections::BTreeMap;

fn grid(width: u32, height: u32, connectivity: u8, wrapping: bool) -> polis_core::spatial::SpatialState {
    factory::build(&SpatialConfig {
        topology: TopologyConfig::Grid {
            width,
            height,
            connectivity,
            wrapping,
        },
        location_attributes: BTreeMap::new(),
        additional_networks: Vec::new(),
    })
    .expect("grid construction is infallible for positive dims")
}

proptest! {
    #[test]
    fn distance_is_symmetric(
        width in 1u32..6,
        height in 1u32..6,
        ax in 0u32..6, ay in 0u32..6,
        bx in 0u32..6, by in 0u32..6,
    ) {
        prop_assume!(ax < width && bx < width && ay < height && by < height);
        let state = grid(width, height, 4, false);
        let query = SpatialQuery::new(Some(&state));
        let a = format!("{ax},{ay}");
        let b = format!("{bx},{by}");
        prop_assert_eq!(
            query.get_distance(&a, &b, DEFAULT_NETWORK),
            query.get_distance(&b, &a, DEFAULT_NETWORK)
        );
    }

    #[test]
    fn open_grid_distance_is_manhattan(
        width in 1u32..6,
        height in 1u32..6,
        ax in 0u32..6, ay in 0u32..6,
        bx in 0u32..6, by in 0u32..6,
    ) {
        prop_assume!(ax < width && bx < width && ay < height && by < height);
        let state = grid(width, height, 4, false);
        let query = SpatialQuery::new(Some(&state));
        let a = format!("{ax},{ay}");
        let b = format!("{bx},{by}");
        let manhattan = i64::from(ax.abs_diff(bx)) + i64::from(ay.abs_diff(by));
        prop_assert_eq!(query.get_distance(&a, &b, DEFAULT_NETWORK), manhattan);
    }

    #[test]
    fn shortest_path_length_matches_distance(
        width in 2u32..6,
        height in 2u32..6,
        bx in 0u32..6, by in 0u32..6,
    ) {
        prop_assume!(bx < width && by < height);
        let state = grid(width, height, 4, false);
        let query = SpatialQuery::new(Some(&state));
        let b = format!("{bx},{by}");
        let distance = query.get_distance("0,0", &b, DEFAULT_NETWORK);
        let path = query.shortest_path("0,0", &b, DEFAULT_NETWORK);
        prop_assert_eq!(path.len() as i64, distance + 1);
        prop_assert_eq!(path.first().map(String::as_str), Some("0,0"));
        prop_assert_eq!(path.last().map(String::as_str), Some(b.as_str()));
        // Every hop is an edge.
        for pair in path.windows(2) {
            prop_assert!(query.is_adjacent(&pair[0], &pair[1], DEFAULT_NETWORK));
        }
    }

    #[test]
    fn wrapping_grid_distance_never_exceeds_open_grid(
        size in 2u32..6,
        bx in 0u32..6, by in 0u32..6,
    ) {
        prop_assume!(bx < size && by < size);
        let open = grid(size, size, 4, false);
        let wrapped = grid(size, size, 4, true);
        let b = format!("{bx},{by}");
        let open_d = SpatialQuery::new(Some(&open)).get_distance("0,0", &b, DEFAULT_NETWORK);
        let wrapped_d = SpatialQuery::new(Some(&wrapped)).get_distance("0,0", &b, DEFAULT_NETWORK);
        prop_assert!(wrapped_d <= open_d);
    }
}
