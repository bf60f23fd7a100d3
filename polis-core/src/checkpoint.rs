//! Checkpoint and run-result record types. The filesystem store that
//! reads and writes them lives in `polis-checkpoint`.

use crate::state::StateSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Why a checkpoint was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointKind {
    /// Periodic `turn_{N}.json`, kept immutable.
    Interval,
    /// `last.json`, overwritten every turn.
    Last,
    /// The run's final `turn_{N}.json`.
    Final,
}

/// One persisted snapshot with its envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The persisted turn (duplicated from `state.turn` for cheap
    /// inspection without decoding the state).
    pub turn: u64,
    /// Why this checkpoint exists.
    pub checkpoint_type: CheckpointKind,
    /// Wall-clock write time.
    pub timestamp: DateTime<Utc>,
    /// Schema fingerprint, gating resume compatibility.
    pub schema_fingerprint: String,
    /// The snapshot itself.
    pub state: StateSnapshot,
}

/// Identity and provenance of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Unique `{name}_{N}agents_{date}_{time}_{seq}` directory name.
    pub run_id: String,
    /// The configured simulation name.
    pub simulation_name: String,
    /// Initial population size.
    pub num_agents: usize,
    /// When the run started.
    pub start_time: DateTime<Utc>,
    /// When the run finished, absent while in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// The configured checkpoint interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_interval: Option<u64>,
    /// The full config, for audit and reproduction.
    pub config_snapshot: serde_json::Value,
    /// Schema fingerprint of the run.
    pub schema_fingerprint: String,
}

/// Everything written to `result.json` when a run completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResults {
    /// Run identity and provenance.
    pub run_metadata: RunMetadata,
    /// The final committed snapshot.
    pub final_state: StateSnapshot,
    /// Turns with an immutable `turn_{N}.json`, sorted ascending.
    pub checkpoint_turns: Vec<u64>,
    /// Aggregates over the final state (population, per-variable
    /// numeric summaries, wall-clock seconds).
    pub summary_stats: BTreeMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&CheckpointKind::Interval).unwrap(),
            "\"interval\""
        );
        assert_eq!(
            serde_json::to_string(&CheckpointKind::Last).unwrap(),
            "\"last\""
        );
        assert_eq!(
            serde_json::to_string(&CheckpointKind::Final).unwrap(),
            "\"final\""
        );
    }

    #[test]
    fn absent_end_time_is_omitted() {
        let metadata = RunMetadata {
            run_id: "r".into(),
            simulation_name: "s".into(),
            num_agents: 2,
            start_time: Utc::now(),
            end_time: None,
            checkpoint_interval: None,
            config_snapshot: serde_json::Value::Null,
            schema_fingerprint: "sha256:0".into(),
        };
        let json = serde_json::to_value(&metadata).unwrap();
        assert!(json.get("end_time").is_none());
        assert!(json.get("checkpoint_interval").is_none());
    }
}
